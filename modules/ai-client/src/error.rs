use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid header value: {0}")]
    Header(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("ANTHROPIC_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Empty response from model {model}")]
    EmptyResponse { model: String },
}

impl AiError {
    /// Whether the provider rejected the request (non-2xx) rather than the
    /// transport failing.
    pub fn is_api_error(&self) -> bool {
        matches!(self, AiError::Api { .. })
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AiError::Parse(err.to_string())
        } else {
            AiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AiError {
    fn from(err: serde_json::Error) -> Self {
        AiError::Parse(err.to_string())
    }
}
