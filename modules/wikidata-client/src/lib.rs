pub mod error;
pub mod types;

pub use error::{Result, WikidataError};
pub use types::SearchHit;

use types::SearchResponse;

const BASE_URL: &str = "https://www.wikidata.org/w/api.php";

/// Wikidata asks API consumers to identify themselves.
const USER_AGENT: &str = "trendwire/0.1 (entity canonicalization)";

pub struct WikidataClient {
    client: reqwest::Client,
    base_url: String,
    language: String,
}

impl WikidataClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: BASE_URL.to_string(),
            language: "en".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Search entities by free-text name and return up to `limit` hits,
    /// best match first.
    pub async fn search(&self, name: &str, limit: u32) -> Result<Vec<SearchHit>> {
        let limit = limit.clamp(1, 50).to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("action", "wbsearchentities"),
                ("search", name),
                ("language", self.language.as_str()),
                ("uselang", self.language.as_str()),
                ("type", "item"),
                ("format", "json"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WikidataError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&body)?;
        tracing::debug!(name, hits = parsed.search.len(), "Wikidata search");
        Ok(parsed.search)
    }

    /// Best single match for a name, if any.
    pub async fn best_match(&self, name: &str) -> Result<Option<SearchHit>> {
        Ok(self.search(name, 1).await?.into_iter().next())
    }
}

impl Default for WikidataClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_envelope() {
        let raw = r#"{
            "searchinfo": {"search": "nato"},
            "search": [
                {"id": "Q7184", "label": "NATO", "description": "intergovernmental military alliance"},
                {"id": "Q123", "label": "Nato"}
            ],
            "success": 1
        }"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.search.len(), 2);
        assert_eq!(parsed.search[0].label.as_deref(), Some("NATO"));
        assert!(parsed.search[1].description.is_none());
    }

    #[test]
    fn missing_search_array_is_empty() {
        let parsed: SearchResponse = serde_json::from_str(r#"{"success": 1}"#).unwrap();
        assert!(parsed.search.is_empty());
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let client = WikidataClient::new().with_base_url("http://127.0.0.1:9/w/api.php");
        let err = client.best_match("nato").await.unwrap_err();
        assert!(matches!(err, WikidataError::Network(_)));
    }
}
