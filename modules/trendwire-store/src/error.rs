use trendwire_common::PipelineError;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Concurrent bucket writers kept colliding past the retry budget.
    #[error("Upsert conflict on {key} after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },

    #[error("Invalid write: {0}")]
    InvalidWrite(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Serialization failure or deadlock; the transaction can be replayed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { key, attempts } => PipelineError::PersistenceConflict {
                key,
                message: format!("gave up after {attempts} attempts"),
            },
            other => PipelineError::Anyhow(anyhow::Error::new(other)),
        }
    }
}
