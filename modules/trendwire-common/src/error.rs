use thiserror::Error;

/// Failures inside one pipeline run. None of these abort a run on their own:
/// the runner contains them per batch or per entity and tallies them.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Network failure, timeout, or non-2xx from the text-understanding call.
    #[error("Extraction call failed: {0}")]
    ExtractionCall(String),

    /// The model answered but the payload was not usable JSON.
    #[error("Extraction response unparseable: {0}")]
    ExtractionParse(String),

    /// External knowledge base unreachable or erroring. Resolution degrades
    /// to passthrough.
    #[error("Entity lookup failed for '{entity}': {message}")]
    ResolutionLookup { entity: String, message: String },

    /// Concurrent upsert could not be merged within the retry budget.
    #[error("Persistence conflict on {key}: {message}")]
    PersistenceConflict { key: String, message: String },

    /// No records in the audit window.
    #[error("No audit data in window: {0}")]
    AuditDataUnavailable(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl PipelineError {
    /// Short stable tag used in run stats and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExtractionCall(_) => "extraction_call",
            Self::ExtractionParse(_) => "extraction_parse",
            Self::ResolutionLookup { .. } => "resolution_lookup",
            Self::PersistenceConflict { .. } => "persistence_conflict",
            Self::AuditDataUnavailable(_) => "audit_data_unavailable",
            Self::Anyhow(_) => "other",
        }
    }
}
