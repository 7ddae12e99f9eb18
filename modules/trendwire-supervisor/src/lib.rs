pub mod checks;
pub mod supervisor;
pub mod types;

pub use supervisor::QualityAuditor;
pub use types::{AuditFinding, AuditReport, CheckStatus, IssueType, SampleRecord};
