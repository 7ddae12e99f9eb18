pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;
pub mod trending;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use error::{Result, StoreError};
pub use memory::{ExtractionStatus, MemoryAliasStore, MemoryDocumentSource, MemoryTrendStore};
pub use postgres::PgStore;
pub use traits::{AliasStore, DocumentSource, ScoreUpdate, TrendStore};
pub use trending::select_trending;
