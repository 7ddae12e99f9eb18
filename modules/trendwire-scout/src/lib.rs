pub mod aggregator;
pub mod canonicalizer;
pub mod dictionary;
pub mod extractor;
pub mod knowledge_base;
pub mod lexicon;
pub mod scout;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod velocity;

pub use scout::{ScoutDeps, TrendScout};
pub use stats::RunStats;
