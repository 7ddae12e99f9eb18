use std::collections::BTreeMap;

use trendwire_common::ResolutionMethod;

use crate::extractor::Rejection;

#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub articles_analyzed: u32,
    pub batches_submitted: u32,
    pub batches_failed: u32,
    pub batches_skipped: u32,
    pub topics_extracted: u32,
    pub candidates_rejected: BTreeMap<Rejection, u32>,
    pub candidates_invalid: u32,
    pub candidates_unmatched: u32,
    pub resolutions: BTreeMap<&'static str, u32>,
    pub kb_lookups: u32,
    pub kb_failures: u32,
    pub topics_stored: u32,
    pub buckets_scored: u32,
    pub cache_writes_failed: u32,
    pub documents_released: u32,
    /// Per-batch and per-bucket failures that did not abort the run.
    pub non_fatal_errors: Vec<String>,
}

impl RunStats {
    pub fn record_rejection(&mut self, rejection: Rejection) {
        *self.candidates_rejected.entry(rejection).or_default() += 1;
    }

    pub fn record_resolution(&mut self, method: ResolutionMethod) {
        *self.resolutions.entry(method.as_str()).or_default() += 1;
    }

    pub fn rejected_total(&self) -> u32 {
        self.candidates_rejected.values().sum()
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Trend Run Complete ===")?;
        writeln!(f, "Articles analyzed:  {}", self.articles_analyzed)?;
        writeln!(f, "Batches submitted:  {}", self.batches_submitted)?;
        writeln!(f, "Batches failed:     {}", self.batches_failed)?;
        writeln!(f, "Batches skipped:    {}", self.batches_skipped)?;
        writeln!(f, "Topics extracted:   {}", self.topics_extracted)?;
        writeln!(f, "Rejected:           {}", self.rejected_total())?;
        writeln!(f, "Invalid entities:   {}", self.candidates_invalid)?;
        writeln!(f, "Unmatched:          {}", self.candidates_unmatched)?;
        writeln!(f, "Topics stored:      {}", self.topics_stored)?;
        writeln!(f, "Buckets scored:     {}", self.buckets_scored)?;
        writeln!(f, "Docs released:      {}", self.documents_released)?;
        if !self.candidates_rejected.is_empty() {
            writeln!(f, "\nRejections:")?;
            for (rule, count) in &self.candidates_rejected {
                writeln!(f, "  {rule}: {count}")?;
            }
        }
        if !self.resolutions.is_empty() {
            writeln!(f, "\nResolution:")?;
            for (method, count) in &self.resolutions {
                writeln!(f, "  {method}: {count}")?;
            }
            writeln!(
                f,
                "  knowledge base lookups: {} ({} failed)",
                self.kb_lookups, self.kb_failures
            )?;
        }
        if self.cache_writes_failed > 0 {
            writeln!(f, "Cache writes failed: {}", self.cache_writes_failed)?;
        }
        if !self.non_fatal_errors.is_empty() {
            writeln!(f, "\nErrors ({}):", self.non_fatal_errors.len())?;
            for err in &self.non_fatal_errors {
                writeln!(f, "  {err}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tallies_and_renders() {
        let mut stats = RunStats::default();
        stats.record_rejection(Rejection::Publisher);
        stats.record_rejection(Rejection::Publisher);
        stats.record_rejection(Rejection::WordCount);
        stats.record_resolution(ResolutionMethod::Fuzzy);
        assert_eq!(stats.rejected_total(), 3);

        let out = stats.to_string();
        assert!(out.contains("publisher: 2"));
        assert!(out.contains("fuzzy: 1"));
    }
}
