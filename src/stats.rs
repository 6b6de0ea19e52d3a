use std::sync::atomic::{AtomicU64, Ordering};

/// Counters collected while streaming citations
#[derive(Default, Debug)]
pub struct IngestStats {
    pub citations_parsed: AtomicU64,
    pub versions_skipped: AtomicU64,
    pub invalid_citations: AtomicU64,
    pub deletions_seen: AtomicU64,
    pub sources_read: AtomicU64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_citations(&self) {
        self.citations_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped(&self) {
        self.versions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_invalid(&self) {
        self.invalid_citations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_deletions(&self, count: u64) {
        self.deletions_seen.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_sources(&self) {
        self.sources_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn citations(&self) -> u64 {
        self.citations_parsed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.versions_skipped.load(Ordering::Relaxed)
    }

    pub fn invalid(&self) -> u64 {
        self.invalid_citations.load(Ordering::Relaxed)
    }

    pub fn deletions(&self) -> u64 {
        self.deletions_seen.load(Ordering::Relaxed)
    }

    pub fn sources(&self) -> u64 {
        self.sources_read.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_zero() {
        let stats = IngestStats::new();
        assert_eq!(stats.citations(), 0);
        assert_eq!(stats.skipped(), 0);
        assert_eq!(stats.invalid(), 0);
        assert_eq!(stats.deletions(), 0);
        assert_eq!(stats.sources(), 0);
    }

    #[test]
    fn mixed_operations() {
        let stats = IngestStats::new();
        stats.inc_citations();
        stats.inc_citations();
        stats.inc_skipped();
        stats.inc_invalid();
        stats.add_deletions(3);
        stats.add_deletions(2);
        stats.inc_sources();

        assert_eq!(stats.citations(), 2);
        assert_eq!(stats.skipped(), 1);
        assert_eq!(stats.invalid(), 1);
        assert_eq!(stats.deletions(), 5);
        assert_eq!(stats.sources(), 1);
    }
}
