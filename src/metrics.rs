use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing load, query, and summary activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_loaded: AtomicU64,
    chunks_indexed: AtomicU64,
    index_rebuilds: AtomicU64,
    index_reuses: AtomicU64,
    questions_answered: AtomicU64,
    summaries_generated: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a loaded document, its chunk count, and whether its index had to be rebuilt.
    pub fn record_load(&self, chunk_count: u64, rebuilt: bool) {
        self.documents_loaded.fetch_add(1, Ordering::Relaxed);
        if rebuilt {
            self.index_rebuilds.fetch_add(1, Ordering::Relaxed);
            self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
        } else {
            self.index_reuses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an answered question.
    pub fn record_question(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a generated summary.
    pub fn record_summary(&self) {
        self.summaries_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_loaded: self.documents_loaded.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            index_rebuilds: self.index_rebuilds.load(Ordering::Relaxed),
            index_reuses: self.index_reuses.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            summaries_generated: self.summaries_generated.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of load requests completed since startup.
    pub documents_loaded: u64,
    /// Chunks embedded across all index rebuilds.
    pub chunks_indexed: u64,
    /// Loads that had to build a fresh index.
    pub index_rebuilds: u64,
    /// Loads that reopened a persisted index.
    pub index_reuses: u64,
    /// Questions answered against a loaded document.
    pub questions_answered: u64,
    /// Summaries produced.
    pub summaries_generated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_rebuilds_and_reuses() {
        let metrics = ServiceMetrics::new();
        metrics.record_load(2, true);
        metrics.record_load(2, false);
        metrics.record_load(3, true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_loaded, 3);
        assert_eq!(snapshot.index_rebuilds, 2);
        assert_eq!(snapshot.index_reuses, 1);
        assert_eq!(snapshot.chunks_indexed, 5);
    }

    #[test]
    fn snapshot_is_consistent() {
        let metrics = ServiceMetrics::new();
        metrics.record_question();
        metrics.record_summary();
        metrics.record_summary();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_loaded, 0);
        assert_eq!(snapshot.questions_answered, 1);
        assert_eq!(snapshot.summaries_generated, 2);
    }
}
