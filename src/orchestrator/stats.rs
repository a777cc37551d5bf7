//! Run statistics

#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub entities_created: usize,
    pub entities_updated: usize,
    pub mentions_created: usize,
    pub relationships_created: usize,
    pub duration_s: f64,
    pub errors: Vec<String>,
}

impl Statistics {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.processed as f64 / self.total as f64
    }
}

/// Why a run ended without visiting every discovered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every discovered document was visited.
    Exhausted,
    /// `max_batch_docs` successful non-skipped documents were processed.
    BatchLimitReached,
    /// The consecutive-failure counter exceeded the configured threshold.
    FailureThresholdExceeded,
    /// A user interrupt was observed between documents.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stats: Statistics,
    pub stop_reason: StopReason,
}

impl RunOutcome {
    /// Exit code: 2 on failure-threshold abort, 1 if any document
    /// failed (but the run otherwise completed), 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.stop_reason == StopReason::FailureThresholdExceeded {
            2
        } else if self.stats.failed > 0 {
            1
        } else {
            0
        }
    }
}
