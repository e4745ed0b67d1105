//! Batch scheduling primitives: per-symbol statuses, phase and run
//! summaries, and the retry-once policy.
//!
//! Each external invocation selects a small batch, runs its phases strictly
//! sequentially, and reports per-symbol terminal statuses. A symbol/phase
//! that fails its first attempt is retried exactly once after a fixed
//! delay, and whatever the retry produces is final.

use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;

use fundsync_core::Symbol;

/// Symbols per fundamentals scan invocation.
pub const SUMMARY_BATCH_SIZE: usize = 10;

/// Symbols per statement scan invocation. Statement ingestion hits several
/// endpoints per symbol, so batches stay minimal.
pub const STATEMENT_BATCH_SIZE: usize = 1;

/// Delay before the single retry of a failed symbol/phase.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Terminal status of one symbol in one phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolStatus {
    /// Records were produced and persisted.
    Success,
    /// Nothing to do: data already fresh in storage.
    Skipped,
    /// Upstream or persistence failure.
    Error,
    /// Providers responded but yielded no usable data.
    NoData,
}

impl SymbolStatus {
    /// True for statuses that trigger the one retry.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Error | Self::NoData)
    }
}

/// Outcome of one symbol in one phase.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolOutcome {
    /// The symbol processed.
    pub symbol: Symbol,
    /// Phase this outcome belongs to.
    pub phase: String,
    /// Terminal status.
    pub status: SymbolStatus,
    /// Failure or skip detail, when there is one.
    pub detail: Option<String>,
    /// Records persisted for this symbol in this phase.
    pub records: usize,
}

/// Aggregated counts for one phase.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSummary {
    /// Phase name.
    pub phase: String,
    /// Symbols that produced persisted records.
    pub success: usize,
    /// Symbols skipped as already fresh.
    pub skipped: usize,
    /// Symbols that failed.
    pub errors: usize,
    /// Symbols with no usable data.
    pub no_data: usize,
    /// Records persisted in this phase.
    pub records_saved: usize,
    /// Audit coverage after reconciliation, for fundamentals phases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage_pct: Option<f64>,
}

impl PhaseSummary {
    /// Creates an empty summary for a named phase.
    #[must_use]
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            ..Default::default()
        }
    }

    /// Folds one symbol outcome into the counts.
    pub fn record(&mut self, outcome: &SymbolOutcome) {
        match outcome.status {
            SymbolStatus::Success => self.success += 1,
            SymbolStatus::Skipped => self.skipped += 1,
            SymbolStatus::Error => self.errors += 1,
            SymbolStatus::NoData => self.no_data += 1,
        }
        self.records_saved += outcome.records;
    }
}

/// Aggregated counts for a whole run.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Symbols processed this invocation.
    pub processed: usize,
    /// Symbols with at least one successful phase.
    pub successful: usize,
    /// Symbols skipped as already fresh.
    pub skipped: usize,
    /// Symbols whose final status was an error.
    pub errors: usize,
    /// Symbols whose final status was no-data.
    pub no_data: usize,
    /// Records persisted across all phases.
    pub records_saved: usize,
    /// Upstream fetches avoided by the freshness guard.
    pub duplicates_prevented: usize,
    /// Wall-clock processing time in milliseconds.
    pub processing_ms: u128,
}

/// Runs an operation, retrying exactly once if the first attempt ends in a
/// retryable status. The second attempt's outcome is final either way.
pub async fn with_retry_once<F, Fut>(mut op: F) -> SymbolOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SymbolOutcome>,
{
    let first = op().await;
    if !first.status.is_retryable() {
        return first;
    }
    sleep(RETRY_DELAY).await;
    op().await
}
