//! Service entry points: scan requests, phase orchestration, run reports.
//!
//! One [`IngestService`] owns the configured providers and the store. Each
//! scan invocation selects a small batch of stale symbols, fans out across
//! the summary providers (or walks the statement providers per symbol), and
//! reports a [`ScanResponse`] whose failures are data, never errors. Only
//! request parsing and universe acquisition surface as `Err`.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use fundsync_core::{
    FetchOutcome, FundamentalSnapshot, FundamentalStore, IngestError, PeriodKind, Result,
    StatementOutcome, Symbol,
};

use crate::coverage::{self, COVERAGE_TARGET_PCT, SectorAverageTable};
use crate::gateway;
use crate::guard::FreshnessGuard;
use crate::merge::{self, SourceBatch, StatementBatch};
use crate::normalize;
use crate::providers::ProviderSet;
use crate::scheduler::{
    PhaseSummary, RETRY_DELAY, RunSummary, STATEMENT_BATCH_SIZE, SUMMARY_BATCH_SIZE, SymbolOutcome,
    SymbolStatus, with_retry_once,
};
use crate::universe;

/// Provenance source tag merged records are stored under.
pub const RECONCILED_SOURCE: &str = "reconciled";

/// Individual per-symbol results included in a response, at most.
pub const RESULTS_CAP: usize = 25;

/// Parameters of one scan invocation.
///
/// All fields are optional in the JSON body; an empty object runs a default
/// freshness-guarded batch.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanRequest {
    /// Explicit symbols to process, bypassing the freshness partition.
    pub symbols: Option<Vec<String>>,
    /// Cap on symbols processed this invocation.
    pub max_symbols: Option<usize>,
    /// Ignore freshness windows and re-fetch everything selected.
    pub force_refresh: bool,
    /// Skip the quarterly phase of a statement scan.
    pub skip_quarterly: bool,
    /// Skip the annual phase of a statement scan.
    pub skip_annual: bool,
    /// Select from the most recently added watchlist entries first.
    pub prioritize_recent: bool,
}

impl ScanRequest {
    /// Parses a request from a JSON body.
    ///
    /// # Errors
    /// Returns [`IngestError::InvalidParameter`] on malformed JSON; this is
    /// one of the two failures a caller sees as an error.
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| IngestError::InvalidParameter(e.to_string()))
    }
}

/// Result of one scan invocation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    /// False only when the batch had work and nothing was produced.
    pub success: bool,
    /// Aggregated counts for the whole run.
    pub summary: RunSummary,
    /// Per-phase summaries, in execution order.
    pub phases: Vec<PhaseSummary>,
    /// Capped sample of individual per-symbol results.
    pub results: Vec<SymbolOutcome>,
}

impl ScanResponse {
    /// Status code for an HTTP-boundary caller: 200 when the run produced
    /// records, 206 otherwise. Failures inside the run never map to 5xx.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        if self.summary.records_saved > 0 { 200 } else { 206 }
    }
}

/// The selected batch for one invocation, recomputed from freshness state.
#[derive(Debug)]
struct BatchPlan {
    batch: Vec<Symbol>,
    fresh_skipped: usize,
    deferred: usize,
}

/// One attempt at the fundamentals phase over a set of symbols.
struct FundamentalsAttempt {
    outcomes: Vec<SymbolOutcome>,
    records: Vec<FundamentalSnapshot>,
    saved: usize,
}

/// Ingestion pipeline bound to a provider set and a store.
pub struct IngestService {
    providers: ProviderSet,
    store: Arc<dyn FundamentalStore>,
}

impl std::fmt::Debug for IngestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestService")
            .field("providers", &self.providers)
            .finish()
    }
}

impl IngestService {
    /// Creates a service over the given providers and store.
    #[must_use]
    pub fn new(providers: ProviderSet, store: Arc<dyn FundamentalStore>) -> Self {
        Self { providers, store }
    }

    /// Runs one fundamentals scan invocation.
    ///
    /// Summary providers fan out concurrently; their partial records are
    /// merged first-non-null-wins in registration order, interpolated up
    /// toward the coverage target, and persisted under the reconciled tag.
    /// Symbols whose first attempt ends in `error` or `no_data` are retried
    /// exactly once.
    ///
    /// # Errors
    /// Only universe acquisition failures propagate.
    pub async fn scan_fundamentals(&self, request: &ScanRequest) -> Result<ScanResponse> {
        let started = Instant::now();
        let today = Utc::now().date_naive();
        let plan = self.plan_batch(request, SUMMARY_BATCH_SIZE, false).await?;
        info!(
            batch = plan.batch.len(),
            fresh_skipped = plan.fresh_skipped,
            deferred = plan.deferred,
            "Fundamentals scan batch selected"
        );

        let primary = self.fundamentals_attempt(&plan.batch, today).await;

        let retry_symbols: Vec<Symbol> = primary
            .outcomes
            .iter()
            .filter(|o| o.status.is_retryable())
            .map(|o| o.symbol.clone())
            .collect();

        let (outcomes, records, saved) = if retry_symbols.is_empty() {
            (primary.outcomes, primary.records, primary.saved)
        } else {
            debug!(count = retry_symbols.len(), "Retrying failed symbols once");
            sleep(RETRY_DELAY).await;
            let retry = self.fundamentals_attempt(&retry_symbols, today).await;

            let retried: HashSet<&Symbol> = retry_symbols.iter().collect();
            let mut outcomes = primary.outcomes;
            for result in retry.outcomes {
                if let Some(slot) = outcomes.iter_mut().find(|o| o.symbol == result.symbol) {
                    *slot = result;
                }
            }
            let mut records: Vec<FundamentalSnapshot> = primary
                .records
                .into_iter()
                .filter(|r| !retried.contains(&r.symbol))
                .collect();
            records.extend(retry.records);
            (outcomes, records, primary.saved + retry.saved)
        };

        let mut phase = PhaseSummary::new("fundamentals");
        for outcome in &outcomes {
            phase.record(outcome);
        }
        if !plan.batch.is_empty() {
            phase.coverage_pct = Some(coverage::audit_coverage(&records));
        }

        Ok(self.finish(&plan, vec![phase], outcomes, saved, 0, started))
    }

    /// Runs one statement scan invocation.
    ///
    /// Phases run sequentially and exhaustively: every symbol's quarterly
    /// periods, then every symbol's annual periods. Within a phase, symbols
    /// are processed one at a time and retried once on failure.
    ///
    /// # Errors
    /// Only universe acquisition failures propagate.
    pub async fn scan_statements(&self, request: &ScanRequest) -> Result<ScanResponse> {
        let started = Instant::now();
        let today = Utc::now().date_naive();
        let plan = self.plan_batch(request, STATEMENT_BATCH_SIZE, true).await?;
        info!(
            batch = plan.batch.len(),
            fresh_skipped = plan.fresh_skipped,
            deferred = plan.deferred,
            "Statement scan batch selected"
        );

        let mut phases = Vec::new();
        let mut outcomes = Vec::new();
        let mut saved = 0usize;
        let mut period_duplicates = 0usize;

        let selected: [(PeriodKind, &str, bool); 2] = [
            (PeriodKind::Quarterly, "quarterly", request.skip_quarterly),
            (PeriodKind::Annual, "annual", request.skip_annual),
        ];

        for (kind, phase_name, skipped) in selected {
            if skipped {
                continue;
            }
            let mut phase = PhaseSummary::new(phase_name);

            for symbol in &plan.batch {
                let duplicates = AtomicUsize::new(0);
                let outcome = with_retry_once(|| {
                    self.statement_symbol(
                        symbol,
                        kind,
                        phase_name,
                        request.force_refresh,
                        today,
                        &duplicates,
                    )
                })
                .await;

                period_duplicates += duplicates.load(Ordering::Relaxed);
                saved += outcome.records;
                phase.record(&outcome);
                outcomes.push(outcome);
            }

            phases.push(phase);
        }

        Ok(self.finish(&plan, phases, outcomes, saved, period_duplicates, started))
    }

    /// Selects the batch for this invocation.
    ///
    /// An explicit symbol list bypasses the freshness partition entirely;
    /// otherwise the partition is recomputed from the store, which is what
    /// makes invocations resumable without a persisted cursor.
    async fn plan_batch(
        &self,
        request: &ScanRequest,
        default_size: usize,
        statements: bool,
    ) -> Result<BatchPlan> {
        if let Some(requested) = &request.symbols {
            let mut seen = HashSet::new();
            let mut batch = Vec::new();
            for entry in requested {
                let symbol = Symbol::new(entry);
                if !symbol.is_valid_shape() {
                    warn!(symbol = %symbol, "Dropping invalid requested symbol");
                    continue;
                }
                if seen.insert(symbol.clone()) {
                    batch.push(symbol);
                }
            }
            if let Some(cap) = request.max_symbols {
                batch.truncate(cap);
            }
            return Ok(BatchPlan {
                batch,
                fresh_skipped: 0,
                deferred: 0,
            });
        }

        let universe = universe::load_universe(self.store.as_ref())
            .await
            .map_err(|e| IngestError::Universe(e.to_string()))?;

        let (mut stale, fresh_skipped) = if request.force_refresh {
            (universe, 0)
        } else {
            let guard = FreshnessGuard::new(self.store.as_ref());
            let partition = if statements {
                guard.partition_statements(&universe, RECONCILED_SOURCE).await
            } else {
                guard.partition_fundamentals(&universe, RECONCILED_SOURCE).await
            }
            .map_err(|e| IngestError::Universe(e.to_string()))?;
            (partition.stale, partition.fresh.len())
        };

        if request.prioritize_recent {
            // Watchlist pages are in added-at order; newest entries last.
            stale.reverse();
        }

        let cap = request.max_symbols.unwrap_or(default_size);
        let deferred = stale.len().saturating_sub(cap);
        stale.truncate(cap);

        Ok(BatchPlan {
            batch: stale,
            fresh_skipped,
            deferred,
        })
    }

    /// One pass of fetch → normalize → merge → interpolate → persist over a
    /// set of symbols.
    async fn fundamentals_attempt(
        &self,
        symbols: &[Symbol],
        today: NaiveDate,
    ) -> FundamentalsAttempt {
        if symbols.is_empty() {
            return FundamentalsAttempt {
                outcomes: Vec::new(),
                records: Vec::new(),
                saved: 0,
            };
        }

        // Fan out across providers; each serializes its own requests behind
        // its pacer. Results come back in registration order, which is the
        // merge priority.
        let fetches = join_all(self.providers.summaries().iter().map(|provider| async move {
            (
                provider.name(),
                provider.mapping(),
                provider.fetch_summaries(symbols).await,
            )
        }))
        .await;

        let mut batches: Vec<SourceBatch> = Vec::new();
        let mut failures: Vec<(Symbol, String)> = Vec::new();
        let mut enabled = 0usize;

        for (name, mapping, fetch) in fetches {
            let Some(results) = fetch else {
                debug!(provider = name, "Provider disabled, skipping");
                continue;
            };
            enabled += 1;

            let mut records = Vec::new();
            for item in results {
                match item.outcome {
                    FetchOutcome::Data(payload) => {
                        records.push(normalize::normalize_summary(
                            name,
                            mapping,
                            &item.symbol,
                            &payload,
                            today,
                        ));
                    }
                    FetchOutcome::NoData => {}
                    FetchOutcome::Failed(message) => failures.push((item.symbol, message)),
                }
            }
            batches.push(SourceBatch {
                source: name.to_string(),
                records,
            });
        }

        let mut merged = merge::merge_snapshots(&batches);

        let mut coverage_pct = coverage::audit_coverage(&merged);
        if !merged.is_empty() && coverage_pct < COVERAGE_TARGET_PCT {
            let table = SectorAverageTable::build(&merged);
            coverage::interpolate(&mut merged, &table);
            coverage_pct = coverage::audit_coverage(&merged);

            if coverage_pct < COVERAGE_TARGET_PCT {
                merged = self.merge_quarterly_supplement(symbols, merged, today).await;
                coverage_pct = coverage::audit_coverage(&merged);
            }
        }
        debug!(coverage_pct, symbols = symbols.len(), "Fundamentals batch reconciled");

        let persist =
            gateway::persist_fundamentals(self.store.as_ref(), merged.clone(), RECONCILED_SOURCE, today)
                .await;

        let mut outcomes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let record = merged.iter().find(|r| &r.symbol == symbol);
            let failure = failures.iter().find(|(s, _)| s == symbol);

            let (status, detail) = match record {
                Some(r) if r.has_any_value() => {
                    if persist.saved == 0 && !persist.chunk_errors.is_empty() {
                        (
                            SymbolStatus::Error,
                            Some(format!("persistence failed: {}", persist.chunk_errors[0])),
                        )
                    } else {
                        (SymbolStatus::Success, None)
                    }
                }
                _ => match failure {
                    Some((_, message)) => (SymbolStatus::Error, Some(message.clone())),
                    None if enabled == 0 => {
                        (SymbolStatus::NoData, Some("no providers enabled".to_string()))
                    }
                    None => (SymbolStatus::NoData, None),
                },
            };

            let records = usize::from(status == SymbolStatus::Success);
            outcomes.push(SymbolOutcome {
                symbol: symbol.clone(),
                phase: "fundamentals".to_string(),
                status,
                detail,
                records,
            });
        }

        FundamentalsAttempt {
            outcomes,
            records: merged,
            saved: persist.saved,
        }
    }

    /// Folds the quarterly-ratio supplement into already-merged records.
    ///
    /// Existing records come first in the fold, so the supplement only fills
    /// fields that are still absent.
    async fn merge_quarterly_supplement(
        &self,
        symbols: &[Symbol],
        merged: Vec<FundamentalSnapshot>,
        today: NaiveDate,
    ) -> Vec<FundamentalSnapshot> {
        let mut batches = vec![SourceBatch {
            source: RECONCILED_SOURCE.to_string(),
            records: merged,
        }];

        for provider in self.providers.summaries() {
            let Some(results) = provider.fetch_quarterly_supplement(symbols).await else {
                continue;
            };
            debug!(provider = provider.name(), "Merging quarterly supplement");
            let records: Vec<FundamentalSnapshot> = results
                .into_iter()
                .filter_map(|item| match item.outcome {
                    FetchOutcome::Data(payload) => Some(normalize::normalize_summary(
                        provider.name(),
                        provider.mapping(),
                        &item.symbol,
                        &payload,
                        today,
                    )),
                    _ => None,
                })
                .collect();
            batches.push(SourceBatch {
                source: provider.name().to_string(),
                records,
            });
        }

        merge::merge_snapshots(&batches)
    }

    /// Processes one symbol for one statement phase.
    async fn statement_symbol(
        &self,
        symbol: &Symbol,
        kind: PeriodKind,
        phase: &str,
        force_refresh: bool,
        today: NaiveDate,
        duplicates: &AtomicUsize,
    ) -> SymbolOutcome {
        let outcome = |status, detail: Option<String>, records| SymbolOutcome {
            symbol: symbol.clone(),
            phase: phase.to_string(),
            status,
            detail,
            records,
        };

        let fresh = if force_refresh {
            HashSet::new()
        } else {
            match FreshnessGuard::new(self.store.as_ref())
                .fresh_periods(symbol, kind, RECONCILED_SOURCE)
                .await
            {
                Ok(dates) => dates,
                Err(e) => {
                    return outcome(
                        SymbolStatus::Error,
                        Some(format!("freshness query failed: {e}")),
                        0,
                    );
                }
            }
        };

        let mut batches: Vec<StatementBatch> = Vec::new();
        let mut last_failure: Option<String> = None;
        let mut enabled = 0usize;
        let mut excluded = 0usize;

        for provider in self.providers.statements() {
            let Some(fetched) = provider.fetch_cash_flows(symbol, kind).await else {
                continue;
            };
            enabled += 1;

            match fetched {
                StatementOutcome::Periods(periods) => {
                    let mut records = Vec::new();
                    for period in &periods {
                        let Some(statement) = normalize::normalize_statement(
                            provider.name(),
                            provider.breakdown(),
                            symbol,
                            period,
                            kind,
                        ) else {
                            continue;
                        };
                        if fresh.contains(&statement.fiscal_date) {
                            excluded += 1;
                            continue;
                        }
                        records.push(statement);
                    }
                    batches.push(StatementBatch {
                        source: provider.name().to_string(),
                        records,
                    });
                }
                StatementOutcome::NoData => {}
                StatementOutcome::Failed(message) => last_failure = Some(message),
            }
        }
        // Overwritten, not accumulated: a retry re-excludes the same periods.
        duplicates.store(excluded, Ordering::Relaxed);

        if enabled == 0 {
            return outcome(
                SymbolStatus::Skipped,
                Some("no statement providers enabled".to_string()),
                0,
            );
        }

        let merged = merge::merge_statements(&batches);
        if merged.is_empty() {
            if excluded > 0 {
                return outcome(
                    SymbolStatus::Skipped,
                    Some(format!("{excluded} periods already fresh")),
                    0,
                );
            }
            if let Some(message) = last_failure {
                return outcome(SymbolStatus::Error, Some(message), 0);
            }
            return outcome(SymbolStatus::NoData, None, 0);
        }

        let persist =
            gateway::persist_cash_flows(self.store.as_ref(), merged, RECONCILED_SOURCE, today)
                .await;

        if persist.saved == 0 {
            if let Some(message) = persist.chunk_errors.first() {
                return outcome(
                    SymbolStatus::Error,
                    Some(format!("persistence failed: {message}")),
                    0,
                );
            }
            return outcome(
                SymbolStatus::Error,
                Some("all records failed validation".to_string()),
                0,
            );
        }

        outcome(SymbolStatus::Success, None, persist.saved)
    }

    /// Builds the run-level report from the phase outcomes.
    fn finish(
        &self,
        plan: &BatchPlan,
        phases: Vec<PhaseSummary>,
        mut outcomes: Vec<SymbolOutcome>,
        saved: usize,
        period_duplicates: usize,
        started: Instant,
    ) -> ScanResponse {
        let mut summary = RunSummary {
            processed: plan.batch.len(),
            skipped: plan.fresh_skipped,
            records_saved: saved,
            duplicates_prevented: plan.fresh_skipped + period_duplicates,
            processing_ms: started.elapsed().as_millis(),
            ..Default::default()
        };

        for symbol in &plan.batch {
            match collapse_statuses(symbol, &outcomes) {
                Some(SymbolStatus::Success) => summary.successful += 1,
                Some(SymbolStatus::Skipped) => summary.skipped += 1,
                Some(SymbolStatus::Error) => summary.errors += 1,
                Some(SymbolStatus::NoData) => summary.no_data += 1,
                None => {}
            }
        }

        // The run only counts as failed when there was work and none of it
        // produced anything.
        let attempted = outcomes
            .iter()
            .any(|o| o.status != SymbolStatus::Skipped);
        let success = summary.successful > 0 || !attempted;

        outcomes.truncate(RESULTS_CAP);

        info!(
            success,
            processed = summary.processed,
            successful = summary.successful,
            errors = summary.errors,
            records_saved = summary.records_saved,
            duplicates_prevented = summary.duplicates_prevented,
            "Scan complete"
        );

        ScanResponse {
            success,
            summary,
            phases,
            results: outcomes,
        }
    }
}

/// Collapses one symbol's per-phase statuses into its run-level status:
/// success beats skipped beats error beats no-data.
fn collapse_statuses(symbol: &Symbol, outcomes: &[SymbolOutcome]) -> Option<SymbolStatus> {
    let statuses: Vec<SymbolStatus> = outcomes
        .iter()
        .filter(|o| &o.symbol == symbol)
        .map(|o| o.status)
        .collect();
    if statuses.is_empty() {
        return None;
    }
    if statuses.contains(&SymbolStatus::Success) {
        return Some(SymbolStatus::Success);
    }
    if statuses.iter().all(|s| *s == SymbolStatus::Skipped) {
        return Some(SymbolStatus::Skipped);
    }
    if statuses.contains(&SymbolStatus::Error) {
        return Some(SymbolStatus::Error);
    }
    Some(SymbolStatus::NoData)
}
