//! Persistence gateway: validation, defensive rounding, chunked upserts.
//!
//! Records are validated before writing; rejected records are counted but
//! never persisted and never abort the run. Cardinal fields get a final
//! rounding pass. Writes are chunked to bound request size, and a failing
//! chunk is recorded while the remaining chunks proceed.

use chrono::{Duration, NaiveDate};
use tracing::warn;

use fundsync_core::{
    CashFlowStatement, FieldKind, FundamentalSnapshot, FundamentalStore, MetricField,
};

/// Records per store write.
pub const WRITE_CHUNK: usize = 5;

/// A fiscal date further ahead than this is implausible and rejected.
pub const MAX_FUTURE_DAYS: i64 = 370;

/// What happened to a batch of records at the persistence boundary.
#[derive(Debug, Default)]
pub struct PersistOutcome {
    /// Rows written to storage.
    pub saved: usize,
    /// Records rejected by validation.
    pub rejected: usize,
    /// Errors from failed store chunks.
    pub chunk_errors: Vec<String>,
}

/// Validates, rounds, chunks, and upserts fundamentals snapshots.
pub async fn persist_fundamentals(
    store: &dyn FundamentalStore,
    records: Vec<FundamentalSnapshot>,
    source: &str,
    today: NaiveDate,
) -> PersistOutcome {
    let mut outcome = PersistOutcome::default();

    let mut valid: Vec<FundamentalSnapshot> = Vec::with_capacity(records.len());
    for mut record in records {
        if let Err(reason) = validate_snapshot(&record, today) {
            warn!(symbol = %record.symbol, reason, "Rejecting fundamentals record");
            outcome.rejected += 1;
            continue;
        }
        round_cardinals(&mut record);
        valid.push(record);
    }

    for chunk in valid.chunks(WRITE_CHUNK) {
        match store.upsert_fundamentals(chunk, source).await {
            Ok(written) => outcome.saved += written,
            Err(e) => {
                warn!(error = %e, "Fundamentals chunk failed to persist");
                outcome.chunk_errors.push(e.to_string());
            }
        }
    }

    outcome
}

/// Validates, chunks, and upserts cash-flow statements.
pub async fn persist_cash_flows(
    store: &dyn FundamentalStore,
    records: Vec<CashFlowStatement>,
    source: &str,
    today: NaiveDate,
) -> PersistOutcome {
    let mut outcome = PersistOutcome::default();

    let valid: Vec<CashFlowStatement> = records
        .into_iter()
        .filter(|record| match validate_statement(record, today) {
            Ok(()) => true,
            Err(reason) => {
                warn!(symbol = %record.symbol, reason, "Rejecting cash-flow record");
                outcome.rejected += 1;
                false
            }
        })
        .collect();

    for chunk in valid.chunks(WRITE_CHUNK) {
        match store.upsert_cash_flows(chunk, source).await {
            Ok(written) => outcome.saved += written,
            Err(e) => {
                warn!(error = %e, "Cash-flow chunk failed to persist");
                outcome.chunk_errors.push(e.to_string());
            }
        }
    }

    outcome
}

fn validate_snapshot(record: &FundamentalSnapshot, today: NaiveDate) -> Result<(), &'static str> {
    if !record.symbol.is_valid_shape() {
        return Err("missing or malformed symbol key");
    }
    if record.fiscal_date > today + Duration::days(MAX_FUTURE_DAYS) {
        return Err("fiscal date implausibly far in the future");
    }
    if !record.has_any_value() {
        return Err("no non-key field holds a value");
    }
    Ok(())
}

fn validate_statement(record: &CashFlowStatement, today: NaiveDate) -> Result<(), &'static str> {
    if !record.symbol.is_valid_shape() {
        return Err("missing or malformed symbol key");
    }
    if record.fiscal_date > today + Duration::days(MAX_FUTURE_DAYS) {
        return Err("fiscal date implausibly far in the future");
    }
    if !record.has_any_value() {
        return Err("no non-key field holds a value");
    }
    Ok(())
}

/// Final defensive pass: cardinal fields are whole numbers on persistence.
fn round_cardinals(record: &mut FundamentalSnapshot) {
    for field in MetricField::ALL {
        if field.kind() == FieldKind::Cardinal
            && let Some(value) = field.get(record)
        {
            field.set(record, value.round());
        }
    }
}
