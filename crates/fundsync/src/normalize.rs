//! Normalization of raw provider payloads into canonical partial records.
//!
//! One raw payload in, one canonical record out. Alias lists are scanned in
//! declared order and the first alias present wins; resolved values route
//! through the percent, cardinal, or general numeric parser according to the
//! field's declared kind. Unmapped raw keys are ignored. Untyped data never
//! leaves this boundary.

use chrono::NaiveDate;
use tracing::warn;

use fundsync_core::{
    BreakdownTable, CashFlowField, CashFlowStatement, FieldMappingTable, FundamentalSnapshot,
    MetricField, PeriodFetch, PeriodKind, RawPayload, Symbol, parse_for_kind, parse_scalar,
};

/// Normalizes one provider's summary payload into a partial snapshot.
///
/// The snapshot's provenance is initialized to the provider tag; merge
/// accumulates further tags later.
pub fn normalize_summary(
    tag: &str,
    mapping: &FieldMappingTable,
    symbol: &Symbol,
    payload: &RawPayload,
    as_of: NaiveDate,
) -> FundamentalSnapshot {
    let mut snapshot = FundamentalSnapshot::new(symbol.clone(), PeriodKind::Ttm, as_of);

    for field in MetricField::ALL {
        if let Some(raw) = mapping.resolve(field, payload)
            && let Some(value) = parse_for_kind(field.kind(), raw)
        {
            field.set(&mut snapshot, value);
        }
    }

    snapshot.sector = mapping.resolve_sector(payload);
    snapshot.push_provenance(tag);
    snapshot
}

/// Normalizes one fiscal period of a statement response.
///
/// Line items resolve by their literal labels through the breakdown table.
/// Periods whose reported end date is not a strict `YYYY-MM-DD` are dropped
/// here and logged; nothing downstream sees them.
pub fn normalize_statement(
    tag: &str,
    breakdown: &BreakdownTable,
    symbol: &Symbol,
    period: &PeriodFetch,
    period_kind: PeriodKind,
) -> Option<CashFlowStatement> {
    let fiscal_date = match NaiveDate::parse_from_str(&period.fiscal_date, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            warn!(
                symbol = %symbol,
                fiscal_date = %period.fiscal_date,
                provider = tag,
                "Dropping statement period with malformed fiscal date"
            );
            return None;
        }
    };

    let mut statement = CashFlowStatement::new(symbol.clone(), period_kind, fiscal_date);

    for column in CashFlowField::ALL {
        if let Some(raw) = breakdown.resolve(column, &period.rows)
            && let Some(value) = parse_scalar(raw)
        {
            column.set(&mut statement, value);
        }
    }

    statement.push_provenance(tag);
    Some(statement)
}
