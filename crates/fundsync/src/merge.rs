//! Cross-provider reconciliation of partial records.
//!
//! Partial records from each provider are grouped by identity and folded
//! left-to-right: the first record establishes the base, and each subsequent
//! record contributes a field only while the running merged value is still
//! absent. First-non-null-wins, which makes fold order the provider
//! priority. Cardinal-scale fields are rounded the moment they are written
//! into the merged record, whichever provider supplied them.

use std::collections::HashMap;

use fundsync_core::{
    CashFlowField, CashFlowStatement, FieldKind, FundamentalSnapshot, MetricField, PeriodKind,
    Symbol,
};

/// One provider's partial snapshots, tagged with its source name.
#[derive(Clone, Debug)]
pub struct SourceBatch {
    /// Provider tag recorded in provenance.
    pub source: String,
    /// Partial records normalized from this provider's payloads.
    pub records: Vec<FundamentalSnapshot>,
}

/// One provider's partial statements, tagged with its source name.
#[derive(Clone, Debug)]
pub struct StatementBatch {
    /// Provider tag recorded in provenance.
    pub source: String,
    /// Partial statements normalized from this provider's payloads.
    pub records: Vec<CashFlowStatement>,
}

/// Merges per-provider snapshot batches into one record per symbol.
///
/// Groups preserve first-seen symbol order; within a group the fold order is
/// the batch order, so callers express provider priority by ordering the
/// input.
#[must_use]
pub fn merge_snapshots(batches: &[SourceBatch]) -> Vec<FundamentalSnapshot> {
    let mut merged: Vec<FundamentalSnapshot> = Vec::new();
    let mut index: HashMap<Symbol, usize> = HashMap::new();

    for batch in batches {
        for record in &batch.records {
            match index.get(&record.symbol) {
                Some(&i) => fold_snapshot(&mut merged[i], record),
                None => {
                    index.insert(record.symbol.clone(), merged.len());
                    merged.push(base_snapshot(record));
                }
            }
        }
    }

    merged
}

/// Merges per-provider statement batches into one record per
/// (symbol, period kind, fiscal date).
#[must_use]
pub fn merge_statements(batches: &[StatementBatch]) -> Vec<CashFlowStatement> {
    let mut merged: Vec<CashFlowStatement> = Vec::new();
    let mut index: HashMap<(Symbol, PeriodKind, chrono::NaiveDate), usize> = HashMap::new();

    for batch in batches {
        for record in &batch.records {
            let key = (record.symbol.clone(), record.period_kind, record.fiscal_date);
            match index.get(&key) {
                Some(&i) => fold_statement(&mut merged[i], record),
                None => {
                    index.insert(key, merged.len());
                    merged.push(base_statement(record));
                }
            }
        }
    }

    merged
}

/// First record of a group: copied wholesale, with cardinal fields rounded
/// on the way in.
fn base_snapshot(record: &FundamentalSnapshot) -> FundamentalSnapshot {
    let mut base = record.clone();
    for field in MetricField::ALL {
        if field.kind() == FieldKind::Cardinal
            && let Some(value) = field.get(&base)
        {
            field.set(&mut base, value.round());
        }
    }
    base
}

/// Folds a subsequent record into the running merge: a field is taken only
/// if the merged value is still absent. The record's provenance tags are
/// appended when it contributed at least one field.
pub fn fold_snapshot(merged: &mut FundamentalSnapshot, record: &FundamentalSnapshot) {
    let mut contributed = false;

    for field in MetricField::ALL {
        if field.get(merged).is_none()
            && let Some(value) = field.get(record)
        {
            let value = if field.kind() == FieldKind::Cardinal {
                value.round()
            } else {
                value
            };
            field.set(merged, value);
            contributed = true;
        }
    }

    if merged.sector.is_none() && record.sector.is_some() {
        merged.sector = record.sector.clone();
        contributed = true;
    }

    if contributed {
        for tag in record.provenance.split(',') {
            merged.push_provenance(tag);
        }
    }
}

fn base_statement(record: &CashFlowStatement) -> CashFlowStatement {
    record.clone()
}

fn fold_statement(merged: &mut CashFlowStatement, record: &CashFlowStatement) {
    let mut contributed = false;

    for column in CashFlowField::ALL {
        if column.get(merged).is_none()
            && let Some(value) = column.get(record)
        {
            column.set(merged, value);
            contributed = true;
        }
    }

    if contributed {
        for tag in record.provenance.split(',') {
            merged.push_provenance(tag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn snapshot(symbol: &str, source: &str, pe: Option<f64>) -> FundamentalSnapshot {
        let mut snap = FundamentalSnapshot::new(
            Symbol::new(symbol),
            PeriodKind::Ttm,
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        );
        snap.pe_ratio = pe;
        snap.push_provenance(source);
        snap
    }

    fn batch(source: &str, records: Vec<FundamentalSnapshot>) -> SourceBatch {
        SourceBatch {
            source: source.to_string(),
            records,
        }
    }

    #[test]
    fn first_non_null_wins_is_order_sensitive() {
        let p1 = batch("p1", vec![snapshot("AAPL", "p1", Some(5.0))]);
        let p2 = batch("p2", vec![snapshot("AAPL", "p2", Some(9.0))]);

        let forward = merge_snapshots(&[p1.clone(), p2.clone()]);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].pe_ratio, Some(5.0));

        let reversed = merge_snapshots(&[p2, p1]);
        assert_eq!(reversed[0].pe_ratio, Some(9.0));
    }

    #[test]
    fn later_providers_fill_only_absent_fields() {
        let mut first = snapshot("AAPL", "fmp", Some(12.0));
        first.market_cap = Some(2_500_000_000.4);

        let mut second = snapshot("AAPL", "yahoo", Some(15.0));
        second.beta = Some(1.2);

        let merged = merge_snapshots(&[
            batch("fmp", vec![first]),
            batch("yahoo", vec![second]),
        ]);

        assert_eq!(merged[0].pe_ratio, Some(12.0));
        assert_eq!(merged[0].beta, Some(1.2));
        // Cardinal fields are rounded at merge-write time.
        assert_eq!(merged[0].market_cap, Some(2_500_000_000.0));
        assert_eq!(merged[0].provenance, "fmp,yahoo");
    }

    #[test]
    fn non_contributing_providers_leave_no_provenance() {
        let first = snapshot("AAPL", "fmp", Some(12.0));
        let second = snapshot("AAPL", "yahoo", Some(15.0));

        let merged = merge_snapshots(&[
            batch("fmp", vec![first]),
            batch("yahoo", vec![second]),
        ]);

        // yahoo's only field was already present.
        assert_eq!(merged[0].provenance, "fmp");
    }

    #[test]
    fn groups_by_symbol_preserving_first_seen_order() {
        let merged = merge_snapshots(&[
            batch(
                "fmp",
                vec![snapshot("MSFT", "fmp", Some(30.0)), snapshot("AAPL", "fmp", None)],
            ),
            batch("yahoo", vec![snapshot("AAPL", "yahoo", Some(28.0))]),
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].symbol, Symbol::new("MSFT"));
        assert_eq!(merged[1].symbol, Symbol::new("AAPL"));
        assert_eq!(merged[1].pe_ratio, Some(28.0));
        assert_eq!(merged[1].provenance, "fmp,yahoo");
    }

    #[test]
    fn statements_group_by_symbol_period_and_date() {
        let date_q1 = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let date_q2 = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();

        let mut fmp_q1 =
            CashFlowStatement::new(Symbol::new("AAPL"), PeriodKind::Quarterly, date_q1);
        fmp_q1.operating_cash_flow = Some(30e9);
        fmp_q1.push_provenance("fmp");

        let mut av_q1 =
            CashFlowStatement::new(Symbol::new("AAPL"), PeriodKind::Quarterly, date_q1);
        av_q1.operating_cash_flow = Some(29e9);
        av_q1.net_income = Some(24e9);
        av_q1.push_provenance("alphavantage");

        let mut av_q2 =
            CashFlowStatement::new(Symbol::new("AAPL"), PeriodKind::Quarterly, date_q2);
        av_q2.operating_cash_flow = Some(28e9);
        av_q2.push_provenance("alphavantage");

        let merged = merge_statements(&[
            StatementBatch {
                source: "fmp".to_string(),
                records: vec![fmp_q1],
            },
            StatementBatch {
                source: "alphavantage".to_string(),
                records: vec![av_q1, av_q2],
            },
        ]);

        assert_eq!(merged.len(), 2);
        let q1 = merged.iter().find(|s| s.fiscal_date == date_q1).unwrap();
        assert_eq!(q1.operating_cash_flow, Some(30e9));
        assert_eq!(q1.net_income, Some(24e9));
        assert_eq!(q1.provenance, "fmp,alphavantage");
    }
}
