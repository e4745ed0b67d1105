//! Duplicate/freshness guard over persisted records.
//!
//! A read-then-decide step executed before any upstream fetch: symbols and
//! fiscal periods that are already fresh in storage are excluded from the
//! fetch plan. The guard never mutates storage.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, Utc};
use tracing::debug;

use fundsync_core::{FundamentalStore, PeriodKind, Result, Symbol};

/// Staleness threshold for fundamentals scans across the universe.
pub const FUNDAMENTALS_FRESH_HOURS: i64 = 24;

/// Staleness threshold before an already-stored fiscal period is worth
/// re-fetching.
pub const PERIOD_FRESH_DAYS: i64 = 7;

/// Result of partitioning a universe into stale work and fresh skips.
#[derive(Debug)]
pub struct StalePartition {
    /// Symbols still needing an update, in universe order.
    pub stale: Vec<Symbol>,
    /// Symbols excluded because they were updated within the window.
    pub fresh: Vec<Symbol>,
}

/// Freshness guard bound to a store.
#[derive(Debug)]
pub struct FreshnessGuard<'a> {
    store: &'a dyn FundamentalStore,
}

impl<'a> FreshnessGuard<'a> {
    /// Creates a guard over the given store.
    #[must_use]
    pub fn new(store: &'a dyn FundamentalStore) -> Self {
        Self { store }
    }

    /// Partitions a universe into symbols needing a fundamentals update and
    /// symbols already fresh under `source`.
    pub async fn partition_fundamentals(
        &self,
        universe: &[Symbol],
        source: &str,
    ) -> Result<StalePartition> {
        let since = Utc::now() - Duration::hours(FUNDAMENTALS_FRESH_HOURS);
        let fresh: HashSet<Symbol> = self
            .store
            .fresh_symbols(source, since)
            .await?
            .into_iter()
            .collect();
        Ok(split(universe, &fresh))
    }

    /// Partitions a universe into symbols needing a statement update and
    /// symbols whose statements were written within the fundamentals window.
    pub async fn partition_statements(
        &self,
        universe: &[Symbol],
        source: &str,
    ) -> Result<StalePartition> {
        let since = Utc::now() - Duration::hours(FUNDAMENTALS_FRESH_HOURS);
        let fresh: HashSet<Symbol> = self
            .store
            .fresh_statement_symbols(source, since)
            .await?
            .into_iter()
            .collect();
        Ok(split(universe, &fresh))
    }

    /// Fiscal periods for one symbol that were stored within the period
    /// re-fetch window and are therefore not worth re-fetching.
    pub async fn fresh_periods(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
        source: &str,
    ) -> Result<HashSet<NaiveDate>> {
        let cutoff = Utc::now() - Duration::days(PERIOD_FRESH_DAYS);
        let fresh: HashSet<NaiveDate> = self
            .store
            .stored_periods(symbol, period, source)
            .await?
            .into_iter()
            .filter(|p| p.updated_at >= cutoff)
            .map(|p| p.fiscal_date)
            .collect();
        if !fresh.is_empty() {
            debug!(symbol = %symbol, count = fresh.len(), "Periods still fresh, excluded");
        }
        Ok(fresh)
    }
}

fn split(universe: &[Symbol], fresh: &HashSet<Symbol>) -> StalePartition {
    let (fresh_symbols, stale): (Vec<Symbol>, Vec<Symbol>) =
        universe.iter().cloned().partition(|s| fresh.contains(s));
    debug!(
        stale = stale.len(),
        fresh = fresh_symbols.len(),
        "Partitioned universe by freshness"
    );
    StalePartition {
        stale,
        fresh: fresh_symbols,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fundsync_core::FundamentalSnapshot;
    use fundsync_store::MemoryStore;

    #[tokio::test]
    async fn partitions_universe_by_freshness() {
        let store = MemoryStore::new();
        let universe: Vec<Symbol> = (0..10).map(|i| Symbol::new(format!("SYM{i}"))).collect();

        // Six of ten are updated within the window.
        let date = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        for symbol in &universe[..6] {
            let snap = FundamentalSnapshot::new(symbol.clone(), PeriodKind::Ttm, date);
            store
                .upsert_fundamentals(&[snap], "reconciled")
                .await
                .unwrap();
        }

        let guard = FreshnessGuard::new(&store);
        let partition = guard
            .partition_fundamentals(&universe, "reconciled")
            .await
            .unwrap();

        assert_eq!(partition.stale.len(), 4);
        assert_eq!(partition.fresh.len(), 6);
        assert_eq!(partition.stale, universe[6..].to_vec());
    }

    #[tokio::test]
    async fn other_source_tags_do_not_count_as_fresh() {
        let store = MemoryStore::new();
        let symbol = Symbol::new("AAPL");
        let date = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let snap = FundamentalSnapshot::new(symbol.clone(), PeriodKind::Ttm, date);
        store.upsert_fundamentals(&[snap], "other").await.unwrap();

        let guard = FreshnessGuard::new(&store);
        let partition = guard
            .partition_fundamentals(std::slice::from_ref(&symbol), "reconciled")
            .await
            .unwrap();
        assert_eq!(partition.stale, vec![symbol]);
    }

    #[tokio::test]
    async fn fresh_periods_exclude_recent_writes() {
        let store = MemoryStore::new();
        let symbol = Symbol::new("MSFT");
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let stmt = fundsync_core::CashFlowStatement::new(
            symbol.clone(),
            PeriodKind::Quarterly,
            date,
        );
        store.upsert_cash_flows(&[stmt], "reconciled").await.unwrap();

        let guard = FreshnessGuard::new(&store);
        let fresh = guard
            .fresh_periods(&symbol, PeriodKind::Quarterly, "reconciled")
            .await
            .unwrap();
        assert!(fresh.contains(&date));
    }
}
