//! In-memory store implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use fundsync_core::{
    CashFlowStatement, FundamentalSnapshot, FundamentalStore, PeriodKind, Result, StoredPeriod,
    Symbol,
};

/// Composite natural key shared by both record families.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecordKey {
    symbol: String,
    period_kind: PeriodKind,
    fiscal_date: NaiveDate,
    source: String,
}

/// Stored row: the record plus its last write time.
#[derive(Debug, Clone)]
struct Row<T> {
    record: T,
    updated_at: DateTime<Utc>,
}

/// Simple in-memory store for testing and development.
///
/// Rows live in `RwLock`-protected `HashMap`s keyed by the same composite
/// natural key the SQLite store uses, so upsert semantics match.
#[derive(Debug, Default)]
pub struct MemoryStore {
    fundamentals: RwLock<HashMap<RecordKey, Row<FundamentalSnapshot>>>,
    cash_flows: RwLock<HashMap<RecordKey, Row<CashFlowStatement>>>,
    watchlist: RwLock<Vec<String>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose watchlist collaborator table holds the given
    /// symbols.
    #[must_use]
    pub fn with_watchlist(symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            watchlist: RwLock::new(symbols.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Replace the watchlist contents.
    pub async fn set_watchlist(&self, symbols: impl IntoIterator<Item = impl Into<String>>) {
        *self.watchlist.write().await = symbols.into_iter().map(Into::into).collect();
    }
}

#[async_trait]
impl FundamentalStore for MemoryStore {
    async fn upsert_fundamentals(
        &self,
        records: &[FundamentalSnapshot],
        source: &str,
    ) -> Result<usize> {
        let mut table = self.fundamentals.write().await;
        for record in records {
            let key = RecordKey {
                symbol: record.symbol.as_str().to_string(),
                period_kind: record.period_kind,
                fiscal_date: record.fiscal_date,
                source: source.to_string(),
            };
            table.insert(
                key,
                Row {
                    record: record.clone(),
                    updated_at: Utc::now(),
                },
            );
        }
        debug!("Upserted {} fundamentals rows", records.len());
        Ok(records.len())
    }

    async fn upsert_cash_flows(
        &self,
        records: &[CashFlowStatement],
        source: &str,
    ) -> Result<usize> {
        let mut table = self.cash_flows.write().await;
        for record in records {
            let key = RecordKey {
                symbol: record.symbol.as_str().to_string(),
                period_kind: record.period_kind,
                fiscal_date: record.fiscal_date,
                source: source.to_string(),
            };
            table.insert(
                key,
                Row {
                    record: record.clone(),
                    updated_at: Utc::now(),
                },
            );
        }
        debug!("Upserted {} cash-flow rows", records.len());
        Ok(records.len())
    }

    async fn fresh_symbols(&self, source: &str, since: DateTime<Utc>) -> Result<Vec<Symbol>> {
        let table = self.fundamentals.read().await;
        let mut symbols: Vec<Symbol> = table
            .iter()
            .filter(|(key, row)| key.source == source && row.updated_at >= since)
            .map(|(key, _)| Symbol::new(&key.symbol))
            .collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }

    async fn fresh_statement_symbols(
        &self,
        source: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Symbol>> {
        let table = self.cash_flows.read().await;
        let mut symbols: Vec<Symbol> = table
            .iter()
            .filter(|(key, row)| key.source == source && row.updated_at >= since)
            .map(|(key, _)| Symbol::new(&key.symbol))
            .collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }

    async fn stored_periods(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
        source: &str,
    ) -> Result<Vec<StoredPeriod>> {
        let table = self.cash_flows.read().await;
        let mut periods: Vec<StoredPeriod> = table
            .iter()
            .filter(|(key, _)| {
                key.symbol == symbol.as_str()
                    && key.period_kind == period
                    && key.source == source
            })
            .map(|(key, row)| StoredPeriod {
                fiscal_date: key.fiscal_date,
                updated_at: row.updated_at,
            })
            .collect();
        periods.sort_by(|a, b| b.fiscal_date.cmp(&a.fiscal_date));
        Ok(periods)
    }

    async fn get_fundamental(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
        fiscal_date: NaiveDate,
        source: &str,
    ) -> Result<Option<FundamentalSnapshot>> {
        let key = RecordKey {
            symbol: symbol.as_str().to_string(),
            period_kind: period,
            fiscal_date,
            source: source.to_string(),
        };
        Ok(self
            .fundamentals
            .read()
            .await
            .get(&key)
            .map(|row| row.record.clone()))
    }

    async fn count_fundamentals(&self, symbol: &Symbol) -> Result<usize> {
        Ok(self
            .fundamentals
            .read()
            .await
            .keys()
            .filter(|key| key.symbol == symbol.as_str())
            .count())
    }

    async fn get_cash_flows(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
        source: &str,
    ) -> Result<Vec<CashFlowStatement>> {
        let table = self.cash_flows.read().await;
        let mut statements: Vec<CashFlowStatement> = table
            .iter()
            .filter(|(key, _)| {
                key.symbol == symbol.as_str()
                    && key.period_kind == period
                    && key.source == source
            })
            .map(|(_, row)| row.record.clone())
            .collect();
        statements.sort_by(|a, b| b.fiscal_date.cmp(&a.fiscal_date));
        Ok(statements)
    }

    async fn universe_page(&self, offset: u32, limit: u32) -> Result<Vec<String>> {
        let watchlist = self.watchlist.read().await;
        Ok(watchlist
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_replaces_on_same_key() {
        let store = MemoryStore::new();
        let symbol = Symbol::new("AAPL");
        let date = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();

        let mut snap = FundamentalSnapshot::new(symbol.clone(), PeriodKind::Ttm, date);
        snap.pe_ratio = Some(20.0);
        store.upsert_fundamentals(&[snap.clone()], "fmp").await.unwrap();

        snap.pe_ratio = Some(22.0);
        store.upsert_fundamentals(&[snap], "fmp").await.unwrap();

        assert_eq!(store.count_fundamentals(&symbol).await.unwrap(), 1);
        let stored = store
            .get_fundamental(&symbol, PeriodKind::Ttm, date, "fmp")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.pe_ratio, Some(22.0));
    }

    #[tokio::test]
    async fn universe_pages_follow_insertion_order() {
        let store = MemoryStore::new();
        store.set_watchlist(["AAPL", "MSFT", "GOOGL"]).await;

        assert_eq!(store.universe_page(0, 2).await.unwrap(), vec!["AAPL", "MSFT"]);
        assert_eq!(store.universe_page(2, 2).await.unwrap(), vec!["GOOGL"]);
        assert!(store.universe_page(3, 2).await.unwrap().is_empty());
    }
}
