//! Persistence trait for canonical records.
//!
//! This module defines the [`FundamentalStore`] trait: idempotent upserts
//! keyed by each record family's natural composite key, plus the read
//! queries the freshness guard and batch scheduler rely on.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::period::PeriodKind;
use crate::types::{CashFlowStatement, FundamentalSnapshot, Symbol};

/// One stored fiscal period with its last update time, as seen by the
/// duplicate/freshness guard.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredPeriod {
    /// Fiscal period end date.
    pub fiscal_date: NaiveDate,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// Storage for canonical records and the symbol universe.
///
/// Upserts use conflict-on-key semantics over the composite natural key
/// `(symbol, period_kind, fiscal_date, source)`: re-ingesting the same key
/// updates the row rather than duplicating it.
#[async_trait]
pub trait FundamentalStore: Send + Sync {
    /// Upserts a chunk of fundamentals snapshots under the given provenance
    /// source tag. Returns the number of rows written.
    async fn upsert_fundamentals(
        &self,
        records: &[FundamentalSnapshot],
        source: &str,
    ) -> Result<usize>;

    /// Upserts a chunk of cash-flow statements under the given provenance
    /// source tag. Returns the number of rows written.
    async fn upsert_cash_flows(&self, records: &[CashFlowStatement], source: &str)
    -> Result<usize>;

    /// Symbols with a fundamentals record under `source` updated at or after
    /// `since`. Used by the freshness guard; never mutates storage.
    async fn fresh_symbols(&self, source: &str, since: DateTime<Utc>) -> Result<Vec<Symbol>>;

    /// Symbols with any cash-flow record under `source` updated at or after
    /// `since`.
    async fn fresh_statement_symbols(
        &self,
        source: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Symbol>>;

    /// Stored cash-flow periods for one symbol under `source`, with their
    /// last update timestamps.
    async fn stored_periods(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
        source: &str,
    ) -> Result<Vec<StoredPeriod>>;

    /// Reads back one fundamentals snapshot by its full natural key.
    async fn get_fundamental(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
        fiscal_date: NaiveDate,
        source: &str,
    ) -> Result<Option<FundamentalSnapshot>>;

    /// Number of fundamentals rows stored for a symbol, across all keys.
    async fn count_fundamentals(&self, symbol: &Symbol) -> Result<usize>;

    /// Reads back all cash-flow statements for one symbol/period/source.
    async fn get_cash_flows(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
        source: &str,
    ) -> Result<Vec<CashFlowStatement>>;

    /// One page of the tracked-symbol universe, in stable order.
    ///
    /// The watchlist is an external collaborator table; this read is the
    /// only access the pipeline has to it.
    async fn universe_page(&self, offset: u32, limit: u32) -> Result<Vec<String>>;
}
