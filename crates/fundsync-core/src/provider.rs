//! Provider adapter traits for fetching raw fundamentals payloads.
//!
//! Adapters know a source's endpoints, authentication, rate limit, and batch
//! size. They fetch raw payloads and return them unparsed; alias resolution
//! and typing happen later in the normalizer. Partial failure never aborts a
//! batch: each symbol carries its own [`FetchOutcome`].

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use crate::mapping::{BreakdownTable, FieldMappingTable};
use crate::period::PeriodKind;
use crate::types::Symbol;

/// Untyped key/value payload as returned by an upstream provider.
///
/// Ephemeral: discarded after normalization, never persisted.
pub type RawPayload = serde_json::Map<String, Value>;

/// Result of fetching one symbol from one provider.
#[derive(Clone, Debug)]
pub struct SymbolFetch {
    /// The symbol that was requested.
    pub symbol: Symbol,
    /// What the provider returned for it.
    pub outcome: FetchOutcome,
}

/// Per-symbol fetch outcome.
#[derive(Clone, Debug)]
pub enum FetchOutcome {
    /// A non-empty raw payload.
    Data(RawPayload),
    /// A successful response with no usable fields.
    NoData,
    /// Retries exhausted; the message describes the last failure.
    Failed(String),
}

impl FetchOutcome {
    /// Returns the payload if this outcome carries data.
    #[must_use]
    pub fn payload(&self) -> Option<&RawPayload> {
        match self {
            Self::Data(p) => Some(p),
            _ => None,
        }
    }
}

/// One fiscal period of a statement response, keyed by its reported end
/// date. The date stays a string until the normalizer's strict parse.
#[derive(Clone, Debug)]
pub struct PeriodFetch {
    /// Fiscal period end date as reported (`YYYY-MM-DD` expected).
    pub fiscal_date: String,
    /// Line items for the period, keyed by the provider's literal labels.
    pub rows: RawPayload,
}

/// Outcome of fetching one symbol's statement periods from one provider.
#[derive(Clone, Debug)]
pub enum StatementOutcome {
    /// One or more fiscal periods.
    Periods(Vec<PeriodFetch>),
    /// A successful response with no periods.
    NoData,
    /// Retries exhausted; the message describes the last failure.
    Failed(String),
}

/// Base trait for all provider adapters.
pub trait ProviderAdapter: Send + Sync + Debug {
    /// Short provenance tag for this provider (e.g. "fmp").
    fn name(&self) -> &'static str;

    /// Hard cap on symbols per invocation, reflecting provider rate limits.
    fn batch_cap(&self) -> usize;

    /// Field-mapping table used to normalize this provider's payloads.
    fn mapping(&self) -> &'static FieldMappingTable;
}

/// Provider of point-in-time fundamentals summaries.
#[async_trait]
pub trait SummaryProvider: ProviderAdapter {
    /// Fetches summary payloads for up to [`ProviderAdapter::batch_cap`]
    /// symbols, serializing requests against the provider's rate limit.
    ///
    /// Returns `None` when the provider is disabled (no API key configured);
    /// callers treat that as "skip this provider", not as an error.
    async fn fetch_summaries(&self, symbols: &[Symbol]) -> Option<Vec<SymbolFetch>>;

    /// Optional supplementary quarterly-ratio fetch used when coverage stays
    /// below target after interpolation. Default: not available.
    async fn fetch_quarterly_supplement(&self, _symbols: &[Symbol]) -> Option<Vec<SymbolFetch>> {
        None
    }
}

/// Provider of cash-flow statement breakdowns.
#[async_trait]
pub trait StatementProvider: ProviderAdapter {
    /// Breakdown table mapping this provider's literal line-item labels to
    /// canonical cash-flow columns.
    fn breakdown(&self) -> &'static BreakdownTable;

    /// Fetches all available cash-flow periods for one symbol.
    ///
    /// Returns `None` when the provider is disabled (no API key configured).
    async fn fetch_cash_flows(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
    ) -> Option<StatementOutcome>;
}
