#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundsync/fundsync/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the fundamentals ingestion pipeline.
//!
//! This crate provides the foundational abstractions:
//!
//! - [`SummaryProvider`](provider::SummaryProvider) /
//!   [`StatementProvider`](provider::StatementProvider) - adapter traits for
//!   upstream data sources
//! - [`FieldMappingTable`](mapping::FieldMappingTable) - per-provider alias
//!   dictionaries
//! - [`parse`] - raw scalar parsers (numeric, percent, cardinal)
//! - [`FundamentalStore`](store::FundamentalStore) - persistence abstraction
//! - [`FundamentalSnapshot`](types::FundamentalSnapshot) /
//!   [`CashFlowStatement`](types::CashFlowStatement) - canonical records

/// Error types for ingestion operations.
pub mod error;
/// Per-provider field-mapping tables.
pub mod mapping;
/// Raw scalar parsers for provider payload values.
pub mod parse;
/// Reporting-period kinds.
pub mod period;
/// Provider adapter traits.
pub mod provider;
/// Retry backoff and request pacing.
pub mod retry;
/// Persistence trait for canonical records.
pub mod store;
/// Canonical record types.
pub mod types;

// Re-export commonly used items at crate root
pub use error::{IngestError, Result};
pub use mapping::{BreakdownTable, FieldMappingTable};
pub use parse::{FieldKind, parse_cardinal, parse_for_kind, parse_percent, parse_scalar};
pub use period::PeriodKind;
pub use provider::{
    FetchOutcome, PeriodFetch, ProviderAdapter, RawPayload, StatementOutcome, StatementProvider,
    SummaryProvider, SymbolFetch,
};
pub use retry::{RequestPacer, RetryPolicy};
pub use store::{FundamentalStore, StoredPeriod};
pub use types::{
    CashFlowField, CashFlowStatement, FundamentalSnapshot, INTERPOLATED_TAG, MetricField, Symbol,
};
