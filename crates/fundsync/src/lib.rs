#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundsync/fundsync/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Multi-provider fundamentals ingestion and reconciliation.
//!
//! The pipeline runs in fixed phases: select a stale batch, fetch raw
//! payloads from the configured providers, normalize them into canonical
//! partial records, merge first-non-null-wins, interpolate toward the
//! coverage target, validate, and persist idempotently. Failures are
//! captured as data in the [`ScanResponse`]; only request parsing and
//! universe acquisition surface as errors.
//!
//! # Features
//!
//! - `fmp` - Financial Modeling Prep provider (summaries + statements)
//! - `alphavantage` - Alpha Vantage provider (summaries + statements)
//! - `finnhub` - Finnhub provider (summaries)
//! - `yahoo` - Yahoo Finance provider (summaries, keyless)
//! - `store-sqlite` - SQLite persistence via `fundsync-store`
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fundsync::{IngestService, ProviderSet, ScanRequest};
//! use fundsync_store::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> fundsync::Result<()> {
//!     let store = Arc::new(SqliteStore::new("fundsync.db")?);
//!     let service = IngestService::new(ProviderSet::from_env(), store);
//!
//!     let response = service.scan_fundamentals(&ScanRequest::default()).await?;
//!     println!("{}", serde_json::to_string_pretty(&response).unwrap());
//!     Ok(())
//! }
//! ```

pub mod coverage;
pub mod gateway;
pub mod guard;
pub mod merge;
pub mod normalize;
pub mod providers;
pub mod scheduler;
pub mod service;
pub mod universe;

pub use fundsync_core::{
    CashFlowStatement, FundamentalSnapshot, FundamentalStore, IngestError, PeriodKind, Result,
    Symbol,
};
pub use providers::ProviderSet;
pub use scheduler::{PhaseSummary, RunSummary, SymbolOutcome, SymbolStatus};
pub use service::{IngestService, RECONCILED_SOURCE, ScanRequest, ScanResponse};
