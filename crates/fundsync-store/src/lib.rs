#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundsync/fundsync/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Persistence implementations for canonical fundamentals records.
//!
//! - [`SqliteStore`] - durable SQLite-backed store (feature `sqlite`, on by
//!   default)
//! - [`MemoryStore`] - in-memory store for tests and development

/// In-memory store implementation.
pub mod memory;
/// SQLite-based store implementation.
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
