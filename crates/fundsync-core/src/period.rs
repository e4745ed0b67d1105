//! Reporting-period kinds for canonical records.
//!
//! [`PeriodKind`] distinguishes trailing-twelve-month snapshots written by
//! summary scans from the quarterly/annual periods of statement ingestion.

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Kind of reporting period a canonical record covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodKind {
    /// Trailing-twelve-month snapshot, dated by its as-of date.
    #[default]
    Ttm,
    /// Quarterly reporting period.
    Quarterly,
    /// Annual reporting period.
    Annual,
}

impl PeriodKind {
    /// Returns true if this kind comes from a financial-statement filing.
    #[must_use]
    pub const fn is_statement(&self) -> bool {
        matches!(self, Self::Quarterly | Self::Annual)
    }

    /// Short storage tag for this period kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ttm => "ttm",
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
        }
    }

    /// Parses a storage tag back into a period kind.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ttm" => Ok(Self::Ttm),
            "quarterly" => Ok(Self::Quarterly),
            "annual" => Ok(Self::Annual),
            other => Err(IngestError::Parse(format!("Invalid period kind: {other}"))),
        }
    }
}
