//! Coverage audit and interpolation of missing fields.
//!
//! Coverage is the fraction of populated values across the fixed audit
//! field list. When a batch lands under the target, missing fields are
//! derived from financial identities on the same record where possible, and
//! otherwise filled from sector averages computed over the batch itself.
//! Every filled record gets the `interpolated` provenance tag, exactly once.

use std::collections::HashMap;

use tracing::debug;

use fundsync_core::{FieldKind, FundamentalSnapshot, INTERPOLATED_TAG, MetricField};

/// Coverage target, in percent, below which interpolation kicks in.
pub const COVERAGE_TARGET_PCT: f64 = 95.0;

/// Sector bucket for records carrying no sector label.
pub const GENERAL_SECTOR: &str = "General";

/// Fallback beta when no sector default applies.
const DEFAULT_BETA: f64 = 1.0;

/// Sector default betas used when no provider reported one.
const SECTOR_BETAS: &[(&str, f64)] = &[
    ("Technology", 1.2),
    ("Communication Services", 1.1),
    ("Consumer Cyclical", 1.15),
    ("Consumer Defensive", 0.7),
    ("Energy", 1.3),
    ("Financial Services", 1.1),
    ("Healthcare", 0.9),
    ("Industrials", 1.05),
    ("Basic Materials", 1.1),
    ("Real Estate", 0.8),
    ("Utilities", 0.6),
];

/// Coverage of the audit field list across a batch, in percent.
///
/// Two records with nine present audit values total score
/// `9 / (2 × 18) = 25%`. An empty batch scores zero.
#[must_use]
pub fn audit_coverage(records: &[FundamentalSnapshot]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }

    let present: usize = records
        .iter()
        .map(|record| {
            MetricField::AUDIT
                .iter()
                .filter(|field| field.get(record).is_some())
                .count()
        })
        .sum();

    let total = records.len() * MetricField::AUDIT.len();
    (present as f64 / total as f64) * 100.0
}

/// Per-sector averages of the audit ratio fields, built once per run from
/// the batch itself. Never persisted.
#[derive(Debug, Default)]
pub struct SectorAverageTable {
    averages: HashMap<String, HashMap<MetricField, f64>>,
}

impl SectorAverageTable {
    /// Builds the table by grouping records by sector (records without a
    /// sector land in the `General` bucket) and averaging each audit field
    /// over present values only.
    #[must_use]
    pub fn build(records: &[FundamentalSnapshot]) -> Self {
        let mut sums: HashMap<String, HashMap<MetricField, (f64, usize)>> = HashMap::new();

        for record in records {
            let sector = record
                .sector
                .clone()
                .unwrap_or_else(|| GENERAL_SECTOR.to_string());
            let bucket = sums.entry(sector).or_default();
            for field in MetricField::AUDIT {
                if let Some(value) = field.get(record) {
                    let (sum, count) = bucket.entry(field).or_insert((0.0, 0));
                    *sum += value;
                    *count += 1;
                }
            }
        }

        let averages = sums
            .into_iter()
            .map(|(sector, fields)| {
                let means = fields
                    .into_iter()
                    .map(|(field, (sum, count))| (field, sum / count as f64))
                    .collect();
                (sector, means)
            })
            .collect();

        Self { averages }
    }

    /// Looks up the average for a field, trying the record's sector first
    /// and falling back to the `General` bucket.
    #[must_use]
    pub fn lookup(&self, sector: Option<&str>, field: MetricField) -> Option<f64> {
        sector
            .and_then(|s| self.averages.get(s))
            .and_then(|fields| fields.get(&field))
            .or_else(|| {
                self.averages
                    .get(GENERAL_SECTOR)
                    .and_then(|fields| fields.get(&field))
            })
            .copied()
    }
}

/// Fills missing fields across a batch from identities and sector averages.
///
/// Returns the number of fields filled. Already-present fields are never
/// touched, and the `interpolated` provenance tag is appended at most once
/// per record, so re-applying the engine is a no-op.
pub fn interpolate(records: &mut [FundamentalSnapshot], table: &SectorAverageTable) -> usize {
    let mut filled = 0usize;

    for record in records.iter_mut() {
        let mut touched = false;

        for field in MetricField::AUDIT {
            if field.get(record).is_some() {
                continue;
            }
            let derived = derive_identity(field, record)
                .or_else(|| table.lookup(record.sector.as_deref(), field));
            if let Some(value) = derived {
                field.set(record, value);
                touched = true;
                filled += 1;
            }
        }

        // Enterprise value has an identity but no sector average: it is not
        // an audited ratio.
        if record.enterprise_value.is_none()
            && let Some(value) = derive_identity(MetricField::EnterpriseValue, record)
        {
            let value = if MetricField::EnterpriseValue.kind() == FieldKind::Cardinal {
                value.round()
            } else {
                value
            };
            MetricField::EnterpriseValue.set(record, value);
            touched = true;
            filled += 1;
        }

        if touched {
            record.push_provenance(INTERPOLATED_TAG);
        }
    }

    if filled > 0 {
        debug!(filled, "Interpolated missing fields");
    }
    filled
}

/// Derives one missing field from other present fields on the same record.
///
/// The constants here are fixed design parameters of the pipeline.
fn derive_identity(field: MetricField, r: &FundamentalSnapshot) -> Option<f64> {
    let value = match field {
        MetricField::PeRatio => {
            let market_cap = r.market_cap?;
            let shares = r.shares_outstanding?;
            let eps = r.eps?;
            if shares == 0.0 || eps == 0.0 {
                return None;
            }
            (market_cap / shares) / eps
        }
        MetricField::Roe => r.roa? * (1.0 + r.debt_to_equity?),
        MetricField::Roa => {
            let leverage = 1.0 + r.debt_to_equity?;
            if leverage == 0.0 {
                return None;
            }
            r.roe? / leverage
        }
        MetricField::Roic => r.roa? * (1.0 + r.debt_to_equity?) * 0.85,
        MetricField::NetMargin => r.operating_margin? * 0.75,
        MetricField::OperatingMargin => r.gross_margin? * 0.6,
        MetricField::QuickRatio => r.current_ratio? * 0.8,
        MetricField::EnterpriseValue => {
            let market_cap = r.market_cap?;
            match r.debt_to_equity {
                Some(d2e) => market_cap * (1.0 + 0.5 * d2e),
                None => market_cap * 1.1,
            }
        }
        MetricField::Beta => sector_beta(r.sector.as_deref()),
        _ => return None,
    };

    value.is_finite().then_some(value)
}

fn sector_beta(sector: Option<&str>) -> f64 {
    sector
        .and_then(|s| {
            SECTOR_BETAS
                .iter()
                .find(|(name, _)| *name == s)
                .map(|(_, beta)| *beta)
        })
        .unwrap_or(DEFAULT_BETA)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fundsync_core::{PeriodKind, Symbol};

    fn snapshot(symbol: &str) -> FundamentalSnapshot {
        FundamentalSnapshot::new(
            Symbol::new(symbol),
            PeriodKind::Ttm,
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        )
    }

    #[test]
    fn coverage_counts_present_audit_values() {
        let mut a = snapshot("AAPL");
        let mut b = snapshot("MSFT");
        // Nine present values across two records and eighteen audit fields.
        for field in &MetricField::AUDIT[..5] {
            field.set(&mut a, 1.0);
        }
        for field in &MetricField::AUDIT[..4] {
            field.set(&mut b, 1.0);
        }

        let coverage = audit_coverage(&[a, b]);
        assert!((coverage - 25.0).abs() < 1e-9);
        assert_eq!(audit_coverage(&[]), 0.0);
    }

    #[test]
    fn identities_use_the_documented_constants() {
        let mut r = snapshot("AAPL");
        r.market_cap = Some(3_000_000_000_000.0);
        r.shares_outstanding = Some(15_000_000_000.0);
        r.eps = Some(8.0);
        r.roa = Some(0.2);
        r.debt_to_equity = Some(1.5);
        r.gross_margin = Some(0.5);
        r.current_ratio = Some(1.5);

        assert_eq!(derive_identity(MetricField::PeRatio, &r), Some(25.0));
        assert_eq!(derive_identity(MetricField::Roe, &r), Some(0.5));
        assert_eq!(derive_identity(MetricField::Roic, &r), Some(0.2 * 2.5 * 0.85));
        assert_eq!(derive_identity(MetricField::OperatingMargin, &r), Some(0.3));
        assert_eq!(derive_identity(MetricField::QuickRatio, &r), Some(1.2));
        assert_eq!(
            derive_identity(MetricField::EnterpriseValue, &r),
            Some(3_000_000_000_000.0 * 1.75)
        );

        let mut no_debt = snapshot("MSFT");
        no_debt.market_cap = Some(1_000_000_000.0);
        assert_eq!(
            derive_identity(MetricField::EnterpriseValue, &no_debt),
            Some(1_100_000_000.0)
        );
    }

    #[test]
    fn net_margin_derives_from_operating_margin() {
        let mut r = snapshot("AAPL");
        r.operating_margin = Some(0.4);
        assert_eq!(derive_identity(MetricField::NetMargin, &r), Some(0.3));
    }

    #[test]
    fn beta_defaults_by_sector_with_general_fallback() {
        assert_eq!(sector_beta(Some("Utilities")), 0.6);
        assert_eq!(sector_beta(Some("Technology")), 1.2);
        assert_eq!(sector_beta(Some("Unheard Of Sector")), 1.0);
        assert_eq!(sector_beta(None), 1.0);
    }

    #[test]
    fn sector_averages_fall_back_to_general() {
        let mut tech = snapshot("AAPL");
        tech.sector = Some("Technology".to_string());
        tech.pe_ratio = Some(30.0);

        let mut unlabeled = snapshot("XYZ");
        unlabeled.pe_ratio = Some(10.0);

        let table = SectorAverageTable::build(&[tech, unlabeled]);
        assert_eq!(table.lookup(Some("Technology"), MetricField::PeRatio), Some(30.0));
        // Unknown sector falls back to the General bucket.
        assert_eq!(table.lookup(Some("Energy"), MetricField::PeRatio), Some(10.0));
        assert_eq!(table.lookup(None, MetricField::PeRatio), Some(10.0));
    }

    #[test]
    fn interpolation_is_idempotent() {
        let mut filled_from_peer = snapshot("AAPL");
        filled_from_peer.sector = Some("Technology".to_string());
        filled_from_peer.roa = Some(0.2);
        filled_from_peer.debt_to_equity = Some(1.0);

        let mut peer = snapshot("MSFT");
        peer.sector = Some("Technology".to_string());
        peer.current_ratio = Some(2.0);

        let mut records = vec![filled_from_peer, peer];
        let table = SectorAverageTable::build(&records);

        let first_pass = interpolate(&mut records, &table);
        assert!(first_pass > 0);
        assert_eq!(records[0].roe, Some(0.4));
        assert!(records[0].has_provenance(INTERPOLATED_TAG));

        let before = records.clone();
        let second_pass = interpolate(&mut records, &table);
        assert_eq!(second_pass, 0);
        assert_eq!(records, before);
        // The tag is not duplicated.
        assert_eq!(
            records[0]
                .provenance
                .split(',')
                .filter(|t| *t == INTERPOLATED_TAG)
                .count(),
            1
        );
    }
}
