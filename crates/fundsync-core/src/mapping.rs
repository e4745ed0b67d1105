//! Per-provider field-mapping tables.
//!
//! Each provider crate declares a static [`FieldMappingTable`] mapping every
//! canonical metric field to an ordered list of provider-specific aliases.
//! Resolution takes the first alias *present* in a raw payload; a key whose
//! value is falsy still matches, only JSON null and missing keys do not.
//! Statement providers additionally declare a [`BreakdownTable`] keyed by the
//! literal line-item labels of their statement responses.

use serde_json::Value;

use crate::provider::RawPayload;
use crate::types::{CashFlowField, MetricField};

/// Ordered alias list for one canonical metric field.
pub type FieldAliases = (MetricField, &'static [&'static str]);

/// Ordered alias list for one cash-flow column.
pub type BreakdownAliases = (CashFlowField, &'static [&'static str]);

/// Static per-provider mapping from canonical fields to payload aliases.
#[derive(Debug)]
pub struct FieldMappingTable {
    /// Alias lists per canonical metric field, scanned in declared order.
    pub fields: &'static [FieldAliases],
    /// Provider-specific keys that may carry the sector label.
    pub sector_keys: &'static [&'static str],
}

impl FieldMappingTable {
    /// Resolves one canonical field against a payload, returning the first
    /// alias value present.
    #[must_use]
    pub fn resolve<'p>(&self, field: MetricField, payload: &'p RawPayload) -> Option<&'p Value> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .and_then(|(_, aliases)| first_present(aliases, payload))
    }

    /// Extracts the sector label from the first sector key present with a
    /// non-empty string value.
    #[must_use]
    pub fn resolve_sector(&self, payload: &RawPayload) -> Option<String> {
        self.sector_keys
            .iter()
            .filter_map(|key| payload.get(*key))
            .find_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
    }
}

/// Static per-provider mapping from statement line-item labels to canonical
/// cash-flow columns.
#[derive(Debug)]
pub struct BreakdownTable {
    /// Alias lists per cash-flow column, scanned in declared order.
    pub columns: &'static [BreakdownAliases],
}

impl BreakdownTable {
    /// Resolves one cash-flow column against a statement row payload.
    #[must_use]
    pub fn resolve<'p>(&self, column: CashFlowField, rows: &'p RawPayload) -> Option<&'p Value> {
        self.columns
            .iter()
            .find(|(c, _)| *c == column)
            .and_then(|(_, labels)| first_present(labels, rows))
    }
}

/// First alias whose key is present in the payload with a non-null value.
fn first_present<'p>(aliases: &[&str], payload: &'p RawPayload) -> Option<&'p Value> {
    aliases
        .iter()
        .find_map(|alias| payload.get(*alias).filter(|v| !v.is_null()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static TABLE: FieldMappingTable = FieldMappingTable {
        fields: &[(MetricField::PeRatio, &["peRatioTTM", "peRatio", "PERatio"])],
        sector_keys: &["sector", "Sector"],
    };

    fn payload(value: Value) -> RawPayload {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn first_alias_present_wins() {
        let p = payload(json!({"peRatio": 15.0, "PERatio": 30.0}));
        let resolved = TABLE.resolve(MetricField::PeRatio, &p).unwrap();
        assert_eq!(resolved.as_f64(), Some(15.0));
    }

    #[test]
    fn null_alias_is_skipped_but_falsy_matches() {
        let p = payload(json!({"peRatioTTM": null, "peRatio": 0.0}));
        let resolved = TABLE.resolve(MetricField::PeRatio, &p).unwrap();
        assert_eq!(resolved.as_f64(), Some(0.0));
    }

    #[test]
    fn unmapped_fields_resolve_to_none() {
        let p = payload(json!({"somethingElse": 1}));
        assert!(TABLE.resolve(MetricField::PeRatio, &p).is_none());
        assert!(TABLE.resolve(MetricField::Beta, &p).is_none());
    }

    #[test]
    fn sector_resolution_skips_blank_labels() {
        let p = payload(json!({"sector": "  ", "Sector": "Technology"}));
        assert_eq!(TABLE.resolve_sector(&p), Some("Technology".to_string()));
    }
}
