#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundsync/fundsync/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Finnhub provider adapter.
//!
//! Fetches the `metric=all` block of `/stock/metric` per symbol. Finnhub
//! reports market capitalization in millions, so that field is deliberately
//! left unmapped rather than persisted at the wrong scale.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use fundsync_core::{
    FetchOutcome, FieldMappingTable, MetricField, ProviderAdapter, RawPayload, RequestPacer,
    RetryPolicy, SummaryProvider, Symbol, SymbolFetch,
};

/// Finnhub API base URL.
const BASE_URL: &str = "https://finnhub.io/api/v1";

/// Environment variable holding the API key.
const API_KEY_VAR: &str = "FINNHUB_API_KEY";

/// Hard cap on symbols per invocation.
const BATCH_CAP: usize = 30;

/// Free-tier budget: 60 requests per minute.
const REQUESTS_PER_MINUTE: u64 = 60;

/// Finnhub provider adapter.
pub struct FinnhubProvider {
    client: Client,
    api_key: Option<String>,
    pacer: RequestPacer,
    retry: RetryPolicy,
}

impl fmt::Debug for FinnhubProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinnhubProvider")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl FinnhubProvider {
    /// Create a new Finnhub provider with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_key(Some(api_key.into()))
    }

    /// Create a provider from the `FINNHUB_API_KEY` environment variable; a
    /// missing variable yields a disabled adapter.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_key(std::env::var(API_KEY_VAR).ok().filter(|k| !k.is_empty()))
    }

    fn with_key(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            api_key,
            pacer: RequestPacer::per_minute(REQUESTS_PER_MINUTE),
            retry: RetryPolicy::default(),
        }
    }

    fn url(&self, symbol: &Symbol, api_key: &str) -> String {
        format!(
            "{BASE_URL}/stock/metric?symbol={}&metric=all&token={api_key}",
            symbol.as_str()
        )
    }

    /// Paced GET with the shared retry budget. Finnhub's error envelope is
    /// a 200 response of the shape `{"error": "..."}`.
    async fn get_metrics(&self, symbol: &Symbol, api_key: &str) -> Result<RawPayload, String> {
        let url = self.url(symbol, api_key);
        let mut last_error = String::new();

        for attempt in 1..=self.retry.max_attempts {
            self.pacer.wait().await;
            debug!(symbol = %symbol, attempt, "Finnhub request");

            let (rate_limited, message) = match self.client.get(&url).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    (true, "HTTP 429".to_string())
                }
                Ok(response) if !response.status().is_success() => {
                    (false, format!("HTTP {}", response.status()))
                }
                Ok(response) => match response.json::<Value>().await {
                    Ok(Value::Object(map)) => {
                        if let Some(err) = map.get("error") {
                            (false, err.as_str().unwrap_or("provider error").to_string())
                        } else {
                            // The usable fields live under the "metric" key.
                            let metrics = map
                                .get("metric")
                                .and_then(Value::as_object)
                                .cloned()
                                .unwrap_or_default();
                            return Ok(metrics);
                        }
                    }
                    Ok(other) => (false, format!("unexpected response shape: {other}")),
                    Err(e) => (false, format!("parse error: {e}")),
                },
                Err(e) => (false, e.to_string()),
            };

            last_error = message;
            if attempt < self.retry.max_attempts {
                sleep(self.retry.backoff(attempt, rate_limited)).await;
            }
        }

        Err(last_error)
    }
}

impl ProviderAdapter for FinnhubProvider {
    fn name(&self) -> &'static str {
        "finnhub"
    }

    fn batch_cap(&self) -> usize {
        BATCH_CAP
    }

    fn mapping(&self) -> &'static FieldMappingTable {
        metric_mapping()
    }
}

#[async_trait]
impl SummaryProvider for FinnhubProvider {
    async fn fetch_summaries(&self, symbols: &[Symbol]) -> Option<Vec<SymbolFetch>> {
        let api_key = self.api_key.as_deref()?;

        let mut results = Vec::with_capacity(symbols.len().min(BATCH_CAP));
        for symbol in symbols.iter().take(BATCH_CAP) {
            let outcome = match self.get_metrics(symbol, api_key).await {
                Ok(metrics) if metrics.is_empty() => FetchOutcome::NoData,
                Ok(metrics) => FetchOutcome::Data(metrics),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Finnhub metric fetch failed");
                    FetchOutcome::Failed(e)
                }
            };
            results.push(SymbolFetch {
                symbol: symbol.clone(),
                outcome,
            });
        }
        Some(results)
    }
}

/// Field-mapping table for Finnhub `/stock/metric` payloads.
#[must_use]
pub fn metric_mapping() -> &'static FieldMappingTable {
    static MAPPING: FieldMappingTable = FieldMappingTable {
        fields: &[
            (MetricField::PeRatio, &["peTTM", "peBasicExclExtraTTM", "peAnnual"]),
            (MetricField::PegRatio, &["pegTTM", "pegAnnual"]),
            (MetricField::PbRatio, &["pb", "pbAnnual", "pbQuarterly"]),
            (MetricField::PsRatio, &["psTTM", "psAnnual"]),
            (MetricField::Roe, &["roeTTM", "roeRfy"]),
            (MetricField::Roa, &["roaTTM", "roaRfy"]),
            (MetricField::Roic, &["roiTTM", "roiAnnual"]),
            (MetricField::GrossMargin, &["grossMarginTTM", "grossMarginAnnual"]),
            (
                MetricField::OperatingMargin,
                &["operatingMarginTTM", "operatingMarginAnnual"],
            ),
            (
                MetricField::NetMargin,
                &["netProfitMarginTTM", "netProfitMarginAnnual"],
            ),
            (
                MetricField::CurrentRatio,
                &["currentRatioQuarterly", "currentRatioAnnual"],
            ),
            (
                MetricField::QuickRatio,
                &["quickRatioQuarterly", "quickRatioAnnual"],
            ),
            (
                MetricField::DebtToEquity,
                &["totalDebt/totalEquityQuarterly", "totalDebt/totalEquityAnnual"],
            ),
            (
                MetricField::DividendYield,
                &["dividendYieldIndicatedAnnual", "currentDividendYieldTTM"],
            ),
            (MetricField::PayoutRatio, &["payoutRatioTTM", "payoutRatioAnnual"]),
            (MetricField::Beta, &["beta"]),
            (MetricField::Eps, &["epsTTM", "epsBasicExclExtraItemsTTM", "epsAnnual"]),
            (
                MetricField::BookValuePerShare,
                &["bookValuePerShareQuarterly", "bookValuePerShareAnnual"],
            ),
            (MetricField::RevenuePerShare, &["revenuePerShareTTM", "revenuePerShareAnnual"]),
            (MetricField::Week52High, &["52WeekHigh"]),
            (MetricField::Week52Low, &["52WeekLow"]),
        ],
        sector_keys: &["finnhubIndustry", "sector"],
    };
    &MAPPING
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_building() {
        let provider = FinnhubProvider::new("tok");
        assert_eq!(
            provider.url(&Symbol::new("MSFT"), "tok"),
            "https://finnhub.io/api/v1/stock/metric?symbol=MSFT&metric=all&token=tok"
        );
    }

    #[test]
    fn provider_metadata() {
        let provider = FinnhubProvider::new("tok");
        assert_eq!(provider.name(), "finnhub");
        assert_eq!(provider.batch_cap(), 30);
    }

    #[tokio::test]
    async fn missing_api_key_disables_the_adapter() {
        let provider = FinnhubProvider::with_key(None);
        assert!(
            provider
                .fetch_summaries(&[Symbol::new("MSFT")])
                .await
                .is_none()
        );
    }

    #[test]
    fn market_cap_is_deliberately_unmapped() {
        // Finnhub reports marketCapitalization in millions; mapping it raw
        // would persist values three orders of magnitude off.
        let payload: RawPayload = json!({"marketCapitalization": 3_100_000.0})
            .as_object()
            .unwrap()
            .clone();
        assert!(
            metric_mapping()
                .resolve(MetricField::MarketCap, &payload)
                .is_none()
        );
    }

    #[test]
    fn quarterly_ratio_aliases_win_over_annual() {
        let payload: RawPayload = json!({
            "currentRatioAnnual": 1.1,
            "currentRatioQuarterly": 1.4
        })
        .as_object()
        .unwrap()
        .clone();
        let resolved = metric_mapping()
            .resolve(MetricField::CurrentRatio, &payload)
            .unwrap();
        assert_eq!(resolved.as_f64(), Some(1.4));
    }
}
