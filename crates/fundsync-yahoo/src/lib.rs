#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundsync/fundsync/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Yahoo Finance provider adapter.
//!
//! Fetches the quoteSummary endpoint (summaryDetail, defaultKeyStatistics,
//! financialData, assetProfile modules) per symbol. Yahoo wraps most values
//! in `{"raw": ..., "fmt": "..."}` containers; the adapter flattens modules
//! into a single payload, unwrapping `raw` where present, so alias
//! resolution sees one flat key space.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use fundsync_core::{
    FetchOutcome, FieldMappingTable, MetricField, ProviderAdapter, RawPayload, RetryPolicy,
    SummaryProvider, Symbol, SymbolFetch,
};

/// Yahoo Finance quote summary API base URL.
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";

/// Modules requested per symbol.
const MODULES: &str = "summaryDetail,defaultKeyStatistics,financialData,assetProfile";

/// Default rate limit delay in milliseconds.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// Hard cap on symbols per invocation.
const BATCH_CAP: usize = 20;

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Yahoo Finance provider adapter.
///
/// Keyless: always enabled. Serializes its own requests at one per second.
#[derive(Debug)]
pub struct YahooProvider {
    client: reqwest::Client,
    rate_limit_ms: u64,
    last_request_time: AtomicU64,
    retry: RetryPolicy,
}

impl YahooProvider {
    /// Create a new Yahoo Finance provider with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rate_limit(Duration::from_millis(DEFAULT_RATE_LIMIT_MS))
    }

    /// Create a new Yahoo Finance provider with custom rate limiting.
    #[must_use]
    pub fn with_rate_limit(rate_limit: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            rate_limit_ms: rate_limit.as_millis() as u64,
            last_request_time: AtomicU64::new(0),
            retry: RetryPolicy::default(),
        }
    }

    /// Apply rate limiting before making a request.
    async fn apply_rate_limit(&self) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let last = self.last_request_time.load(Ordering::Relaxed);
        let elapsed = now.saturating_sub(last);

        if elapsed < self.rate_limit_ms {
            let wait_time = self.rate_limit_ms - elapsed;
            debug!("Rate limiting: waiting {}ms", wait_time);
            sleep(Duration::from_millis(wait_time)).await;
        }

        self.last_request_time.store(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            Ordering::Relaxed,
        );
    }

    fn build_url(&self, symbol: &Symbol) -> String {
        format!(
            "{QUOTE_SUMMARY_URL}/{}?modules={MODULES}",
            symbol.as_str()
        )
    }

    /// One symbol's summary fetch with the shared retry budget.
    ///
    /// A 404 is a definitive no-data answer, not a retryable failure.
    async fn fetch_one(&self, symbol: &Symbol) -> FetchOutcome {
        let url = self.build_url(symbol);
        let mut last_error = String::new();

        for attempt in 1..=self.retry.max_attempts {
            self.apply_rate_limit().await;
            debug!(symbol = %symbol, attempt, "Yahoo quoteSummary request");

            let (rate_limited, message) = match self.client.get(&url).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    (true, "HTTP 429".to_string())
                }
                Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                    return FetchOutcome::NoData;
                }
                Ok(response) if !response.status().is_success() => {
                    (false, format!("HTTP {}", response.status()))
                }
                Ok(response) => match response.json::<Value>().await {
                    Ok(body) => match flatten_quote_summary(&body) {
                        Ok(Some(payload)) => return FetchOutcome::Data(payload),
                        Ok(None) => return FetchOutcome::NoData,
                        Err(e) => (false, e),
                    },
                    Err(e) => (false, format!("parse error: {e}")),
                },
                Err(e) => (false, e.to_string()),
            };

            last_error = message;
            if attempt < self.retry.max_attempts {
                sleep(self.retry.backoff(attempt, rate_limited)).await;
            }
        }

        warn!(symbol = %symbol, error = %last_error, "Yahoo quoteSummary failed");
        FetchOutcome::Failed(last_error)
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Flatten a quoteSummary response into one payload.
///
/// Returns `Ok(None)` when the response carries no result, `Err` with the
/// API error description when Yahoo reports one.
fn flatten_quote_summary(body: &Value) -> Result<Option<RawPayload>, String> {
    let summary = body
        .get("quoteSummary")
        .ok_or_else(|| "missing quoteSummary envelope".to_string())?;

    if let Some(error) = summary.get("error").filter(|e| !e.is_null()) {
        let description = error
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown API error");
        return Err(description.to_string());
    }

    let Some(result) = summary
        .get("result")
        .and_then(Value::as_array)
        .and_then(|r| r.first())
        .and_then(Value::as_object)
    else {
        return Ok(None);
    };

    let mut payload = RawPayload::new();
    for module in result.values() {
        let Some(module) = module.as_object() else {
            continue;
        };
        for (key, value) in module {
            let unwrapped = match value {
                // {"raw": 21.4, "fmt": "21.40"} containers
                Value::Object(container) => match container.get("raw") {
                    Some(raw) => raw.clone(),
                    None => continue,
                },
                Value::Array(_) => continue,
                other => other.clone(),
            };
            payload.entry(key.clone()).or_insert(unwrapped);
        }
    }

    if payload.is_empty() {
        Ok(None)
    } else {
        Ok(Some(payload))
    }
}

impl ProviderAdapter for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    fn batch_cap(&self) -> usize {
        BATCH_CAP
    }

    fn mapping(&self) -> &'static FieldMappingTable {
        quote_summary_mapping()
    }
}

#[async_trait]
impl SummaryProvider for YahooProvider {
    async fn fetch_summaries(&self, symbols: &[Symbol]) -> Option<Vec<SymbolFetch>> {
        let mut results = Vec::with_capacity(symbols.len().min(BATCH_CAP));
        for symbol in symbols.iter().take(BATCH_CAP) {
            let outcome = self.fetch_one(symbol).await;
            results.push(SymbolFetch {
                symbol: symbol.clone(),
                outcome,
            });
        }
        Some(results)
    }
}

/// Field-mapping table for flattened quoteSummary payloads.
#[must_use]
pub fn quote_summary_mapping() -> &'static FieldMappingTable {
    static MAPPING: FieldMappingTable = FieldMappingTable {
        fields: &[
            (MetricField::PeRatio, &["trailingPE"]),
            (MetricField::ForwardPe, &["forwardPE"]),
            (MetricField::PegRatio, &["pegRatio", "trailingPegRatio"]),
            (MetricField::PbRatio, &["priceToBook"]),
            (MetricField::PsRatio, &["priceToSalesTrailing12Months"]),
            (MetricField::EvToEbitda, &["enterpriseToEbitda"]),
            (MetricField::Roe, &["returnOnEquity"]),
            (MetricField::Roa, &["returnOnAssets"]),
            (MetricField::GrossMargin, &["grossMargins"]),
            (MetricField::OperatingMargin, &["operatingMargins"]),
            (MetricField::NetMargin, &["profitMargins"]),
            (MetricField::CurrentRatio, &["currentRatio"]),
            (MetricField::QuickRatio, &["quickRatio"]),
            (MetricField::DebtToEquity, &["debtToEquity"]),
            (MetricField::DividendYield, &["dividendYield", "trailingAnnualDividendYield"]),
            (MetricField::PayoutRatio, &["payoutRatio"]),
            (MetricField::Beta, &["beta"]),
            (MetricField::Eps, &["trailingEps"]),
            (MetricField::EpsDiluted, &["epsTrailingTwelveMonths"]),
            (MetricField::BookValuePerShare, &["bookValue"]),
            (MetricField::RevenuePerShare, &["revenuePerShare"]),
            (MetricField::MarketCap, &["marketCap"]),
            (MetricField::EnterpriseValue, &["enterpriseValue"]),
            (
                MetricField::SharesOutstanding,
                &["sharesOutstanding", "impliedSharesOutstanding"],
            ),
            (MetricField::Price, &["currentPrice", "regularMarketPrice"]),
            (MetricField::Week52High, &["fiftyTwoWeekHigh"]),
            (MetricField::Week52Low, &["fiftyTwoWeekLow"]),
        ],
        sector_keys: &["sector", "sectorDisp"],
    };
    &MAPPING
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_url_includes_modules() {
        let provider = YahooProvider::new();
        let url = provider.build_url(&Symbol::new("AAPL"));
        assert!(url.contains("/AAPL?"));
        assert!(url.contains("modules=summaryDetail"));
    }

    #[test]
    fn provider_metadata() {
        let provider = YahooProvider::new();
        assert_eq!(provider.name(), "yahoo");
        assert_eq!(provider.batch_cap(), 20);
    }

    #[test]
    fn flatten_unwraps_raw_containers() {
        let body = json!({
            "quoteSummary": {
                "result": [{
                    "summaryDetail": {
                        "trailingPE": {"raw": 28.5, "fmt": "28.50"},
                        "beta": {"raw": 1.2, "fmt": "1.20"}
                    },
                    "assetProfile": {
                        "sector": "Technology"
                    }
                }],
                "error": null
            }
        });

        let payload = flatten_quote_summary(&body).unwrap().unwrap();
        assert_eq!(payload.get("trailingPE").and_then(Value::as_f64), Some(28.5));
        assert_eq!(
            payload.get("sector").and_then(Value::as_str),
            Some("Technology")
        );
    }

    #[test]
    fn flatten_reports_api_errors() {
        let body = json!({
            "quoteSummary": {
                "result": [],
                "error": {"code": "Not Found", "description": "Quote not found"}
            }
        });
        assert_eq!(
            flatten_quote_summary(&body).unwrap_err(),
            "Quote not found"
        );
    }

    #[test]
    fn flatten_empty_result_is_no_data() {
        let body = json!({"quoteSummary": {"result": [], "error": null}});
        assert!(flatten_quote_summary(&body).unwrap().is_none());
    }
}
