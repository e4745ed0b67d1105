#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundsync/fundsync/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Financial Modeling Prep (FMP) provider adapter.
//!
//! Fetches TTM ratio and key-metric summaries plus cash-flow statement
//! breakdowns from the [Financial Modeling Prep](https://financialmodelingprep.com/)
//! API. Payloads are returned raw; the pipeline's normalizer resolves them
//! through [`summary_mapping`] and [`cash_flow_breakdown`].

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use fundsync_core::{
    BreakdownTable, CashFlowField, FetchOutcome, FieldMappingTable, MetricField, PeriodFetch,
    PeriodKind, ProviderAdapter, RawPayload, RequestPacer, RetryPolicy, StatementOutcome,
    StatementProvider, SummaryProvider, Symbol, SymbolFetch,
};

/// Base URL for the FMP stable API.
const FMP_BASE_URL: &str = "https://financialmodelingprep.com/stable";

/// Environment variable holding the API key.
const API_KEY_VAR: &str = "FMP_API_KEY";

/// Hard cap on symbols per invocation.
const BATCH_CAP: usize = 50;

/// FMP paid-tier budget: 300 requests per minute.
const REQUESTS_PER_MINUTE: u64 = 300;

/// Periods requested per cash-flow statement fetch.
const STATEMENT_LIMIT: usize = 8;

/// Financial Modeling Prep provider adapter.
///
/// Summary fetches combine the `ratios-ttm`, `key-metrics-ttm`, and
/// `profile` endpoints into one raw payload per symbol.
pub struct FmpProvider {
    client: Client,
    api_key: Option<String>,
    pacer: RequestPacer,
    retry: RetryPolicy,
}

impl fmt::Debug for FmpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FmpProvider")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl FmpProvider {
    /// Create a new FMP provider with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_key(Some(api_key.into()))
    }

    /// Create an FMP provider from the `FMP_API_KEY` environment variable.
    ///
    /// A missing variable yields a disabled adapter whose fetches return
    /// `None`.
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

    /// Build a URL with the API key appended.
    fn url(&self, endpoint: &str, api_key: &str) -> String {
        if endpoint.contains('?') {
            format!("{FMP_BASE_URL}/{endpoint}&apikey={api_key}")
        } else {
            format!("{FMP_BASE_URL}/{endpoint}?apikey={api_key}")
        }
    }

    /// Make a paced GET request with the shared retry budget.
    ///
    /// HTTP 429 backs off at the rate-limited schedule; other non-2xx
    /// statuses and FMP error envelopes back off at the transient schedule.
    /// Exhausting the budget returns the last failure message.
    async fn get_with_retry(&self, endpoint: &str, api_key: &str) -> Result<Value, String> {
        let url = self.url(endpoint, api_key);
        let mut last_error = String::new();

        for attempt in 1..=self.retry.max_attempts {
            self.pacer.wait().await;
            debug!(endpoint, attempt, "FMP request");

            let (retryable_rate_limited, message) = match self.client.get(&url).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    (true, "HTTP 429".to_string())
                }
                Ok(response) if !response.status().is_success() => {
                    (false, format!("HTTP {}", response.status()))
                }
                Ok(response) => match response.text().await {
                    Ok(text) if text.contains("\"Error Message\"") || text.contains("\"error\"") => {
                        (false, text)
                    }
                    Ok(text) => match serde_json::from_str(&text) {
                        Ok(value) => return Ok(value),
                        Err(e) => (false, format!("parse error: {e}")),
                    },
                    Err(e) => (false, e.to_string()),
                },
                Err(e) => (false, e.to_string()),
            };

            last_error = message;
            if attempt < self.retry.max_attempts {
                sleep(self.retry.backoff(attempt, retryable_rate_limited)).await;
            }
        }

        Err(last_error)
    }

    /// Fetch one symbol's summary payload by merging the three summary
    /// endpoints. Endpoint failures degrade to whatever did respond.
    async fn fetch_summary_payload(&self, symbol: &Symbol, api_key: &str) -> FetchOutcome {
        let endpoints = [
            format!("ratios-ttm?symbol={}", symbol.as_str()),
            format!("key-metrics-ttm?symbol={}", symbol.as_str()),
            format!("profile?symbol={}", symbol.as_str()),
        ];

        let mut merged = RawPayload::new();
        let mut last_error = None;

        for endpoint in &endpoints {
            match self.get_with_retry(endpoint, api_key).await {
                Ok(value) => merge_first_object(&mut merged, &value),
                Err(e) => {
                    warn!(symbol = %symbol, endpoint, error = %e, "FMP endpoint failed");
                    last_error = Some(e);
                }
            }
        }

        if merged.is_empty() {
            match last_error {
                Some(e) => FetchOutcome::Failed(e),
                None => FetchOutcome::NoData,
            }
        } else {
            FetchOutcome::Data(merged)
        }
    }
}

/// Merge the first object of a list response (or a bare object) into the
/// accumulated payload. Existing keys are kept, preserving endpoint order.
fn merge_first_object(target: &mut RawPayload, value: &Value) {
    let object = match value {
        Value::Array(items) => items.first().and_then(Value::as_object),
        Value::Object(map) => Some(map),
        _ => None,
    };
    if let Some(map) = object {
        for (k, v) in map {
            target.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

impl ProviderAdapter for FmpProvider {
    fn name(&self) -> &'static str {
        "fmp"
    }

    fn batch_cap(&self) -> usize {
        BATCH_CAP
    }

    fn mapping(&self) -> &'static FieldMappingTable {
        summary_mapping()
    }
}

#[async_trait]
impl SummaryProvider for FmpProvider {
    async fn fetch_summaries(&self, symbols: &[Symbol]) -> Option<Vec<SymbolFetch>> {
        let api_key = self.api_key.as_deref()?;

        let mut results = Vec::with_capacity(symbols.len().min(BATCH_CAP));
        for symbol in symbols.iter().take(BATCH_CAP) {
            let outcome = self.fetch_summary_payload(symbol, api_key).await;
            results.push(SymbolFetch {
                symbol: symbol.clone(),
                outcome,
            });
        }
        Some(results)
    }

    async fn fetch_quarterly_supplement(&self, symbols: &[Symbol]) -> Option<Vec<SymbolFetch>> {
        let api_key = self.api_key.as_deref()?;

        let mut results = Vec::with_capacity(symbols.len().min(BATCH_CAP));
        for symbol in symbols.iter().take(BATCH_CAP) {
            let endpoint = format!("ratios?symbol={}&period=quarter&limit=1", symbol.as_str());
            let outcome = match self.get_with_retry(&endpoint, api_key).await {
                Ok(value) => {
                    let mut payload = RawPayload::new();
                    merge_first_object(&mut payload, &value);
                    if payload.is_empty() {
                        FetchOutcome::NoData
                    } else {
                        FetchOutcome::Data(payload)
                    }
                }
                Err(e) => FetchOutcome::Failed(e),
            };
            results.push(SymbolFetch {
                symbol: symbol.clone(),
                outcome,
            });
        }
        Some(results)
    }
}

#[async_trait]
impl StatementProvider for FmpProvider {
    fn breakdown(&self) -> &'static BreakdownTable {
        cash_flow_breakdown()
    }

    async fn fetch_cash_flows(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
    ) -> Option<StatementOutcome> {
        let api_key = self.api_key.as_deref()?;

        let period_param = match period {
            PeriodKind::Quarterly => "quarter",
            _ => "annual",
        };
        let endpoint = format!(
            "cash-flow-statement?symbol={}&period={period_param}&limit={STATEMENT_LIMIT}",
            symbol.as_str()
        );

        let outcome = match self.get_with_retry(&endpoint, api_key).await {
            Ok(Value::Array(items)) => {
                let periods: Vec<PeriodFetch> = items
                    .into_iter()
                    .filter_map(|item| {
                        let rows = item.as_object()?.clone();
                        let fiscal_date = rows.get("date")?.as_str()?.to_string();
                        Some(PeriodFetch { fiscal_date, rows })
                    })
                    .collect();
                if periods.is_empty() {
                    StatementOutcome::NoData
                } else {
                    StatementOutcome::Periods(periods)
                }
            }
            Ok(_) => StatementOutcome::NoData,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "FMP cash-flow fetch failed");
                StatementOutcome::Failed(e)
            }
        };

        Some(outcome)
    }
}

/// Field-mapping table for FMP summary payloads.
///
/// Aliases span the three merged endpoints; TTM-suffixed ratio keys first,
/// then their plain-period fallbacks used by the quarterly supplement.
#[must_use]
pub fn summary_mapping() -> &'static FieldMappingTable {
    static MAPPING: FieldMappingTable = FieldMappingTable {
        fields: &[
            (MetricField::PeRatio, &["peRatioTTM", "peRatio", "priceEarningsRatio"]),
            (MetricField::ForwardPe, &["forwardPE"]),
            (MetricField::PegRatio, &["pegRatioTTM", "pegRatio"]),
            (
                MetricField::PbRatio,
                &["priceToBookRatioTTM", "priceBookValueRatioTTM", "priceToBookRatio"],
            ),
            (MetricField::PsRatio, &["priceToSalesRatioTTM", "priceSalesRatio"]),
            (
                MetricField::EvToEbitda,
                &["enterpriseValueOverEBITDATTM", "enterpriseValueMultipleTTM", "enterpriseValueMultiple"],
            ),
            (MetricField::Roe, &["returnOnEquityTTM", "returnOnEquity"]),
            (MetricField::Roa, &["returnOnAssetsTTM", "returnOnAssets"]),
            (
                MetricField::Roic,
                &["returnOnInvestedCapitalTTM", "returnOnCapitalEmployedTTM", "returnOnCapitalEmployed"],
            ),
            (MetricField::GrossMargin, &["grossProfitMarginTTM", "grossProfitMargin"]),
            (
                MetricField::OperatingMargin,
                &["operatingProfitMarginTTM", "operatingProfitMargin"],
            ),
            (MetricField::NetMargin, &["netProfitMarginTTM", "netProfitMargin"]),
            (MetricField::CurrentRatio, &["currentRatioTTM", "currentRatio"]),
            (MetricField::QuickRatio, &["quickRatioTTM", "quickRatio"]),
            (
                MetricField::DebtToEquity,
                &["debtEquityRatioTTM", "debtToEquityTTM", "debtEquityRatio"],
            ),
            (
                MetricField::DividendYield,
                &["dividendYieldTTM", "dividendYielTTM", "dividendYield"],
            ),
            (MetricField::PayoutRatio, &["payoutRatioTTM", "payoutRatio"]),
            (MetricField::Beta, &["beta"]),
            (MetricField::Eps, &["netIncomePerShareTTM", "netIncomePerShare"]),
            (MetricField::EpsDiluted, &["epsDilutedTTM"]),
            (
                MetricField::BookValuePerShare,
                &["bookValuePerShareTTM", "bookValuePerShare"],
            ),
            (
                MetricField::RevenuePerShare,
                &["revenuePerShareTTM", "revenuePerShare"],
            ),
            (MetricField::MarketCap, &["marketCapTTM", "mktCap", "marketCap"]),
            (MetricField::EnterpriseValue, &["enterpriseValueTTM", "enterpriseValue"]),
            (
                MetricField::SharesOutstanding,
                &["sharesOutstanding", "weightedAverageShsOutTTM"],
            ),
            (MetricField::Price, &["price"]),
            (MetricField::Week52High, &["yearHigh"]),
            (MetricField::Week52Low, &["yearLow"]),
        ],
        sector_keys: &["sector"],
    };
    &MAPPING
}

/// Breakdown table for FMP cash-flow statement rows.
#[must_use]
pub fn cash_flow_breakdown() -> &'static BreakdownTable {
    static BREAKDOWN: BreakdownTable = BreakdownTable {
        columns: &[
            (
                CashFlowField::OperatingCashFlow,
                &["netCashProvidedByOperatingActivities", "operatingCashFlow"],
            ),
            (
                CashFlowField::InvestingCashFlow,
                &["netCashUsedForInvestingActivites", "netCashProvidedByInvestingActivities"],
            ),
            (
                CashFlowField::FinancingCashFlow,
                &[
                    "netCashUsedProvidedByFinancingActivities",
                    "netCashProvidedByFinancingActivities",
                ],
            ),
            (
                CashFlowField::CapitalExpenditures,
                &["capitalExpenditure", "investmentsInPropertyPlantAndEquipment"],
            ),
            (CashFlowField::FreeCashFlow, &["freeCashFlow"]),
            (
                CashFlowField::DividendsPaid,
                &["dividendsPaid", "commonDividendsPaid"],
            ),
            (CashFlowField::NetIncome, &["netIncome"]),
            (
                CashFlowField::DepreciationAmortization,
                &["depreciationAndAmortization"],
            ),
            (
                CashFlowField::ChangeInWorkingCapital,
                &["changeInWorkingCapital"],
            ),
            (CashFlowField::NetChangeInCash, &["netChangeInCash"]),
        ],
    };
    &BREAKDOWN
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_building_appends_api_key() {
        let provider = FmpProvider::new("test_key");
        assert_eq!(
            provider.url("ratios-ttm?symbol=AAPL", "test_key"),
            "https://financialmodelingprep.com/stable/ratios-ttm?symbol=AAPL&apikey=test_key"
        );
        assert_eq!(
            provider.url("profile", "test_key"),
            "https://financialmodelingprep.com/stable/profile?apikey=test_key"
        );
    }

    #[test]
    fn provider_metadata() {
        let provider = FmpProvider::new("test_key");
        assert_eq!(provider.name(), "fmp");
        assert_eq!(provider.batch_cap(), 50);
    }

    #[test]
    fn debug_redacts_api_key() {
        let provider = FmpProvider::new("secret_key_12345");
        let debug_str = format!("{provider:?}");
        assert!(!debug_str.contains("secret_key_12345"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn missing_api_key_disables_the_adapter() {
        let provider = FmpProvider::with_key(None);
        let result = provider.fetch_summaries(&[Symbol::new("AAPL")]).await;
        assert!(result.is_none());
        let statements = provider
            .fetch_cash_flows(&Symbol::new("AAPL"), PeriodKind::Annual)
            .await;
        assert!(statements.is_none());
    }

    #[test]
    fn merge_keeps_first_endpoint_value() {
        let mut payload = RawPayload::new();
        merge_first_object(&mut payload, &json!([{"peRatioTTM": 21.0, "beta": 1.1}]));
        merge_first_object(&mut payload, &json!([{"beta": 9.9, "price": 175.0}]));
        assert_eq!(payload.get("beta").and_then(Value::as_f64), Some(1.1));
        assert_eq!(payload.get("price").and_then(Value::as_f64), Some(175.0));
    }

    #[test]
    fn summary_mapping_resolves_ttm_aliases_first() {
        let payload: RawPayload = json!({"peRatio": 18.0, "peRatioTTM": 21.4})
            .as_object()
            .unwrap()
            .clone();
        let resolved = summary_mapping()
            .resolve(MetricField::PeRatio, &payload)
            .unwrap();
        assert_eq!(resolved.as_f64(), Some(21.4));
    }

    #[test]
    fn breakdown_covers_every_cash_flow_column() {
        let mapped: Vec<CashFlowField> = cash_flow_breakdown()
            .columns
            .iter()
            .map(|(c, _)| *c)
            .collect();
        for column in CashFlowField::ALL {
            assert!(mapped.contains(&column), "{column:?} unmapped");
        }
    }
}
