#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundsync/fundsync/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Alpha Vantage provider adapter.
//!
//! Uses the `OVERVIEW` function for fundamentals summaries and `CASH_FLOW`
//! for statement breakdowns. The free tier is tightly rate limited, so the
//! batch cap is the smallest of all adapters and requests are paced well
//! below the documented budget.

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

/// Alpha Vantage query endpoint.
const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Environment variable holding the API key.
const API_KEY_VAR: &str = "ALPHAVANTAGE_API_KEY";

/// Hard cap on symbols per invocation (free tier: 25 requests/day-ish).
const BATCH_CAP: usize = 10;

/// Free-tier budget: 5 requests per minute.
const REQUESTS_PER_MINUTE: u64 = 5;

/// Alpha Vantage provider adapter.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: Option<String>,
    pacer: RequestPacer,
    retry: RetryPolicy,
}

impl fmt::Debug for AlphaVantageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlphaVantageProvider")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl AlphaVantageProvider {
    /// Create a new Alpha Vantage provider with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_key(Some(api_key.into()))
    }

    /// Create a provider from the `ALPHAVANTAGE_API_KEY` environment
    /// variable; a missing variable yields a disabled adapter.
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

    fn url(&self, function: &str, symbol: &Symbol, api_key: &str) -> String {
        format!(
            "{BASE_URL}?function={function}&symbol={}&apikey={api_key}",
            symbol.as_str()
        )
    }

    /// Paced GET with the shared retry budget.
    ///
    /// Alpha Vantage signals throttling with a 200 response carrying a
    /// `Note` or `Information` envelope; those back off at the rate-limited
    /// schedule, an `Error Message` envelope at the transient one.
    async fn get_with_retry(
        &self,
        function: &str,
        symbol: &Symbol,
        api_key: &str,
    ) -> Result<RawPayload, String> {
        let url = self.url(function, symbol, api_key);
        let mut last_error = String::new();

        for attempt in 1..=self.retry.max_attempts {
            self.pacer.wait().await;
            debug!(function, symbol = %symbol, attempt, "Alpha Vantage request");

            let (rate_limited, message) = match self.client.get(&url).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    (true, "HTTP 429".to_string())
                }
                Ok(response) if !response.status().is_success() => {
                    (false, format!("HTTP {}", response.status()))
                }
                Ok(response) => match response.json::<Value>().await {
                    Ok(Value::Object(map)) => {
                        if let Some(note) = map.get("Note").or_else(|| map.get("Information")) {
                            (true, note.as_str().unwrap_or("throttled").to_string())
                        } else if let Some(err) = map.get("Error Message") {
                            (false, err.as_str().unwrap_or("provider error").to_string())
                        } else {
                            return Ok(map);
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

impl ProviderAdapter for AlphaVantageProvider {
    fn name(&self) -> &'static str {
        "alphavantage"
    }

    fn batch_cap(&self) -> usize {
        BATCH_CAP
    }

    fn mapping(&self) -> &'static FieldMappingTable {
        overview_mapping()
    }
}

#[async_trait]
impl SummaryProvider for AlphaVantageProvider {
    async fn fetch_summaries(&self, symbols: &[Symbol]) -> Option<Vec<SymbolFetch>> {
        let api_key = self.api_key.as_deref()?;

        let mut results = Vec::with_capacity(symbols.len().min(BATCH_CAP));
        for symbol in symbols.iter().take(BATCH_CAP) {
            let outcome = match self.get_with_retry("OVERVIEW", symbol, api_key).await {
                // An unknown symbol comes back as an empty object.
                Ok(map) if map.is_empty() => FetchOutcome::NoData,
                Ok(map) => FetchOutcome::Data(map),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Alpha Vantage overview failed");
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

#[async_trait]
impl StatementProvider for AlphaVantageProvider {
    fn breakdown(&self) -> &'static BreakdownTable {
        cash_flow_breakdown()
    }

    async fn fetch_cash_flows(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
    ) -> Option<StatementOutcome> {
        let api_key = self.api_key.as_deref()?;

        let report_key = match period {
            PeriodKind::Quarterly => "quarterlyReports",
            _ => "annualReports",
        };

        let outcome = match self.get_with_retry("CASH_FLOW", symbol, api_key).await {
            Ok(map) => {
                let periods: Vec<PeriodFetch> = map
                    .get(report_key)
                    .and_then(Value::as_array)
                    .map(|reports| {
                        reports
                            .iter()
                            .filter_map(|report| {
                                let rows = report.as_object()?.clone();
                                let fiscal_date =
                                    rows.get("fiscalDateEnding")?.as_str()?.to_string();
                                Some(PeriodFetch { fiscal_date, rows })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                if periods.is_empty() {
                    StatementOutcome::NoData
                } else {
                    StatementOutcome::Periods(periods)
                }
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Alpha Vantage cash-flow fetch failed");
                StatementOutcome::Failed(e)
            }
        };

        Some(outcome)
    }
}

/// Field-mapping table for Alpha Vantage `OVERVIEW` payloads.
///
/// Every value is a string; percentage-kind fields arrive either as
/// fractions (`"0.147"`) or whole points, which the percent parser's
/// whole-point heuristic normalizes.
#[must_use]
pub fn overview_mapping() -> &'static FieldMappingTable {
    static MAPPING: FieldMappingTable = FieldMappingTable {
        fields: &[
            (MetricField::PeRatio, &["PERatio", "TrailingPE"]),
            (MetricField::ForwardPe, &["ForwardPE"]),
            (MetricField::PegRatio, &["PEGRatio"]),
            (MetricField::PbRatio, &["PriceToBookRatio"]),
            (MetricField::PsRatio, &["PriceToSalesRatioTTM"]),
            (MetricField::EvToEbitda, &["EVToEBITDA"]),
            (MetricField::Roe, &["ReturnOnEquityTTM"]),
            (MetricField::Roa, &["ReturnOnAssetsTTM"]),
            (MetricField::NetMargin, &["ProfitMargin"]),
            (MetricField::OperatingMargin, &["OperatingMarginTTM"]),
            (MetricField::DividendYield, &["DividendYield"]),
            (MetricField::PayoutRatio, &["PayoutRatio"]),
            (MetricField::Beta, &["Beta"]),
            (MetricField::Eps, &["EPS"]),
            (MetricField::EpsDiluted, &["DilutedEPSTTM"]),
            (MetricField::BookValuePerShare, &["BookValue"]),
            (MetricField::RevenuePerShare, &["RevenuePerShareTTM"]),
            (MetricField::MarketCap, &["MarketCapitalization"]),
            (MetricField::SharesOutstanding, &["SharesOutstanding"]),
            (MetricField::Week52High, &["52WeekHigh"]),
            (MetricField::Week52Low, &["52WeekLow"]),
        ],
        sector_keys: &["Sector"],
    };
    &MAPPING
}

/// Breakdown table for Alpha Vantage `CASH_FLOW` report rows.
#[must_use]
pub fn cash_flow_breakdown() -> &'static BreakdownTable {
    static BREAKDOWN: BreakdownTable = BreakdownTable {
        columns: &[
            (CashFlowField::OperatingCashFlow, &["operatingCashflow"]),
            (CashFlowField::InvestingCashFlow, &["cashflowFromInvestment"]),
            (CashFlowField::FinancingCashFlow, &["cashflowFromFinancing"]),
            (CashFlowField::CapitalExpenditures, &["capitalExpenditures"]),
            (
                CashFlowField::DividendsPaid,
                &["dividendPayout", "dividendPayoutCommonStock"],
            ),
            (CashFlowField::NetIncome, &["netIncome"]),
            (
                CashFlowField::DepreciationAmortization,
                &["depreciationDepletionAndAmortization"],
            ),
            (
                CashFlowField::NetChangeInCash,
                &["changeInCashAndCashEquivalents"],
            ),
        ],
    };
    &BREAKDOWN
}
