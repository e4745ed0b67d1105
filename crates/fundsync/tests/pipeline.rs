//! End-to-end pipeline tests over scripted providers and the in-memory
//! store: batch selection, reconciliation, interpolation, retry-once, and
//! idempotent persistence.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{Value, json};

use fundsync::{
    IngestService, PeriodKind, ProviderSet, RECONCILED_SOURCE, ScanRequest, Symbol, SymbolStatus,
};
use fundsync_core::{
    BreakdownTable, CashFlowField, FetchOutcome, FieldMappingTable, FundamentalStore, MetricField,
    PeriodFetch, ProviderAdapter, RawPayload, StatementOutcome, StatementProvider, SummaryProvider,
    SymbolFetch,
};
use fundsync_store::MemoryStore;

static MOCK_MAPPING: FieldMappingTable = FieldMappingTable {
    fields: &[
        (MetricField::PeRatio, &["pe"]),
        (MetricField::PbRatio, &["pb"]),
        (MetricField::Roe, &["roe"]),
        (MetricField::Roa, &["roa"]),
        (MetricField::DebtToEquity, &["d2e"]),
        (MetricField::CurrentRatio, &["currentRatio"]),
        (MetricField::GrossMargin, &["grossMargin"]),
        (MetricField::Beta, &["beta"]),
        (MetricField::MarketCap, &["marketCap"]),
        (MetricField::Eps, &["eps"]),
        (MetricField::SharesOutstanding, &["shares"]),
    ],
    sector_keys: &["sector"],
};

static MOCK_BREAKDOWN: BreakdownTable = BreakdownTable {
    columns: &[
        (CashFlowField::OperatingCashFlow, &["Operating Cash Flow"]),
        (CashFlowField::FreeCashFlow, &["Free Cash Flow"]),
        (CashFlowField::NetIncome, &["Net Income"]),
    ],
};

type Script = Vec<(&'static str, FetchOutcome)>;

/// Summary provider returning scripted outcomes: one script per fetch call,
/// with the last script repeating.
#[derive(Debug, Default)]
struct MockSummary {
    name: &'static str,
    enabled: bool,
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<Vec<Symbol>>>,
    calls: AtomicUsize,
}

impl MockSummary {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            enabled: true,
            ..Default::default()
        }
    }

    fn disabled(name: &'static str) -> Self {
        Self {
            name,
            enabled: false,
            ..Default::default()
        }
    }

    fn script(self, script: Script) -> Self {
        self.scripts.lock().unwrap().push_back(script);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn requested(&self) -> Vec<Vec<Symbol>> {
        self.requests.lock().unwrap().clone()
    }
}

impl ProviderAdapter for MockSummary {
    fn name(&self) -> &'static str {
        self.name
    }

    fn batch_cap(&self) -> usize {
        50
    }

    fn mapping(&self) -> &'static FieldMappingTable {
        &MOCK_MAPPING
    }
}

#[async_trait]
impl SummaryProvider for MockSummary {
    async fn fetch_summaries(&self, symbols: &[Symbol]) -> Option<Vec<SymbolFetch>> {
        if !self.enabled {
            return None;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(symbols.to_vec());

        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.len() > 1 {
                scripts.pop_front().unwrap()
            } else {
                scripts.front().cloned().unwrap_or_default()
            }
        };

        Some(
            symbols
                .iter()
                .map(|symbol| SymbolFetch {
                    symbol: symbol.clone(),
                    outcome: script
                        .iter()
                        .find(|(s, _)| *s == symbol.as_str())
                        .map(|(_, outcome)| outcome.clone())
                        .unwrap_or(FetchOutcome::NoData),
                })
                .collect(),
        )
    }
}

/// Statement provider returning fixed period sets per period kind.
#[derive(Debug, Default)]
struct MockStatement {
    quarterly: Vec<(&'static str, Value)>,
    annual: Vec<(&'static str, Value)>,
}

impl ProviderAdapter for MockStatement {
    fn name(&self) -> &'static str {
        "stmt"
    }

    fn batch_cap(&self) -> usize {
        10
    }

    fn mapping(&self) -> &'static FieldMappingTable {
        &MOCK_MAPPING
    }
}

#[async_trait]
impl StatementProvider for MockStatement {
    fn breakdown(&self) -> &'static BreakdownTable {
        &MOCK_BREAKDOWN
    }

    async fn fetch_cash_flows(
        &self,
        _symbol: &Symbol,
        period: PeriodKind,
    ) -> Option<StatementOutcome> {
        let rows = match period {
            PeriodKind::Quarterly => &self.quarterly,
            _ => &self.annual,
        };
        if rows.is_empty() {
            return Some(StatementOutcome::NoData);
        }
        Some(StatementOutcome::Periods(
            rows.iter()
                .map(|(date, value)| PeriodFetch {
                    fiscal_date: (*date).to_string(),
                    rows: payload(value.clone()),
                })
                .collect(),
        ))
    }
}

fn payload(value: Value) -> RawPayload {
    value.as_object().unwrap().clone()
}

fn data(value: Value) -> FetchOutcome {
    FetchOutcome::Data(payload(value))
}

fn service_with(providers: Vec<Arc<MockSummary>>, store: Arc<MemoryStore>) -> IngestService {
    let mut set = ProviderSet::new();
    for provider in providers {
        set.register_summary(provider);
    }
    IngestService::new(set, store)
}

fn explicit(symbols: &[&str]) -> ScanRequest {
    ScanRequest {
        symbols: Some(symbols.iter().map(|s| (*s).to_string()).collect()),
        ..ScanRequest::default()
    }
}

#[tokio::test]
async fn merge_order_decides_conflicts_end_to_end() {
    for (first_wins, expected_pe) in [(true, 12.0), (false, 15.0)] {
        let p1 = Arc::new(
            MockSummary::new("p1").script(vec![("AAPL", data(json!({"pe": 12.0})))]),
        );
        let p2 = Arc::new(MockSummary::new("p2").script(vec![(
            "AAPL",
            data(json!({"pe": 15.0, "beta": 1.2, "sector": "Technology"})),
        )]));

        let store = Arc::new(MemoryStore::new());
        let providers: Vec<Arc<MockSummary>> = if first_wins {
            vec![p1, p2]
        } else {
            vec![p2, p1]
        };
        let service = service_with(providers, store.clone());

        let response = service.scan_fundamentals(&explicit(&["AAPL"])).await.unwrap();
        assert!(response.success);
        assert_eq!(response.http_status(), 200);
        assert_eq!(response.summary.successful, 1);

        let stored = store
            .get_fundamental(
                &Symbol::new("AAPL"),
                PeriodKind::Ttm,
                Utc::now().date_naive(),
                RECONCILED_SOURCE,
            )
            .await
            .unwrap()
            .expect("record persisted");
        assert_eq!(stored.pe_ratio, Some(expected_pe));
        assert_eq!(stored.beta, Some(1.2));
        let tags: Vec<&str> = stored.provenance.split(',').collect();
        if first_wins {
            // Both providers contributed, in fold order.
            assert_eq!(&tags[..2], &["p1", "p2"]);
        } else {
            // p1's only field was already taken from p2, so it left no tag.
            assert_eq!(tags[0], "p2");
            assert!(!tags.contains(&"p1"));
        }
    }
}

#[tokio::test]
async fn reingestion_updates_instead_of_duplicating() {
    let provider = Arc::new(MockSummary::new("p1").script(vec![(
        "AAPL",
        data(json!({"pe": 21.0, "marketCap": 2_500_000_000.4_f64})),
    )]));
    let store = Arc::new(MemoryStore::new());
    let service = service_with(vec![provider], store.clone());

    let first = service.scan_fundamentals(&explicit(&["AAPL"])).await.unwrap();
    let second = service.scan_fundamentals(&explicit(&["AAPL"])).await.unwrap();
    assert!(first.success && second.success);

    let symbol = Symbol::new("AAPL");
    assert_eq!(store.count_fundamentals(&symbol).await.unwrap(), 1);

    let stored = store
        .get_fundamental(
            &symbol,
            PeriodKind::Ttm,
            Utc::now().date_naive(),
            RECONCILED_SOURCE,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.pe_ratio, Some(21.0));
    // Cardinal fields are whole numbers on persistence.
    assert_eq!(stored.market_cap, Some(2_500_000_000.0));
}

#[tokio::test]
async fn freshness_partition_selects_only_stale_symbols() {
    let store = Arc::new(MemoryStore::new());
    let universe: Vec<String> = (0..10).map(|i| format!("SYM{i}")).collect();
    store.set_watchlist(universe.clone()).await;

    // Six of ten already updated within the staleness window.
    let date = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
    for name in &universe[..6] {
        let snap = fundsync::FundamentalSnapshot::new(Symbol::new(name), PeriodKind::Ttm, date);
        store
            .upsert_fundamentals(&[snap], RECONCILED_SOURCE)
            .await
            .unwrap();
    }

    let script: Script = universe[6..]
        .iter()
        .map(|name| {
            let leaked: &'static str = Box::leak(name.clone().into_boxed_str());
            (leaked, data(json!({"pe": 10.0})))
        })
        .collect();
    let provider = Arc::new(MockSummary::new("p1").script(script));
    let service = service_with(vec![provider.clone()], store);

    let response = service
        .scan_fundamentals(&ScanRequest::default())
        .await
        .unwrap();

    assert_eq!(response.summary.processed, 4);
    assert_eq!(response.summary.skipped, 6);
    assert_eq!(response.summary.duplicates_prevented, 6);
    assert_eq!(response.summary.successful, 4);

    let requested = provider.requested();
    assert_eq!(requested.len(), 1);
    let expected: Vec<Symbol> = universe[6..].iter().map(Symbol::new).collect();
    assert_eq!(requested[0], expected);
}

#[tokio::test(start_paused = true)]
async fn failed_symbol_is_retried_once_and_recovers() {
    let provider = Arc::new(
        MockSummary::new("p1")
            .script(vec![("AAPL", FetchOutcome::Failed("HTTP 500".to_string()))])
            .script(vec![("AAPL", data(json!({"pe": 18.0})))]),
    );
    let store = Arc::new(MemoryStore::new());
    let service = service_with(vec![provider.clone()], store);

    let response = service.scan_fundamentals(&explicit(&["AAPL"])).await.unwrap();

    assert_eq!(provider.calls(), 2);
    assert!(response.success);
    assert_eq!(response.results[0].status, SymbolStatus::Success);
    assert_eq!(response.summary.records_saved, 1);
}

#[tokio::test(start_paused = true)]
async fn second_failure_is_final_not_double_retried() {
    let provider = Arc::new(
        MockSummary::new("p1")
            .script(vec![("AAPL", FetchOutcome::Failed("HTTP 500".to_string()))]),
    );
    let store = Arc::new(MemoryStore::new());
    let service = service_with(vec![provider.clone()], store);

    let response = service.scan_fundamentals(&explicit(&["AAPL"])).await.unwrap();

    assert_eq!(provider.calls(), 2);
    assert!(!response.success);
    assert_eq!(response.http_status(), 206);
    assert_eq!(response.results[0].status, SymbolStatus::Error);
    assert_eq!(response.summary.errors, 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_providers_yield_no_data_and_zero_coverage() {
    let provider = Arc::new(MockSummary::disabled("p1"));
    let store = Arc::new(MemoryStore::new());
    let service = service_with(vec![provider.clone()], store);

    let response = service.scan_fundamentals(&explicit(&["AAPL"])).await.unwrap();

    // A disabled provider is never called and never an error.
    assert_eq!(provider.calls(), 0);
    assert!(!response.success);
    assert_eq!(response.http_status(), 206);
    assert_eq!(response.results[0].status, SymbolStatus::NoData);
    assert_eq!(response.phases[0].coverage_pct, Some(0.0));
}

#[tokio::test]
async fn interpolation_fills_gaps_and_tags_provenance() {
    let provider = Arc::new(MockSummary::new("p1").script(vec![(
        "AAPL",
        data(json!({
            "roa": 0.2,
            "d2e": 1.0,
            "currentRatio": 2.0,
            "grossMargin": 0.5,
            "sector": "Technology"
        })),
    )]));
    let store = Arc::new(MemoryStore::new());
    let service = service_with(vec![provider], store.clone());

    let response = service.scan_fundamentals(&explicit(&["AAPL"])).await.unwrap();
    assert!(response.success);

    let stored = store
        .get_fundamental(
            &Symbol::new("AAPL"),
            PeriodKind::Ttm,
            Utc::now().date_naive(),
            RECONCILED_SOURCE,
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stored.roe, Some(0.4));
    assert_eq!(stored.quick_ratio, Some(1.6));
    assert_eq!(stored.beta, Some(1.2));
    assert_eq!(stored.provenance, "p1,interpolated");
}

#[tokio::test]
async fn explicit_symbols_are_validated_and_capped() {
    let provider = Arc::new(MockSummary::new("p1").script(vec![
        ("AAPL", data(json!({"pe": 10.0}))),
        ("MSFT", data(json!({"pe": 11.0}))),
    ]));
    let store = Arc::new(MemoryStore::new());
    let service = service_with(vec![provider.clone()], store);

    let request = ScanRequest {
        symbols: Some(vec![
            "aapl".to_string(),
            "bad sym".to_string(),
            "MSFT".to_string(),
        ]),
        max_symbols: Some(1),
        ..ScanRequest::default()
    };
    let response = service.scan_fundamentals(&request).await.unwrap();

    assert_eq!(response.summary.processed, 1);
    assert_eq!(provider.requested()[0], vec![Symbol::new("AAPL")]);
}

#[tokio::test]
async fn statement_scan_runs_quarterly_then_annual_then_skips_fresh() {
    let statement = Arc::new(MockStatement {
        quarterly: vec![
            (
                "2024-03-31",
                json!({"Operating Cash Flow": 30e9, "Net Income": 24e9}),
            ),
            (
                "2023-12-31",
                json!({"Operating Cash Flow": 28e9, "Free Cash Flow": 20e9}),
            ),
        ],
        annual: vec![(
            "2023-12-31",
            json!({"Operating Cash Flow": 110e9, "Net Income": 95e9}),
        )],
    });

    let mut set = ProviderSet::new();
    set.register_statement(statement);
    let store = Arc::new(MemoryStore::new());
    let service = IngestService::new(set, store.clone());

    let first = service.scan_statements(&explicit(&["MSFT"])).await.unwrap();
    assert!(first.success);
    assert_eq!(first.summary.records_saved, 3);

    // Quarterly runs exhaustively before annual.
    let phase_names: Vec<&str> = first.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(phase_names, vec!["quarterly", "annual"]);
    assert_eq!(first.phases[0].records_saved, 2);
    assert_eq!(first.phases[1].records_saved, 1);

    let symbol = Symbol::new("MSFT");
    let quarterly = store
        .get_cash_flows(&symbol, PeriodKind::Quarterly, RECONCILED_SOURCE)
        .await
        .unwrap();
    assert_eq!(quarterly.len(), 2);
    assert_eq!(quarterly[0].operating_cash_flow, Some(30e9));
    assert_eq!(quarterly[0].provenance, "stmt");

    // A second run finds every period still fresh and skips the fetch plan.
    let second = service.scan_statements(&explicit(&["MSFT"])).await.unwrap();
    assert!(second.success);
    assert_eq!(second.summary.records_saved, 0);
    assert_eq!(second.summary.skipped, 1);
    assert_eq!(second.summary.duplicates_prevented, 3);
    assert!(
        second
            .results
            .iter()
            .all(|o| o.status == SymbolStatus::Skipped)
    );
    assert_eq!(
        store
            .get_cash_flows(&symbol, PeriodKind::Quarterly, RECONCILED_SOURCE)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn statement_phases_can_be_skipped_per_request() {
    let statement = Arc::new(MockStatement {
        quarterly: vec![("2024-03-31", json!({"Operating Cash Flow": 30e9}))],
        annual: vec![("2023-12-31", json!({"Operating Cash Flow": 110e9}))],
    });

    let mut set = ProviderSet::new();
    set.register_statement(statement);
    let store = Arc::new(MemoryStore::new());
    let service = IngestService::new(set, store);

    let request = ScanRequest {
        skip_annual: true,
        ..explicit(&["MSFT"])
    };
    let response = service.scan_statements(&request).await.unwrap();

    assert_eq!(response.phases.len(), 1);
    assert_eq!(response.phases[0].phase, "quarterly");
    assert_eq!(response.summary.records_saved, 1);
}
