//! Provider set: the configured adapters for one pipeline instance.
//!
//! Registration order matters: it is the merge fold order, so the first
//! registered provider wins conflicts under first-non-null-wins.

use std::sync::Arc;

use tracing::debug;

use fundsync_core::{StatementProvider, SummaryProvider};

/// The set of configured provider adapters.
///
/// Constructed explicitly (dependency injection) and passed into the
/// service; nothing here is global or mutable at runtime.
#[derive(Default)]
pub struct ProviderSet {
    summary: Vec<Arc<dyn SummaryProvider>>,
    statement: Vec<Arc<dyn StatementProvider>>,
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field(
                "summary",
                &self.summary.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field(
                "statement",
                &self.statement.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ProviderSet {
    /// Create a new empty provider set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the full set from the environment: every adapter whose API key
    /// variable is present is enabled, plus the keyless Yahoo adapter.
    #[must_use]
    pub fn from_env() -> Self {
        #[allow(unused_mut)]
        let mut set = Self::new();
        #[cfg(feature = "fmp")]
        {
            set = set.with_fmp_env();
        }
        #[cfg(feature = "yahoo")]
        {
            set = set.with_yahoo();
        }
        #[cfg(feature = "finnhub")]
        {
            set = set.with_finnhub_env();
        }
        #[cfg(feature = "alphavantage")]
        {
            set = set.with_alphavantage_env();
        }
        set
    }

    /// Register a summary provider. Registration order is merge priority.
    pub fn register_summary(&mut self, provider: Arc<dyn SummaryProvider>) {
        debug!(provider = provider.name(), "Registering summary provider");
        self.summary.push(provider);
    }

    /// Register a statement provider. Registration order is merge priority.
    pub fn register_statement(&mut self, provider: Arc<dyn StatementProvider>) {
        debug!(provider = provider.name(), "Registering statement provider");
        self.statement.push(provider);
    }

    /// The configured summary providers, in priority order.
    #[must_use]
    pub fn summaries(&self) -> &[Arc<dyn SummaryProvider>] {
        &self.summary
    }

    /// The configured statement providers, in priority order.
    #[must_use]
    pub fn statements(&self) -> &[Arc<dyn StatementProvider>] {
        &self.statement
    }

    // Builder methods for easy setup with specific providers

    /// Add the Financial Modeling Prep provider with an explicit key.
    #[cfg(feature = "fmp")]
    #[must_use]
    pub fn with_fmp(mut self, api_key: &str) -> Self {
        let provider = Arc::new(fundsync_fmp::FmpProvider::new(api_key));
        self.register_summary(provider.clone());
        self.register_statement(provider);
        self
    }

    /// Add the Financial Modeling Prep provider configured from `FMP_API_KEY`.
    #[cfg(feature = "fmp")]
    #[must_use]
    pub fn with_fmp_env(mut self) -> Self {
        let provider = Arc::new(fundsync_fmp::FmpProvider::from_env());
        self.register_summary(provider.clone());
        self.register_statement(provider);
        self
    }

    /// Add the Yahoo Finance provider (keyless).
    #[cfg(feature = "yahoo")]
    #[must_use]
    pub fn with_yahoo(mut self) -> Self {
        let provider = Arc::new(fundsync_yahoo::YahooProvider::new());
        self.register_summary(provider);
        self
    }

    /// Add the Finnhub provider configured from `FINNHUB_API_KEY`.
    #[cfg(feature = "finnhub")]
    #[must_use]
    pub fn with_finnhub_env(mut self) -> Self {
        let provider = Arc::new(fundsync_finnhub::FinnhubProvider::from_env());
        self.register_summary(provider);
        self
    }

    /// Add the Alpha Vantage provider configured from `ALPHAVANTAGE_API_KEY`.
    #[cfg(feature = "alphavantage")]
    #[must_use]
    pub fn with_alphavantage_env(mut self) -> Self {
        let provider = Arc::new(fundsync_alphavantage::AlphaVantageProvider::from_env());
        self.register_summary(provider.clone());
        self.register_statement(provider);
        self
    }
}
