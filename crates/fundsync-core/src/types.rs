//! Canonical record types for reconciled fundamentals data.
//!
//! This module defines the core data structures:
//!
//! - [`Symbol`] - Ticker symbol with shape validation
//! - [`FundamentalSnapshot`] - Reconciled valuation/profitability metrics
//! - [`CashFlowStatement`] - Reconciled cash-flow line items
//! - [`MetricField`] / [`CashFlowField`] - Field handles used by the
//!   normalizer, merge engine, and coverage audit

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::parse::FieldKind;
use crate::period::PeriodKind;

/// Provenance tag appended when the interpolation engine fills a field.
pub const INTERPOLATED_TAG: &str = "interpolated";

/// Maximum accepted symbol length.
const MAX_SYMBOL_LEN: usize = 10;

/// A ticker symbol.
///
/// Symbols are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the symbol matches the accepted shape: uppercase
    /// alphanumerics plus `.`/`-`, between 1 and 10 characters.
    #[must_use]
    pub fn is_valid_shape(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= MAX_SYMBOL_LEN
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Reconciled fundamentals snapshot for one symbol and period.
///
/// Every metric is optional; `None` is the absent marker. A populated field
/// always traces back to a provider tag in `provenance`, or to the
/// interpolation engine via the `interpolated` tag.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    /// Stock symbol.
    pub symbol: Symbol,
    /// Kind of reporting period.
    pub period_kind: PeriodKind,
    /// Period end date (as-of date for TTM snapshots).
    pub fiscal_date: NaiveDate,
    /// Free-text sector label, when any provider reported one.
    pub sector: Option<String>,

    // Valuation
    /// Price-to-earnings ratio.
    pub pe_ratio: Option<f64>,
    /// Forward price-to-earnings ratio.
    pub forward_pe: Option<f64>,
    /// Price/earnings-to-growth ratio.
    pub peg_ratio: Option<f64>,
    /// Price-to-book ratio.
    pub pb_ratio: Option<f64>,
    /// Price-to-sales ratio.
    pub ps_ratio: Option<f64>,
    /// EV/EBITDA ratio.
    pub ev_to_ebitda: Option<f64>,

    // Profitability
    /// Return on equity.
    pub roe: Option<f64>,
    /// Return on assets.
    pub roa: Option<f64>,
    /// Return on invested capital.
    pub roic: Option<f64>,
    /// Gross profit margin.
    pub gross_margin: Option<f64>,
    /// Operating profit margin.
    pub operating_margin: Option<f64>,
    /// Net profit margin.
    pub net_margin: Option<f64>,

    // Liquidity & solvency
    /// Current ratio.
    pub current_ratio: Option<f64>,
    /// Quick ratio.
    pub quick_ratio: Option<f64>,
    /// Debt-to-equity ratio.
    pub debt_to_equity: Option<f64>,

    // Dividends
    /// Dividend yield.
    pub dividend_yield: Option<f64>,
    /// Dividend payout ratio.
    pub payout_ratio: Option<f64>,

    // Risk
    /// Beta coefficient.
    pub beta: Option<f64>,

    // Per-share
    /// Earnings per share.
    pub eps: Option<f64>,
    /// Diluted earnings per share.
    pub eps_diluted: Option<f64>,
    /// Book value per share.
    pub book_value_per_share: Option<f64>,
    /// Revenue per share.
    pub revenue_per_share: Option<f64>,

    // Market data
    /// Market capitalization (whole dollars).
    pub market_cap: Option<f64>,
    /// Enterprise value (whole dollars).
    pub enterprise_value: Option<f64>,
    /// Shares outstanding (whole shares).
    pub shares_outstanding: Option<f64>,
    /// Last traded price.
    pub price: Option<f64>,
    /// 52-week high price.
    pub week_52_high: Option<f64>,
    /// 52-week low price.
    pub week_52_low: Option<f64>,

    /// Comma-joined, order-preserving list of contributing provider tags.
    pub provenance: String,
}

impl FundamentalSnapshot {
    /// Creates an empty snapshot with required key fields.
    #[must_use]
    pub fn new(symbol: Symbol, period_kind: PeriodKind, fiscal_date: NaiveDate) -> Self {
        Self {
            symbol,
            period_kind,
            fiscal_date,
            ..Default::default()
        }
    }

    /// Returns true if at least one metric field holds a value.
    #[must_use]
    pub fn has_any_value(&self) -> bool {
        MetricField::ALL.iter().any(|f| f.get(self).is_some())
    }

    /// Appends a provider tag to the provenance list, preserving order and
    /// skipping tags already present.
    pub fn push_provenance(&mut self, tag: &str) {
        push_tag(&mut self.provenance, tag);
    }

    /// Returns true if the given tag already appears in the provenance list.
    #[must_use]
    pub fn has_provenance(&self, tag: &str) -> bool {
        self.provenance.split(',').any(|t| t == tag)
    }
}

/// Reconciled cash-flow statement for one symbol and fiscal period.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CashFlowStatement {
    /// Stock symbol.
    pub symbol: Symbol,
    /// Quarterly or annual.
    pub period_kind: PeriodKind,
    /// End date of the fiscal period.
    pub fiscal_date: NaiveDate,

    /// Cash generated by operations.
    pub operating_cash_flow: Option<f64>,
    /// Cash used in investing activities.
    pub investing_cash_flow: Option<f64>,
    /// Cash from financing activities.
    pub financing_cash_flow: Option<f64>,
    /// Capital expenditures.
    pub capital_expenditures: Option<f64>,
    /// Free cash flow.
    pub free_cash_flow: Option<f64>,
    /// Dividends paid.
    pub dividends_paid: Option<f64>,
    /// Net income as reported on the statement.
    pub net_income: Option<f64>,
    /// Depreciation and amortization.
    pub depreciation_amortization: Option<f64>,
    /// Change in working capital.
    pub change_in_working_capital: Option<f64>,
    /// Net change in cash over the period.
    pub net_change_in_cash: Option<f64>,

    /// Comma-joined, order-preserving list of contributing provider tags.
    pub provenance: String,
}

impl CashFlowStatement {
    /// Creates an empty statement with required key fields.
    #[must_use]
    pub fn new(symbol: Symbol, period_kind: PeriodKind, fiscal_date: NaiveDate) -> Self {
        Self {
            symbol,
            period_kind,
            fiscal_date,
            ..Default::default()
        }
    }

    /// Returns true if at least one line item holds a value.
    #[must_use]
    pub fn has_any_value(&self) -> bool {
        CashFlowField::ALL.iter().any(|f| f.get(self).is_some())
    }

    /// Appends a provider tag to the provenance list, preserving order and
    /// skipping tags already present.
    pub fn push_provenance(&mut self, tag: &str) {
        push_tag(&mut self.provenance, tag);
    }
}

fn push_tag(provenance: &mut String, tag: &str) {
    if tag.is_empty() || provenance.split(',').any(|t| t == tag) {
        return;
    }
    if !provenance.is_empty() {
        provenance.push(',');
    }
    provenance.push_str(tag);
}

/// Handle to one numeric field of a [`FundamentalSnapshot`].
///
/// The normalizer uses these to route raw values through the right parser,
/// the merge engine folds over them, and the coverage audit counts them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum MetricField {
    PeRatio,
    ForwardPe,
    PegRatio,
    PbRatio,
    PsRatio,
    EvToEbitda,
    Roe,
    Roa,
    Roic,
    GrossMargin,
    OperatingMargin,
    NetMargin,
    CurrentRatio,
    QuickRatio,
    DebtToEquity,
    DividendYield,
    PayoutRatio,
    Beta,
    Eps,
    EpsDiluted,
    BookValuePerShare,
    RevenuePerShare,
    MarketCap,
    EnterpriseValue,
    SharesOutstanding,
    Price,
    Week52High,
    Week52Low,
}

impl MetricField {
    /// Every metric field, in canonical order.
    pub const ALL: [Self; 28] = [
        Self::PeRatio,
        Self::ForwardPe,
        Self::PegRatio,
        Self::PbRatio,
        Self::PsRatio,
        Self::EvToEbitda,
        Self::Roe,
        Self::Roa,
        Self::Roic,
        Self::GrossMargin,
        Self::OperatingMargin,
        Self::NetMargin,
        Self::CurrentRatio,
        Self::QuickRatio,
        Self::DebtToEquity,
        Self::DividendYield,
        Self::PayoutRatio,
        Self::Beta,
        Self::Eps,
        Self::EpsDiluted,
        Self::BookValuePerShare,
        Self::RevenuePerShare,
        Self::MarketCap,
        Self::EnterpriseValue,
        Self::SharesOutstanding,
        Self::Price,
        Self::Week52High,
        Self::Week52Low,
    ];

    /// The fixed audit list used for coverage computation and sector
    /// averaging.
    pub const AUDIT: [Self; 18] = [
        Self::PeRatio,
        Self::ForwardPe,
        Self::PegRatio,
        Self::PbRatio,
        Self::PsRatio,
        Self::EvToEbitda,
        Self::Roe,
        Self::Roa,
        Self::Roic,
        Self::GrossMargin,
        Self::OperatingMargin,
        Self::NetMargin,
        Self::CurrentRatio,
        Self::QuickRatio,
        Self::DebtToEquity,
        Self::DividendYield,
        Self::PayoutRatio,
        Self::Beta,
    ];

    /// How raw values for this field are parsed.
    #[must_use]
    pub const fn kind(self) -> FieldKind {
        match self {
            Self::Roe
            | Self::Roa
            | Self::Roic
            | Self::GrossMargin
            | Self::OperatingMargin
            | Self::NetMargin
            | Self::DividendYield
            | Self::PayoutRatio => FieldKind::Percent,
            Self::MarketCap | Self::EnterpriseValue | Self::SharesOutstanding => {
                FieldKind::Cardinal
            }
            _ => FieldKind::Numeric,
        }
    }

    /// Canonical snake_case name, used in logs and sector tables.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PeRatio => "pe_ratio",
            Self::ForwardPe => "forward_pe",
            Self::PegRatio => "peg_ratio",
            Self::PbRatio => "pb_ratio",
            Self::PsRatio => "ps_ratio",
            Self::EvToEbitda => "ev_to_ebitda",
            Self::Roe => "roe",
            Self::Roa => "roa",
            Self::Roic => "roic",
            Self::GrossMargin => "gross_margin",
            Self::OperatingMargin => "operating_margin",
            Self::NetMargin => "net_margin",
            Self::CurrentRatio => "current_ratio",
            Self::QuickRatio => "quick_ratio",
            Self::DebtToEquity => "debt_to_equity",
            Self::DividendYield => "dividend_yield",
            Self::PayoutRatio => "payout_ratio",
            Self::Beta => "beta",
            Self::Eps => "eps",
            Self::EpsDiluted => "eps_diluted",
            Self::BookValuePerShare => "book_value_per_share",
            Self::RevenuePerShare => "revenue_per_share",
            Self::MarketCap => "market_cap",
            Self::EnterpriseValue => "enterprise_value",
            Self::SharesOutstanding => "shares_outstanding",
            Self::Price => "price",
            Self::Week52High => "week_52_high",
            Self::Week52Low => "week_52_low",
        }
    }

    /// Reads this field from a snapshot.
    #[must_use]
    pub fn get(self, s: &FundamentalSnapshot) -> Option<f64> {
        match self {
            Self::PeRatio => s.pe_ratio,
            Self::ForwardPe => s.forward_pe,
            Self::PegRatio => s.peg_ratio,
            Self::PbRatio => s.pb_ratio,
            Self::PsRatio => s.ps_ratio,
            Self::EvToEbitda => s.ev_to_ebitda,
            Self::Roe => s.roe,
            Self::Roa => s.roa,
            Self::Roic => s.roic,
            Self::GrossMargin => s.gross_margin,
            Self::OperatingMargin => s.operating_margin,
            Self::NetMargin => s.net_margin,
            Self::CurrentRatio => s.current_ratio,
            Self::QuickRatio => s.quick_ratio,
            Self::DebtToEquity => s.debt_to_equity,
            Self::DividendYield => s.dividend_yield,
            Self::PayoutRatio => s.payout_ratio,
            Self::Beta => s.beta,
            Self::Eps => s.eps,
            Self::EpsDiluted => s.eps_diluted,
            Self::BookValuePerShare => s.book_value_per_share,
            Self::RevenuePerShare => s.revenue_per_share,
            Self::MarketCap => s.market_cap,
            Self::EnterpriseValue => s.enterprise_value,
            Self::SharesOutstanding => s.shares_outstanding,
            Self::Price => s.price,
            Self::Week52High => s.week_52_high,
            Self::Week52Low => s.week_52_low,
        }
    }

    /// Writes this field on a snapshot.
    pub fn set(self, s: &mut FundamentalSnapshot, value: f64) {
        let slot = match self {
            Self::PeRatio => &mut s.pe_ratio,
            Self::ForwardPe => &mut s.forward_pe,
            Self::PegRatio => &mut s.peg_ratio,
            Self::PbRatio => &mut s.pb_ratio,
            Self::PsRatio => &mut s.ps_ratio,
            Self::EvToEbitda => &mut s.ev_to_ebitda,
            Self::Roe => &mut s.roe,
            Self::Roa => &mut s.roa,
            Self::Roic => &mut s.roic,
            Self::GrossMargin => &mut s.gross_margin,
            Self::OperatingMargin => &mut s.operating_margin,
            Self::NetMargin => &mut s.net_margin,
            Self::CurrentRatio => &mut s.current_ratio,
            Self::QuickRatio => &mut s.quick_ratio,
            Self::DebtToEquity => &mut s.debt_to_equity,
            Self::DividendYield => &mut s.dividend_yield,
            Self::PayoutRatio => &mut s.payout_ratio,
            Self::Beta => &mut s.beta,
            Self::Eps => &mut s.eps,
            Self::EpsDiluted => &mut s.eps_diluted,
            Self::BookValuePerShare => &mut s.book_value_per_share,
            Self::RevenuePerShare => &mut s.revenue_per_share,
            Self::MarketCap => &mut s.market_cap,
            Self::EnterpriseValue => &mut s.enterprise_value,
            Self::SharesOutstanding => &mut s.shares_outstanding,
            Self::Price => &mut s.price,
            Self::Week52High => &mut s.week_52_high,
            Self::Week52Low => &mut s.week_52_low,
        };
        *slot = Some(value);
    }
}

/// Handle to one line item of a [`CashFlowStatement`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum CashFlowField {
    OperatingCashFlow,
    InvestingCashFlow,
    FinancingCashFlow,
    CapitalExpenditures,
    FreeCashFlow,
    DividendsPaid,
    NetIncome,
    DepreciationAmortization,
    ChangeInWorkingCapital,
    NetChangeInCash,
}

impl CashFlowField {
    /// Every cash-flow column, in canonical order.
    pub const ALL: [Self; 10] = [
        Self::OperatingCashFlow,
        Self::InvestingCashFlow,
        Self::FinancingCashFlow,
        Self::CapitalExpenditures,
        Self::FreeCashFlow,
        Self::DividendsPaid,
        Self::NetIncome,
        Self::DepreciationAmortization,
        Self::ChangeInWorkingCapital,
        Self::NetChangeInCash,
    ];

    /// Canonical snake_case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OperatingCashFlow => "operating_cash_flow",
            Self::InvestingCashFlow => "investing_cash_flow",
            Self::FinancingCashFlow => "financing_cash_flow",
            Self::CapitalExpenditures => "capital_expenditures",
            Self::FreeCashFlow => "free_cash_flow",
            Self::DividendsPaid => "dividends_paid",
            Self::NetIncome => "net_income",
            Self::DepreciationAmortization => "depreciation_amortization",
            Self::ChangeInWorkingCapital => "change_in_working_capital",
            Self::NetChangeInCash => "net_change_in_cash",
        }
    }

    /// Reads this line item from a statement.
    #[must_use]
    pub fn get(self, s: &CashFlowStatement) -> Option<f64> {
        match self {
            Self::OperatingCashFlow => s.operating_cash_flow,
            Self::InvestingCashFlow => s.investing_cash_flow,
            Self::FinancingCashFlow => s.financing_cash_flow,
            Self::CapitalExpenditures => s.capital_expenditures,
            Self::FreeCashFlow => s.free_cash_flow,
            Self::DividendsPaid => s.dividends_paid,
            Self::NetIncome => s.net_income,
            Self::DepreciationAmortization => s.depreciation_amortization,
            Self::ChangeInWorkingCapital => s.change_in_working_capital,
            Self::NetChangeInCash => s.net_change_in_cash,
        }
    }

    /// Writes this line item on a statement.
    pub fn set(self, s: &mut CashFlowStatement, value: f64) {
        let slot = match self {
            Self::OperatingCashFlow => &mut s.operating_cash_flow,
            Self::InvestingCashFlow => &mut s.investing_cash_flow,
            Self::FinancingCashFlow => &mut s.financing_cash_flow,
            Self::CapitalExpenditures => &mut s.capital_expenditures,
            Self::FreeCashFlow => &mut s.free_cash_flow,
            Self::DividendsPaid => &mut s.dividends_paid,
            Self::NetIncome => &mut s.net_income,
            Self::DepreciationAmortization => &mut s.depreciation_amortization,
            Self::ChangeInWorkingCapital => &mut s.change_in_working_capital,
            Self::NetChangeInCash => &mut s.net_change_in_cash,
        };
        *slot = Some(value);
    }
}
