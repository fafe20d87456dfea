//! Record types shared by sources, the store and the feature pipeline.

use crate::error::{DataError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Filing form a feature set is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormType {
    /// Quarterly report (10-Q)
    Quarterly,
    /// Annual report (10-K)
    Annual,
}

impl FormType {
    /// Form string as reported by EDGAR.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Quarterly => "10-Q",
            Self::Annual => "10-K",
        }
    }

    /// Parse an EDGAR form string. Amendments and other forms are rejected.
    pub fn from_form(form: &str) -> Option<Self> {
        match form {
            "10-Q" => Some(Self::Quarterly),
            "10-K" => Some(Self::Annual),
            _ => None,
        }
    }

    /// Whether a fiscal period belongs to this form.
    ///
    /// 10-Q filings report quarters, 10-K filings report the full year.
    pub const fn accepts(&self, period: FiscalPeriod) -> bool {
        match self {
            Self::Quarterly => period.is_quarter(),
            Self::Annual => matches!(period, FiscalPeriod::FY),
        }
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fiscal reporting window.
///
/// Ordered `Q1 < Q2 < Q3 < Q4 < FY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FiscalPeriod {
    /// First quarter
    Q1,
    /// Second quarter
    Q2,
    /// Third quarter
    Q3,
    /// Fourth quarter
    Q4,
    /// Full fiscal year
    FY,
}

impl FiscalPeriod {
    /// Provider string for this period.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Q1 => "Q1",
            Self::Q2 => "Q2",
            Self::Q3 => "Q3",
            Self::Q4 => "Q4",
            Self::FY => "FY",
        }
    }

    /// Parse a provider string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Q1" => Ok(Self::Q1),
            "Q2" => Ok(Self::Q2),
            "Q3" => Ok(Self::Q3),
            "Q4" => Ok(Self::Q4),
            "FY" => Ok(Self::FY),
            _ => Err(DataError::Parse(format!("Invalid fiscal period: {}", s))),
        }
    }

    /// Whether this is one of the four quarters.
    pub const fn is_quarter(&self) -> bool {
        !matches!(self, Self::FY)
    }
}

impl fmt::Display for FiscalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single tagged disclosure value, as supplied by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    /// Entity (ticker) the value belongs to
    pub entity_id: String,
    /// Fiscal year
    pub fiscal_year: i32,
    /// Fiscal period
    pub fiscal_period: FiscalPeriod,
    /// Date the filing was made
    pub filed: NaiveDate,
    /// Raw form string (e.g. "10-Q", "10-K/A")
    pub form: String,
    /// Disclosure concept tag (e.g. "AssetsCurrent")
    pub tag: String,
    /// Reported value
    pub value: f64,
    /// Unit of measure (e.g. "USD", "USD/shares")
    pub unit: String,
}

/// A disclosure concept to pull from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Concept {
    /// Concept tag
    pub tag: &'static str,
    /// XBRL taxonomy
    pub taxonomy: &'static str,
    /// Unit the values are reported in
    pub unit: &'static str,
}

/// Entity metadata, including its industry classification code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Entity identifier (ticker)
    pub entity_id: String,
    /// SEC central index key
    pub cik: String,
    /// Standard industrial classification code
    pub sic: String,
    /// Registered name
    pub name: Option<String>,
}

/// One scalar feature for one entity and reporting period (long format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Entity identifier
    pub entity_id: String,
    /// Fiscal year
    pub fiscal_year: i32,
    /// Fiscal period
    pub fiscal_period: FiscalPeriod,
    /// Latest filing date contributing to the period
    pub filed: NaiveDate,
    /// Feature name
    pub name: String,
    /// Feature value
    pub value: f64,
}

/// Cross-sectional statistics of one feature within an industry and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryStat {
    /// Classification code prefix the statistic covers
    pub code: String,
    /// Fiscal year
    pub fiscal_year: i32,
    /// Fiscal period
    pub fiscal_period: FiscalPeriod,
    /// Latest filing date among the members
    pub filed: NaiveDate,
    /// Feature name
    pub name: String,
    /// Mean of the members' values
    pub mean: f64,
    /// Sample standard deviation, missing with fewer than two members
    pub std: Option<f64>,
    /// Number of member rows
    pub count: usize,
}

/// Persisted long-format feature tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureTable {
    /// Quarterly features built from 10-Q filings
    Quarterly,
    /// Annual features built from 10-K filings
    Annual,
    /// Quarterly features normalized against their industry
    NormalizedQuarterly,
    /// Annual features normalized against their industry
    NormalizedAnnual,
}

impl FeatureTable {
    /// All feature tables.
    pub const ALL: [Self; 4] = [
        Self::Quarterly,
        Self::Annual,
        Self::NormalizedQuarterly,
        Self::NormalizedAnnual,
    ];

    /// SQL table name.
    pub const fn table_name(&self) -> &'static str {
        match self {
            Self::Quarterly => "quarterly_features",
            Self::Annual => "annual_features",
            Self::NormalizedQuarterly => "normalized_quarterly_features",
            Self::NormalizedAnnual => "normalized_annual_features",
        }
    }

    /// Filing form the table's rows derive from.
    pub const fn form(&self) -> FormType {
        match self {
            Self::Quarterly | Self::NormalizedQuarterly => FormType::Quarterly,
            Self::Annual | Self::NormalizedAnnual => FormType::Annual,
        }
    }

    /// Whether rows are industry-normalized.
    pub const fn is_normalized(&self) -> bool {
        matches!(self, Self::NormalizedQuarterly | Self::NormalizedAnnual)
    }

    /// Refined table a normalized table is derived from.
    pub const fn source(&self) -> Option<Self> {
        match self {
            Self::NormalizedQuarterly => Some(Self::Quarterly),
            Self::NormalizedAnnual => Some(Self::Annual),
            Self::Quarterly | Self::Annual => None,
        }
    }

    /// Normalized counterpart of a refined table.
    pub const fn normalized(&self) -> Self {
        match self {
            Self::Quarterly | Self::NormalizedQuarterly => Self::NormalizedQuarterly,
            Self::Annual | Self::NormalizedAnnual => Self::NormalizedAnnual,
        }
    }
}

impl fmt::Display for FeatureTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Inclusive bounds on filing dates. Unset sides are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest filing date to include
    pub start: Option<NaiveDate>,
    /// Latest filing date to include
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Range with no bounds.
    pub const fn all() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Range between two dates.
    pub const fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Whether a date falls within the range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }

    /// Start bound in store format.
    pub(crate) fn start_param(&self) -> Option<String> {
        self.start.map(|d| d.to_string())
    }

    /// End bound in store format.
    pub(crate) fn end_param(&self) -> Option<String> {
        self.end.map(|d| d.to_string())
    }
}
