//! Industry statistics over classification-code prefixes.
//!
//! Entities are grouped by the leading digits of their SIC code: two digits
//! for a major group, three for an industry group and four for an industry.
//! For every fiscal period and feature the aggregator computes the members'
//! mean and sample standard deviation, and the latest filing date among them.

use crate::error::{FeatureError, Result};
use crate::schema::FeatureSet;
use crate::table::{FILED, FISCAL_PERIOD, FISCAL_YEAR};
use chrono::NaiveDate;
use hobart_data::{
    ClassificationLookup, DateRange, FeatureRow, FiscalPeriod, IndustryStat, SqliteStore,
};
use polars::prelude::*;
use std::collections::HashMap;
use std::fmt;

const NAME: &str = "name";
const VALUE: &str = "value";
const MEAN: &str = "mean";
const STD: &str = "std";
const COUNT: &str = "count";

/// Granularity of an industry classification prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndustryLevel {
    /// Two-digit major group
    MajorGroup = 2,
    /// Three-digit industry group
    IndustryGroup = 3,
    /// Four-digit industry
    Industry = 4,
}

impl IndustryLevel {
    /// Number of leading code digits.
    pub const fn digits(&self) -> usize {
        *self as usize
    }

    /// Truncate a classification code to this level.
    pub fn prefix(&self, code: &str) -> String {
        code.chars().take(self.digits()).collect()
    }
}

impl TryFrom<u8> for IndustryLevel {
    type Error = FeatureError;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            2 => Ok(Self::MajorGroup),
            3 => Ok(Self::IndustryGroup),
            4 => Ok(Self::Industry),
            other => Err(FeatureError::InvalidArgument(format!(
                "industry level must be 2, 3 or 4, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for IndustryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digits())
    }
}

/// Statistics of one industry, ordered by period and feature.
#[derive(Debug, Clone, PartialEq)]
pub struct IndustryTable {
    code: String,
    stats: Vec<IndustryStat>,
    lookup: HashMap<(i32, FiscalPeriod, String), usize>,
}

impl IndustryTable {
    /// Build a table from statistics of the industry `code`.
    pub fn new(code: impl Into<String>, mut stats: Vec<IndustryStat>) -> Self {
        stats.sort_by(|a, b| {
            let left = (a.fiscal_year, a.fiscal_period, &a.name);
            left.cmp(&(b.fiscal_year, b.fiscal_period, &b.name))
        });
        let lookup = stats
            .iter()
            .enumerate()
            .map(|(i, s)| ((s.fiscal_year, s.fiscal_period, s.name.clone()), i))
            .collect();
        Self {
            code: code.into(),
            stats,
            lookup,
        }
    }

    /// Classification prefix the table covers.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// All statistics.
    pub fn stats(&self) -> &[IndustryStat] {
        &self.stats
    }

    /// Number of `(period, feature)` groups.
    pub const fn len(&self) -> usize {
        self.stats.len()
    }

    /// Whether the table has no groups.
    pub const fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Statistic of one feature in one period.
    pub fn get(
        &self,
        fiscal_year: i32,
        fiscal_period: FiscalPeriod,
        name: &str,
    ) -> Option<&IndustryStat> {
        self.lookup
            .get(&(fiscal_year, fiscal_period, name.to_string()))
            .map(|&i| &self.stats[i])
    }
}

/// Computes industry statistics from a feature set's refined table.
#[derive(Debug, Clone, Copy)]
pub struct IndustryAggregator<'a> {
    store: &'a SqliteStore,
    set: FeatureSet,
}

impl<'a> IndustryAggregator<'a> {
    /// Aggregate the refined features of `set` held in `store`.
    pub const fn new(store: &'a SqliteStore, set: FeatureSet) -> Self {
        Self { store, set }
    }

    /// Resolve the industry prefix from exactly one of an entity or a code.
    pub fn resolve_prefix(
        &self,
        entity_id: Option<&str>,
        code: Option<&str>,
        level: IndustryLevel,
    ) -> Result<String> {
        match (entity_id, code) {
            (Some(entity_id), None) => Ok(level.prefix(&self.store.industry_code(entity_id)?)),
            (None, Some(code)) => Ok(level.prefix(code)),
            (Some(_), Some(_)) => Err(FeatureError::InvalidArgument(
                "give either an entity or an industry code, not both".to_string(),
            )),
            (None, None) => Err(FeatureError::InvalidArgument(
                "an entity or an industry code is required".to_string(),
            )),
        }
    }

    /// Industry statistics, computed by the store.
    ///
    /// Fails with [`FeatureError::NoData`] when no entity of the industry has
    /// features in the range.
    pub fn aggregate(
        &self,
        entity_id: Option<&str>,
        code: Option<&str>,
        level: IndustryLevel,
        range: DateRange,
    ) -> Result<IndustryTable> {
        let prefix = self.resolve_prefix(entity_id, code, level)?;
        let stats = self.store.industry_stats(self.set.table(), &prefix, range)?;
        if stats.is_empty() {
            return Err(FeatureError::NoData(format!(
                "industry {} has no {} features",
                prefix, self.set
            )));
        }
        Ok(IndustryTable::new(prefix, stats))
    }

    /// Industry statistics computed in process from the members' rows.
    ///
    /// Agrees with [`Self::aggregate`] within floating-point tolerance.
    pub fn aggregate_in_memory(
        &self,
        entity_id: Option<&str>,
        code: Option<&str>,
        level: IndustryLevel,
        range: DateRange,
    ) -> Result<IndustryTable> {
        let prefix = self.resolve_prefix(entity_id, code, level)?;
        let rows = self
            .store
            .industry_features(self.set.table(), &prefix, range)?;
        if rows.is_empty() {
            return Err(FeatureError::NoData(format!(
                "industry {} has no {} features",
                prefix, self.set
            )));
        }
        let stats = summarize(&prefix, &rows)?;
        Ok(IndustryTable::new(prefix, stats))
    }
}

/// Group rows by `(fiscal_year, fiscal_period, name)` and compute the mean,
/// sample standard deviation and latest filing date of each group.
///
/// Groups with a single member have no deviation.
pub fn summarize(code: &str, rows: &[FeatureRow]) -> Result<Vec<IndustryStat>> {
    let long = df![
        FISCAL_YEAR => rows.iter().map(|r| r.fiscal_year).collect::<Vec<_>>(),
        FISCAL_PERIOD => rows.iter().map(|r| r.fiscal_period.as_str()).collect::<Vec<_>>(),
        FILED => rows.iter().map(|r| r.filed).collect::<Vec<_>>(),
        NAME => rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        VALUE => rows.iter().map(|r| r.value).collect::<Vec<_>>(),
    ]?;

    let groups = long
        .lazy()
        .group_by([col(FISCAL_YEAR), col(FISCAL_PERIOD), col(NAME)])
        .agg([
            col(VALUE).mean().alias(MEAN),
            col(VALUE).std(1).alias(STD),
            col(FILED).max(),
            len().alias(COUNT),
        ])
        .sort([FISCAL_YEAR, FISCAL_PERIOD, NAME], Default::default())
        .collect()?;

    let years = groups.column(FISCAL_YEAR)?.i32()?;
    let periods = groups.column(FISCAL_PERIOD)?.str()?;
    let names = groups.column(NAME)?.str()?;
    let means = groups.column(MEAN)?.f64()?;
    let stds = groups.column(STD)?.f64()?;
    let filed: Vec<Option<NaiveDate>> = groups.column(FILED)?.date()?.as_date_iter().collect();
    let counts = groups.column(COUNT)?.cast(&DataType::Int64)?;
    let counts = counts.i64()?;

    let mut stats = Vec::with_capacity(groups.height());
    for (i, filed) in filed.into_iter().enumerate() {
        let (Some(fiscal_year), Some(period), Some(name), Some(mean), Some(filed), Some(count)) = (
            years.get(i),
            periods.get(i),
            names.get(i),
            means.get(i),
            filed,
            counts.get(i),
        ) else {
            return Err(FeatureError::InvalidArgument(format!(
                "industry {} group {} has a missing value",
                code, i
            )));
        };
        let count = count as usize;
        stats.push(IndustryStat {
            code: code.to_string(),
            fiscal_year,
            fiscal_period: FiscalPeriod::parse(period)?,
            filed,
            name: name.to_string(),
            mean,
            std: stds.get(i).filter(|std| count > 1 && std.is_finite()),
            count,
        });
    }
    Ok(stats)
}
