//! Period-indexed wide tables.
//!
//! A [`WideTable`] is a polars [`DataFrame`] with a fixed layout: the index
//! columns `fiscal_year` (Int32), `fiscal_period` (String) and `filed`
//! (Date), followed by one Float64 column per feature. Non-finite floats are
//! never stored, so a division by zero surfaces as a null rather than an
//! infinity.

use crate::error::{FeatureError, Result};
use chrono::NaiveDate;
use hobart_data::FiscalPeriod;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fiscal year column.
pub(crate) const FISCAL_YEAR: &str = "fiscal_year";
/// Fiscal period column.
pub(crate) const FISCAL_PERIOD: &str = "fiscal_period";
/// Filing date column.
pub(crate) const FILED: &str = "filed";

/// Names of the index columns, in frame order.
pub(crate) const INDEX_COLUMNS: [&str; 3] = [FISCAL_YEAR, FISCAL_PERIOD, FILED];

/// Row index of a wide table, ordered by year, period and filing date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    /// Fiscal year
    pub fiscal_year: i32,
    /// Fiscal period
    pub fiscal_period: FiscalPeriod,
    /// Latest filing date contributing to the period
    pub filed: NaiveDate,
}

impl PeriodKey {
    /// Create a new index key.
    pub const fn new(fiscal_year: i32, fiscal_period: FiscalPeriod, filed: NaiveDate) -> Self {
        Self {
            fiscal_year,
            fiscal_period,
            filed,
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.fiscal_year, self.fiscal_period, self.filed)
    }
}

/// Feature frame indexed by [`PeriodKey`].
///
/// The index is decoded once when the table is built, so row lookups never
/// touch the index columns again.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    index: Vec<PeriodKey>,
    frame: DataFrame,
}

impl WideTable {
    /// Wrap a DataFrame holding the index columns and any number of feature
    /// columns.
    ///
    /// Index columns are cast to their canonical types and moved to the
    /// front; feature columns are cast to Float64 with non-finite values
    /// nulled. Fails with [`FeatureError::SchemaMismatch`] when an index
    /// column is absent and [`FeatureError::InvalidArgument`] when an index
    /// cell is null or not a fiscal period.
    pub fn from_dataframe(frame: DataFrame) -> Result<Self> {
        let names: Vec<String> = frame
            .get_column_names_str()
            .into_iter()
            .map(str::to_string)
            .collect();
        let missing: Vec<String> = INDEX_COLUMNS
            .iter()
            .filter(|index| !names.iter().any(|name| name == *index))
            .map(|index| (*index).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(FeatureError::SchemaMismatch { missing });
        }

        let mut exprs = vec![
            col(FISCAL_YEAR).cast(DataType::Int32),
            col(FISCAL_PERIOD).cast(DataType::String),
            col(FILED).cast(DataType::Date),
        ];
        exprs.extend(
            names
                .iter()
                .filter(|name| !INDEX_COLUMNS.contains(&name.as_str()))
                .map(|name| {
                    let name = name.as_str();
                    finite(col(name).cast(DataType::Float64)).alias(name)
                }),
        );
        let frame = frame.lazy().select(exprs).collect()?;

        let index = decode_index(&frame)?;
        Ok(Self { index, frame })
    }

    /// The underlying frame.
    pub fn dataframe(&self) -> &DataFrame {
        &self.frame
    }

    /// A lazy query over a copy of the frame.
    pub fn lazy(&self) -> LazyFrame {
        self.frame.clone().lazy()
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Number of feature columns.
    pub fn width(&self) -> usize {
        self.frame.width().saturating_sub(INDEX_COLUMNS.len())
    }

    /// Row index.
    pub fn index(&self) -> &[PeriodKey] {
        &self.index
    }

    /// Feature column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.frame
            .get_column_names_str()
            .into_iter()
            .skip(INDEX_COLUMNS.len())
            .collect()
    }

    fn values(&self, name: &str) -> Option<&Float64Chunked> {
        if INDEX_COLUMNS.contains(&name) {
            return None;
        }
        self.frame.column(name).ok()?.f64().ok()
    }

    /// Values of a feature column.
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.values(name).map(|values| values.into_iter().collect())
    }

    /// Value of a cell, `None` when the column is absent or the cell missing.
    pub fn get(&self, row: usize, name: &str) -> Option<f64> {
        self.values(name)?.get(row)
    }

    /// Required columns the table does not have.
    fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        let present = self.column_names();
        required
            .iter()
            .filter(|name| !present.contains(name))
            .map(|name| (*name).to_string())
            .collect()
    }

    /// A table with exactly the named feature columns, in the given order.
    ///
    /// Fails with [`FeatureError::SchemaMismatch`] naming every absent column.
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let missing = self.missing_columns(names);
        if !missing.is_empty() {
            return Err(FeatureError::SchemaMismatch { missing });
        }

        let frame = self
            .frame
            .select(INDEX_COLUMNS.iter().chain(names).copied())?;
        Ok(Self {
            index: self.index.clone(),
            frame,
        })
    }

    /// Whether two tables have the same index and columns, with values equal
    /// within a relative tolerance.
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        if self.index != other.index || self.column_names() != other.column_names() {
            return false;
        }
        self.column_names().into_iter().all(|name| {
            let (Some(left), Some(right)) = (self.values(name), other.values(name)) else {
                return false;
            };
            left.into_iter().zip(right).all(|cells| match cells {
                (Some(a), Some(b)) => (a - b).abs() <= epsilon * a.abs().max(b.abs()).max(1.0),
                (None, None) => true,
                _ => false,
            })
        })
    }

    /// Build a table from an index and named columns.
    #[cfg(test)]
    pub(crate) fn from_columns(
        index: &[PeriodKey],
        columns: &[(&str, Vec<Option<f64>>)],
    ) -> Result<Self> {
        let years: Vec<i32> = index.iter().map(|k| k.fiscal_year).collect();
        let periods: Vec<&str> = index.iter().map(|k| k.fiscal_period.as_str()).collect();
        let filed: Vec<NaiveDate> = index.iter().map(|k| k.filed).collect();

        let mut frame = vec![
            Column::new(FISCAL_YEAR.into(), years),
            Column::new(FISCAL_PERIOD.into(), periods),
            Column::new(FILED.into(), filed),
        ];
        for (name, values) in columns {
            frame.push(Column::new((*name).into(), values.clone()));
        }
        Self::from_dataframe(DataFrame::new(frame)?)
    }

    /// Replace (or append) one feature column.
    #[cfg(test)]
    pub(crate) fn with_values(self, name: &str, values: Vec<Option<f64>>) -> Result<Self> {
        let mut frame = self.frame;
        frame.with_column(Column::new(name.into(), values))?;
        Self::from_dataframe(frame)
    }
}

fn decode_index(frame: &DataFrame) -> Result<Vec<PeriodKey>> {
    let years = frame.column(FISCAL_YEAR)?.i32()?;
    let periods = frame.column(FISCAL_PERIOD)?.str()?;
    let filed = frame.column(FILED)?.date()?;

    years
        .into_iter()
        .zip(periods.into_iter())
        .zip(filed.as_date_iter())
        .enumerate()
        .map(|(i, ((year, period), filed))| match (year, period, filed) {
            (Some(year), Some(period), Some(filed)) => {
                Ok(PeriodKey::new(year, FiscalPeriod::parse(period)?, filed))
            }
            _ => Err(FeatureError::InvalidArgument(format!(
                "row {} has a missing index value",
                i
            ))),
        })
        .collect()
}

/// `expr` where it is finite, null elsewhere.
pub(crate) fn finite(expr: Expr) -> Expr {
    when(expr.clone().is_finite())
        .then(expr)
        .otherwise(lit(NULL))
}

/// Aggregations that spread `value` over one column per name in `names`,
/// keyed by the `key` column, inside a `group_by`.
///
/// A name with no row in a group yields a null.
pub(crate) fn spread(key: &str, value: &str, names: &[&str]) -> Vec<Expr> {
    names
        .iter()
        .map(|name| {
            col(value)
                .filter(col(key).eq(lit(*name)))
                .first()
                .alias(*name)
        })
        .collect()
}
