//! Industry-relative normalization of refined features.

use crate::error::Result;
use crate::industry::{IndustryAggregator, IndustryLevel, IndustryTable};
use crate::schema::{FEATURE_COLUMNS, FeatureSet, is_pct_change};
use crate::store::FeatureStore;
use crate::table::{FILED, FISCAL_PERIOD, FISCAL_YEAR, INDEX_COLUMNS, WideTable, finite};
use hobart_data::{DateRange, SqliteStore};
use polars::prelude::*;

const ROW: &str = "row";
const NAME: &str = "name";
const MEAN: &str = "mean";
const STD: &str = "std";

/// Z-scores an entity's refined features against its industry.
#[derive(Debug, Clone, Copy)]
pub struct IndustryNormalizer<'a> {
    store: &'a SqliteStore,
    set: FeatureSet,
}

impl<'a> IndustryNormalizer<'a> {
    /// Normalize the features of `set` held in `store`.
    pub const fn new(store: &'a SqliteStore, set: FeatureSet) -> Self {
        Self { store, set }
    }

    /// Compute normalized features from the entity's refined features and
    /// its industry's statistics at `level`.
    pub fn from_other_refined(
        &self,
        entity_id: &str,
        level: IndustryLevel,
        range: DateRange,
    ) -> Result<WideTable> {
        let own = FeatureStore::new(self.store, self.set.table()).read(entity_id, range)?;
        let industry = IndustryAggregator::new(self.store, self.set).aggregate(
            Some(entity_id),
            None,
            level,
            range,
        )?;
        standardize(&own, &industry)
    }

    /// Read previously installed normalized features.
    pub fn from_refined(&self, entity_id: &str, range: DateRange) -> Result<WideTable> {
        FeatureStore::new(self.store, self.set.normalized_table()).read(entity_id, range)
    }

    /// Compute an entity's normalized features and write them to the
    /// normalized table. Returns the number of rows written.
    ///
    /// The entity's previous normalized rows are replaced in the same
    /// transaction, and only once the new rows have been computed.
    pub fn install(
        &self,
        entity_id: &str,
        level: IndustryLevel,
        range: DateRange,
    ) -> Result<usize> {
        let table = self.from_other_refined(entity_id, level, range)?;
        FeatureStore::new(self.store, self.set.normalized_table()).replace(entity_id, &table)
    }
}

/// Z-score every feature of `own` against the industry statistics of the
/// same fiscal period.
///
/// A period or feature without a usable statistic yields a missing z-score.
/// Missing percent-change scores become `0.0`; every other missing score is
/// forward-filled and rows still incomplete are dropped. Rows sharing a
/// filing date keep only the first, and the result is sorted by period.
pub fn standardize(own: &WideTable, industry: &IndustryTable) -> Result<WideTable> {
    let own = own.select(&FEATURE_COLUMNS)?;
    let keys = [col(FISCAL_YEAR), col(FISCAL_PERIOD)];

    let mut selection: Vec<Expr> = INDEX_COLUMNS.iter().map(|name| col(*name)).collect();
    selection.extend(FEATURE_COLUMNS.iter().map(|name| {
        let score = finite((col(*name) - col(mean_of(name))) / col(std_of(name)));
        let score = if is_pct_change(name) {
            score.fill_null(lit(0.0))
        } else {
            score
        };
        score.forward_fill(None).alias(*name)
    }));

    let scores = own
        .lazy()
        .with_row_index(ROW, None)
        .join(
            statistics(industry)?,
            keys.clone(),
            keys,
            JoinArgs::new(JoinType::Left),
        )
        .sort([ROW], Default::default())
        .select(selection)
        .drop_nulls(Some(FEATURE_COLUMNS.iter().map(|name| col(*name)).collect()))
        .unique_stable(Some(vec![FILED.into()]), UniqueKeepStrategy::First)
        .sort(
            INDEX_COLUMNS,
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;

    WideTable::from_dataframe(scores)
}

fn mean_of(name: &str) -> String {
    format!("{}_mean", name)
}

fn std_of(name: &str) -> String {
    format!("{}_std", name)
}

/// One row per fiscal period with the industry mean and deviation of every
/// feature as `<feature>_mean` and `<feature>_std`.
fn statistics(industry: &IndustryTable) -> Result<LazyFrame> {
    let stats = industry.stats();
    let long = df![
        FISCAL_YEAR => stats.iter().map(|s| s.fiscal_year).collect::<Vec<_>>(),
        FISCAL_PERIOD => stats.iter().map(|s| s.fiscal_period.as_str()).collect::<Vec<_>>(),
        NAME => stats.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        MEAN => stats.iter().map(|s| s.mean).collect::<Vec<_>>(),
        STD => stats.iter().map(|s| s.std).collect::<Vec<_>>(),
    ]?;

    let mut per_period = Vec::with_capacity(2 * FEATURE_COLUMNS.len());
    for name in FEATURE_COLUMNS {
        let feature = col(NAME).eq(lit(name));
        per_period.push(col(MEAN).filter(feature.clone()).first().alias(mean_of(name)));
        per_period.push(col(STD).filter(feature).first().alias(std_of(name)));
    }

    Ok(long
        .lazy()
        .group_by([col(FISCAL_YEAR), col(FISCAL_PERIOD)])
        .agg(per_period))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::PeriodKey;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use hobart_data::{FiscalPeriod, IndustryStat};

    fn key(period: FiscalPeriod, month: u32) -> PeriodKey {
        PeriodKey::new(2021, period, NaiveDate::from_ymd_opt(2021, month, 1).unwrap())
    }

    fn stat(period: FiscalPeriod, name: &str, mean: f64, std: Option<f64>) -> IndustryStat {
        IndustryStat {
            code: "37".to_string(),
            fiscal_year: 2021,
            fiscal_period: period,
            filed: NaiveDate::from_ymd_opt(2021, 12, 31).unwrap(),
            name: name.to_string(),
            mean,
            std,
            count: 3,
        }
    }

    /// Entity table with every feature equal to `value`.
    fn own(keys: Vec<PeriodKey>, value: f64) -> WideTable {
        let columns: Vec<(&str, Vec<Option<f64>>)> = FEATURE_COLUMNS
            .iter()
            .map(|name| (*name, vec![Some(value); keys.len()]))
            .collect();
        WideTable::from_columns(&keys, &columns).unwrap()
    }

    /// Industry statistics with the same mean and deviation for every feature.
    fn industry(periods: &[FiscalPeriod], mean: f64, std: Option<f64>) -> IndustryTable {
        let stats = periods
            .iter()
            .flat_map(|&p| FEATURE_COLUMNS.into_iter().map(move |name| stat(p, name, mean, std)))
            .collect();
        IndustryTable::new("37", stats)
    }

    #[test]
    fn test_zscore() {
        let own = own(vec![key(FiscalPeriod::Q1, 5)], 10.0);
        let industry = industry(&[FiscalPeriod::Q1], 8.0, Some(2.0));

        let z = standardize(&own, &industry).unwrap();
        assert_eq!(z.column_names(), FEATURE_COLUMNS.to_vec());
        for name in FEATURE_COLUMNS {
            assert_eq!(z.get(0, name), Some(1.0));
        }
    }

    #[test]
    fn test_own_filed_is_kept() {
        let own = own(vec![key(FiscalPeriod::Q1, 5)], 10.0);
        let industry = industry(&[FiscalPeriod::Q1], 8.0, Some(2.0));

        let z = standardize(&own, &industry).unwrap();
        assert_eq!(z.index(), own.index());
    }

    #[test]
    fn test_missing_industry_period_fills() {
        let own = own(vec![key(FiscalPeriod::Q1, 5), key(FiscalPeriod::Q2, 8)], 10.0);
        let industry = industry(&[FiscalPeriod::Q1], 8.0, Some(2.0));

        let z = standardize(&own, &industry).unwrap();
        assert_eq!(z.height(), 2);
        // Percent-change scores are zero-filled, the rest carried forward
        assert_eq!(z.get(1, "AssetsCurrent_pct_change"), Some(0.0));
        assert_relative_eq!(z.get(1, "QuickRatio").unwrap(), 1.0);
    }

    #[test]
    fn test_undefined_first_period_is_dropped() {
        let own = own(vec![key(FiscalPeriod::Q1, 5), key(FiscalPeriod::Q2, 8)], 10.0);
        let mut stats = industry(&[FiscalPeriod::Q2], 8.0, Some(4.0)).stats().to_vec();
        // Single-member groups have no deviation
        stats.extend(
            FEATURE_COLUMNS
                .iter()
                .map(|name| stat(FiscalPeriod::Q1, name, 10.0, None)),
        );
        let industry = IndustryTable::new("37", stats);

        let z = standardize(&own, &industry).unwrap();
        assert_eq!(z.height(), 1);
        assert_eq!(z.index()[0].fiscal_period, FiscalPeriod::Q2);
        assert_relative_eq!(z.get(0, "DebtEquityRatio").unwrap(), 0.5);
    }

    #[test]
    fn test_zero_deviation_is_missing() {
        let own = own(vec![key(FiscalPeriod::Q1, 5)], 10.0);
        let industry = industry(&[FiscalPeriod::Q1], 10.0, Some(0.0));

        let z = standardize(&own, &industry).unwrap();
        assert!(z.is_empty());
    }

    #[test]
    fn test_dedup_by_filed_and_sort() {
        let own = own(
            vec![key(FiscalPeriod::Q2, 8), key(FiscalPeriod::Q1, 5), key(FiscalPeriod::Q3, 8)],
            10.0,
        );
        let industry = industry(
            &[FiscalPeriod::Q1, FiscalPeriod::Q2, FiscalPeriod::Q3],
            8.0,
            Some(2.0),
        );

        let z = standardize(&own, &industry).unwrap();
        assert_eq!(z.height(), 2);
        assert_eq!(z.index()[0].fiscal_period, FiscalPeriod::Q1);
        assert_eq!(z.index()[1].fiscal_period, FiscalPeriod::Q2);
    }
}
