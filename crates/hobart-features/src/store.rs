//! Persistence of wide feature tables as long-format rows.

use crate::error::{FeatureError, Result};
use crate::schema::{FEATURE_COLUMNS, FeatureSet, is_feature};
use crate::table::{FILED, FISCAL_PERIOD, FISCAL_YEAR, WideTable, spread};
use hobart_data::{DateRange, FeatureRow, FeatureTable, FiscalPeriod, SqliteStore};
use polars::prelude::*;
use std::collections::BTreeSet;
use tracing::debug;

/// Feature name column of the long frame.
const NAME: &str = "name";
/// Feature value column of the long frame.
const VALUE: &str = "value";

/// Access to one feature table.
///
/// Writes melt a wide table into one row per feature and period; reads pivot
/// them back with the canonical column order. [`FeatureStore::write`] is
/// append-only: writing an entity twice without [`FeatureStore::clear`] in
/// between fails with [`FeatureError::DuplicateWrite`].
/// [`FeatureStore::replace`] swaps an entity's rows atomically.
#[derive(Debug, Clone, Copy)]
pub struct FeatureStore<'a> {
    store: &'a SqliteStore,
    table: FeatureTable,
}

impl<'a> FeatureStore<'a> {
    /// Access `table` through `store`.
    pub const fn new(store: &'a SqliteStore, table: FeatureTable) -> Self {
        Self { store, table }
    }

    /// Table this store writes to.
    pub const fn table(&self) -> FeatureTable {
        self.table
    }

    /// Persist an entity's features in one transaction.
    ///
    /// Returns the number of long rows written. Missing cells are not
    /// written.
    pub fn write(&self, entity_id: &str, table: &WideTable) -> Result<usize> {
        let rows = melt(entity_id, table)?;
        let written = self.store.insert_features(self.table, &rows)?;
        debug!(entity = entity_id, table = %self.table, rows = written, "Wrote features");
        Ok(written)
    }

    /// Replace an entity's rows with `table` in one transaction.
    ///
    /// When `table` lacks a feature column or the write fails, the entity's
    /// stored rows are left as they were.
    pub fn replace(&self, entity_id: &str, table: &WideTable) -> Result<usize> {
        let rows = melt(entity_id, table)?;
        let written = self.store.replace_features(self.table, entity_id, &rows)?;
        debug!(entity = entity_id, table = %self.table, rows = written, "Replaced features");
        Ok(written)
    }

    /// Read an entity's features back into a wide table.
    pub fn read(&self, entity_id: &str, range: DateRange) -> Result<WideTable> {
        let rows = self.store.features(self.table, entity_id, range)?;
        if rows.is_empty() {
            return Err(FeatureError::NoData(format!(
                "{}: no rows in {}",
                entity_id, self.table
            )));
        }
        pivot(&rows)
    }

    /// Entities eligible for this table.
    ///
    /// For a refined table these are the entities whose raw observations hold
    /// at least `min_rows` rows of every concept; for a normalized table, the
    /// entities whose refined features hold at least `min_rows` rows of every
    /// feature.
    pub fn read_candidates(&self, min_rows: usize) -> Result<BTreeSet<String>> {
        let candidates = match self.table.source() {
            Some(source) => self
                .store
                .entities_with_features(source, &FEATURE_COLUMNS, min_rows)?,
            None => {
                let set = feature_set(self.table);
                self.store
                    .candidate_entities(set.form(), &set.tags(), min_rows)?
            }
        };
        Ok(candidates)
    }

    /// Entities already in this table with at least `min_rows` rows of every
    /// feature.
    pub fn entities(&self, min_rows: usize) -> Result<BTreeSet<String>> {
        Ok(self
            .store
            .entities_with_features(self.table, &FEATURE_COLUMNS, min_rows)?)
    }

    /// Delete an entity's rows. Returns the number of rows deleted.
    pub fn clear(&self, entity_id: &str) -> Result<usize> {
        Ok(self.store.delete_features(self.table, entity_id)?)
    }

    /// Entities ordered by a feature's value in one fiscal period.
    ///
    /// An omitted year or period defaults to the most recent one holding the
    /// feature.
    pub fn entities_sorted_by(
        &self,
        feature: &str,
        year: Option<i32>,
        period: Option<FiscalPeriod>,
        ascending: bool,
    ) -> Result<Vec<String>> {
        if !is_feature(feature) {
            return Err(FeatureError::InvalidArgument(format!(
                "unknown feature {}",
                feature
            )));
        }

        let Some((year, period)) = self.store.latest_period(self.table, feature, year, period)?
        else {
            return Err(FeatureError::NoData(format!(
                "no {} rows in {}",
                feature, self.table
            )));
        };

        Ok(self
            .store
            .entities_sorted_by(self.table, feature, year, period, ascending)?)
    }
}

fn feature_set(table: FeatureTable) -> FeatureSet {
    match table.form() {
        hobart_data::FormType::Quarterly => FeatureSet::Quarterly,
        hobart_data::FormType::Annual => FeatureSet::Annual,
    }
}

/// Melt the feature columns of a wide table into long rows.
///
/// Fails with [`FeatureError::SchemaMismatch`] unless every feature column
/// is present. Columns outside the schema are ignored.
pub fn melt(entity_id: &str, table: &WideTable) -> Result<Vec<FeatureRow>> {
    let table = table.select(&FEATURE_COLUMNS)?;
    let frame = table.dataframe();

    let mut rows = Vec::with_capacity(table.height() * FEATURE_COLUMNS.len());
    for name in FEATURE_COLUMNS {
        let values = frame.column(name)?.f64()?;
        for (key, value) in table.index().iter().zip(values) {
            let Some(value) = value else {
                continue;
            };
            rows.push(FeatureRow {
                entity_id: entity_id.to_string(),
                fiscal_year: key.fiscal_year,
                fiscal_period: key.fiscal_period,
                filed: key.filed,
                name: name.to_string(),
                value,
            });
        }
    }
    Ok(rows)
}

/// Pivot long rows into a wide table with the feature columns in canonical
/// order, one row per `(fiscal_year, fiscal_period, filed)`.
pub fn pivot(rows: &[FeatureRow]) -> Result<WideTable> {
    let long = df![
        FISCAL_YEAR => rows.iter().map(|r| r.fiscal_year).collect::<Vec<_>>(),
        FISCAL_PERIOD => rows.iter().map(|r| r.fiscal_period.as_str()).collect::<Vec<_>>(),
        FILED => rows.iter().map(|r| r.filed).collect::<Vec<_>>(),
        NAME => rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        VALUE => rows.iter().map(|r| r.value).collect::<Vec<_>>(),
    ]?;

    let wide = long
        .lazy()
        .group_by([col(FISCAL_YEAR), col(FISCAL_PERIOD), col(FILED)])
        .agg(spread(NAME, VALUE, &FEATURE_COLUMNS))
        .sort([FISCAL_YEAR, FISCAL_PERIOD, FILED], Default::default())
        .collect()?;

    WideTable::from_dataframe(wide)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::PeriodKey;
    use chrono::NaiveDate;

    fn table(periods: &[(FiscalPeriod, u32)]) -> WideTable {
        let index: Vec<PeriodKey> = periods
            .iter()
            .map(|&(p, m)| PeriodKey::new(2021, p, NaiveDate::from_ymd_opt(2021, m, 1).unwrap()))
            .collect();
        let columns: Vec<(&str, Vec<Option<f64>>)> = FEATURE_COLUMNS
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let values = (0..periods.len())
                    .map(|i| Some((i * 100 + j) as f64 / 7.0))
                    .collect();
                (*name, values)
            })
            .collect();
        WideTable::from_columns(&index, &columns).unwrap()
    }

    #[test]
    fn test_write_read_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let features = FeatureStore::new(&store, FeatureTable::Quarterly);
        let original = table(&[(FiscalPeriod::Q1, 5), (FiscalPeriod::Q2, 8)]);

        assert_eq!(features.write("F", &original).unwrap(), 24);
        let read = features.read("F", DateRange::all()).unwrap();
        assert_eq!(read, original);
    }

    #[test]
    fn test_read_reasserts_column_order() {
        let store = SqliteStore::in_memory().unwrap();
        let features = FeatureStore::new(&store, FeatureTable::Quarterly);
        let original = table(&[(FiscalPeriod::Q1, 5)]);

        let mut reversed: Vec<&str> = FEATURE_COLUMNS.to_vec();
        reversed.reverse();
        let shuffled = original.select(&reversed).unwrap();

        features.write("F", &shuffled).unwrap();
        let read = features.read("F", DateRange::all()).unwrap();
        assert_eq!(read, original);
    }

    #[test]
    fn test_write_twice_is_duplicate() {
        let store = SqliteStore::in_memory().unwrap();
        let features = FeatureStore::new(&store, FeatureTable::Annual);
        let original = table(&[(FiscalPeriod::FY, 2)]);

        features.write("F", &original).unwrap();
        assert!(matches!(
            features.write("F", &original),
            Err(FeatureError::DuplicateWrite { .. })
        ));

        assert_eq!(features.clear("F").unwrap(), 12);
        assert_eq!(features.write("F", &original).unwrap(), 12);
    }

    #[test]
    fn test_write_missing_columns_persists_nothing() {
        let store = SqliteStore::in_memory().unwrap();
        let features = FeatureStore::new(&store, FeatureTable::Quarterly);
        let partial = table(&[(FiscalPeriod::Q1, 5)])
            .select(&FEATURE_COLUMNS[1..])
            .unwrap();

        match features.write("F", &partial) {
            Err(FeatureError::SchemaMismatch { missing }) => {
                assert_eq!(missing, vec!["AssetsCurrent_pct_change"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            features.read("F", DateRange::all()),
            Err(FeatureError::NoData(_))
        ));
    }

    #[test]
    fn test_replace_swaps_rows() {
        let store = SqliteStore::in_memory().unwrap();
        let features = FeatureStore::new(&store, FeatureTable::Quarterly);
        let original = table(&[(FiscalPeriod::Q1, 5), (FiscalPeriod::Q2, 8)]);
        features.write("F", &original).unwrap();

        let newer = table(&[(FiscalPeriod::Q3, 11)]);
        assert_eq!(features.replace("F", &newer).unwrap(), 12);
        assert_eq!(features.read("F", DateRange::all()).unwrap(), newer);

        // A table failing the schema check leaves the stored rows alone
        let partial = original.select(&FEATURE_COLUMNS[..6]).unwrap();
        assert!(matches!(
            features.replace("F", &partial),
            Err(FeatureError::SchemaMismatch { .. })
        ));
        assert_eq!(features.read("F", DateRange::all()).unwrap(), newer);
    }

    #[test]
    fn test_pivot_fills_absent_features_with_null() {
        let rows = vec![FeatureRow {
            entity_id: "F".to_string(),
            fiscal_year: 2021,
            fiscal_period: FiscalPeriod::Q1,
            filed: NaiveDate::from_ymd_opt(2021, 5, 1).unwrap(),
            name: "QuickRatio".to_string(),
            value: 1.5,
        }];

        let table = pivot(&rows).unwrap();
        assert_eq!(table.column_names(), FEATURE_COLUMNS.to_vec());
        assert_eq!(table.get(0, "QuickRatio"), Some(1.5));
        assert_eq!(table.get(0, "DebtEquityRatio"), None);
        assert_eq!(melt("F", &table).unwrap(), rows);
    }

    #[test]
    fn test_read_date_range() {
        let store = SqliteStore::in_memory().unwrap();
        let features = FeatureStore::new(&store, FeatureTable::Quarterly);
        let original = table(&[(FiscalPeriod::Q1, 5), (FiscalPeriod::Q2, 8)]);
        features.write("F", &original).unwrap();

        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2021, 6, 1),
            end: None,
        };
        let read = features.read("F", range).unwrap();
        assert_eq!(read.height(), 1);
        assert_eq!(read.index()[0].fiscal_period, FiscalPeriod::Q2);
    }

    #[test]
    fn test_entities_sorted_by() {
        let store = SqliteStore::in_memory().unwrap();
        let features = FeatureStore::new(&store, FeatureTable::Quarterly);
        for (entity, scale) in [("A", 2.0), ("B", 1.0), ("C", 3.0)] {
            let t = table(&[(FiscalPeriod::Q1, 5)])
                .with_values("QuickRatio", vec![Some(scale)])
                .unwrap();
            features.write(entity, &t).unwrap();
        }

        let sorted = features
            .entities_sorted_by("QuickRatio", None, None, true)
            .unwrap();
        assert_eq!(sorted, vec!["B", "A", "C"]);

        assert!(matches!(
            features.entities_sorted_by("Revenue", None, None, true),
            Err(FeatureError::InvalidArgument(_))
        ));
        assert!(matches!(
            features.entities_sorted_by("QuickRatio", Some(1999), None, true),
            Err(FeatureError::NoData(_))
        ));
    }
}
