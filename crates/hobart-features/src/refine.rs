//! Refinement of raw disclosure observations into feature tables.
//!
//! Observations are filtered to one filing form, deduplicated so that only
//! the earliest filing of each `(fiscal_year, fiscal_period, tag)` survives,
//! and pivoted into one column per concept. Ratios and percent changes are
//! derived from those columns and incomplete periods are dropped.

use crate::error::{FeatureError, Result};
use crate::schema::{FEATURE_COLUMNS, FeatureSet, PCT_CHANGE_COLUMNS};
use crate::table::{FILED, FISCAL_PERIOD, FISCAL_YEAR, INDEX_COLUMNS, WideTable, finite, spread};
use hobart_data::{DateRange, DisclosureSource, FormType, RawObservation, SqliteStore};
use polars::prelude::*;
use tracing::debug;

/// Concept tag column of the long observation frame.
const TAG: &str = "tag";
/// Value column of the long observation frame.
const VALUE: &str = "value";
/// Transient row number used by [`pct_change`].
const ROW: &str = "row";

/// Features derived as ratios of concepts.
const RATIOS: [&str; 6] = [
    "EarningsPerShare",
    "DebtEquityRatio",
    "QuickRatio",
    "WorkingCapitalRatio",
    "ReturnOnEquity",
    "PriceBookRatio",
];

/// Builds refined feature tables from raw observations.
#[derive(Debug, Clone, Copy)]
pub struct RecordNormalizer {
    set: FeatureSet,
}

impl RecordNormalizer {
    /// Create a normalizer for a feature set.
    pub const fn new(set: FeatureSet) -> Self {
        Self { set }
    }

    /// Feature set this normalizer builds.
    pub const fn feature_set(&self) -> FeatureSet {
        self.set
    }

    /// Refine raw observations into a wide table of the 12 features.
    ///
    /// Fails with [`FeatureError::NoData`] when no observation of the set's
    /// form, periods and concepts remains after filtering. Periods that are
    /// still incomplete after all fills are dropped, so the result may be
    /// empty.
    pub fn normalize(&self, observations: &[RawObservation]) -> Result<WideTable> {
        let filings = self.unique_filings(observations)?;
        if filings.height() == 0 {
            return Err(FeatureError::NoData(format!(
                "no {} observations of the required concepts",
                self.set.form()
            )));
        }

        let tags = self.set.tags();
        let mut per_period = vec![col(FILED).max()];
        per_period.extend(spread(TAG, VALUE, &tags));

        let concepts = filings
            .lazy()
            .group_by([col(FISCAL_YEAR), col(FISCAL_PERIOD)])
            .agg(per_period)
            .sort([FISCAL_YEAR, FISCAL_PERIOD], Default::default())
            .with_columns(
                tags.iter()
                    .map(|tag| col(*tag).forward_fill(None))
                    .collect::<Vec<_>>(),
            );

        let with_ratios = concepts
            .with_columns([
                ratio("EarningsPerShare", col("EarningsPerShareBasic")),
                ratio(
                    "DebtEquityRatio",
                    col("LiabilitiesCurrent") / col("StockholdersEquity"),
                ),
                ratio(
                    "QuickRatio",
                    (col("AssetsCurrent") - col("InventoryNet")) / col("LiabilitiesCurrent"),
                ),
                ratio(
                    "WorkingCapitalRatio",
                    col("AssetsCurrent") / col("LiabilitiesCurrent"),
                ),
                ratio(
                    "ReturnOnEquity",
                    col("NetIncomeLoss") / col("StockholdersEquity"),
                ),
                ratio(
                    "PriceBookRatio",
                    col("StockholdersEquity") / (col("AssetsCurrent") - col("LiabilitiesCurrent")),
                ),
            ])
            .with_columns(
                RATIOS
                    .iter()
                    .map(|name| col(*name).forward_fill(None))
                    .collect::<Vec<_>>(),
            );

        let mut selection: Vec<Expr> = INDEX_COLUMNS.iter().map(|name| col(*name)).collect();
        selection.extend(FEATURE_COLUMNS.iter().map(|name| col(*name)));

        let refined = pct_change(with_ratios, &PCT_CHANGE_COLUMNS)
            .select(selection)
            .drop_nulls(Some(FEATURE_COLUMNS.iter().map(|name| col(*name)).collect()))
            .collect()?;

        WideTable::from_dataframe(refined)
    }

    /// Load an entity's stored raw observations and refine them.
    pub fn from_raw(
        &self,
        store: &SqliteStore,
        entity_id: &str,
        range: DateRange,
    ) -> Result<WideTable> {
        let observations = store.observations(entity_id, range)?;
        if observations.is_empty() {
            return Err(FeatureError::NoData(format!(
                "{}: no raw observations",
                entity_id
            )));
        }
        self.normalize(&observations)
    }

    /// Pull an entity's observations straight from a source and refine them.
    ///
    /// A concept the source fails on is treated as having no data.
    pub fn from_source(
        &self,
        source: &dyn DisclosureSource,
        entity_id: &str,
        range: DateRange,
    ) -> Result<WideTable> {
        let mut observations = source.observations_of(entity_id, self.set.concepts())?;
        observations.retain(|o| range.contains(o.filed));
        debug!(entity = entity_id, rows = observations.len(), "Pulled observations");
        self.normalize(&observations)
    }

    /// Observations of the set's form, periods and concepts as a long frame
    /// of `fiscal_year`, `fiscal_period`, `filed`, `tag` and `value`,
    /// keeping only the earliest filing of each
    /// `(fiscal_year, fiscal_period, tag)`.
    pub fn unique_filings(&self, observations: &[RawObservation]) -> Result<DataFrame> {
        let form = self.set.form();
        let concepts = self.set.concepts();

        let filings: Vec<&RawObservation> = observations
            .iter()
            .filter(|o| FormType::from_form(&o.form) == Some(form))
            .filter(|o| form.accepts(o.fiscal_period))
            .filter(|o| concepts.iter().any(|c| c.tag == o.tag && c.unit == o.unit))
            .collect();

        let long = df![
            FISCAL_YEAR => filings.iter().map(|o| o.fiscal_year).collect::<Vec<_>>(),
            FISCAL_PERIOD => filings.iter().map(|o| o.fiscal_period.as_str()).collect::<Vec<_>>(),
            FILED => filings.iter().map(|o| o.filed).collect::<Vec<_>>(),
            TAG => filings.iter().map(|o| o.tag.as_str()).collect::<Vec<_>>(),
            VALUE => filings.iter().map(|o| o.value).collect::<Vec<_>>(),
        ]?;

        let unique = long
            .lazy()
            .sort(
                [FISCAL_YEAR, FISCAL_PERIOD, FILED],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .unique_stable(
                Some(vec![FISCAL_YEAR.into(), FISCAL_PERIOD.into(), TAG.into()]),
                UniqueKeepStrategy::First,
            )
            .collect()?;
        Ok(unique)
    }
}

/// A ratio column, null where the division is not finite.
fn ratio(name: &str, expr: Expr) -> Expr {
    finite(expr).alias(name)
}

/// Add period-over-period percent changes, `(x[t] - x[t-1]) / x[t-1]`, of
/// each `(source, target)` pair to a frame sorted by period.
///
/// The first period has no predecessor and is defined as `0.0`. Undefined
/// changes are forward-filled from the last defined one.
pub fn pct_change(frame: LazyFrame, pairs: &[(&str, &str)]) -> LazyFrame {
    let changes: Vec<Expr> = pairs
        .iter()
        .map(|(source, target)| {
            let previous = col(*source).shift(lit(1));
            when(col(ROW).eq(lit(0)))
                .then(lit(0.0))
                .otherwise(finite((col(*source) - previous.clone()) / previous))
                .forward_fill(None)
                .alias(*target)
        })
        .collect();

    frame
        .with_row_index(ROW, None)
        .with_columns(changes)
        .drop([ROW])
}
