//! The versioned feature schema and the feature sets built on it.

use hobart_data::edgar::concepts;
use hobart_data::{Concept, FeatureTable, FormType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of [`FEATURE_COLUMNS`]. Bumped whenever a feature is added,
/// removed or redefined.
pub const SCHEMA_VERSION: u32 = 1;

/// Feature columns every refined or normalized table carries, in their
/// canonical order.
pub const FEATURE_COLUMNS: [&str; 12] = [
    "AssetsCurrent_pct_change",
    "DebtEquityRatio",
    "EarningsPerShare",
    "InventoryNet_pct_change",
    "LiabilitiesCurrent_pct_change",
    "NetIncomeLoss_pct_change",
    "OperatingIncomeLoss_pct_change",
    "PriceBookRatio",
    "QuickRatio",
    "ReturnOnEquity",
    "StockholdersEquity_pct_change",
    "WorkingCapitalRatio",
];

/// Source columns with a percent-change feature, paired with the feature.
pub const PCT_CHANGE_COLUMNS: [(&str, &str); 6] = [
    ("AssetsCurrent", "AssetsCurrent_pct_change"),
    ("InventoryNet", "InventoryNet_pct_change"),
    ("LiabilitiesCurrent", "LiabilitiesCurrent_pct_change"),
    ("NetIncomeLoss", "NetIncomeLoss_pct_change"),
    ("OperatingIncomeLoss", "OperatingIncomeLoss_pct_change"),
    ("StockholdersEquity", "StockholdersEquity_pct_change"),
];

/// Whether a feature is a percent change.
pub fn is_pct_change(feature: &str) -> bool {
    PCT_CHANGE_COLUMNS.iter().any(|(_, target)| *target == feature)
}

/// Whether a name is one of the schema's features.
pub fn is_feature(name: &str) -> bool {
    FEATURE_COLUMNS.contains(&name)
}

/// Which filings a feature set is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureSet {
    /// Quarterly features from 10-Q filings
    Quarterly,
    /// Annual features from 10-K filings
    Annual,
}

impl FeatureSet {
    /// Both feature sets.
    pub const ALL: [Self; 2] = [Self::Quarterly, Self::Annual];

    /// Filing form the set is built from.
    pub const fn form(&self) -> FormType {
        match self {
            Self::Quarterly => FormType::Quarterly,
            Self::Annual => FormType::Annual,
        }
    }

    /// Disclosure concepts the set derives its features from.
    pub fn concepts(&self) -> &'static [Concept] {
        &concepts::POPULAR
    }

    /// Tags of [`Self::concepts`].
    pub fn tags(&self) -> Vec<&'static str> {
        self.concepts().iter().map(|c| c.tag).collect()
    }

    /// Table holding the set's refined features.
    pub const fn table(&self) -> FeatureTable {
        match self {
            Self::Quarterly => FeatureTable::Quarterly,
            Self::Annual => FeatureTable::Annual,
        }
    }

    /// Table holding the set's industry-normalized features.
    pub const fn normalized_table(&self) -> FeatureTable {
        self.table().normalized()
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quarterly => f.write_str("quarterly"),
            Self::Annual => f.write_str("annual"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_feature_columns_sorted_and_unique() {
        let mut sorted = FEATURE_COLUMNS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted, FEATURE_COLUMNS.to_vec());
    }

    #[test]
    fn test_pct_change_targets_are_features() {
        for (source, target) in PCT_CHANGE_COLUMNS {
            assert!(is_feature(target));
            assert_eq!(target, format!("{}_pct_change", source));
        }
        assert!(is_pct_change("NetIncomeLoss_pct_change"));
        assert!(!is_pct_change("QuickRatio"));
    }

    #[rstest]
    #[case(
        FeatureSet::Quarterly,
        FormType::Quarterly,
        FeatureTable::Quarterly,
        FeatureTable::NormalizedQuarterly
    )]
    #[case(
        FeatureSet::Annual,
        FormType::Annual,
        FeatureTable::Annual,
        FeatureTable::NormalizedAnnual
    )]
    fn test_feature_set_tables(
        #[case] set: FeatureSet,
        #[case] form: FormType,
        #[case] table: FeatureTable,
        #[case] normalized: FeatureTable,
    ) {
        assert_eq!(set.form(), form);
        assert_eq!(set.table(), table);
        assert_eq!(set.normalized_table(), normalized);
        assert_eq!(set.tags().len(), 7);
    }
}
