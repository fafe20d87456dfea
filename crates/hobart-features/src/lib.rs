#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/hobart/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod industry;
pub mod normalize;
pub mod refine;
pub mod schema;
pub mod store;
pub mod table;

pub use error::{FeatureError, Result};
pub use industry::{IndustryAggregator, IndustryLevel, IndustryTable, summarize};
pub use normalize::{IndustryNormalizer, standardize};
pub use refine::{RecordNormalizer, pct_change};
pub use schema::{FEATURE_COLUMNS, FeatureSet, PCT_CHANGE_COLUMNS, SCHEMA_VERSION};
pub use store::{FeatureStore, melt, pivot};
pub use table::{PeriodKey, WideTable};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
