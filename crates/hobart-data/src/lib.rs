#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/hobart/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod edgar;
pub mod error;
pub mod source;
pub mod store;
pub mod types;

pub use error::{DataError, Result};
pub use source::{ClassificationLookup, DisclosureSource};
pub use store::{SqliteStore, StoreStats, TableStats};
pub use types::{
    Concept, DateRange, FeatureRow, FeatureTable, FiscalPeriod, FormType, IndustryStat,
    RawObservation, Submission,
};

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
