#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/hobart/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use hobart_data as data;
pub use hobart_features as features;

pub mod config;
pub mod error;
pub mod install;

pub use config::{DATABASE_PATH_ENV, InstallConfig, StoreConfig, default_database_path};
pub use error::{Error, Result};
pub use install::{InstallReport, Installer};

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
