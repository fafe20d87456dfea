//! SEC EDGAR record shapes.
//!
//! This module maps the SEC "companyfacts" and "submissions" JSON documents
//! into the raw records consumed by the feature pipeline. Fetching the
//! documents is left to the caller; [`CompanyFactsDir`] reads them from disk.
//!
//! # Example
//!
//! ```no_run
//! use hobart_data::edgar::{CompanyFactsDir, concepts};
//! use hobart_data::source::DisclosureSource;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = CompanyFactsDir::new("data/edgar");
//! let rows = source.observations("AAPL", &concepts::ASSETS_CURRENT)?;
//! println!("Found {} AssetsCurrent observations", rows.len());
//! # Ok(())
//! # }
//! ```

pub mod concepts;
pub mod facts;

pub use facts::{CompanyFacts, CompanyFactsDir, parse_submission};
