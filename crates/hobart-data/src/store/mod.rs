//! Persistence layer for disclosure records and features.

pub mod sqlite;

pub use sqlite::{SqliteStore, StoreStats, TableStats};
