//! Parallel installation of observations and feature tables.
//!
//! Each stage runs one task per entity on a dedicated rayon pool. SQLite
//! connections are not shared between threads, so every worker opens its own
//! connection to the configured database on first use and keeps it for the
//! rest of the stage. Entities that fail are logged and counted as skipped;
//! they never abort the stage.

use crate::config::{InstallConfig, StoreConfig};
use crate::error::Result;
use hobart_data::{DisclosureSource, SqliteStore};
use hobart_features::{FeatureSet, FeatureStore, IndustryNormalizer, RecordNormalizer};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of one install stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// Entities the stage considered
    pub attempted: usize,
    /// Entities that had rows written
    pub installed: usize,
    /// Entities skipped because of missing data or errors
    pub skipped: usize,
    /// Rows written in total
    pub rows: usize,
}

impl InstallReport {
    fn record(mut self, outcome: Option<usize>) -> Self {
        self.attempted += 1;
        match outcome {
            Some(rows) if rows > 0 => {
                self.installed += 1;
                self.rows += rows;
            }
            _ => self.skipped += 1,
        }
        self
    }

    fn merge(mut self, other: Self) -> Self {
        self.attempted += other.attempted;
        self.installed += other.installed;
        self.skipped += other.skipped;
        self.rows += other.rows;
        self
    }
}

/// Installs one feature set into the configured store.
#[derive(Debug)]
pub struct Installer {
    store: StoreConfig,
    set: FeatureSet,
    config: InstallConfig,
    pool: rayon::ThreadPool,
}

impl Installer {
    /// Create an installer with a pool of `config.workers` threads.
    pub fn new(store: StoreConfig, set: FeatureSet, config: InstallConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("hobart-install-{}", i))
            .build()?;
        Ok(Self {
            store,
            set,
            config,
            pool,
        })
    }

    /// Feature set being installed.
    pub const fn feature_set(&self) -> FeatureSet {
        self.set
    }

    /// Install configuration.
    pub const fn config(&self) -> &InstallConfig {
        &self.config
    }

    /// Copy submissions and raw observations of `entities` from `source`.
    ///
    /// Observations already present are left untouched, so the stage can be
    /// rerun after new filings arrive.
    pub fn install_observations(
        &self,
        source: &dyn DisclosureSource,
        entities: &[String],
    ) -> Result<InstallReport> {
        // Opening once up front creates the schema before workers race for it
        self.store.open()?;

        let set = self.set;
        let report = self.run(entities, |store, entity| {
            let submission = match source.submission(entity) {
                Ok(submission) => submission,
                Err(e) => {
                    debug!(entity, error = %e, "No submission, skipping");
                    return Ok(0);
                }
            };
            store.put_submission(&submission)?;

            let observations = source.observations_of(entity, set.concepts())?;
            Ok(store.put_observations(&observations)?)
        });

        info!(
            set = %self.set,
            attempted = report.attempted,
            installed = report.installed,
            skipped = report.skipped,
            rows = report.rows,
            "Installed observations"
        );
        Ok(report)
    }

    /// Refine raw observations into the feature set's table.
    ///
    /// Candidates are the entities holding at least `min_rows` rows of every
    /// concept, optionally restricted to `entities`. Existing rows of an
    /// entity are replaced.
    pub fn install_features(&self, entities: Option<&[String]>) -> Result<InstallReport> {
        let table = self.set.table();
        let candidates = self.prepare(table, entities)?;

        let normalizer = RecordNormalizer::new(self.set);
        let range = self.config.range;
        let report = self.run(&candidates, |store, entity| {
            let refined = normalizer.from_raw(store, entity, range)?;
            Ok(FeatureStore::new(store, table).replace(entity, &refined)?)
        });

        info!(
            table = %table,
            attempted = report.attempted,
            installed = report.installed,
            skipped = report.skipped,
            rows = report.rows,
            "Installed features"
        );
        Ok(report)
    }

    /// Normalize refined features against their industries into the feature
    /// set's normalized table.
    ///
    /// Candidates are the entities holding at least `min_rows` refined rows of
    /// every feature, optionally restricted to `entities`. An entity whose
    /// normalization fails keeps the rows it already had.
    pub fn install_normalized(&self, entities: Option<&[String]>) -> Result<InstallReport> {
        let table = self.set.normalized_table();
        let candidates = self.prepare(table, entities)?;

        let set = self.set;
        let level = self.config.level;
        let range = self.config.range;
        let report = self.run(&candidates, |store, entity| {
            Ok(IndustryNormalizer::new(store, set).install(entity, level, range)?)
        });

        info!(
            table = %table,
            level = %level,
            attempted = report.attempted,
            installed = report.installed,
            skipped = report.skipped,
            rows = report.rows,
            "Installed normalized features"
        );
        Ok(report)
    }

    /// Recreate the target table if configured and list the candidates.
    fn prepare(
        &self,
        table: hobart_data::FeatureTable,
        entities: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let store = self.store.open()?;
        if self.config.recreate_tables {
            info!(table = %table, "Recreating table");
            store.recreate_table(table)?;
        }

        let mut candidates =
            FeatureStore::new(&store, table).read_candidates(self.config.min_rows)?;
        if let Some(entities) = entities {
            let wanted: BTreeSet<&str> = entities.iter().map(String::as_str).collect();
            candidates.retain(|entity| wanted.contains(entity.as_str()));
        }
        debug!(table = %table, candidates = candidates.len(), "Resolved candidates");
        Ok(candidates.into_iter().collect())
    }

    /// Run `task` for every entity on the pool and tally the outcomes.
    fn run<F>(&self, entities: &[String], task: F) -> InstallReport
    where
        F: Fn(&SqliteStore, &str) -> Result<usize> + Sync,
    {
        let stores = WorkerStores::new(self.pool.current_num_threads());
        self.pool.install(|| {
            entities
                .par_iter()
                .map(|entity| {
                    let store = match stores.checkout(|| self.store.open()) {
                        Ok(store) => store,
                        Err(e) => {
                            let path = self.store.path.display();
                            warn!(path = %path, error = %e, "Failed to open store");
                            return None;
                        }
                    };
                    let outcome = match task(&store, entity) {
                        Ok(rows) => Some(rows),
                        Err(e) => {
                            debug!(entity = entity.as_str(), error = %e, "Skipping entity");
                            None
                        }
                    };
                    stores.checkin(store);
                    outcome
                })
                .fold(InstallReport::default, InstallReport::record)
                .reduce(InstallReport::default, InstallReport::merge)
        })
    }
}

/// One cached connection per pool thread, kept for the length of a stage.
///
/// A store is taken out of its slot while a task uses it. A thread that picks
/// up a second task while the first one waits finds the slot empty and opens
/// another connection instead of blocking on its own slot.
struct WorkerStores {
    slots: Vec<Mutex<Option<SqliteStore>>>,
}

impl WorkerStores {
    fn new(workers: usize) -> Self {
        Self {
            slots: (0..workers).map(|_| Mutex::new(None)).collect(),
        }
    }

    fn slot(&self) -> Option<&Mutex<Option<SqliteStore>>> {
        rayon::current_thread_index().and_then(|i| self.slots.get(i))
    }

    /// The current thread's cached store, or a newly opened one.
    fn checkout<O>(&self, open: O) -> Result<SqliteStore>
    where
        O: FnOnce() -> Result<SqliteStore>,
    {
        let cached = self
            .slot()
            .and_then(|slot| slot.lock().ok().and_then(|mut guard| guard.take()));
        match cached {
            Some(store) => Ok(store),
            None => open(),
        }
    }

    /// Return a store to the current thread's slot.
    fn checkin(&self, store: SqliteStore) {
        if let Some(slot) = self.slot()
            && let Ok(mut guard) = slot.lock()
        {
            *guard = Some(store);
        }
    }
}
