//! SQLite persistence for submissions, raw observations and feature tables.

use crate::error::{DataError, Result};
use crate::source::ClassificationLookup;
use crate::types::{
    DateRange, FeatureRow, FeatureTable, FiscalPeriod, FormType, IndustryStat, RawObservation,
    Submission,
};
use chrono::NaiveDate;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params, params_from_iter};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite store backing the feature pipeline.
///
/// A store owns a single connection and is not shared between threads;
/// parallel workers each open their own. Entity-set queries are memoized
/// per store. The memo is cleared by every write through this store and
/// whenever SQLite reports a commit from another connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    entity_sets: RefCell<EntitySets>,
}

/// Memoized entity sets and the data version they were read at.
#[derive(Debug, Default)]
struct EntitySets {
    data_version: Option<i64>,
    sets: HashMap<String, BTreeSet<String>>,
}

impl SqliteStore {
    /// Open (or create) a store on disk.
    ///
    /// The database is switched to WAL mode so that several connections can
    /// write disjoint entities concurrently.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        let store = Self::from_connection(conn);
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self::from_connection(conn);
        store.initialize_schema()?;
        Ok(store)
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            entity_sets: RefCell::new(EntitySets::default()),
        }
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        // Entity metadata
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS submissions (
                entity_id TEXT PRIMARY KEY,
                cik TEXT NOT NULL,
                sic TEXT NOT NULL,
                name TEXT
            )",
            [],
        )?;

        // Raw tagged disclosure values, as fetched
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS observations (
                entity_id TEXT NOT NULL,
                tag TEXT NOT NULL,
                form TEXT NOT NULL,
                fiscal_year INTEGER NOT NULL,
                fiscal_period TEXT NOT NULL,
                filed TEXT NOT NULL,
                value REAL NOT NULL,
                unit TEXT NOT NULL,
                PRIMARY KEY (entity_id, tag, form, fiscal_year, fiscal_period, filed, unit)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_observations_form_tag ON observations(form, tag)",
            [],
        )?;

        for table in FeatureTable::ALL {
            self.create_feature_table(table)?;
        }

        Ok(())
    }

    fn create_feature_table(&self, table: FeatureTable) -> Result<()> {
        let name = table.table_name();
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {name} (
                    entity_id TEXT NOT NULL,
                    fiscal_year INTEGER NOT NULL,
                    fiscal_period TEXT NOT NULL,
                    filed TEXT NOT NULL,
                    name TEXT NOT NULL,
                    value REAL NOT NULL,
                    PRIMARY KEY (entity_id, fiscal_year, fiscal_period, name)
                )"
            ),
            [],
        )?;
        self.conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{name}_period
                 ON {name}(fiscal_year, fiscal_period, name)"
            ),
            [],
        )?;
        Ok(())
    }

    /// Drop and recreate a feature table.
    pub fn recreate_table(&self, table: FeatureTable) -> Result<()> {
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS {}", table.table_name()), [])?;
        self.create_feature_table(table)?;
        self.invalidate();
        Ok(())
    }

    /// Clear the memoized entity sets.
    pub fn invalidate(&self) {
        self.entity_sets.borrow_mut().sets.clear();
    }

    /// `PRAGMA data_version` only changes when another connection commits;
    /// writes through this connection call [`Self::invalidate`] instead.
    fn memoized(
        &self,
        key: String,
        query: impl FnOnce() -> Result<BTreeSet<String>>,
    ) -> Result<BTreeSet<String>> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA data_version", [], |row| row.get(0))?;
        {
            let mut memo = self.entity_sets.borrow_mut();
            if memo.data_version != Some(version) {
                memo.sets.clear();
                memo.data_version = Some(version);
            }
            if let Some(set) = memo.sets.get(&key) {
                return Ok(set.clone());
            }
        }

        let set = query()?;
        self.entity_sets.borrow_mut().sets.insert(key, set.clone());
        Ok(set)
    }

    /// Store entity metadata, replacing any previous record.
    pub fn put_submission(&self, submission: &Submission) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO submissions (entity_id, cik, sic, name)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                submission.entity_id,
                submission.cik,
                submission.sic,
                submission.name
            ],
        )?;
        self.invalidate();
        Ok(())
    }

    /// Get entity metadata.
    pub fn get_submission(&self, entity_id: &str) -> Result<Option<Submission>> {
        let result = self
            .conn
            .query_row(
                "SELECT entity_id, cik, sic, name FROM submissions WHERE entity_id = ?1",
                params![entity_id],
                |row| {
                    Ok(Submission {
                        entity_id: row.get(0)?,
                        cik: row.get(1)?,
                        sic: row.get(2)?,
                        name: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(result)
    }

    /// All entities with metadata, sorted.
    pub fn submitted_entities(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT entity_id FROM submissions ORDER BY entity_id")?;

        let entities = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(entities)
    }

    /// Store raw observations. Already-stored observations are ignored.
    ///
    /// Returns the number of new rows.
    pub fn put_observations(&self, observations: &[RawObservation]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO observations
                 (entity_id, tag, form, fiscal_year, fiscal_period, filed, value, unit)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for obs in observations {
                inserted += stmt.execute(params![
                    obs.entity_id,
                    obs.tag,
                    obs.form,
                    obs.fiscal_year,
                    obs.fiscal_period.as_str(),
                    obs.filed.to_string(),
                    obs.value,
                    obs.unit,
                ])?;
            }
        }

        tx.commit()?;
        self.invalidate();
        Ok(inserted)
    }

    /// Raw observations of an entity, ordered by period then filing date.
    pub fn observations(&self, entity_id: &str, range: DateRange) -> Result<Vec<RawObservation>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, fiscal_year, fiscal_period, filed, form, tag, value, unit
             FROM observations
             WHERE entity_id = ?1
               AND (?2 IS NULL OR filed >= ?2)
               AND (?3 IS NULL OR filed <= ?3)
             ORDER BY fiscal_year, fiscal_period, filed, tag",
        )?;

        let rows = stmt.query_map(
            params![entity_id, range.start_param(), range.end_param()],
            |row| {
                Ok(RawObservation {
                    entity_id: row.get(0)?,
                    fiscal_year: row.get(1)?,
                    fiscal_period: period_column(row, 2)?,
                    filed: date_column(row, 3)?,
                    form: row.get(4)?,
                    tag: row.get(5)?,
                    value: row.get(6)?,
                    unit: row.get(7)?,
                })
            },
        )?;

        let mut observations = Vec::new();
        for row in rows {
            observations.push(row?);
        }

        Ok(observations)
    }

    /// Entities whose raw observations of `form` contain at least `min_rows`
    /// rows for every tag.
    pub fn candidate_entities(
        &self,
        form: FormType,
        tags: &[&str],
        min_rows: usize,
    ) -> Result<BTreeSet<String>> {
        let key = format!("observations:{}:{}:{}", form, min_rows, tags.join(","));
        self.memoized(key, || {
            let values = vec![Value::Text(form.as_str().to_string())];
            self.entities_having("observations", "form = ?1", "tag", tags, min_rows, values)
        })
    }

    /// Entities in a feature table with at least `min_rows` rows of every
    /// named feature.
    pub fn entities_with_features(
        &self,
        table: FeatureTable,
        names: &[&str],
        min_rows: usize,
    ) -> Result<BTreeSet<String>> {
        let key = format!("{}:{}:{}", table, min_rows, names.join(","));
        self.memoized(key, || {
            self.entities_having(table.table_name(), "1 = 1", "name", names, min_rows, Vec::new())
        })
    }

    /// Entities of `from` grouped by entity whose `column` takes every value
    /// in `required` at least `min_rows` times.
    fn entities_having(
        &self,
        from: &str,
        filter: &str,
        column: &str,
        required: &[&str],
        min_rows: usize,
        mut values: Vec<Value>,
    ) -> Result<BTreeSet<String>> {
        let mut having = Vec::with_capacity(required.len());
        values.push(Value::Integer(min_rows as i64));
        let min_param = values.len();
        for item in required {
            values.push(Value::Text((*item).to_string()));
            having.push(format!("SUM({} = ?{}) >= ?{}", column, values.len(), min_param));
        }
        if having.is_empty() {
            having.push(format!("COUNT(*) >= ?{}", min_param));
        }

        let sql = format!(
            "SELECT entity_id FROM {from} WHERE {filter} GROUP BY entity_id HAVING {}",
            having.join(" AND ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entities = stmt
            .query_map(params_from_iter(values.iter()), |row| row.get(0))?
            .collect::<std::result::Result<BTreeSet<String>, _>>()?;

        debug!(table = from, count = entities.len(), "Queried entity set");
        Ok(entities)
    }

    /// Insert long-format feature rows in a single transaction.
    ///
    /// Rows colliding with stored rows fail the whole call with
    /// [`DataError::DuplicateWrite`] and nothing is written.
    pub fn insert_features(&self, table: FeatureTable, rows: &[FeatureRow]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        insert_feature_rows(&tx, table, rows)?;
        tx.commit()?;
        self.invalidate();
        Ok(rows.len())
    }

    /// Replace an entity's rows in a feature table.
    ///
    /// The delete and the insert share one transaction: if any row fails to
    /// insert, the entity's previous rows are kept.
    pub fn replace_features(
        &self,
        table: FeatureTable,
        entity_id: &str,
        rows: &[FeatureRow],
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let deleted = tx.execute(
            &format!("DELETE FROM {} WHERE entity_id = ?1", table.table_name()),
            params![entity_id],
        )?;
        insert_feature_rows(&tx, table, rows)?;
        tx.commit()?;
        self.invalidate();

        debug!(
            table = %table,
            entity = entity_id,
            deleted,
            written = rows.len(),
            "Replaced rows"
        );
        Ok(rows.len())
    }

    /// Feature rows of an entity, ordered by period, filing date and name.
    pub fn features(
        &self,
        table: FeatureTable,
        entity_id: &str,
        range: DateRange,
    ) -> Result<Vec<FeatureRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT entity_id, fiscal_year, fiscal_period, filed, name, value
             FROM {}
             WHERE entity_id = ?1
               AND (?2 IS NULL OR filed >= ?2)
               AND (?3 IS NULL OR filed <= ?3)
             ORDER BY fiscal_year, fiscal_period, filed, name",
            table.table_name()
        ))?;

        let rows = stmt.query_map(
            params![entity_id, range.start_param(), range.end_param()],
            feature_row,
        )?;

        let mut features = Vec::new();
        for row in rows {
            features.push(row?);
        }

        Ok(features)
    }

    /// Feature rows of every entity whose classification code starts with
    /// `prefix`.
    pub fn industry_features(
        &self,
        table: FeatureTable,
        prefix: &str,
        range: DateRange,
    ) -> Result<Vec<FeatureRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT f.entity_id, f.fiscal_year, f.fiscal_period, f.filed, f.name, f.value
             FROM {} f
             JOIN submissions s ON s.entity_id = f.entity_id
             WHERE substr(s.sic, 1, length(?1)) = ?1
               AND (?2 IS NULL OR f.filed >= ?2)
               AND (?3 IS NULL OR f.filed <= ?3)
             ORDER BY f.fiscal_year, f.fiscal_period, f.name, f.entity_id",
            table.table_name()
        ))?;

        let rows = stmt.query_map(
            params![prefix, range.start_param(), range.end_param()],
            feature_row,
        )?;

        let mut features = Vec::new();
        for row in rows {
            features.push(row?);
        }

        Ok(features)
    }

    /// Delete an entity's rows from a feature table.
    pub fn delete_features(&self, table: FeatureTable, entity_id: &str) -> Result<usize> {
        let deleted = self.conn.execute(
            &format!("DELETE FROM {} WHERE entity_id = ?1", table.table_name()),
            params![entity_id],
        )?;
        self.invalidate();
        Ok(deleted)
    }

    /// Per-period statistics of every feature across the entities whose
    /// classification code starts with `prefix`.
    ///
    /// The standard deviation is the sample deviation and is `None` for
    /// groups with a single member.
    pub fn industry_stats(
        &self,
        table: FeatureTable,
        prefix: &str,
        range: DateRange,
    ) -> Result<Vec<IndustryStat>> {
        let mut stmt = self.conn.prepare(&format!(
            "WITH members AS (
                SELECT f.fiscal_year, f.fiscal_period, f.filed, f.name, f.value
                FROM {} f
                JOIN submissions s ON s.entity_id = f.entity_id
                WHERE substr(s.sic, 1, length(?1)) = ?1
                  AND (?2 IS NULL OR f.filed >= ?2)
                  AND (?3 IS NULL OR f.filed <= ?3)
            ),
            groups AS (
                SELECT fiscal_year, fiscal_period, name,
                       AVG(value) AS mean, COUNT(*) AS n, MAX(filed) AS filed
                FROM members
                GROUP BY fiscal_year, fiscal_period, name
            )
            SELECT g.fiscal_year, g.fiscal_period, g.filed, g.name, g.mean, g.n,
                   SUM((m.value - g.mean) * (m.value - g.mean)) AS ss
            FROM groups g
            JOIN members m
              ON m.fiscal_year = g.fiscal_year
             AND m.fiscal_period = g.fiscal_period
             AND m.name = g.name
            GROUP BY g.fiscal_year, g.fiscal_period, g.name
            ORDER BY g.fiscal_year, g.fiscal_period, g.name",
            table.table_name()
        ))?;

        let rows = stmt.query_map(
            params![prefix, range.start_param(), range.end_param()],
            |row| {
                let count = row.get::<_, i64>(5)? as usize;
                let ss: f64 = row.get(6)?;
                Ok(IndustryStat {
                    code: prefix.to_string(),
                    fiscal_year: row.get(0)?,
                    fiscal_period: period_column(row, 1)?,
                    filed: date_column(row, 2)?,
                    name: row.get(3)?,
                    mean: row.get(4)?,
                    std: (count > 1).then(|| (ss / (count - 1) as f64).sqrt()),
                    count,
                })
            },
        )?;

        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?);
        }

        Ok(stats)
    }

    /// Most recent fiscal period holding a feature, optionally restricted to
    /// a year or a period.
    pub fn latest_period(
        &self,
        table: FeatureTable,
        name: &str,
        year: Option<i32>,
        period: Option<FiscalPeriod>,
    ) -> Result<Option<(i32, FiscalPeriod)>> {
        let result = self
            .conn
            .query_row(
                &format!(
                    "SELECT fiscal_year, fiscal_period FROM {}
                     WHERE name = ?1
                       AND (?2 IS NULL OR fiscal_year = ?2)
                       AND (?3 IS NULL OR fiscal_period = ?3)
                     ORDER BY fiscal_year DESC, fiscal_period DESC
                     LIMIT 1",
                    table.table_name()
                ),
                params![name, year, period.map(|p| p.as_str())],
                |row| Ok((row.get(0)?, period_column(row, 1)?)),
            )
            .optional()?;

        Ok(result)
    }

    /// Entities ordered by a feature's value within one fiscal period.
    ///
    /// Ties are broken by entity id.
    pub fn entities_sorted_by(
        &self,
        table: FeatureTable,
        name: &str,
        year: i32,
        period: FiscalPeriod,
        ascending: bool,
    ) -> Result<Vec<String>> {
        let order = if ascending { "ASC" } else { "DESC" };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT entity_id FROM {}
             WHERE name = ?1 AND fiscal_year = ?2 AND fiscal_period = ?3
             ORDER BY value {order}, entity_id",
            table.table_name()
        ))?;

        let entities = stmt
            .query_map(params![name, year, period.as_str()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(entities)
    }

    /// Get store statistics.
    pub fn get_stats(&self) -> Result<StoreStats> {
        let submissions: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))?;

        let observations: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;

        let mut features = Vec::with_capacity(FeatureTable::ALL.len());
        for table in FeatureTable::ALL {
            let (rows, entities): (i64, i64) = self.conn.query_row(
                &format!(
                    "SELECT COUNT(*), COUNT(DISTINCT entity_id) FROM {}",
                    table.table_name()
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            features.push(TableStats {
                table,
                rows: rows as usize,
                entities: entities as usize,
            });
        }

        Ok(StoreStats {
            submissions: submissions as usize,
            observations: observations as usize,
            features,
        })
    }
}

impl ClassificationLookup for SqliteStore {
    fn industry_code(&self, entity_id: &str) -> Result<String> {
        self.get_submission(entity_id)?
            .map(|s| s.sic)
            .ok_or_else(|| DataError::UnknownEntity(entity_id.to_string()))
    }
}

/// Insert feature rows inside an open transaction, mapping key collisions
/// to [`DataError::DuplicateWrite`].
fn insert_feature_rows(conn: &Connection, table: FeatureTable, rows: &[FeatureRow]) -> Result<()> {
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} (entity_id, fiscal_year, fiscal_period, filed, name, value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        table.table_name()
    ))?;
    for row in rows {
        stmt.execute(params![
            row.entity_id,
            row.fiscal_year,
            row.fiscal_period.as_str(),
            row.filed.to_string(),
            row.name,
            row.value,
        ])
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                DataError::DuplicateWrite {
                    entity: row.entity_id.clone(),
                    table: table.to_string(),
                }
            }
            other => DataError::Database(other),
        })?;
    }
    Ok(())
}

fn feature_row(row: &Row<'_>) -> rusqlite::Result<FeatureRow> {
    Ok(FeatureRow {
        entity_id: row.get(0)?,
        fiscal_year: row.get(1)?,
        fiscal_period: period_column(row, 2)?,
        filed: date_column(row, 3)?,
        name: row.get(4)?,
        value: row.get(5)?,
    })
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&row.get::<_, String>(idx)?, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn period_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<FiscalPeriod> {
    FiscalPeriod::parse(&row.get::<_, String>(idx)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Row counts of one feature table.
#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    /// Table counted
    pub table: FeatureTable,
    /// Number of long-format rows
    pub rows: usize,
    /// Number of distinct entities
    pub entities: usize,
}

/// Store statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Number of entities with metadata
    pub submissions: usize,
    /// Number of raw observations
    pub observations: usize,
    /// Per feature table counts
    pub features: Vec<TableStats>,
}
