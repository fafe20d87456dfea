//! Integration tests for installing a directory of EDGAR documents

use chrono::NaiveDate;
use hobart::data::edgar::CompanyFactsDir;
use hobart::data::{DateRange, FeatureTable};
use hobart::features::{FEATURE_COLUMNS, FeatureSet, FeatureStore, IndustryLevel};
use hobart::{InstallConfig, Installer, StoreConfig};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::Path;

const QUARTERS: [(&str, &str); 3] = [
    ("Q1", "2021-05-01"),
    ("Q2", "2021-08-01"),
    ("Q3", "2021-11-01"),
];

/// Companyfacts document where concept `k` grows by `growth * (k + 1)` a quarter.
fn company_facts(base: f64, growth: f64) -> String {
    let mut taxonomies: Map<String, Value> = Map::new();
    for (k, concept) in FeatureSet::Quarterly.concepts().iter().enumerate() {
        let facts: Vec<Value> = QUARTERS
            .iter()
            .enumerate()
            .map(|(q, (fp, filed))| {
                json!({
                    "val": base * (k + 1) as f64 * (1.0 + growth * (k + 1) as f64 * q as f64),
                    "fy": 2021,
                    "fp": fp,
                    "form": "10-Q",
                    "filed": filed,
                })
            })
            .collect();

        let taxonomy = taxonomies
            .entry(concept.taxonomy.to_string())
            .or_insert_with(|| json!({}));
        taxonomy[concept.tag] = json!({ "units": { concept.unit: facts } });
    }

    json!({ "cik": 1, "entityName": "Test Co", "facts": taxonomies }).to_string()
}

fn write_entity(root: &Path, entity: &str, sic: &str, base: f64, growth: f64) {
    fs::write(
        root.join("facts").join(format!("{}.json", entity)),
        company_facts(base, growth),
    )
    .unwrap();
    fs::write(
        root.join("submissions").join(format!("{}.json", entity)),
        json!({ "cik": "1", "sic": sic }).to_string(),
    )
    .unwrap();
}

fn edgar_dir(root: &Path) -> CompanyFactsDir {
    fs::create_dir_all(root.join("facts")).unwrap();
    fs::create_dir_all(root.join("submissions")).unwrap();
    write_entity(root, "F", "3711", 10.0, 0.05);
    write_entity(root, "GM", "3712", 14.0, 0.10);
    write_entity(root, "TSLA", "3711", 6.0, 0.20);
    write_entity(root, "KR", "5411", 9.0, 0.02);
    // Companyfacts without a submission
    fs::write(root.join("facts").join("ORPHAN.json"), company_facts(5.0, 0.1)).unwrap();
    CompanyFactsDir::new(root)
}

fn config(workers: usize) -> InstallConfig {
    InstallConfig {
        workers,
        level: IndustryLevel::MajorGroup,
        min_rows: 1,
        recreate_tables: false,
        range: DateRange::all(),
    }
}

#[test]
fn test_full_install() {
    let dir = tempfile::tempdir().unwrap();
    let source = edgar_dir(&dir.path().join("edgar"));
    let store = StoreConfig::new(dir.path().join("db").join("hobart.db"));
    let entities = source.entities().unwrap();
    assert_eq!(entities.len(), 5);

    let installer = Installer::new(store.clone(), FeatureSet::Quarterly, config(3)).unwrap();

    let observations = installer.install_observations(&source, &entities).unwrap();
    assert_eq!(observations.attempted, 5);
    assert_eq!(observations.installed, 4);
    assert_eq!(observations.skipped, 1);
    assert_eq!(observations.rows, 4 * 7 * 3);

    let features = installer.install_features(None).unwrap();
    assert_eq!(features.installed, 4);
    assert_eq!(features.rows, 4 * 3 * FEATURE_COLUMNS.len());

    // KR is alone in its major group and normalizes to nothing
    let normalized = installer.install_normalized(None).unwrap();
    assert_eq!(normalized.attempted, 4);
    assert_eq!(normalized.installed, 3);
    assert_eq!(normalized.skipped, 1);

    let db = store.open().unwrap();
    let stored = FeatureStore::new(&db, FeatureTable::NormalizedQuarterly)
        .entities(1)
        .unwrap();
    assert_eq!(
        stored.into_iter().collect::<Vec<_>>(),
        vec!["F", "GM", "TSLA"]
    );
}

#[test]
fn test_reinstall_replaces_rows() {
    let dir = tempfile::tempdir().unwrap();
    let source = edgar_dir(&dir.path().join("edgar"));
    let store = StoreConfig::new(dir.path().join("hobart.db"));
    let entities = source.entities().unwrap();

    let installer = Installer::new(store.clone(), FeatureSet::Quarterly, config(2)).unwrap();
    installer.install_observations(&source, &entities).unwrap();
    let first = installer.install_features(None).unwrap();

    // Rerunning writes nothing new to the raw table and replaces features
    assert_eq!(installer.install_observations(&source, &entities).unwrap().rows, 0);
    let second = installer.install_features(None).unwrap();
    assert_eq!(first, second);

    let db = store.open().unwrap();
    let stats = db.get_stats().unwrap();
    let quarterly = stats
        .features
        .iter()
        .find(|t| t.table == FeatureTable::Quarterly)
        .unwrap();
    assert_eq!(quarterly.rows, first.rows);
}

#[test]
fn test_restricted_install() {
    let dir = tempfile::tempdir().unwrap();
    let source = edgar_dir(&dir.path().join("edgar"));
    let store = StoreConfig::new(dir.path().join("hobart.db"));
    let entities = source.entities().unwrap();

    let installer = Installer::new(
        store,
        FeatureSet::Quarterly,
        InstallConfig {
            recreate_tables: true,
            ..config(1)
        },
    )
    .unwrap();
    installer.install_observations(&source, &entities).unwrap();

    let only = vec!["GM".to_string(), "UNKNOWN".to_string()];
    let report = installer.install_features(Some(only.as_slice())).unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.installed, 1);

    // The annual set needs 10-K filings, which the documents lack
    let annual = Installer::new(
        StoreConfig::new(dir.path().join("hobart.db")),
        FeatureSet::Annual,
        config(1),
    )
    .unwrap();
    assert_eq!(annual.install_features(None).unwrap().attempted, 0);
}

#[test]
fn test_empty_rerun_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let source = edgar_dir(&dir.path().join("edgar"));
    let store = StoreConfig::new(dir.path().join("hobart.db"));
    let entities = source.entities().unwrap();

    let installer = Installer::new(store.clone(), FeatureSet::Quarterly, config(2)).unwrap();
    installer.install_observations(&source, &entities).unwrap();
    installer.install_features(None).unwrap();
    installer.install_normalized(None).unwrap();

    // Nothing was filed after 2030, so every entity fails and keeps its rows
    let later = Installer::new(
        store.clone(),
        FeatureSet::Quarterly,
        InstallConfig {
            range: DateRange {
                start: NaiveDate::from_ymd_opt(2030, 1, 1),
                end: None,
            },
            ..config(2)
        },
    )
    .unwrap();
    let features = later.install_features(None).unwrap();
    assert_eq!(features.installed, 0);
    let normalized = later.install_normalized(None).unwrap();
    assert_eq!(normalized.installed, 0);

    let db = store.open().unwrap();
    let refined = FeatureStore::new(&db, FeatureTable::Quarterly)
        .read("F", DateRange::all())
        .unwrap();
    assert_eq!(refined.height(), 3);
    let stored = FeatureStore::new(&db, FeatureTable::NormalizedQuarterly)
        .entities(1)
        .unwrap();
    assert!(stored.contains("F"));
    assert_eq!(stored.len(), 3);
}
