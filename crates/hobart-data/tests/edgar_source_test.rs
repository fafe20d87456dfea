//! Integration tests for reading EDGAR documents from disk into a store

use chrono::NaiveDate;
use hobart_data::edgar::{CompanyFactsDir, concepts};
use hobart_data::{
    ClassificationLookup, DataError, DateRange, DisclosureSource, FiscalPeriod, FormType,
    SqliteStore,
};
use std::fs;
use std::path::Path;

const FACTS: &str = r#"{
    "cik": 37996,
    "entityName": "Ford Motor Co",
    "facts": {
        "us-gaap": {
            "AssetsCurrent": {
                "units": {
                    "USD": [
                        {"val": 100.0, "fy": 2021, "fp": "Q1", "form": "10-Q", "filed": "2021-04-28"},
                        {"val": 101.0, "fy": 2021, "fp": "Q1", "form": "10-Q/A", "filed": "2021-05-10"},
                        {"val": 110.0, "fy": 2021, "fp": "Q2", "form": "10-Q", "filed": "2021-07-28"},
                        {"val": 130.0, "fy": 2021, "fp": "FY", "form": "10-K", "filed": "2022-02-03"}
                    ]
                }
            },
            "EarningsPerShareBasic": {
                "units": {
                    "USD/shares": [
                        {"val": 0.5, "fy": 2021, "fp": "Q1", "form": "10-Q", "filed": "2021-04-28"}
                    ]
                }
            }
        }
    }
}"#;

const SUBMISSION: &str = r#"{"cik": "0000037996", "sic": "3711", "name": "FORD MOTOR CO"}"#;

fn write_docs(root: &Path) {
    fs::create_dir_all(root.join("facts")).unwrap();
    fs::create_dir_all(root.join("submissions")).unwrap();
    fs::write(root.join("facts").join("F.json"), FACTS).unwrap();
    fs::write(root.join("submissions").join("F.json"), SUBMISSION).unwrap();
    fs::write(root.join("facts").join("notes.txt"), "ignored").unwrap();
}

#[test]
fn test_company_facts_dir_source() {
    let dir = tempfile::tempdir().unwrap();
    write_docs(dir.path());
    let source = CompanyFactsDir::new(dir.path());

    assert_eq!(source.entities().unwrap(), vec!["F"]);

    let submission = source.submission("F").unwrap();
    assert_eq!(submission.sic, "3711");
    assert_eq!(submission.cik, "0000037996");

    let assets = source
        .observations("F", &concepts::ASSETS_CURRENT)
        .unwrap();
    assert_eq!(assets.len(), 4);

    let eps = source
        .observations("F", &concepts::EARNINGS_PER_SHARE_BASIC)
        .unwrap();
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].unit, "USD/shares");

    assert!(matches!(
        source.observations("GM", &concepts::ASSETS_CURRENT),
        Err(DataError::Io(_))
    ));
}

#[test]
fn test_observations_of_reads_every_concept() {
    let dir = tempfile::tempdir().unwrap();
    write_docs(dir.path());
    let source = CompanyFactsDir::new(dir.path());

    let rows = source.observations_of("F", &concepts::POPULAR).unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(
        rows.iter().filter(|o| o.tag == "EarningsPerShareBasic").count(),
        1
    );

    // Concepts absent from the document contribute nothing
    let rows = source
        .observations_of("F", &[concepts::INVENTORY_NET])
        .unwrap();
    assert!(rows.is_empty());

    // A missing document fails the entity as a whole
    assert!(matches!(
        source.observations_of("GM", &concepts::POPULAR),
        Err(DataError::Io(_))
    ));
}

#[test]
fn test_source_into_store() {
    let dir = tempfile::tempdir().unwrap();
    write_docs(dir.path());
    let source = CompanyFactsDir::new(dir.path());
    let store = SqliteStore::new(dir.path().join("hobart.db")).unwrap();

    store.put_submission(&source.submission("F").unwrap()).unwrap();
    let rows = source.observations_of("F", &concepts::POPULAR).unwrap();
    assert_eq!(store.put_observations(&rows).unwrap(), 5);

    assert_eq!(store.industry_code("F").unwrap(), "3711");

    let stored = store.observations("F", DateRange::all()).unwrap();
    assert_eq!(stored.len(), 5);
    assert_eq!(stored[0].fiscal_period, FiscalPeriod::Q1);

    let range = DateRange::between(
        NaiveDate::from_ymd_opt(2021, 7, 1).unwrap(),
        NaiveDate::from_ymd_opt(2021, 12, 31).unwrap(),
    );
    let stored = store.observations("F", range).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].value, 110.0);

    // The 10-Q/A amendment does not count toward quarterly candidates
    let candidates = store
        .candidate_entities(FormType::Quarterly, &["AssetsCurrent"], 2)
        .unwrap();
    assert!(candidates.contains("F"));
    let candidates = store
        .candidate_entities(FormType::Quarterly, &["AssetsCurrent"], 3)
        .unwrap();
    assert!(candidates.is_empty());

    let stats = store.get_stats().unwrap();
    assert_eq!(stats.submissions, 1);
    assert_eq!(stats.observations, 5);
}
