//! SEC "companyfacts" and "submissions" JSON documents.
//!
//! The SEC publishes every XBRL fact of a company at
//! `https://data.sec.gov/api/xbrl/companyfacts/CIK{cik_padded}.json` and its
//! metadata (including the SIC code) at
//! `https://data.sec.gov/submissions/CIK{cik_padded}.json`.

use crate::error::{DataError, Result};
use crate::source::DisclosureSource;
use crate::types::{Concept, FiscalPeriod, RawObservation, Submission};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Parsed companyfacts document for one company.
#[derive(Debug, Clone)]
pub struct CompanyFacts {
    /// CIK, zero-padded to 10 digits
    pub cik: String,
    /// Registered name
    pub entity_name: String,
    facts: HashMap<String, HashMap<String, ConceptData>>,
}

impl CompanyFacts {
    /// Parse a companyfacts JSON document.
    pub fn parse_json(json: &str) -> Result<Self> {
        let response: CompanyFactsResponse = serde_json::from_str(json)
            .map_err(|e| DataError::Parse(format!("Failed to parse SEC JSON: {}", e)))?;

        Ok(Self {
            cik: pad_cik(&response.cik)?,
            entity_name: response.entity_name,
            facts: response.facts,
        })
    }

    /// Observations of one concept, attributed to `entity_id`.
    ///
    /// Facts without a fiscal year, fiscal period, form or filing date, or
    /// with a fiscal period outside `Q1..Q4`/`FY`, are not observations of a
    /// reporting period and are skipped.
    pub fn observations(&self, entity_id: &str, concept: &Concept) -> Result<Vec<RawObservation>> {
        let Some(values) = self
            .facts
            .get(concept.taxonomy)
            .and_then(|taxonomy| taxonomy.get(concept.tag))
            .and_then(|data| data.units.get(concept.unit))
        else {
            return Ok(Vec::new());
        };

        let mut observations = Vec::with_capacity(values.len());
        for fact in values {
            let (Some(fy), Some(fp), Some(form), Some(filed)) =
                (fact.fy, &fact.fp, &fact.form, &fact.filed)
            else {
                continue;
            };
            let Ok(fiscal_period) = FiscalPeriod::parse(fp) else {
                continue;
            };
            let filed = NaiveDate::parse_from_str(filed, "%Y-%m-%d")
                .map_err(|e| DataError::Parse(format!("Invalid filed date: {}", e)))?;

            observations.push(RawObservation {
                entity_id: entity_id.to_string(),
                fiscal_year: fy,
                fiscal_period,
                filed,
                form: form.clone(),
                tag: concept.tag.to_string(),
                value: fact.val,
                unit: concept.unit.to_string(),
            });
        }

        Ok(observations)
    }
}

/// Parse a submissions JSON document into entity metadata.
pub fn parse_submission(entity_id: &str, json: &str) -> Result<Submission> {
    let response: SubmissionsResponse = serde_json::from_str(json)
        .map_err(|e| DataError::Parse(format!("Failed to parse SEC submissions JSON: {}", e)))?;

    let sic = response
        .sic
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DataError::missing(entity_id, "submission has no SIC code"))?;

    Ok(Submission {
        entity_id: entity_id.to_string(),
        cik: pad_cik(&response.cik)?,
        sic,
        name: response.name,
    })
}

/// Pad a CIK to 10 digits. The SEC serves it as a number or a string.
fn pad_cik(cik: &serde_json::Value) -> Result<String> {
    let digits = match cik {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => return Err(DataError::Parse(format!("Invalid CIK: {}", other))),
    };
    Ok(format!("{:0>10}", digits))
}

/// Directory of downloaded EDGAR documents.
///
/// Layout: `<root>/facts/<ENTITY>.json` (companyfacts) and
/// `<root>/submissions/<ENTITY>.json` (submissions).
#[derive(Debug, Clone)]
pub struct CompanyFactsDir {
    root: PathBuf,
}

impl CompanyFactsDir {
    /// Create a source rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Entities with a companyfacts document, sorted.
    pub fn entities(&self) -> Result<Vec<String>> {
        let mut entities = Vec::new();
        for entry in std::fs::read_dir(self.root.join("facts"))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                entities.push(stem.to_string());
            }
        }
        entities.sort();
        Ok(entities)
    }

    /// Load and parse the companyfacts document of an entity.
    pub fn company_facts(&self, entity_id: &str) -> Result<CompanyFacts> {
        let path = self.root.join("facts").join(format!("{}.json", entity_id));
        let json = std::fs::read_to_string(path)?;
        CompanyFacts::parse_json(&json)
    }
}

impl DisclosureSource for CompanyFactsDir {
    fn submission(&self, entity_id: &str) -> Result<Submission> {
        let path = self
            .root
            .join("submissions")
            .join(format!("{}.json", entity_id));
        let json = std::fs::read_to_string(path)?;
        parse_submission(entity_id, &json)
    }

    fn observations(&self, entity_id: &str, concept: &Concept) -> Result<Vec<RawObservation>> {
        self.company_facts(entity_id)?
            .observations(entity_id, concept)
    }

    fn observations_of(
        &self,
        entity_id: &str,
        concepts: &[Concept],
    ) -> Result<Vec<RawObservation>> {
        let facts = self.company_facts(entity_id)?;

        let mut observations = Vec::new();
        for concept in concepts {
            match facts.observations(entity_id, concept) {
                Ok(rows) => observations.extend(rows),
                Err(e) => {
                    debug!(
                        entity = entity_id,
                        tag = concept.tag,
                        error = %e,
                        "No data for concept"
                    );
                }
            }
        }
        Ok(observations)
    }
}

// SEC API JSON structure
// Based on: https://www.sec.gov/edgar/sec-api-documentation

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompanyFactsResponse {
    cik: serde_json::Value,
    entity_name: String,
    facts: HashMap<String, HashMap<String, ConceptData>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ConceptData {
    units: HashMap<String, Vec<FactData>>,
}

#[derive(Debug, Clone, Deserialize)]
struct FactData {
    val: f64,
    #[serde(default)]
    fy: Option<i32>,
    #[serde(default)]
    fp: Option<String>,
    #[serde(default)]
    form: Option<String>,
    #[serde(default)]
    filed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmissionsResponse {
    cik: serde_json::Value,
    #[serde(default)]
    sic: Option<String>,
    #[serde(default)]
    name: Option<String>,
}
