//! Seams to the external collaborators of the feature pipeline.

use crate::error::Result;
use crate::types::{Concept, RawObservation, Submission};
use tracing::debug;

/// Supplier of raw disclosure records.
///
/// Implementations may fail or return nothing for a concept; callers treat
/// either as "no data for this tag".
pub trait DisclosureSource: Send + Sync {
    /// Metadata for an entity, including its classification code.
    fn submission(&self, entity_id: &str) -> Result<Submission>;

    /// All observations of one concept for an entity.
    fn observations(&self, entity_id: &str, concept: &Concept) -> Result<Vec<RawObservation>>;

    /// Observations of several concepts for an entity.
    ///
    /// A concept the source fails on contributes no rows. Sources that keep
    /// all of an entity's concepts in one document override this to read it
    /// once.
    fn observations_of(
        &self,
        entity_id: &str,
        concepts: &[Concept],
    ) -> Result<Vec<RawObservation>> {
        let mut observations = Vec::new();
        for concept in concepts {
            match self.observations(entity_id, concept) {
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

/// Resolves an entity to its industry classification code.
pub trait ClassificationLookup {
    /// Full classification code (a string of digits).
    fn industry_code(&self, entity_id: &str) -> Result<String>;
}
