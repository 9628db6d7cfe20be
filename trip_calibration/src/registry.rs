use log::{debug, info};

use std::collections::HashMap;

use crate::config::*;
use crate::{aggregate, normalize, reconcile};

/// Descriptive metadata attached to a registered scenario.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ScenarioMetadata {
    pub scenario_id: i64,
    pub scenario_name: String,
    pub scenario_year: Option<i32>,
}

impl ScenarioMetadata {
    /// The sentinel id used when a scenario directory has no metadata file.
    pub const FALLBACK_ID: i64 = 999;

    /// The defaults applied when the metadata reader finds nothing: the
    /// sentinel id and the directory base name. Missing metadata is not an
    /// error.
    pub fn fallback(dir_name: &str) -> ScenarioMetadata {
        ScenarioMetadata {
            scenario_id: ScenarioMetadata::FALLBACK_ID,
            scenario_name: dir_name.to_string(),
            scenario_year: None,
        }
    }
}

/// The comparison tables computed for one scenario, immutable once built.
#[derive(PartialEq, Debug, Clone)]
pub struct ScenarioEntry {
    pub metadata: ScenarioMetadata,
    /// Model vs. survey by detailed tour type, with a Total stratum.
    pub detailed: Vec<ComparisonRow>,
    /// Model vs. survey by general category, with a Total stratum.
    pub general: Vec<ComparisonRow>,
    /// Model vs. survey for employee trips only, no Total stratum.
    pub employee: Vec<ComparisonRow>,
}

/// Holds the pre-aggregated survey baseline and one [ScenarioEntry] per
/// registered model run.
///
/// The survey is normalized and aggregated exactly once, at construction.
/// Each `register` call runs the full pipeline for that scenario's model
/// records against the cached survey tables; results live for the registry's
/// lifetime. Registration is expected to finish before lookups start; after
/// that the registry is read-only shared state.
pub struct ScenarioRegistry {
    mappings: Mappings,
    survey_detailed: Vec<AggregateRow>,
    survey_general: Vec<AggregateRow>,
    survey_employee: Vec<AggregateRow>,
    entries: HashMap<String, ScenarioEntry>,
}

impl ScenarioRegistry {
    /// Builds a registry around one survey table.
    pub fn new(
        survey_records: &[TripRecord],
        mappings: Mappings,
    ) -> Result<ScenarioRegistry, CalibrationError> {
        info!(
            "registry: building survey baseline from {} records",
            survey_records.len()
        );
        let normalized = normalize(survey_records, Source::Survey, &mappings)?;
        let tables = aggregate(&normalized, TourTypeGranularity::Detailed, false)?;
        let employee = aggregate(&normalized, TourTypeGranularity::Detailed, true)?;
        let general = tables.general.ok_or_else(|| CalibrationError::InvariantViolation {
            value: "detailed aggregation returned no general rollup".to_string(),
        })?;
        Ok(ScenarioRegistry {
            mappings,
            survey_detailed: tables.rows,
            survey_general: general,
            survey_employee: employee.rows,
            entries: HashMap::new(),
        })
    }

    /// Runs the pipeline for one scenario's model records and caches the
    /// comparison tables under `key`.
    ///
    /// Entries are write-once: registering an existing key fails with
    /// [CalibrationError::InvariantViolation]. A failed registration leaves
    /// the registry unchanged; other scenarios are unaffected.
    pub fn register(
        &mut self,
        key: &str,
        model_records: &[TripRecord],
        metadata: ScenarioMetadata,
    ) -> Result<(), CalibrationError> {
        if self.entries.contains_key(key) {
            return Err(CalibrationError::InvariantViolation {
                value: format!("scenario {:?} is already registered", key),
            });
        }
        info!(
            "registry: registering scenario {:?} ({} model records)",
            key,
            model_records.len()
        );
        let normalized = normalize(model_records, Source::Model, &self.mappings)?;
        let tables = aggregate(&normalized, TourTypeGranularity::Detailed, false)?;
        let employee = aggregate(&normalized, TourTypeGranularity::Detailed, true)?;
        let general = tables.general.ok_or_else(|| CalibrationError::InvariantViolation {
            value: "detailed aggregation returned no general rollup".to_string(),
        })?;

        let entry = ScenarioEntry {
            metadata,
            detailed: reconcile(&tables.rows, &self.survey_detailed)?,
            general: reconcile(&general, &self.survey_general)?,
            employee: reconcile(&employee.rows, &self.survey_employee)?,
        };
        debug!(
            "registry: scenario {:?} -> {} detailed, {} general, {} employee rows",
            key,
            entry.detailed.len(),
            entry.general.len(),
            entry.employee.len()
        );
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    /// Looks up a registered scenario. An unknown key is recoverable: the
    /// caller renders a "no data" state instead of failing.
    pub fn get(&self, key: &str) -> Result<&ScenarioEntry, CalibrationError> {
        self.entries
            .get(key)
            .ok_or_else(|| CalibrationError::NotFound {
                key: key.to_string(),
            })
    }

    /// The registered scenario keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        keys
    }
}
