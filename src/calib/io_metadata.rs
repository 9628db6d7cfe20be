// Reads the optional per-scenario metadata file.

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::Deserialize;
use snafu::prelude::*;

use trip_calibration::ScenarioMetadata;

use crate::calib::{io_common::simplify_file_name, *};

/// On-disk shape of `scenario.json` inside a scenario directory.
#[derive(Debug, Clone, Deserialize)]
struct MetadataFile {
    scenario_id: i64,
    scenario_name: String,
    scenario_year: Option<i32>,
}

/// Reads `<dir>/scenario.json`. A missing file is not an error: model runs
/// are routinely compared before their metadata lands in the catalog, so the
/// sentinel fallback is used instead.
pub fn read_scenario_metadata(dir: &Path) -> CalibResult<ScenarioMetadata> {
    let path = dir.join("scenario.json");
    if !path.exists() {
        let dir_name = simplify_file_name(&dir.display().to_string());
        info!(
            "No scenario.json under {:?}, using fallback metadata",
            dir.display().to_string()
        );
        return Ok(ScenarioMetadata::fallback(&dir_name));
    }
    let contents = fs::read_to_string(&path).context(OpeningJsonSnafu {})?;
    let parsed: MetadataFile = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    debug!("read_scenario_metadata: {:?}", parsed);
    Ok(ScenarioMetadata {
        scenario_id: parsed.scenario_id,
        scenario_name: parsed.scenario_name,
        scenario_year: parsed.scenario_year,
    })
}
