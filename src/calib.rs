use log::{info, warn};

use snafu::{prelude::*, Snafu};
use trip_calibration::*;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::calib::config_reader::*;

pub mod io_common;
pub mod io_csv;
pub mod io_excel;
pub mod io_metadata;

#[derive(Debug, Snafu)]
pub enum CalibError {
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading CSV line {lineno}"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Missing column {column} in {path}"))]
    MissingColumn { column: String, path: String },
    #[snafu(display("CSV line {lineno} is too short"))]
    CsvLineTooShort { lineno: usize },
    #[snafu(display("Bad numeric or boolean value at line {lineno}"))]
    BadCellValue { lineno: usize },
    #[snafu(display("Error opening Excel file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display(""))]
    EmptyExcel {},
    #[snafu(display(""))]
    OpeningJson { source: std::io::Error },
    #[snafu(display(""))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display(""))]
    MissingParentDir {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CalibResult<T> = Result<T, CalibError>;

pub mod config_reader {
    use crate::calib::*;

    /// One trip table on disk.
    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct FileSource {
        /// `csv` or `excel`.
        pub provider: String,
        #[serde(rename = "filePath")]
        pub file_path: String,
        /// For Excel-based inputs, the name of the worksheet to use.
        /// Defaults to the first worksheet.
        #[serde(rename = "worksheetName")]
        pub worksheet_name: Option<String>,
    }

    /// One model run to register against the survey.
    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct ScenarioSource {
        pub key: String,
        #[serde(rename = "dirPath")]
        pub dir_path: String,
        /// Name of the trip table inside the scenario directory.
        #[serde(rename = "tripFile")]
        pub trip_file: Option<String>,
    }

    /// Overrides applied on top of the standard normalization tables.
    /// Values are shared-vocabulary display labels (e.g. "UBER/Lyft").
    #[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
    pub struct ModeOverrides {
        pub model: Option<HashMap<String, String>>,
        pub survey: Option<HashMap<String, String>>,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct DashConfig {
        #[serde(rename = "surveySource")]
        pub survey_source: FileSource,
        pub scenarios: Vec<ScenarioSource>,
        #[serde(rename = "modeOverrides")]
        pub mode_overrides: Option<ModeOverrides>,
    }

    pub fn parse_config(contents: &str) -> CalibResult<DashConfig> {
        serde_json::from_str(contents).context(ParsingJsonSnafu {})
    }

    pub fn read_config(path: &str) -> CalibResult<DashConfig> {
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu {})?;
        parse_config(contents.as_str())
    }

    pub fn read_summary(path: String) -> CalibResult<JSValue> {
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu {})?;
        let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        Ok(js)
    }
}

/// Resolves the configured label overrides into normalization tables.
pub fn build_mappings(overrides: &Option<ModeOverrides>) -> CalibResult<Mappings> {
    let mut builder = builder::MappingsBuilder::new();
    if let Some(ov) = overrides {
        for (raw, label) in ov.model.clone().unwrap_or_default() {
            let mode = match AccessMode::from_label(label.as_str()) {
                Some(m) => m,
                None => whatever!("Unknown access-mode label {:?} in modeOverrides.model", label),
            };
            builder = builder.model_mode(raw.as_str(), mode);
        }
        for (raw, label) in ov.survey.clone().unwrap_or_default() {
            let mode = match AccessMode::from_label(label.as_str()) {
                Some(m) => m,
                None => whatever!("Unknown access-mode label {:?} in modeOverrides.survey", label),
            };
            builder = builder.survey_mode(raw.as_str(), mode);
        }
    }
    Ok(builder.build())
}

fn read_trip_table(root: &Path, source: &FileSource) -> CalibResult<Vec<TripRecord>> {
    let p: PathBuf = [root.to_path_buf(), PathBuf::from(source.file_path.clone())]
        .iter()
        .collect();
    let p2 = p.as_path().display().to_string();
    info!("Attempting to read trip table {:?}", p2);
    match source.provider.as_str() {
        "csv" => io_csv::read_trip_csv(&p2),
        "excel" => io_excel::read_trip_excel(&p2, &source.worksheet_name),
        x => whatever!("Provider not implemented {:?}", x),
    }
}

fn load_scenario(
    root: &Path,
    registry: &mut ScenarioRegistry,
    scenario: &ScenarioSource,
) -> CalibResult<()> {
    let dir: PathBuf = [root.to_path_buf(), PathBuf::from(scenario.dir_path.clone())]
        .iter()
        .collect();
    let trip_file = scenario
        .trip_file
        .clone()
        .unwrap_or_else(|| "final_trips.csv".to_string());
    let trip_path = dir.join(trip_file).display().to_string();
    let records = io_csv::read_trip_csv(&trip_path)?;
    let metadata = io_metadata::read_scenario_metadata(&dir)?;

    match registry.register(&scenario.key, &records, metadata) {
        Result::Ok(()) => Ok(()),
        Result::Err(e) => whatever!("Pipeline error for scenario {:?}: {}", scenario.key, e),
    }
}

fn comparison_rows_to_json(rows: &[ComparisonRow]) -> Vec<JSValue> {
    rows.iter()
        .map(|r| {
            json!({
                "stratum": r.stratum,
                "accessMode": r.mode.label(),
                "modelTrips": r.metric_model,
                "surveyTrips": r.metric_survey,
                "modelPct": r.pct_model,
                "surveyPct": r.pct_survey,
            })
        })
        .collect()
}

fn build_summary_js(registry: &ScenarioRegistry) -> CalibResult<JSValue> {
    let mut scenarios: Vec<JSValue> = Vec::new();
    for key in registry.keys() {
        let entry = match registry.get(key) {
            Result::Ok(e) => e,
            Result::Err(e) => whatever!("Registry error: {}", e),
        };
        scenarios.push(json!({
            "key": key,
            "metadata": {
                "scenarioId": entry.metadata.scenario_id,
                "scenarioName": entry.metadata.scenario_name,
                "scenarioYear": entry.metadata.scenario_year,
            },
            "detailed": comparison_rows_to_json(&entry.detailed),
            "general": comparison_rows_to_json(&entry.general),
            "employee": comparison_rows_to_json(&entry.employee),
        }));
    }
    Ok(json!({ "scenarios": scenarios }))
}

/// Loads the survey and every configured scenario, then writes the
/// comparison summary.
///
/// A scenario that fails to load or to go through the pipeline is logged
/// and skipped; the remaining scenarios are still compared. Errors on the
/// survey side are fatal, since every comparison is anchored on it.
pub fn run_dashboard(
    config_path: String,
    out_path: Option<String>,
    check_summary_path: Option<String>,
) -> CalibResult<()> {
    let config = read_config(config_path.as_str())?;
    info!("config: {:?}", config);
    let root = Path::new(config_path.as_str())
        .parent()
        .context(MissingParentDirSnafu {})?;

    let mappings = build_mappings(&config.mode_overrides)?;
    let survey_records = read_trip_table(root, &config.survey_source)?;
    info!("Read {} survey records", survey_records.len());

    let mut registry = match ScenarioRegistry::new(&survey_records, mappings) {
        Result::Ok(r) => r,
        Result::Err(e) => whatever!("Survey pipeline error: {}", e),
    };

    for scenario in config.scenarios.iter() {
        if let Err(e) = load_scenario(root, &mut registry, scenario) {
            warn!("Skipping scenario {:?}: {}", scenario.key, e);
        }
    }

    let summary = build_summary_js(&registry)?;
    let pretty_js_summary = serde_json::to_string_pretty(&summary).context(ParsingJsonSnafu {})?;
    match out_path.as_deref() {
        None | Some("stdout") => println!("{}", pretty_js_summary),
        Some(path) => fs::write(path, &pretty_js_summary).context(OpeningJsonSnafu {})?,
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_summary {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_summary.as_ref(),
                "\n",
            );
            whatever!("Difference detected between computed summary and reference summary")
        }
    }

    Ok(())
}
