// ********* Input data structures ***********

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;

/// The origin of a trip table.
///
/// The survey is the ground truth that model runs are calibrated against.
/// Both sides carry their own raw category codes and go through the same
/// normalization step.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Source {
    Model,
    Survey,
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Model => write!(f, "model"),
            Source::Survey => write!(f, "survey"),
        }
    }
}

/// One passenger trip, as supplied by the data-loading layer.
///
/// The loading layer is expected to have already restricted the table to
/// inbound, non-external trips. Records are consumed read-only; every
/// pipeline stage produces a new table.
#[derive(PartialEq, Debug, Clone)]
pub struct TripRecord {
    /// Raw source-specific airport access mode code (e.g. `RIDEHAIL_LOC1`
    /// on the model side, `tnc` on the survey side).
    pub access_mode: String,
    /// Raw trip mode code. Survey tables may leave this empty.
    pub trip_mode: String,
    /// Raw tour type / trip purpose code (e.g. `res_per1`, `vis_bus`).
    pub tour_type: String,
    pub inbound: bool,
    /// 1.0 per observed trip for survey data, an expansion weight for
    /// model data. Non-negative.
    pub weight: f64,
}

/// A trip record after normalization: the access mode is resolved into the
/// shared vocabulary and the tour type carries a shared detailed code.
#[derive(PartialEq, Debug, Clone)]
pub struct NormalizedTrip {
    pub access_mode: AccessMode,
    pub trip_mode: String,
    pub tour_type: String,
    pub inbound: bool,
    pub weight: f64,
}

// ******** Shared vocabularies *********

/// The eight canonical access modes that every comparison output uses.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum AccessMode {
    DropOff,
    ShuttleVan,
    PublicTransit,
    ParkedCar,
    RentalCar,
    RideHail,
    Taxi,
    Walk,
}

impl AccessMode {
    /// All the modes, in the order they appear in output tables.
    pub const ALL: [AccessMode; 8] = [
        AccessMode::DropOff,
        AccessMode::ShuttleVan,
        AccessMode::PublicTransit,
        AccessMode::ParkedCar,
        AccessMode::RentalCar,
        AccessMode::RideHail,
        AccessMode::Taxi,
        AccessMode::Walk,
    ];

    /// The display label used on charts and in summary files.
    pub fn label(&self) -> &'static str {
        match self {
            AccessMode::DropOff => "Drop-off/Pick-up",
            AccessMode::ShuttleVan => "Shared Shuttle Van",
            AccessMode::PublicTransit => "Public Transportation",
            AccessMode::ParkedCar => "Personal Car Parked",
            AccessMode::RentalCar => "Rental Car",
            AccessMode::RideHail => "UBER/Lyft",
            AccessMode::Taxi => "Taxi",
            AccessMode::Walk => "Walk",
        }
    }

    pub fn from_label(label: &str) -> Option<AccessMode> {
        AccessMode::ALL.iter().find(|m| m.label() == label).copied()
    }

    /// Position in [AccessMode::ALL]. Used to index per-stratum tallies.
    pub(crate) fn index(&self) -> usize {
        AccessMode::ALL.iter().position(|m| m == self).unwrap()
    }
}

impl Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The stratum label synthesized across all non-employee tour types.
/// Reserved: an input record must never carry it as a tour type.
pub const TOTAL_STRATUM: &str = "Total";

/// Canonical trip mode codes written by the model-side correction.
pub const TRIP_MODE_TAXI: &str = "TAXI";
pub const TRIP_MODE_TNC_SINGLE: &str = "TNC_SINGLE";
pub const TRIP_MODE_TNC_SHARED: &str = "TNC_SHARED";

/// Classifies a detailed tour type into its general rollup category.
///
/// Prefix rule: resident codes roll up to `resident`, visitor codes to
/// `visitor`, employee codes to `employee`. The `Total` sentinel maps to
/// itself. Anything else passes through unchanged; the permissive fallback
/// keeps survey categories alive that the mapping tables never list.
pub fn general_tour_type(tour_type: &str) -> String {
    if tour_type.starts_with("res") {
        "resident".to_string()
    } else if tour_type.starts_with("vis") {
        "visitor".to_string()
    } else if tour_type.starts_with("emp") {
        "employee".to_string()
    } else {
        tour_type.to_string()
    }
}

/// The stratification level of an aggregation run.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum TourTypeGranularity {
    /// By shared detailed tour type (`res_nb`, `vis_bus`, ...).
    Detailed,
    /// By general rollup category (`resident`, `visitor`).
    General,
}

// ******** Normalization tables *********

/// The hand-maintained tables that rewrite raw source codes into the shared
/// vocabulary.
///
/// The access-mode tables are per source and exhaustive: a raw code without
/// an entry fails normalization with [CalibrationError::UnmappedCategory].
/// The tour-type table only covers the model side; codes absent from it
/// pass through unchanged (survey tables already carry the shared codes).
///
/// The tables are plain data on purpose. Upstream taxonomies have disagreed
/// before on where ride-hail arrivals belong (a distinct UBER/Lyft category
/// versus folding into public transit), so the choice is configuration:
/// start from [Mappings::standard] and override entries with
/// [crate::builder::MappingsBuilder].
#[derive(PartialEq, Debug, Clone)]
pub struct Mappings {
    pub(crate) model_modes: HashMap<String, AccessMode>,
    pub(crate) survey_modes: HashMap<String, AccessMode>,
    pub(crate) tour_types: HashMap<String, String>,
}

impl Mappings {
    /// The standard tables: ride-hail arrivals keep the distinct UBER/Lyft
    /// label, transit-access legs (KNR_*, TNC_LOC/MIX/PRM, WALK_LOC/MIX/PRM)
    /// collapse into Public Transportation.
    pub fn standard() -> Mappings {
        let model_modes: HashMap<String, AccessMode> = [
            ("CURB_LOC1", AccessMode::DropOff),
            ("PARK_ESCORT", AccessMode::ParkedCar),
            ("PARK_LOC1", AccessMode::ParkedCar),
            ("PARK_LOC4", AccessMode::ParkedCar),
            ("PARK_LOC5", AccessMode::ParkedCar),
            ("HOTEL_COURTESY", AccessMode::ShuttleVan),
            ("SHUTTLEVAN", AccessMode::ShuttleVan),
            ("RENTAL", AccessMode::RentalCar),
            ("RIDEHAIL_LOC1", AccessMode::RideHail),
            ("TAXI_LOC1", AccessMode::Taxi),
            ("WALK", AccessMode::Walk),
            ("KNR_LOC", AccessMode::PublicTransit),
            ("KNR_MIX", AccessMode::PublicTransit),
            ("KNR_PRM", AccessMode::PublicTransit),
            ("TNC_LOC", AccessMode::PublicTransit),
            ("TNC_MIX", AccessMode::PublicTransit),
            ("TNC_PRM", AccessMode::PublicTransit),
            ("WALK_LOC", AccessMode::PublicTransit),
            ("WALK_MIX", AccessMode::PublicTransit),
            ("WALK_PRM", AccessMode::PublicTransit),
        ]
        .iter()
        .map(|(code, mode)| (code.to_string(), *mode))
        .collect();

        let survey_modes: HashMap<String, AccessMode> = [
            ("drop_off", AccessMode::DropOff),
            ("park_escort", AccessMode::ParkedCar),
            ("park_on_site", AccessMode::ParkedCar),
            ("park_off_site", AccessMode::ParkedCar),
            ("shuttle", AccessMode::ShuttleVan),
            ("rental_car", AccessMode::RentalCar),
            ("tnc", AccessMode::RideHail),
            ("taxi", AccessMode::Taxi),
            ("active_transportation", AccessMode::Walk),
            ("public_transit", AccessMode::PublicTransit),
        ]
        .iter()
        .map(|(code, mode)| (code.to_string(), *mode))
        .collect();

        let mut tour_types: HashMap<String, String> = [
            ("vis_per", "vis_nb"),
            ("vis_bus", "vis_bus"),
            ("emp", "emp"),
        ]
        .iter()
        .map(|(raw, shared)| (raw.to_string(), shared.to_string()))
        .collect();
        // The model splits resident tours into 8 person-type segments each.
        for segment in 1..=8 {
            tour_types.insert(format!("res_per{}", segment), "res_nb".to_string());
            tour_types.insert(format!("res_bus{}", segment), "res_bus".to_string());
        }

        Mappings {
            model_modes,
            survey_modes,
            tour_types,
        }
    }

    /// Resolves a raw access-mode code for the given source.
    pub fn resolve_mode(&self, source: Source, raw: &str) -> Result<AccessMode, CalibrationError> {
        let table = match source {
            Source::Model => &self.model_modes,
            Source::Survey => &self.survey_modes,
        };
        table
            .get(raw)
            .copied()
            .ok_or_else(|| CalibrationError::UnmappedCategory {
                source,
                code: raw.to_string(),
            })
    }

    /// Rewrites a raw tour-type code into its shared detailed code, or
    /// passes it through unchanged when the table has no entry.
    pub fn resolve_tour_type(&self, raw: &str) -> String {
        match self.tour_types.get(raw) {
            Some(shared) => shared.clone(),
            None => raw.to_string(),
        }
    }
}

// ******** Output data structures *********

/// One cell of an aggregated table: the summed weight and the share of its
/// stratum for a (stratum, mode) pair.
#[derive(PartialEq, Debug, Clone)]
pub struct AggregateRow {
    /// A detailed tour type, a general category, or [TOTAL_STRATUM].
    pub stratum: String,
    pub mode: AccessMode,
    /// Summed trip weight. Zero when the row was backfilled.
    pub metric: f64,
    /// `metric / stratum total * 100`; 0 when the stratum total is 0.
    pub pct: f64,
}

/// The result of one aggregation run.
#[derive(PartialEq, Debug, Clone)]
pub struct AggregateTables {
    pub rows: Vec<AggregateRow>,
    /// The general rollup, present only for detailed, non-employee runs.
    /// Returned alongside because the reconciler always needs both.
    pub general: Option<Vec<AggregateRow>>,
}

/// A model/survey pair joined on (stratum, mode).
///
/// The model side is `None` when the model produced no row for the key;
/// the consuming chart still renders the category, with an empty model bar.
/// Percentages are the aggregator's whole-population shares, never rescaled
/// after the join.
#[derive(PartialEq, Debug, Clone)]
pub struct ComparisonRow {
    pub stratum: String,
    pub mode: AccessMode,
    pub metric_model: Option<f64>,
    pub metric_survey: f64,
    pub pct_model: Option<f64>,
    pub pct_survey: f64,
}

/// Errors that abort a pipeline run.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum CalibrationError {
    /// A raw code has no entry in a normalization table. The mapping table
    /// is stale relative to the upstream data; passing the code through
    /// would silently corrupt downstream totals.
    UnmappedCategory { source: Source, code: String },
    /// A structural guarantee was broken (reserved stratum label in the
    /// input, duplicate aggregation key, double registration). Indicates a
    /// defect in an earlier stage.
    InvariantViolation { value: String },
    /// A registry lookup for an unknown scenario key. Recoverable: the
    /// presentation layer renders a "no data" state.
    NotFound { key: String },
}

impl Error for CalibrationError {}

impl Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationError::UnmappedCategory { source, code } => {
                write!(f, "unmapped {} access-mode code {:?}", source, code)
            }
            CalibrationError::InvariantViolation { value } => {
                write!(f, "invariant violation: {}", value)
            }
            CalibrationError::NotFound { key } => {
                write!(f, "no scenario registered under key {:?}", key)
            }
        }
    }
}
