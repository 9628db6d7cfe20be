use std::path::Path;

use trip_calibration::TripRecord;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

/// Accepts the boolean spellings seen across trip-table exports.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "True" | "true" | "TRUE" | "1" => Some(true),
        "False" | "false" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_weight(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

/// Only inbound (airport-bound) trips of non-external tours take part in
/// the comparison. Applied at load time, once per source.
pub fn keep_record(record: &TripRecord) -> bool {
    record.inbound && record.tour_type != "external"
}
