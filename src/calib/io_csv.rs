// Primitives for reading trip tables from CSV files.

use std::collections::HashMap;

use log::debug;
use snafu::prelude::*;

use trip_calibration::TripRecord;

use crate::calib::{io_common::keep_record, *};

/// Column positions resolved from a header row by name.
///
/// `trip_mode` is optional: survey exports do not always carry it, and the
/// normalization step only consults it on the model side.
#[derive(Debug, Clone)]
pub struct TripColumns {
    pub access_mode: usize,
    pub trip_mode: Option<usize>,
    pub tour_type: usize,
    pub inbound: usize,
    pub weight: usize,
}

pub fn resolve_columns(header: &[String], path: &str) -> CalibResult<TripColumns> {
    let positions: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim(), idx))
        .collect();
    debug!("resolve_columns: positions: {:?}", positions);
    let required = |column: &str| -> CalibResult<usize> {
        positions.get(column).cloned().context(MissingColumnSnafu {
            column,
            path: path.to_string(),
        })
    };
    Ok(TripColumns {
        access_mode: required("arrival_mode")?,
        trip_mode: positions.get("trip_mode").cloned(),
        tour_type: required("tour_type")?,
        inbound: required("inbound")?,
        weight: required("weight_person_trip")?,
    })
}

pub fn read_trip_csv(path: &str) -> CalibResult<Vec<TripRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context(CsvOpenSnafu {
            path: path.to_string(),
        })?;
    let header: Vec<String> = rdr
        .headers()
        .context(CsvLineParseSnafu { lineno: 1usize })?
        .iter()
        .map(|s| s.to_string())
        .collect();
    let cols = resolve_columns(&header, path)?;

    let mut res: Vec<TripRecord> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        // Header is line 1
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        let cell = |col: usize| -> CalibResult<&str> {
            line.get(col).context(CsvLineTooShortSnafu { lineno })
        };

        let inbound =
            io_common::parse_bool(cell(cols.inbound)?).context(BadCellValueSnafu { lineno })?;
        let weight =
            io_common::parse_weight(cell(cols.weight)?).context(BadCellValueSnafu { lineno })?;
        let trip_mode = match cols.trip_mode {
            Some(col) => cell(col)?.to_string(),
            None => String::new(),
        };

        let record = TripRecord {
            access_mode: cell(cols.access_mode)?.to_string(),
            trip_mode,
            tour_type: cell(cols.tour_type)?.to_string(),
            inbound,
            weight,
        };
        if keep_record(&record) {
            res.push(record);
        }
    }
    debug!("read_trip_csv: {:?}: kept {} records", path, res.len());
    Ok(res)
}
