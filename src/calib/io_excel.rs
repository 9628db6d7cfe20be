// Primitives for reading trip tables from Excel workbooks.

use calamine::{open_workbook, DataType, Reader, Xlsx};
use log::debug;
use snafu::prelude::*;

use trip_calibration::TripRecord;

use crate::calib::{io_common::keep_record, io_csv::resolve_columns, *};

pub fn read_trip_excel(path: &str, worksheet_name: &Option<String>) -> CalibResult<Vec<TripRecord>> {
    let wrange = get_range(path, worksheet_name)?;

    let mut iter = wrange.rows();
    let header_row = iter.next().context(EmptyExcelSnafu {})?;
    let header: Vec<String> = header_row
        .iter()
        .map(|dt| match dt {
            DataType::String(s) => s.clone(),
            _ => String::new(),
        })
        .collect();
    debug!("read_trip_excel: header: {:?}", header);
    let cols = resolve_columns(&header, path)?;

    let mut res: Vec<TripRecord> = Vec::new();
    for (idx, row) in iter.enumerate() {
        // Header is line 1
        let lineno = idx + 2;
        let cell = |col: usize| -> CalibResult<&DataType> {
            row.get(col).context(CsvLineTooShortSnafu { lineno })
        };

        let inbound = cell_to_bool(cell(cols.inbound)?).context(BadCellValueSnafu { lineno })?;
        let weight = cell_to_f64(cell(cols.weight)?).context(BadCellValueSnafu { lineno })?;
        let trip_mode = match cols.trip_mode {
            Some(col) => cell_to_string(cell(col)?),
            None => String::new(),
        };

        let record = TripRecord {
            access_mode: cell_to_string(cell(cols.access_mode)?),
            trip_mode,
            tour_type: cell_to_string(cell(cols.tour_type)?),
            inbound,
            weight,
        };
        if keep_record(&record) {
            res.push(record);
        }
    }
    debug!("read_trip_excel: {:?}: kept {} records", path, res.len());
    Ok(res)
}

pub fn cell_to_string(dt: &DataType) -> String {
    match dt {
        DataType::String(s) => s.clone(),
        DataType::Int(i) => i.to_string(),
        DataType::Float(f) => f.to_string(),
        DataType::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

pub fn cell_to_f64(dt: &DataType) -> Option<f64> {
    match dt {
        DataType::Float(f) => Some(*f),
        DataType::Int(i) => Some(*i as f64),
        DataType::String(s) => io_common::parse_weight(s),
        _ => None,
    }
}

pub fn cell_to_bool(dt: &DataType) -> Option<bool> {
    match dt {
        DataType::Bool(b) => Some(*b),
        DataType::String(s) => io_common::parse_bool(s),
        DataType::Int(0) => Some(false),
        DataType::Int(1) => Some(true),
        _ => None,
    }
}

fn get_range(
    path: &str,
    worksheet_name_o: &Option<String>,
) -> CalibResult<calamine::Range<DataType>> {
    debug!(
        "read_trip_excel: path: {:?} worksheet: {:?}",
        &path, &worksheet_name_o
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu {
        path: path.to_string(),
    })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = worksheet_name_o {
        let wrange = workbook
            .worksheet_range(worksheet_name)
            .context(EmptyExcelSnafu {})?
            .context(OpeningExcelSnafu {
                path: path.to_string(),
            })?;
        Ok(wrange)
    } else {
        let all_worksheets = workbook.worksheets();
        match all_worksheets.as_slice() {
            [] => Err(CalibError::EmptyExcel {}),
            [(worksheet_name, wrange)] => {
                debug!(
                    "read_trip_excel: path: {:?} worksheet: {:?}",
                    &path, &worksheet_name
                );
                Ok(wrange.clone())
            }
            [(worksheet_name, wrange), ..] => {
                // Several worksheets and no name configured: take the first
                // one, which is where trip exports land.
                debug!(
                    "read_trip_excel: path: {:?} picking first worksheet {:?}",
                    &path, &worksheet_name
                );
                Ok(wrange.clone())
            }
        }
    }
}
