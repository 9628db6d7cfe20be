mod config;
use log::{debug, info};

use std::collections::{BTreeMap, HashMap};

pub use crate::config::*;

pub mod builder;
pub mod manual;
mod registry;
pub use crate::registry::*;

// **** Normalization ****

/// Rewrites raw trip records into the shared vocabulary.
///
/// Arguments:
/// * `records` the trip table to normalize, already restricted to inbound,
///   non-external trips by the loading layer
/// * `source` which taxonomy the raw codes come from
/// * `mappings` the normalization tables to apply
///
/// Fails with [CalibrationError::UnmappedCategory] on the first access-mode
/// code without a table entry. A stale table must be fixed, not worked
/// around: letting the code through would corrupt every downstream total.
pub fn normalize(
    records: &[TripRecord],
    source: Source,
    mappings: &Mappings,
) -> Result<Vec<NormalizedTrip>, CalibrationError> {
    info!("normalize: processing {} {} records", records.len(), source);
    let mut res: Vec<NormalizedTrip> = Vec::with_capacity(records.len());
    for r in records.iter() {
        let access_mode = mappings.resolve_mode(source, &r.access_mode)?;
        let tour_type = mappings.resolve_tour_type(&r.tour_type);
        // The taxonomies disagree on how ride-share party size is encoded,
        // so the model trip mode is rewritten to the survey convention.
        // This must happen after access-mode resolution and before any
        // aggregation.
        let trip_mode = match source {
            Source::Model => correct_trip_mode(access_mode, &r.trip_mode),
            Source::Survey => r.trip_mode.clone(),
        };
        res.push(NormalizedTrip {
            access_mode,
            trip_mode,
            tour_type,
            inbound: r.inbound,
            weight: r.weight,
        });
    }
    debug!("normalize: produced {} normalized records", res.len());
    Ok(res)
}

fn correct_trip_mode(access_mode: AccessMode, raw_trip_mode: &str) -> String {
    match access_mode {
        AccessMode::Taxi => TRIP_MODE_TAXI.to_string(),
        AccessMode::RideHail if raw_trip_mode == "SHARED2" => TRIP_MODE_TNC_SINGLE.to_string(),
        AccessMode::RideHail if raw_trip_mode == "SHARED3" => TRIP_MODE_TNC_SHARED.to_string(),
        _ => raw_trip_mode.to_string(),
    }
}

// **** Aggregation ****

/// Builds the aggregated (stratum, mode) table for one normalized source.
///
/// `include_employee` selects one of two mutually exclusive runs: `true`
/// keeps only employee trips and synthesizes no `Total` stratum, `false`
/// drops employee trips and appends a `Total` stratum summed across all
/// the others.
///
/// Every stratum in the output carries all eight access modes; pairs with
/// no observations are backfilled with `metric = 0, pct = 0`. For detailed,
/// non-employee runs the general rollup is computed from the detailed rows
/// and returned alongside.
pub fn aggregate(
    records: &[NormalizedTrip],
    stratify_by: TourTypeGranularity,
    include_employee: bool,
) -> Result<AggregateTables, CalibrationError> {
    info!(
        "aggregate: {} records, stratify_by: {:?}, include_employee: {:?}",
        records.len(),
        stratify_by,
        include_employee
    );

    // Step 1: employee selection.
    let selected: Vec<&NormalizedTrip> = records
        .iter()
        .filter(|r| (general_tour_type(&r.tour_type) == "employee") == include_employee)
        .collect();

    // Step 2: group and sum weights.
    let mut sums: BTreeMap<String, HashMap<AccessMode, f64>> = BTreeMap::new();
    for r in selected.iter() {
        if r.tour_type == TOTAL_STRATUM {
            // The sentinel would collide with the synthesized stratum.
            return Err(CalibrationError::InvariantViolation {
                value: format!("record carries the reserved tour type {:?}", TOTAL_STRATUM),
            });
        }
        let stratum = match stratify_by {
            TourTypeGranularity::Detailed => r.tour_type.clone(),
            TourTypeGranularity::General => general_tour_type(&r.tour_type),
        };
        let tally = sums.entry(stratum).or_default();
        *tally.entry(r.access_mode).or_insert(0.0) += r.weight;
    }

    // Step 3: synthesize the Total stratum from the non-Total strata.
    if !include_employee && !sums.is_empty() {
        let mut total: HashMap<AccessMode, f64> = HashMap::new();
        for tally in sums.values() {
            for (mode, metric) in tally.iter() {
                *total.entry(*mode).or_insert(0.0) += *metric;
            }
        }
        sums.insert(TOTAL_STRATUM.to_string(), total);
    }

    // Steps 4 and 5: completion then percentages. The order is
    // interchangeable since backfilled rows always end up at 0/0.
    let sparse = sparse_rows(&sums);
    let rows = percentages_within_strata(complete_vocabulary(&sparse)?);

    let general = match (stratify_by, include_employee) {
        (TourTypeGranularity::Detailed, false) => Some(rollup_general(&rows)?),
        _ => None,
    };
    Ok(AggregateTables { rows, general })
}

fn sparse_rows(sums: &BTreeMap<String, HashMap<AccessMode, f64>>) -> Vec<AggregateRow> {
    let mut rows: Vec<AggregateRow> = Vec::new();
    for (stratum, tally) in sums.iter() {
        for mode in AccessMode::ALL.iter() {
            if let Some(metric) = tally.get(mode) {
                rows.push(AggregateRow {
                    stratum: stratum.clone(),
                    mode: *mode,
                    metric: *metric,
                    pct: 0.0,
                });
            }
        }
    }
    rows
}

/// Ensures every stratum present in `rows` carries all eight access modes.
///
/// Missing (stratum, mode) pairs are inserted with `metric = 0, pct = 0`;
/// existing rows are kept untouched, so running completion on an already
/// complete table is a no-op. The output is ordered by stratum (ascending,
/// `Total` last) and by the canonical mode order within each stratum.
///
/// A duplicate (stratum, mode) pair fails with
/// [CalibrationError::InvariantViolation]: summing duplicates silently
/// would hide a grouping defect.
pub fn complete_vocabulary(rows: &[AggregateRow]) -> Result<Vec<AggregateRow>, CalibrationError> {
    let mut by_stratum: BTreeMap<String, Vec<Option<AggregateRow>>> = BTreeMap::new();
    for row in rows.iter() {
        let slots = by_stratum
            .entry(row.stratum.clone())
            .or_insert_with(|| vec![None; 8]);
        let idx = row.mode.index();
        if slots[idx].is_some() {
            return Err(CalibrationError::InvariantViolation {
                value: format!("duplicate aggregate row for ({:?}, {})", row.stratum, row.mode),
            });
        }
        slots[idx] = Some(row.clone());
    }

    let mut res: Vec<AggregateRow> = Vec::with_capacity(by_stratum.len() * 8);
    let mut emit = |stratum: &str, slots: &[Option<AggregateRow>]| {
        for (idx, mode) in AccessMode::ALL.iter().enumerate() {
            res.push(slots[idx].clone().unwrap_or(AggregateRow {
                stratum: stratum.to_string(),
                mode: *mode,
                metric: 0.0,
                pct: 0.0,
            }));
        }
    };
    for (stratum, slots) in by_stratum.iter() {
        if stratum != TOTAL_STRATUM {
            emit(stratum, slots);
        }
    }
    if let Some(slots) = by_stratum.get(TOTAL_STRATUM) {
        emit(TOTAL_STRATUM, slots);
    }
    Ok(res)
}

/// Recomputes `pct` as the share of each row within its stratum.
///
/// A stratum with zero total weight keeps all percentages at 0 rather than
/// dividing by zero; this is informational, not an error, so that strata
/// the model never produces still render.
fn percentages_within_strata(rows: Vec<AggregateRow>) -> Vec<AggregateRow> {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for row in rows.iter() {
        *totals.entry(row.stratum.clone()).or_insert(0.0) += row.metric;
    }
    rows.into_iter()
        .map(|row| {
            let total = totals.get(&row.stratum).copied().unwrap_or(0.0);
            let pct = if total > 0.0 {
                row.metric / total * 100.0
            } else {
                debug!("stratum {:?} has zero total weight", row.stratum);
                0.0
            };
            AggregateRow { pct, ..row }
        })
        .collect()
}

/// Sums detailed rows (excluding `Total`) into the general categories and
/// rebuilds percentages and the `Total` stratum at that level.
fn rollup_general(detailed: &[AggregateRow]) -> Result<Vec<AggregateRow>, CalibrationError> {
    let mut sums: BTreeMap<String, HashMap<AccessMode, f64>> = BTreeMap::new();
    for row in detailed.iter() {
        if row.stratum == TOTAL_STRATUM {
            continue;
        }
        let tally = sums.entry(general_tour_type(&row.stratum)).or_default();
        *tally.entry(row.mode).or_insert(0.0) += row.metric;
    }
    if !sums.is_empty() {
        let mut total: HashMap<AccessMode, f64> = HashMap::new();
        for tally in sums.values() {
            for (mode, metric) in tally.iter() {
                *total.entry(*mode).or_insert(0.0) += *metric;
            }
        }
        sums.insert(TOTAL_STRATUM.to_string(), total);
    }
    let sparse = sparse_rows(&sums);
    Ok(percentages_within_strata(complete_vocabulary(&sparse)?))
}

// **** Reconciliation ****

/// Merges a model aggregate with a survey aggregate on (stratum, mode).
///
/// The join is anchored on the survey side: every survey row yields exactly
/// one comparison row, and model rows without a survey counterpart are
/// dropped. The survey vocabulary decides what the comparison displays.
/// Percentages are carried through unchanged — they must stay
/// whole-population shares, so they are never recomputed after the join.
pub fn reconcile(
    model_rows: &[AggregateRow],
    survey_rows: &[AggregateRow],
) -> Result<Vec<ComparisonRow>, CalibrationError> {
    let mut model_index: HashMap<(&str, AccessMode), &AggregateRow> = HashMap::new();
    for row in model_rows.iter() {
        if model_index
            .insert((row.stratum.as_str(), row.mode), row)
            .is_some()
        {
            return Err(CalibrationError::InvariantViolation {
                value: format!("duplicate model row for ({:?}, {})", row.stratum, row.mode),
            });
        }
    }

    let res: Vec<ComparisonRow> = survey_rows
        .iter()
        .map(|survey| {
            let model = model_index.get(&(survey.stratum.as_str(), survey.mode));
            ComparisonRow {
                stratum: survey.stratum.clone(),
                mode: survey.mode,
                metric_model: model.map(|m| m.metric),
                pct_model: model.map(|m| m.pct),
                metric_survey: survey.metric,
                pct_survey: survey.pct,
            }
        })
        .collect();
    debug!(
        "reconcile: {} survey rows against {} model rows",
        res.len(),
        model_rows.len()
    );
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(access_mode: &str, trip_mode: &str, tour_type: &str, weight: f64) -> TripRecord {
        TripRecord {
            access_mode: access_mode.to_string(),
            trip_mode: trip_mode.to_string(),
            tour_type: tour_type.to_string(),
            inbound: true,
            weight,
        }
    }

    fn pct_sum(rows: &[AggregateRow], stratum: &str) -> f64 {
        rows.iter()
            .filter(|r| r.stratum == stratum)
            .map(|r| r.pct)
            .sum()
    }

    #[test]
    fn normalize_maps_both_taxonomies_to_shared_labels() {
        let mappings = Mappings::standard();
        let model = normalize(
            &[trip("RIDEHAIL_LOC1", "SHARED2", "res_per1", 10.0)],
            Source::Model,
            &mappings,
        )
        .unwrap();
        assert_eq!(model[0].access_mode, AccessMode::RideHail);
        assert_eq!(model[0].access_mode.label(), "UBER/Lyft");
        assert_eq!(model[0].trip_mode, TRIP_MODE_TNC_SINGLE);
        assert_eq!(model[0].tour_type, "res_nb");

        let survey = normalize(&[trip("tnc", "", "res_nb", 5.0)], Source::Survey, &mappings).unwrap();
        assert_eq!(survey[0].access_mode, AccessMode::RideHail);
        assert_eq!(survey[0].tour_type, "res_nb");
    }

    #[test]
    fn normalize_corrects_model_trip_modes() {
        let mappings = Mappings::standard();
        let model = normalize(
            &[
                trip("TAXI_LOC1", "SHARED2", "vis_per", 1.0),
                trip("RIDEHAIL_LOC1", "SHARED3", "vis_per", 1.0),
                trip("CURB_LOC1", "SHARED2", "vis_per", 1.0),
            ],
            Source::Model,
            &mappings,
        )
        .unwrap();
        assert_eq!(model[0].trip_mode, TRIP_MODE_TAXI);
        assert_eq!(model[1].trip_mode, TRIP_MODE_TNC_SHARED);
        // No correction outside taxi and ride-hail arrivals.
        assert_eq!(model[2].trip_mode, "SHARED2");
    }

    #[test]
    fn normalize_does_not_correct_survey_trip_modes() {
        let mappings = Mappings::standard();
        let survey = normalize(
            &[trip("taxi", "SHARED2", "res_nb", 1.0)],
            Source::Survey,
            &mappings,
        )
        .unwrap();
        assert_eq!(survey[0].trip_mode, "SHARED2");
    }

    #[test]
    fn normalize_fails_on_unmapped_code() {
        let mappings = Mappings::standard();
        let err = normalize(
            &[trip("JETPACK", "", "res_per1", 1.0)],
            Source::Model,
            &mappings,
        )
        .unwrap_err();
        assert_eq!(
            err,
            CalibrationError::UnmappedCategory {
                source: Source::Model,
                code: "JETPACK".to_string()
            }
        );
    }

    #[test]
    fn aggregate_completes_the_vocabulary_for_every_stratum() {
        let mappings = Mappings::standard();
        let records = normalize(
            &[
                trip("RIDEHAIL_LOC1", "SHARED2", "res_per1", 10.0),
                trip("CURB_LOC1", "", "vis_per", 4.0),
            ],
            Source::Model,
            &mappings,
        )
        .unwrap();
        let tables = aggregate(&records, TourTypeGranularity::Detailed, false).unwrap();
        // res_nb, vis_nb and Total, each with all 8 modes.
        assert_eq!(tables.rows.len(), 24);
        for stratum in ["res_nb", "vis_nb", TOTAL_STRATUM] {
            let modes: Vec<AccessMode> = tables
                .rows
                .iter()
                .filter(|r| r.stratum == stratum)
                .map(|r| r.mode)
                .collect();
            assert_eq!(modes, AccessMode::ALL.to_vec());
        }
    }

    #[test]
    fn aggregate_percentages_close_to_100_per_stratum() {
        let mappings = Mappings::standard();
        let records = normalize(
            &[
                trip("RIDEHAIL_LOC1", "SHARED2", "res_per1", 10.0),
                trip("CURB_LOC1", "", "res_per2", 30.0),
                trip("RENTAL", "", "vis_per", 4.0),
            ],
            Source::Model,
            &mappings,
        )
        .unwrap();
        let tables = aggregate(&records, TourTypeGranularity::Detailed, false).unwrap();
        for stratum in ["res_nb", "vis_nb", TOTAL_STRATUM] {
            assert!((pct_sum(&tables.rows, stratum) - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn aggregate_total_stratum_sums_the_others() {
        let mappings = Mappings::standard();
        let records = normalize(
            &[
                trip("RIDEHAIL_LOC1", "SHARED2", "res_per1", 10.0),
                trip("RIDEHAIL_LOC1", "SHARED2", "vis_per", 7.0),
                trip("CURB_LOC1", "", "vis_bus", 3.0),
            ],
            Source::Model,
            &mappings,
        )
        .unwrap();
        let tables = aggregate(&records, TourTypeGranularity::Detailed, false).unwrap();
        let total_ridehail = tables
            .rows
            .iter()
            .find(|r| r.stratum == TOTAL_STRATUM && r.mode == AccessMode::RideHail)
            .unwrap();
        assert_eq!(total_ridehail.metric, 17.0);
        let total_dropoff = tables
            .rows
            .iter()
            .find(|r| r.stratum == TOTAL_STRATUM && r.mode == AccessMode::DropOff)
            .unwrap();
        assert_eq!(total_dropoff.metric, 3.0);
    }

    #[test]
    fn aggregate_employee_run_has_no_total_stratum() {
        let mappings = Mappings::standard();
        let records = normalize(
            &[
                trip("WALK", "", "emp", 5.0),
                trip("RIDEHAIL_LOC1", "SHARED2", "res_per1", 10.0),
            ],
            Source::Model,
            &mappings,
        )
        .unwrap();
        let tables = aggregate(&records, TourTypeGranularity::Detailed, true).unwrap();
        assert!(tables.rows.iter().all(|r| r.stratum == "emp"));
        assert_eq!(tables.rows.len(), 8);
        assert!(tables.general.is_none());
        let walk = tables
            .rows
            .iter()
            .find(|r| r.mode == AccessMode::Walk)
            .unwrap();
        assert_eq!(walk.metric, 5.0);
        assert_eq!(walk.pct, 100.0);
    }

    #[test]
    fn aggregate_excludes_employees_from_non_employee_runs() {
        let mappings = Mappings::standard();
        let records = normalize(
            &[
                trip("WALK", "", "emp", 5.0),
                trip("RIDEHAIL_LOC1", "SHARED2", "res_per1", 10.0),
            ],
            Source::Model,
            &mappings,
        )
        .unwrap();
        let tables = aggregate(&records, TourTypeGranularity::Detailed, false).unwrap();
        assert!(tables.rows.iter().all(|r| r.stratum != "emp"));
        let total_walk = tables
            .rows
            .iter()
            .find(|r| r.stratum == TOTAL_STRATUM && r.mode == AccessMode::Walk)
            .unwrap();
        assert_eq!(total_walk.metric, 0.0);
    }

    #[test]
    fn aggregate_returns_the_general_rollup_alongside() {
        let mappings = Mappings::standard();
        let records = normalize(
            &[
                trip("RIDEHAIL_LOC1", "SHARED2", "res_per1", 10.0),
                trip("RIDEHAIL_LOC1", "SHARED2", "res_bus1", 2.0),
                trip("CURB_LOC1", "", "vis_per", 4.0),
            ],
            Source::Model,
            &mappings,
        )
        .unwrap();
        let tables = aggregate(&records, TourTypeGranularity::Detailed, false).unwrap();
        let general = tables.general.unwrap();
        // resident, visitor and Total strata.
        assert_eq!(general.len(), 24);
        let resident_ridehail = general
            .iter()
            .find(|r| r.stratum == "resident" && r.mode == AccessMode::RideHail)
            .unwrap();
        assert_eq!(resident_ridehail.metric, 12.0);
        assert_eq!(resident_ridehail.pct, 100.0);
        for stratum in ["resident", "visitor", TOTAL_STRATUM] {
            assert!((pct_sum(&general, stratum) - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn aggregate_empty_input_yields_empty_tables() {
        let tables = aggregate(&[], TourTypeGranularity::Detailed, false).unwrap();
        assert!(tables.rows.is_empty());
        assert_eq!(tables.general, Some(vec![]));
    }

    #[test]
    fn aggregate_rejects_the_reserved_total_tour_type() {
        let records = vec![NormalizedTrip {
            access_mode: AccessMode::Walk,
            trip_mode: "".to_string(),
            tour_type: TOTAL_STRATUM.to_string(),
            inbound: true,
            weight: 1.0,
        }];
        let err = aggregate(&records, TourTypeGranularity::Detailed, false).unwrap_err();
        assert!(matches!(err, CalibrationError::InvariantViolation { .. }));
    }

    #[test]
    fn completion_is_idempotent() {
        let sparse = vec![AggregateRow {
            stratum: "res_nb".to_string(),
            mode: AccessMode::RideHail,
            metric: 10.0,
            pct: 100.0,
        }];
        let once = complete_vocabulary(&sparse).unwrap();
        let twice = complete_vocabulary(&once).unwrap();
        assert_eq!(once.len(), 8);
        assert_eq!(once, twice);
    }

    #[test]
    fn completion_rejects_duplicate_keys() {
        let row = AggregateRow {
            stratum: "res_nb".to_string(),
            mode: AccessMode::RideHail,
            metric: 10.0,
            pct: 100.0,
        };
        let err = complete_vocabulary(&[row.clone(), row]).unwrap_err();
        assert!(matches!(err, CalibrationError::InvariantViolation { .. }));
    }

    #[test]
    fn reconcile_is_anchored_on_the_survey() {
        let survey = vec![
            AggregateRow {
                stratum: "res_nb".to_string(),
                mode: AccessMode::RideHail,
                metric: 5.0,
                pct: 100.0,
            },
            AggregateRow {
                stratum: "res_nb".to_string(),
                mode: AccessMode::Taxi,
                metric: 0.0,
                pct: 0.0,
            },
        ];
        let model = vec![
            AggregateRow {
                stratum: "res_nb".to_string(),
                mode: AccessMode::RideHail,
                metric: 10.0,
                pct: 40.0,
            },
            // No survey counterpart: must be dropped.
            AggregateRow {
                stratum: "res_bus".to_string(),
                mode: AccessMode::Walk,
                metric: 3.0,
                pct: 60.0,
            },
        ];
        let rows = reconcile(&model, &survey).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].metric_model, Some(10.0));
        assert_eq!(rows[0].metric_survey, 5.0);
        // Percentages carried through, never rescaled.
        assert_eq!(rows[0].pct_model, Some(40.0));
        assert_eq!(rows[0].pct_survey, 100.0);
        // Survey row without a model counterpart keeps an empty model side.
        assert_eq!(rows[1].metric_model, None);
        assert_eq!(rows[1].pct_model, None);
    }

    #[test]
    fn reconcile_rejects_duplicate_model_keys() {
        let row = AggregateRow {
            stratum: "res_nb".to_string(),
            mode: AccessMode::RideHail,
            metric: 10.0,
            pct: 100.0,
        };
        let err = reconcile(&[row.clone(), row.clone()], &[row]).unwrap_err();
        assert!(matches!(err, CalibrationError::InvariantViolation { .. }));
    }

    /// The end-to-end scenario from the calibration runbook: one model trip
    /// and one survey trip that land on the same (stratum, mode) cell.
    #[test]
    fn single_cell_end_to_end() {
        let mappings = Mappings::standard();
        let model = normalize(
            &[trip("RIDEHAIL_LOC1", "SHARED2", "res_per1", 10.0)],
            Source::Model,
            &mappings,
        )
        .unwrap();
        let survey = normalize(&[trip("tnc", "", "res_nb", 5.0)], Source::Survey, &mappings).unwrap();

        let model_tables = aggregate(&model, TourTypeGranularity::Detailed, false).unwrap();
        let survey_tables = aggregate(&survey, TourTypeGranularity::Detailed, false).unwrap();
        let rows = reconcile(&model_tables.rows, &survey_tables.rows).unwrap();

        let cell = rows
            .iter()
            .find(|r| r.stratum == "res_nb" && r.mode == AccessMode::RideHail)
            .unwrap();
        assert_eq!(cell.metric_model, Some(10.0));
        assert_eq!(cell.metric_survey, 5.0);
        assert_eq!(cell.pct_model, Some(100.0));
        assert_eq!(cell.pct_survey, 100.0);

        // The 7 other modes of that stratum are all present and at zero on
        // both sides.
        let others: Vec<&ComparisonRow> = rows
            .iter()
            .filter(|r| r.stratum == "res_nb" && r.mode != AccessMode::RideHail)
            .collect();
        assert_eq!(others.len(), 7);
        for row in others {
            assert_eq!(row.metric_model, Some(0.0));
            assert_eq!(row.metric_survey, 0.0);
            assert_eq!(row.pct_model, Some(0.0));
            assert_eq!(row.pct_survey, 0.0);
        }
    }
}
