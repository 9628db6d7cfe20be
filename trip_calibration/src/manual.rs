/*!

This is the long-form manual for `trip_calibration` and `modecal`.

## The pipeline

The library turns two trip tables — one written by a travel-demand model
run, one collected by a rider survey — into comparison tables that a chart
or a summary file can render side by side. Three stages run in order:

1. **Normalization** ([crate::normalize]). Raw access-mode and tour-type
   codes from either taxonomy are rewritten into one shared vocabulary
   (the eight [crate::AccessMode] labels and the shared detailed tour
   types). Model records additionally get their trip mode corrected for
   taxi and ride-hail arrivals, since the two taxonomies disagree on how
   ride-share party size is encoded. A raw access-mode code that the
   tables do not know is an error, never a pass-through.

2. **Aggregation** ([crate::aggregate]). Weights are summed by
   (stratum, mode), a `Total` stratum is synthesized, and each row gets
   its percentage share within its stratum. Every stratum carries all
   eight modes; combinations with no observations are backfilled at zero
   so a chart never silently omits a mode. Detailed runs also return the
   general rollup (resident / visitor) alongside.

3. **Reconciliation** ([crate::reconcile]). The model table is joined to
   the survey table on (stratum, mode), anchored on the survey side: every
   survey row appears exactly once in the output, with an empty model side
   where the model produced nothing. Percentages are carried through
   unchanged.

[crate::ScenarioRegistry] wires the stages together: it aggregates the
survey once, then runs the full pipeline per registered model scenario and
caches the three comparison tables (detailed, general, employee) behind a
key lookup.

## Input expectations

Trip tables are sequences of [crate::TripRecord]. The loading layer is
expected to keep only inbound, non-external trips before handing records
over; the pipeline does not re-validate this. Survey weights are 1.0 per
observed trip, model weights are expansion weights.

## Mapping overrides

The normalization tables are configuration, not code. Upstream taxonomies
have carried two different conventions for ride-hail arrivals (a distinct
UBER/Lyft category versus folding into public transit); pick one with
[crate::builder::MappingsBuilder] instead of editing the tables:

```text
let mappings = MappingsBuilder::new()
    .survey_mode("tnc", AccessMode::PublicTransit)
    .model_mode("RIDEHAIL_LOC1", AccessMode::PublicTransit)
    .build();
```

The `modecal` binary exposes the same overrides through the
`modeOverrides` block of its JSON configuration.

 */
