//! Table expansion: decode -> resolve -> aggregate across every row and
//! mapped characterization, merging results into the original table.
//!
//! Rows are mutually independent; the only shared state is the read-only
//! characterization map. Lenient runs fan rows out over a rayon pool and
//! reassemble results by original row index, so output order never depends
//! on scheduling. Strict runs stay sequential and stop at the first
//! row-scoped failure. Each row's decoded payload is dropped as soon as
//! the row is finished.

use rayon::prelude::*;
use tracing::{info, instrument};

use crate::aggregate::aggregate;
use crate::charmap::CharacterizationMap;
use crate::error::{Result, UnpackError};
use crate::payload;
use crate::resolve::{resolve, DEFAULT_WEIGHT_FIELD};
use crate::table::SupplyCurveTable;

pub mod report;

pub use report::{FailureKind, FailureRecord, FailureReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// First row-level failure aborts the run; no output is produced.
    Strict,
    /// Failures are recorded, offending cells become null, the run
    /// completes.
    #[default]
    Lenient,
}

#[derive(Debug, Clone)]
pub struct ExpandOptions {
    pub mode: Mode,
    /// Sub-cell field holding the aggregation weight.
    pub weight_field: String,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        ExpandOptions {
            mode: Mode::Lenient,
            weight_field: DEFAULT_WEIGHT_FIELD.to_string(),
        }
    }
}

/// Per-row result, tagged with the original row index for reassembly.
struct RowOutcome {
    index: usize,
    cells: Vec<String>,
    failures: Vec<FailureRecord>,
}

/// Expand `table` by one column per characterization-map entry.
///
/// The expanded table keeps every original column, row, and row order;
/// unpacking only appends columns. Returns the failure report alongside,
/// which is empty exactly when no row was degraded.
#[instrument(level = "info", skip_all, fields(rows = table.len(), characterizations = map.len()))]
pub fn expand(
    table: &SupplyCurveTable,
    payload_column: &str,
    map: &CharacterizationMap,
    options: &ExpandOptions,
) -> Result<(SupplyCurveTable, FailureReport)> {
    let payload_idx = table
        .column_index(payload_column)
        .ok_or_else(|| UnpackError::Schema {
            column: payload_column.to_string(),
        })?;

    for name in map.names() {
        if table.column_index(name).is_some() {
            return Err(UnpackError::config(format!(
                "characterization `{}` collides with an existing table column",
                name
            )));
        }
    }

    let outcomes = match options.mode {
        Mode::Strict => {
            let mut outcomes = Vec::with_capacity(table.len());
            for (index, row) in table.rows.iter().enumerate() {
                let outcome = process_row(index, row, payload_idx, map, &options.weight_field);
                if let Some(first) = outcome.failures.first() {
                    return Err(first.to_error());
                }
                outcomes.push(outcome);
            }
            outcomes
        }
        Mode::Lenient => {
            rayon::ThreadPoolBuilder::new()
                .num_threads(num_cpus::get())
                .build_global()
                .ok();

            let mut outcomes: Vec<RowOutcome> = table
                .rows
                .par_iter()
                .enumerate()
                .map(|(index, row)| {
                    process_row(index, row, payload_idx, map, &options.weight_field)
                })
                .collect();
            // workers return results tagged with the original row index;
            // reorder before assembly
            outcomes.sort_unstable_by_key(|outcome| outcome.index);
            outcomes
        }
    };

    let mut headers = table.headers.clone();
    headers.extend(map.names().map(|name| name.to_string()));

    let mut rows = Vec::with_capacity(table.len());
    let mut report = FailureReport::default();
    for outcome in outcomes {
        let mut row = table.rows[outcome.index].clone();
        row.extend(outcome.cells);
        rows.push(row);
        for failure in outcome.failures {
            report.push(failure);
        }
    }

    info!(failures = report.total(), "expansion complete");
    Ok((SupplyCurveTable { headers, rows }, report))
}

/// Decode one row's payload and aggregate every characterization against
/// it. Never returns an error: failures become records for the caller to
/// interpret by mode.
fn process_row(
    index: usize,
    row: &[String],
    payload_idx: usize,
    map: &CharacterizationMap,
    weight_field: &str,
) -> RowOutcome {
    let raw = row.get(payload_idx).map(String::as_str).unwrap_or("");

    let decoded = match payload::decode(index, raw) {
        Ok(decoded) => decoded,
        Err(err) => {
            let reason = match err {
                UnpackError::Decode { reason, .. } => reason,
                other => other.to_string(),
            };
            return RowOutcome {
                index,
                cells: vec![String::new(); map.len()],
                failures: vec![FailureRecord {
                    row: index,
                    characterization: None,
                    kind: FailureKind::Decode,
                    reason,
                }],
            };
        }
    };

    let mut cells = Vec::with_capacity(map.len());
    let mut failures = Vec::new();
    for (name, path) in map.iter() {
        let leaves = resolve(&decoded, path, weight_field);
        match aggregate(&leaves) {
            Ok(value) => cells.push(value.to_cell()),
            Err(mismatch) => {
                cells.push(String::new());
                failures.push(FailureRecord {
                    row: index,
                    characterization: Some(name.to_string()),
                    kind: FailureKind::Aggregation,
                    reason: mismatch.to_string(),
                });
            }
        }
    }

    RowOutcome {
        index,
        cells,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::write::write_table;

    fn char_map() -> CharacterizationMap {
        CharacterizationMap::from_json_str(
            r#"{"landuse": "landuse", "mean_slope": "slope"}"#,
        )
        .unwrap()
    }

    fn bespoke_table() -> SupplyCurveTable {
        let payload_a = r#"{
            "cell_0": {"landuse": "forest", "slope": 10.0, "area": 2.0},
            "cell_1": {"landuse": "water", "slope": 20.0, "area": 3.0}
        }"#
        .replace('\n', " ");
        SupplyCurveTable {
            headers: vec!["sc_gid".into(), "cell_data".into()],
            rows: vec![
                vec!["0".into(), payload_a],
                vec!["1".into(), String::new()],
                vec!["2".into(), r#"{"landuse": "barren", "slope": 4.0}"#.into()],
            ],
        }
    }

    #[test]
    fn appends_one_column_per_characterization() -> anyhow::Result<()> {
        let table = bespoke_table();
        let (expanded, report) =
            expand(&table, "cell_data", &char_map(), &ExpandOptions::default())?;

        assert!(report.is_clean());
        assert_eq!(expanded.len(), table.len());
        assert_eq!(
            expanded.headers,
            vec!["sc_gid", "cell_data", "landuse", "mean_slope"]
        );

        // original cells pass through unchanged, in order
        for (expanded_row, row) in expanded.rows.iter().zip(&table.rows) {
            assert_eq!(&expanded_row[..2], &row[..]);
        }

        // bespoke row: categorical fractions and weighted mean
        assert_eq!(expanded.rows[0][2], r#"{"forest":0.4,"water":0.6}"#);
        assert_eq!(expanded.rows[0][3], "16");

        // empty payload row: every characterization is null
        assert_eq!(expanded.rows[1][2], "");
        assert_eq!(expanded.rows[1][3], "");

        // single-cell payload row
        assert_eq!(expanded.rows[2][2], r#"{"barren":1.0}"#);
        assert_eq!(expanded.rows[2][3], "4");
        Ok(())
    }

    #[test]
    fn missing_payload_column_is_a_schema_error() {
        let err = expand(
            &bespoke_table(),
            "no_such_column",
            &char_map(),
            &ExpandOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, UnpackError::Schema { .. }), "got {err}");
    }

    #[test]
    fn column_collision_is_a_config_error() {
        let map = CharacterizationMap::from_json_str(r#"{"sc_gid": "landuse"}"#).unwrap();
        let err = expand(
            &bespoke_table(),
            "cell_data",
            &map,
            &ExpandOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, UnpackError::Config { .. }), "got {err}");
    }

    #[test]
    fn lenient_mode_records_failures_and_completes() -> anyhow::Result<()> {
        let mut table = bespoke_table();
        table.rows[1][1] = "{not json".into();

        let (expanded, report) =
            expand(&table, "cell_data", &char_map(), &ExpandOptions::default())?;

        assert_eq!(expanded.len(), 3);
        // offending row nulled, neighbors untouched
        assert_eq!(expanded.rows[1][2], "");
        assert_eq!(expanded.rows[1][3], "");
        assert_ne!(expanded.rows[0][2], "");

        assert_eq!(report.total(), 1);
        assert_eq!(report.count(FailureKind::Decode), 1);
        assert_eq!(report.records()[0].row, 1);
        Ok(())
    }

    #[test]
    fn strict_mode_aborts_on_first_failure() {
        let mut table = bespoke_table();
        table.rows[1][1] = "{not json".into();

        let options = ExpandOptions {
            mode: Mode::Strict,
            ..ExpandOptions::default()
        };
        let err = expand(&table, "cell_data", &char_map(), &options).unwrap_err();
        match err {
            UnpackError::Decode { row, .. } => assert_eq!(row, 1),
            other => panic!("expected Decode, got {other}"),
        }
    }

    #[test]
    fn mixed_leaf_kinds_null_only_that_cell() -> anyhow::Result<()> {
        let table = SupplyCurveTable {
            headers: vec!["sc_gid".into(), "cell_data".into()],
            rows: vec![vec![
                "0".into(),
                r#"{
                    "cell_0": {"landuse": "forest", "slope": 1.0, "area": 1.0},
                    "cell_1": {"landuse": 7.0, "slope": 2.0, "area": 1.0}
                }"#
                .replace('\n', " "),
            ]],
        };

        let (expanded, report) =
            expand(&table, "cell_data", &char_map(), &ExpandOptions::default())?;

        assert_eq!(expanded.rows[0][2], "");
        assert_eq!(expanded.rows[0][3], "1.5");
        assert_eq!(report.count(FailureKind::Aggregation), 1);
        assert_eq!(
            report.records()[0].characterization.as_deref(),
            Some("landuse")
        );
        Ok(())
    }

    #[test]
    fn expansion_is_idempotent_byte_for_byte() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let table = bespoke_table();
        let map = char_map();
        let options = ExpandOptions::default();

        let mut outputs = Vec::new();
        for run in 0..2 {
            let (expanded, _) = expand(&table, "cell_data", &map, &options)?;
            let path = dir.path().join(format!("run_{run}.csv"));
            write_table(&expanded, &path)?;
            outputs.push(std::fs::read(&path)?);
        }
        assert_eq!(outputs[0], outputs[1]);
        Ok(())
    }

    #[test]
    fn row_order_is_preserved_across_many_rows() -> anyhow::Result<()> {
        let rows: Vec<Vec<String>> = (0..500)
            .map(|i| {
                vec![
                    i.to_string(),
                    format!(r#"{{"slope": {}.0, "area": 1.0}}"#, i),
                ]
            })
            .collect();
        let table = SupplyCurveTable {
            headers: vec!["sc_gid".into(), "cell_data".into()],
            rows,
        };
        let map = CharacterizationMap::from_json_str(r#"{"mean_slope": "slope"}"#).unwrap();

        let (expanded, report) =
            expand(&table, "cell_data", &map, &ExpandOptions::default())?;

        assert!(report.is_clean());
        assert_eq!(expanded.len(), 500);
        for (i, row) in expanded.rows.iter().enumerate() {
            assert_eq!(row[0], i.to_string());
            assert_eq!(row[2], format!("{}", i));
        }
        Ok(())
    }
}
