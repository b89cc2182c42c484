//! Expanded-table output.
//!
//! The output format follows the path extension: `.parquet` writes a
//! Parquet file, anything else CSV. Both paths write to a `.tmp` sibling
//! and rename into place, so a failed run never leaves a partial output
//! file behind.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use csv::WriterBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use super::SupplyCurveTable;
use crate::error::{Result, UnpackError};

pub fn write_table(table: &SupplyCurveTable, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let is_parquet = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("parquet"));

    if is_parquet {
        write_parquet(table, path)
    } else {
        write_csv(table, path)
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "out".to_string());
    path.with_file_name(format!("{}.tmp", file_name))
}

fn finalize(tmp_path: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp_path, path).map_err(|e| {
        UnpackError::io(
            format!(
                "renaming `{}` to `{}`",
                tmp_path.display(),
                path.display()
            ),
            e,
        )
    })
}

fn write_csv(table: &SupplyCurveTable, path: &Path) -> Result<()> {
    let tmp_path = tmp_sibling(path);
    let file = File::create(&tmp_path)
        .map_err(|e| UnpackError::io(format!("creating `{}`", tmp_path.display()), e))?;

    let mut writer = WriterBuilder::new()
        .flexible(true)
        .from_writer(BufWriter::new(file));
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer
        .flush()
        .map_err(|e| UnpackError::io(format!("flushing `{}`", tmp_path.display()), e))?;
    drop(writer);

    finalize(&tmp_path, path)
}

fn write_parquet(table: &SupplyCurveTable, path: &Path) -> Result<()> {
    let mut fields = Vec::with_capacity(table.headers.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.headers.len());

    for (col, name) in table.headers.iter().enumerate() {
        let cells: Vec<&str> = table
            .rows
            .iter()
            .map(|row| row.get(col).map(String::as_str).unwrap_or(""))
            .collect();

        if is_float_column(&cells) {
            let values: Vec<Option<f64>> = cells
                .iter()
                .map(|cell| {
                    let cell = cell.trim();
                    if cell.is_empty() {
                        None
                    } else {
                        cell.parse::<f64>().ok()
                    }
                })
                .collect();
            fields.push(Field::new(name.as_str(), DataType::Float64, true));
            arrays.push(Arc::new(Float64Array::from(values)));
        } else {
            let values: Vec<Option<&str>> = cells
                .iter()
                .map(|cell| if cell.is_empty() { None } else { Some(*cell) })
                .collect();
            fields.push(Field::new(name.as_str(), DataType::Utf8, true));
            arrays.push(Arc::new(StringArray::from(values)));
        }
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let tmp_path = tmp_sibling(path);
    let file = File::create(&tmp_path)
        .map_err(|e| UnpackError::io(format!("creating `{}`", tmp_path.display()), e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    debug!(rows = table.rows.len(), path = %path.display(), "wrote parquet output");

    finalize(&tmp_path, path)
}

/// A column is written as Float64 when it has at least one non-empty cell
/// and every non-empty cell parses as a float. Everything else stays Utf8.
fn is_float_column(cells: &[&str]) -> bool {
    let mut any = false;
    for cell in cells {
        let cell = cell.trim();
        if cell.is_empty() {
            continue;
        }
        if cell.parse::<f64>().is_err() {
            return false;
        }
        any = true;
    }
    any
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn sample_table() -> SupplyCurveTable {
        SupplyCurveTable {
            headers: vec!["sc_gid".into(), "state".into(), "mean_slope".into()],
            rows: vec![
                vec!["0".into(), "CO".into(), "2.5".into()],
                vec!["1".into(), "NM".into(), "".into()],
                vec!["2".into(), "AZ".into(), "4.25".into()],
            ],
        }
    }

    #[test]
    fn csv_round_trips() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("expanded.csv");

        let table = sample_table();
        write_table(&table, &path)?;
        assert!(!tmp_sibling(&path).exists(), "tmp file left behind");

        let round_tripped = SupplyCurveTable::read_csv(&path)?;
        assert_eq!(round_tripped, table);
        Ok(())
    }

    #[test]
    fn parquet_output_types_numeric_columns() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("expanded.parquet");

        write_table(&sample_table(), &path)?;

        let file = File::open(&path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        let batches: Vec<_> = reader.collect::<std::result::Result<_, _>>()?;
        let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total_rows, 3);

        let schema = batches[0].schema();
        // sc_gid and mean_slope are all-numeric, state is not
        assert_eq!(schema.field_with_name("sc_gid")?.data_type(), &DataType::Float64);
        assert_eq!(schema.field_with_name("state")?.data_type(), &DataType::Utf8);
        assert_eq!(
            schema.field_with_name("mean_slope")?.data_type(),
            &DataType::Float64
        );
        Ok(())
    }

    #[test]
    fn float_column_detection_requires_a_value() {
        assert!(is_float_column(&["1.5", "", "2"]));
        assert!(!is_float_column(&["", ""]));
        assert!(!is_float_column(&["1.5", "forest"]));
        assert!(!is_float_column(&[r#"{"forest":0.4}"#]));
    }
}
