//! Supply-curve table I/O.
//!
//! All pass-through cells are opaque strings; the engine only interprets
//! the one designated payload column. Row identity is the row's position,
//! header row excluded.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::info;

use crate::error::{Result, UnpackError};

pub mod write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyCurveTable {
    /// Column names from the header row.
    pub headers: Vec<String>,
    /// One record per table row, one string per column.
    pub rows: Vec<Vec<String>>,
}

impl SupplyCurveTable {
    /// Read a CSV table with a header row. Short records are padded with
    /// empty cells so every row indexes consistently against `headers`.
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            UnpackError::io(format!("opening input table `{}`", path.display()), e)
        })?;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::new(file));

        let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(|s| s.to_string()).collect();
            if row.len() < headers.len() {
                row.resize(headers.len(), String::new());
            }
            rows.push(row);
        }

        info!(
            rows = rows.len(),
            columns = headers.len(),
            path = %path.display(),
            "read supply curve table"
        );
        Ok(SupplyCurveTable { headers, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn reads_headers_and_pads_short_rows() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sc.csv");
        let mut f = File::create(&path)?;
        writeln!(f, "sc_gid,capacity_mw,cell_data")?;
        writeln!(f, "0,120.5,\"{{\"\"landuse\"\": \"\"forest\"\"}}\"")?;
        writeln!(f, "1,88.0")?;

        let table = SupplyCurveTable::read_csv(&path)?;
        assert_eq!(table.headers, vec!["sc_gid", "capacity_mw", "cell_data"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][2], r#"{"landuse": "forest"}"#);
        // short row padded to the header width
        assert_eq!(table.rows[1], vec!["1", "88.0", ""]);

        assert_eq!(table.column_index("cell_data"), Some(2));
        assert_eq!(table.column_index("missing"), None);
        Ok(())
    }
}
