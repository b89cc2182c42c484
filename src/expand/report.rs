//! Run-level failure accounting.
//!
//! Row-scoped failures are collected as data instead of thrown, so lenient
//! runs complete while still being distinguishable from clean ones. The
//! report is surfaced on every run, success included.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Result, UnpackError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Decode,
    Aggregation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Decode => write!(f, "decode"),
            FailureKind::Aggregation => write!(f, "aggregation"),
        }
    }
}

/// One recorded row-scoped failure. `characterization` is `None` for
/// decode failures, which null the whole row.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub row: usize,
    pub characterization: Option<String>,
    pub kind: FailureKind,
    pub reason: String,
}

impl FailureRecord {
    /// Rebuild the error this record stands for; strict mode aborts with it.
    pub fn to_error(&self) -> UnpackError {
        match self.kind {
            FailureKind::Decode => UnpackError::Decode {
                row: self.row,
                reason: self.reason.clone(),
            },
            FailureKind::Aggregation => UnpackError::Aggregation {
                row: self.row,
                characterization: self.characterization.clone().unwrap_or_default(),
                reason: self.reason.clone(),
            },
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct FailureReport {
    records: Vec<FailureRecord>,
}

impl FailureReport {
    pub fn push(&mut self, record: FailureRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn count(&self, kind: FailureKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    pub fn is_clean(&self) -> bool {
        self.records.is_empty()
    }

    /// Counts per failure kind, in a stable order.
    pub fn counts(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Write the report as JSON, stamped with the generation time.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let document = ReportDocument {
            generated_at: Utc::now(),
            total_failures: self.total(),
            decode_errors: self.count(FailureKind::Decode),
            aggregation_errors: self.count(FailureKind::Aggregation),
            records: &self.records,
        };

        let mut file = fs::File::create(path)
            .map_err(|e| UnpackError::io(format!("creating `{}`", path.display()), e))?;
        serde_json::to_writer_pretty(&mut file, &document)?;
        file.write_all(b"\n")
            .map_err(|e| UnpackError::io(format!("writing `{}`", path.display()), e))?;
        Ok(())
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "no row failures");
        }
        write!(f, "{} row failure(s)", self.total())?;
        let mut sep = " (";
        for (kind, count) in self.counts() {
            write!(f, "{}{}: {}", sep, kind, count)?;
            sep = ", ";
        }
        write!(f, ")")
    }
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    generated_at: DateTime<Utc>,
    total_failures: usize,
    decode_errors: usize,
    aggregation_errors: usize,
    records: &'a [FailureRecord],
}
