//! Per-row payload decoding.
//!
//! A supply-curve row carries its characterization data as one embedded
//! JSON string. Decoding is purely syntactic: missing-field situations are
//! the resolver's concern, not the decoder's.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{Result, UnpackError};

/// Raw cell contents that mean "this row has no characterization data".
/// Compared case-insensitively after trimming.
static NO_DATA_SENTINELS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["none", "null", "nan", "{}"].into_iter().collect());

/// The nested structure parsed from one row's payload cell.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    /// Empty or sentinel cell: the row legitimately has no data, and every
    /// characterization resolves to null without an error.
    Empty,
    Tree(Value),
}

impl DecodedPayload {
    pub fn is_empty(&self) -> bool {
        matches!(self, DecodedPayload::Empty)
    }
}

/// Decode the payload cell of row `row`. Malformed JSON is attributed to
/// that row only; callers decide whether it aborts the run.
pub fn decode(row: usize, raw: &str) -> Result<DecodedPayload> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || NO_DATA_SENTINELS.contains(trimmed.to_lowercase().as_str()) {
        return Ok(DecodedPayload::Empty);
    }

    let value: Value = serde_json::from_str(trimmed).map_err(|e| UnpackError::Decode {
        row,
        reason: e.to_string(),
    })?;
    Ok(DecodedPayload::Tree(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_sentinel_cells_decode_to_empty() -> anyhow::Result<()> {
        for raw in ["", "   ", "None", "none", "NULL", "NaN", "{}", " nan "] {
            assert!(
                decode(0, raw)?.is_empty(),
                "`{raw}` should decode to Empty"
            );
        }
        Ok(())
    }

    #[test]
    fn valid_json_decodes_to_tree() -> anyhow::Result<()> {
        let payload = decode(3, r#"{"0": {"landuse": "forest", "area": 2.0}}"#)?;
        match payload {
            DecodedPayload::Tree(Value::Object(obj)) => {
                assert!(obj.contains_key("0"));
            }
            other => panic!("expected object tree, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn malformed_json_is_a_row_scoped_decode_error() {
        let err = decode(17, r#"{"cells": "#).unwrap_err();
        match err {
            UnpackError::Decode { row, .. } => assert_eq!(row, 17),
            other => panic!("expected Decode, got {other}"),
        }
    }
}
