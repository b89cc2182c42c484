//! Path resolution against decoded payloads.
//!
//! A path is applied from the payload root. The bespoke-wind shape — an
//! outer container keyed by sub-cell identifier — is handled by one
//! explicit fan-out rule: when the next segment cannot be looked up
//! directly on a container whose elements are objects, the remaining path
//! is applied independently to every element. Fan-out happens at most once
//! per resolution branch, so a payload is either treated as a single cell
//! or as one layer of sub-cells, never searched at arbitrary depth.
//!
//! Resolution is read-only: it borrows into the payload and never clones
//! subtrees.

use serde_json::{Map, Value};

use crate::charmap::{PathExpr, PathSegment};
use crate::payload::DecodedPayload;

/// Sub-cell field conventionally holding the aggregation weight.
pub const DEFAULT_WEIGHT_FIELD: &str = "area";

/// Scalar kinds a payload leaf can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafScalar {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

/// A resolved scalar plus the weight drawn from its carrying sub-cell.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafValue {
    pub value: LeafScalar,
    pub weight: f64,
}

impl LeafValue {
    pub fn new(value: LeafScalar, weight: f64) -> Self {
        LeafValue { value, weight }
    }
}

/// Resolve `path` against `payload`, yielding one leaf per matching
/// sub-cell. Partial coverage across sub-cells is expected and legal; an
/// empty result is not an error.
pub fn resolve(payload: &DecodedPayload, path: &PathExpr, weight_field: &str) -> Vec<LeafValue> {
    let DecodedPayload::Tree(root) = payload else {
        return Vec::new();
    };
    let mut out = Vec::new();
    resolve_node(root, path.segments(), weight_field, None, false, &mut out);
    out
}

/// `carrier` is the nearest enclosing object, used for the weight lookup
/// once a leaf is reached. `fanned_out` marks branches already below the
/// sub-cell layer, where a missing segment means "no contribution".
fn resolve_node<'a>(
    node: &'a Value,
    path: &[PathSegment],
    weight_field: &str,
    carrier: Option<&'a Map<String, Value>>,
    fanned_out: bool,
    out: &mut Vec<LeafValue>,
) {
    let Some((segment, rest)) = path.split_first() else {
        if let Some(scalar) = as_scalar(node) {
            out.push(LeafValue::new(scalar, carrier_weight(carrier, weight_field)));
        }
        return;
    };

    match node {
        Value::Object(map) => {
            let direct = match segment {
                PathSegment::Key(key) => map.get(key.as_str()),
                PathSegment::Index(_) => None,
            };
            match direct {
                Some(child) => {
                    resolve_node(child, rest, weight_field, Some(map), fanned_out, out);
                }
                None if !fanned_out => {
                    for sub_cell in map.values().filter(|v| v.is_object()) {
                        resolve_node(sub_cell, path, weight_field, Some(map), true, out);
                    }
                }
                None => {}
            }
        }
        Value::Array(items) => {
            if let PathSegment::Index(i) = segment {
                if let Some(child) = items.get(*i) {
                    resolve_node(child, rest, weight_field, carrier, fanned_out, out);
                    return;
                }
            }
            if !fanned_out {
                for sub_cell in items.iter().filter(|v| v.is_object()) {
                    resolve_node(sub_cell, path, weight_field, carrier, true, out);
                }
            }
        }
        _ => {}
    }
}

fn as_scalar(value: &Value) -> Option<LeafScalar> {
    match value {
        Value::Number(n) => Some(LeafScalar::Number(n.as_f64().unwrap_or(f64::NAN))),
        Value::String(s) => Some(LeafScalar::Text(s.clone())),
        Value::Bool(b) => Some(LeafScalar::Bool(*b)),
        Value::Null => Some(LeafScalar::Null),
        Value::Object(_) | Value::Array(_) => None,
    }
}

fn carrier_weight(carrier: Option<&Map<String, Value>>, weight_field: &str) -> f64 {
    carrier
        .and_then(|map| map.get(weight_field))
        .and_then(Value::as_f64)
        .filter(|w| w.is_finite() && *w >= 0.0)
        .unwrap_or(1.0)
}
