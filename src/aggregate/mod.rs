//! Collapses the leaf values resolved for one characterization on one row
//! into a single output value.
//!
//! Policy by observed leaf kind:
//! - no leaves (or only nulls) -> null
//! - numeric leaves -> weight-normalized mean, arithmetic mean when every
//!   weight is zero
//! - categorical leaves (text or bool) -> category -> weight-fraction map,
//!   count fractions when every weight is zero
//! - numeric mixed with categorical -> kind mismatch, recorded per
//!   row/characterization
//!
//! The policy is deterministic and independent of leaf order: categorical
//! output lives in a `BTreeMap`, numeric accumulation differs across
//! permutations only by float rounding.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::resolve::{LeafScalar, LeafValue};

/// Single output representation written into one expanded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateValue {
    Null,
    Number(f64),
    Fractions(BTreeMap<String, f64>),
}

impl AggregateValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AggregateValue::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AggregateValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Render into a table cell: empty string for null, plain float for
    /// numbers, canonical sorted-key JSON for fraction maps.
    pub fn to_cell(&self) -> String {
        match self {
            AggregateValue::Null => String::new(),
            AggregateValue::Number(v) => v.to_string(),
            AggregateValue::Fractions(fractions) => {
                let object: serde_json::Map<String, Value> = fractions
                    .iter()
                    .map(|(category, fraction)| (category.clone(), Value::from(*fraction)))
                    .collect();
                Value::Object(object).to_string()
            }
        }
    }
}

/// Incompatible leaf kinds within one characterization. The caller
/// attributes this to its row and characterization name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindMismatch {
    pub numeric: usize,
    pub categorical: usize,
}

impl fmt::Display for KindMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "incompatible leaf kinds: {} numeric and {} categorical values",
            self.numeric, self.categorical
        )
    }
}

pub fn aggregate(leaves: &[LeafValue]) -> Result<AggregateValue, KindMismatch> {
    // Null leaves carry no information; a characterization whose every leaf
    // is null behaves like an empty resolution.
    let live: Vec<&LeafValue> = leaves
        .iter()
        .filter(|leaf| !matches!(leaf.value, LeafScalar::Null))
        .collect();
    if live.is_empty() {
        return Ok(AggregateValue::Null);
    }

    let numeric = live
        .iter()
        .filter(|leaf| matches!(leaf.value, LeafScalar::Number(_)))
        .count();
    let categorical = live.len() - numeric;

    if numeric > 0 && categorical > 0 {
        return Err(KindMismatch {
            numeric,
            categorical,
        });
    }

    if categorical == 0 {
        Ok(aggregate_numeric(&live))
    } else {
        Ok(aggregate_categorical(&live))
    }
}

fn aggregate_numeric(leaves: &[&LeafValue]) -> AggregateValue {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut plain_sum = 0.0;

    for leaf in leaves {
        let LeafScalar::Number(v) = &leaf.value else {
            continue;
        };
        let v = *v;
        weighted_sum += v * leaf.weight;
        weight_total += leaf.weight;
        plain_sum += v;
    }

    if weight_total > 0.0 {
        AggregateValue::Number(weighted_sum / weight_total)
    } else {
        AggregateValue::Number(plain_sum / leaves.len() as f64)
    }
}

fn aggregate_categorical(leaves: &[&LeafValue]) -> AggregateValue {
    // per category: (weight sum, leaf count)
    let mut buckets: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut weight_total = 0.0;

    for leaf in leaves {
        let category = match &leaf.value {
            LeafScalar::Text(s) => s.clone(),
            LeafScalar::Bool(b) => b.to_string(),
            _ => continue,
        };
        let bucket = buckets.entry(category).or_insert((0.0, 0));
        bucket.0 += leaf.weight;
        bucket.1 += 1;
        weight_total += leaf.weight;
    }

    let count_total = leaves.len() as f64;
    let fractions = buckets
        .into_iter()
        .map(|(category, (weight, count))| {
            let fraction = if weight_total > 0.0 {
                weight / weight_total
            } else {
                count as f64 / count_total
            };
            (category, fraction)
        })
        .collect();
    AggregateValue::Fractions(fractions)
}
