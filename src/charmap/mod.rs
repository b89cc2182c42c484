//! Characterization map: user-supplied mapping from a characterization name
//! to the path expression locating its value(s) inside an embedded payload.
//!
//! The map is loaded once per run and shared read-only across all rows.
//! Entry order follows the map file, and governs output column order.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, UnpackError};

/// One step of a path expression: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{}", k),
            PathSegment::Index(i) => write!(f, "{}", i),
        }
    }
}

/// An ordered sequence of keys/indices navigating a decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr(Vec<PathSegment>);

impl PathExpr {
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Parse the dotted-string form, e.g. `"cells.landuse"`. Purely numeric
    /// segments become array indices.
    fn from_dotted(name: &str, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(UnpackError::config(format!(
                "entry `{}` has an empty path expression",
                name
            )));
        }
        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                return Err(UnpackError::config(format!(
                    "entry `{}` has an empty segment in path `{}`",
                    name, raw
                )));
            }
            if part.bytes().all(|b| b.is_ascii_digit()) {
                let idx = part.parse::<usize>().map_err(|_| {
                    UnpackError::config(format!(
                        "entry `{}` has an out-of-range index `{}`",
                        name, part
                    ))
                })?;
                segments.push(PathSegment::Index(idx));
            } else {
                segments.push(PathSegment::Key(part.to_string()));
            }
        }
        Ok(PathExpr(segments))
    }

    /// Parse the explicit-list form, e.g. `["cells", "landuse"]` or
    /// `["turbines", 0, "hub_height"]`. Strings stay keys even when numeric.
    fn from_list(name: &str, items: &[Value]) -> Result<Self> {
        if items.is_empty() {
            return Err(UnpackError::config(format!(
                "entry `{}` has an empty path expression",
                name
            )));
        }
        let mut segments = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(s) if !s.is_empty() => {
                    segments.push(PathSegment::Key(s.clone()));
                }
                Value::Number(n) => {
                    let idx = n.as_u64().ok_or_else(|| {
                        UnpackError::config(format!(
                            "entry `{}` has a non-integer path segment `{}`",
                            name, n
                        ))
                    })?;
                    segments.push(PathSegment::Index(idx as usize));
                }
                other => {
                    return Err(UnpackError::config(format!(
                        "entry `{}` has a path segment that is neither a \
                         string nor an integer: {}",
                        name, other
                    )));
                }
            }
        }
        Ok(PathExpr(segments))
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

/// Validated name → path mapping, in map-definition order.
#[derive(Debug, Clone)]
pub struct CharacterizationMap {
    entries: Vec<(String, PathExpr)>,
}

impl CharacterizationMap {
    /// Load and validate a map file. `.yaml`/`.yml` sources are parsed as
    /// YAML; everything else must be well-formed JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            UnpackError::io(
                format!("reading characterization map `{}`", path.display()),
                e,
            )
        })?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| {
                ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml")
            });

        let value: Value = if is_yaml {
            serde_yaml::from_str(&text).map_err(|e| {
                UnpackError::config(format!("`{}` is not well-formed YAML: {}", path.display(), e))
            })?
        } else {
            serde_json::from_str(&text).map_err(|e| {
                UnpackError::config(format!("`{}` is not well-formed JSON: {}", path.display(), e))
            })?
        };

        let map = Self::from_value(value)?;
        debug!(entries = map.len(), path = %path.display(), "loaded characterization map");
        Ok(map)
    }

    /// Build a map from an in-memory JSON string.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(|e| {
            UnpackError::config(format!("map source is not well-formed JSON: {}", e))
        })?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self> {
        let Value::Object(obj) = value else {
            return Err(UnpackError::config(
                "map source must be an object of name -> path entries",
            ));
        };

        let mut entries = Vec::with_capacity(obj.len());
        // Names that differ only by case or surrounding whitespace would
        // collide as output columns, so they count as duplicates here.
        let mut seen: HashSet<String> = HashSet::with_capacity(obj.len());

        for (name, path_value) in obj {
            let normalized = name.trim().to_lowercase();
            if normalized.is_empty() {
                return Err(UnpackError::config("characterization name is empty"));
            }
            if !seen.insert(normalized) {
                return Err(UnpackError::config(format!(
                    "duplicate characterization name `{}`",
                    name.trim()
                )));
            }

            let path = match &path_value {
                Value::String(s) => PathExpr::from_dotted(&name, s)?,
                Value::Array(items) => PathExpr::from_list(&name, items)?,
                other => {
                    return Err(UnpackError::config(format!(
                        "entry `{}` must be a dotted string or a list of \
                         segments, got {}",
                        name, other
                    )));
                }
            };
            entries.push((name, path));
        }

        Ok(CharacterizationMap { entries })
    }

    /// Iterate `(name, path)` pairs in map-definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PathExpr)> {
        self.entries.iter().map(|(n, p)| (n.as_str(), p))
    }

    /// Characterization names in map-definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
