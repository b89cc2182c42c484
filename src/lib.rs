//! scunpack: expand supply-curve characterization payloads into flat
//! columns.
//!
//! Supply-curve tables for bespoke wind (and similar multi-cell
//! technologies) embed per-cell land-use, resource, and exclusion detail
//! as a JSON string in one column. This crate unpacks that column,
//! per a user-supplied characterization map, into one analyzable column
//! per characterization, and reports any rows it had to degrade.

pub mod aggregate;
pub mod charmap;
pub mod error;
pub mod expand;
pub mod payload;
pub mod resolve;
pub mod table;

pub use charmap::CharacterizationMap;
pub use error::{Result, UnpackError};
pub use expand::{expand, ExpandOptions, FailureReport, Mode};
pub use table::SupplyCurveTable;
