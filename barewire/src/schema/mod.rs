//! Schema model, validation, size analysis, canonical identity and
//! compatibility analysis.
//!
//! A schema starts life as a [`Schema<Draft>`], collects named type
//! definitions, and is turned into an immutable [`Schema<Validated>`] by
//! [`Schema::validate`]. Every other layer of the crate refuses drafts at
//! the type level.

mod canonical;
mod compat;
mod model;
mod size;
mod validate;

pub use canonical::{canonical_text, schema_id};
pub use compat::{check_read_compatibility, CompatIssue, CompatReport, Compatibility};
pub use model::{Draft, PrimitiveType, Schema, StructField, Type, Validated};
pub use size::SizeInfo;
