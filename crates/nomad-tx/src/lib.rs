//! # Nomad Transform
//!
//! The Column Operator (C4), Row Operator (C5) and Structure Assembler
//! (C6): everything that rewrites, filters, deduplicates, and reshapes a
//! batch between the Source Reader and the Sink Writer.
//!
//! [`plan::Plan`] is the pure, schema-eager composition the column
//! operator and structure assembler build into; [`row_ops::Deduplicator`]
//! is the one stateful piece the engine driver must call outside of a
//! plan, since cross-batch dedup cannot be expressed as a per-batch rule.

pub mod column_ops;
pub mod plan;
pub mod row_ops;
pub mod structure;

pub use column_ops::{build_plan, propagate_renames};
pub use plan::{BatchTransform, Plan};
pub use row_ops::{Deduplicator, NotEmptyFilter};
pub use structure::{MetadataStep, NestStep};
