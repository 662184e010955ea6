//! # Nomad Core
//!
//! Shared types for the nomad batch data-cleaning engine: the error
//! taxonomy, the process-wide [`Config`], the declarative [`Workflow`]
//! model, and the Pattern Registry of named Unicode character classes.
//!
//! This crate has no I/O and no knowledge of Arrow readers/writers — it is
//! the vocabulary the `nomad-io` and `nomad-tx` crates share.

pub mod config;
pub mod error;
pub mod pattern;
pub mod workflow;

pub use config::Config;
pub use error::{NomadError, NomadResult, TransformErrorKind};
pub use workflow::{AdditionalItem, Compression, Concatenation, Dedup, NotEmpty, Structure, Workflow};
