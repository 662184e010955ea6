//! # Nomad I/O
//!
//! Concrete Source Reader (C2) and Sink Writer (C7) implementations: opens
//! CSV or Parquet input by extension and streams a fully composed plan out
//! to a Parquet file.

pub mod sink_parquet;
pub mod source;
pub mod source_csv;
pub mod source_parquet;

pub use sink_parquet::SinkWriter;
pub use source::{open, BatchSource};
pub use source_csv::CsvOptions;
