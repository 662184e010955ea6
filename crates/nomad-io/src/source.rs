//! Source Reader (C2): opens a path as either Parquet or delimited text
//! based on the file extension (case-insensitive) and exposes it as a
//! lazy, schema-known stream of [`RecordBatch`]es.
//!
//! No rows are read until [`BatchSource::next_batch`] is called — opening a
//! source only determines its schema.

use std::path::Path;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use nomad_core::NomadError;

use crate::source_csv::{CsvOptions, CsvSource};
use crate::source_parquet::ParquetSource;

/// Default null tokens recognised by the CSV source when no override is
/// supplied in the workflow/CLI configuration.
pub fn default_null_tokens() -> Vec<String> {
    ["", " ", "\t", "NULL", "null", "NaN", "nan", "None", "none"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// A lazily-opened tabular source: schema is known up front, rows stream
/// one [`RecordBatch`] at a time.
pub trait BatchSource {
    fn schema(&self) -> SchemaRef;
    fn next_batch(&mut self) -> Result<Option<RecordBatch>, NomadError>;
}

/// Opens `path` as a CSV or Parquet source based on its extension.
///
/// `csv_options` is required for CSV inputs (`encoding`/`delimiter` are
/// mandatory for CSV) and ignored for Parquet inputs.
pub fn open(
    path: &Path,
    csv_options: Option<CsvOptions>,
    analyze_rows: usize,
    batch_size: usize,
) -> Result<Box<dyn BatchSource>, NomadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "parquet" => {
            let source = ParquetSource::open(path, batch_size)?;
            Ok(Box::new(source))
        }
        _ => {
            let opts = csv_options.ok_or_else(|| {
                NomadError::SourceError(format!(
                    "{}: CSV source requires encoding/delimiter options",
                    path.display()
                ))
            })?;
            let source = CsvSource::open(path, opts, analyze_rows, batch_size)?;
            Ok(Box::new(source))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_null_tokens_match_upstream_set() {
        let tokens = default_null_tokens();
        for t in ["", " ", "\t", "NULL", "null", "NaN", "nan", "None", "none"] {
            assert!(tokens.iter().any(|x| x == t), "missing token {t:?}");
        }
    }

    #[test]
    fn open_rejects_csv_without_options() {
        let err = open(Path::new("/tmp/does-not-exist.csv"), None, 1000, 50_000).unwrap_err();
        assert!(matches!(err, NomadError::SourceError(_)));
    }
}
