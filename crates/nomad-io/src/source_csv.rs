//! CSV half of the Source Reader (C2).
//!
//! Ragged rows are tolerated (extras truncated, missing fields padded with
//! null) via the `csv` crate's flexible-record mode — `arrow-csv`'s own
//! reader is stricter than this domain's inputs need. Schema is inferred
//! from a bounded prefix of rows; the file is then re-read from the start
//! for the actual streaming pass.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::builder::{Float64Builder, Int64Builder, StringBuilder};
use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use encoding_rs::Encoding;
use encoding_rs_io::DecodeReaderBytesBuilder;
use nomad_core::NomadError;
use tracing::warn;

use crate::source::BatchSource;

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub encoding: String,
    pub delimiter: u8,
    pub null_tokens: Vec<String>,
    pub has_header: bool,
    /// When true, the CSV reader's own quote handling is disabled so stray
    /// `"`/`'` characters are read as literal field content rather than
    /// quoting syntax. Left `false` here, `CsvSource::open` auto-detects
    /// this by scanning the file's leading lines the way the upstream
    /// pre-pass does; set it explicitly to force the behavior either way.
    pub strip_quotes: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            encoding: "utf-8".to_string(),
            delimiter: b',',
            null_tokens: crate::source::default_null_tokens(),
            has_header: true,
            strip_quotes: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int64,
    Float64,
    Utf8,
}

pub struct CsvSource {
    path: PathBuf,
    options: CsvOptions,
    schema: SchemaRef,
    kinds: Vec<ColumnKind>,
    reader: csv::Reader<Box<dyn Read>>,
    batch_size: usize,
    exhausted: bool,
}

/// Leading lines scanned for stray quote characters when deciding whether
/// to auto-enable `strip_quotes`.
const QUOTE_SCAN_LINES: usize = 20;

/// Scans the first [`QUOTE_SCAN_LINES`] lines of the decoded file for `"`
/// or `'` characters, the same heuristic the upstream pre-pass uses to
/// decide whether a file embeds quotes outside the standard CSV
/// convention.
fn detect_stray_quotes(path: &Path, options: &CsvOptions) -> Result<bool, NomadError> {
    let file = File::open(path).map_err(|e| NomadError::SourceError(format!("{}: {e}", path.display())))?;
    let encoding = resolve_encoding(&options.encoding);
    let decoded: Box<dyn Read> = Box::new(
        DecodeReaderBytesBuilder::new()
            .encoding(Some(encoding))
            .utf8_passthru(true)
            .build(file),
    );
    let reader = BufReader::new(decoded);
    for line in reader.lines().take(QUOTE_SCAN_LINES) {
        let line = line.map_err(|e| NomadError::DecodeError(format!("{}: {e}", path.display())))?;
        if line.contains('"') || line.contains('\'') {
            return Ok(true);
        }
    }
    Ok(false)
}

impl CsvSource {
    pub fn open(path: &Path, mut options: CsvOptions, analyze_rows: usize, batch_size: usize) -> Result<Self, NomadError> {
        if !options.strip_quotes {
            options.strip_quotes = detect_stray_quotes(path, &options)?;
        }
        let (schema, kinds) = infer_schema(path, &options, analyze_rows)?;
        let reader = open_decoded_reader(path, &options)?;
        Ok(CsvSource {
            path: path.to_path_buf(),
            options,
            schema,
            kinds,
            reader,
            batch_size,
            exhausted: false,
        })
    }
}

fn resolve_encoding(label: &str) -> &'static Encoding {
    Encoding::for_label(label.as_bytes()).unwrap_or(encoding_rs::UTF_8)
}

fn open_decoded_reader(path: &Path, options: &CsvOptions) -> Result<csv::Reader<Box<dyn Read>>, NomadError> {
    let file = File::open(path).map_err(|e| NomadError::SourceError(format!("{}: {e}", path.display())))?;
    let encoding = resolve_encoding(&options.encoding);
    let decoded: Box<dyn Read> = Box::new(
        DecodeReaderBytesBuilder::new()
            .encoding(Some(encoding))
            .utf8_passthru(true)
            .build(file),
    );
    let reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(options.has_header)
        .flexible(true)
        .quoting(!options.strip_quotes)
        .trim(csv::Trim::All)
        .from_reader(decoded);
    Ok(reader)
}

fn clean_header(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_string()
}

fn infer_schema(path: &Path, options: &CsvOptions, analyze_rows: usize) -> Result<(SchemaRef, Vec<ColumnKind>), NomadError> {
    let mut reader = open_decoded_reader(path, options)?;

    let header: Vec<String> = if options.has_header {
        reader
            .headers()
            .map_err(|e| NomadError::DecodeError(format!("{}: {e}", path.display())))?
            .iter()
            .map(clean_header)
            .collect()
    } else {
        let width = reader
            .records()
            .next()
            .transpose()
            .map_err(|e| NomadError::DecodeError(format!("{}: {e}", path.display())))?
            .map(|r| r.len())
            .unwrap_or(0);
        (0..width).map(|i| format!("col_{i}")).collect()
    };

    let mut seen = HashSet::new();
    for name in &header {
        if !seen.insert(name.clone()) {
            return Err(NomadError::InvalidSchema(format!(
                "{}: duplicate column name after trimming: {name}",
                path.display()
            )));
        }
    }

    let width = header.len();
    let mut all_int = vec![true; width];
    let mut all_float = vec![true; width];
    let mut any_value = vec![false; width];

    for record in reader.records().take(analyze_rows) {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(error = ?e, "skipping malformed row during schema inference");
                continue;
            }
        };
        for i in 0..width {
            let raw = record.get(i).unwrap_or("");
            let trimmed = raw.trim();
            if trimmed.is_empty() || options.null_tokens.iter().any(|t| t == trimmed) {
                continue;
            }
            any_value[i] = true;
            if trimmed.parse::<i64>().is_err() {
                all_int[i] = false;
            }
            if trimmed.parse::<f64>().is_err() {
                all_float[i] = false;
            }
        }
    }

    let mut kinds = Vec::with_capacity(width);
    let mut fields = Vec::with_capacity(width);
    for (i, name) in header.iter().enumerate() {
        let kind = if !any_value[i] {
            ColumnKind::Utf8
        } else if all_int[i] {
            ColumnKind::Int64
        } else if all_float[i] {
            ColumnKind::Float64
        } else {
            ColumnKind::Utf8
        };
        let dtype = match kind {
            ColumnKind::Int64 => DataType::Int64,
            ColumnKind::Float64 => DataType::Float64,
            ColumnKind::Utf8 => DataType::Utf8,
        };
        kinds.push(kind);
        fields.push(Field::new(name, dtype, true));
    }

    Ok((Arc::new(Schema::new(fields)), kinds))
}

impl BatchSource for CsvSource {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>, NomadError> {
        if self.exhausted {
            return Ok(None);
        }

        let width = self.kinds.len();
        let mut string_builders: Vec<Option<StringBuilder>> = self
            .kinds
            .iter()
            .map(|k| if *k == ColumnKind::Utf8 { Some(StringBuilder::new()) } else { None })
            .collect();
        let mut int_builders: Vec<Option<Int64Builder>> = self
            .kinds
            .iter()
            .map(|k| if *k == ColumnKind::Int64 { Some(Int64Builder::new()) } else { None })
            .collect();
        let mut float_builders: Vec<Option<Float64Builder>> = self
            .kinds
            .iter()
            .map(|k| if *k == ColumnKind::Float64 { Some(Float64Builder::new()) } else { None })
            .collect();

        let mut rows_in_batch = 0usize;
        loop {
            if rows_in_batch >= self.batch_size {
                break;
            }
            let mut record = csv::StringRecord::new();
            let read = self
                .reader
                .read_record(&mut record)
                .map_err(|e| NomadError::DecodeError(format!("{}: {e}", self.path.display())))?;
            if !read {
                self.exhausted = true;
                break;
            }

            for i in 0..width {
                let raw = record.get(i).unwrap_or("");
                let trimmed = raw.trim();
                let is_null = trimmed.is_empty() || self.options.null_tokens.iter().any(|t| t == trimmed);
                match self.kinds[i] {
                    ColumnKind::Utf8 => {
                        let b = string_builders[i].as_mut().unwrap();
                        if is_null {
                            b.append_null();
                        } else {
                            b.append_value(trimmed);
                        }
                    }
                    ColumnKind::Int64 => {
                        let b = int_builders[i].as_mut().unwrap();
                        if is_null {
                            b.append_null();
                        } else {
                            match trimmed.parse::<i64>() {
                                Ok(v) => b.append_value(v),
                                Err(_) => b.append_null(),
                            }
                        }
                    }
                    ColumnKind::Float64 => {
                        let b = float_builders[i].as_mut().unwrap();
                        if is_null {
                            b.append_null();
                        } else {
                            match trimmed.parse::<f64>() {
                                Ok(v) => b.append_value(v),
                                Err(_) => b.append_null(),
                            }
                        }
                    }
                }
            }
            rows_in_batch += 1;
        }

        if rows_in_batch == 0 {
            return Ok(None);
        }

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(width);
        for i in 0..width {
            let array: ArrayRef = match self.kinds[i] {
                ColumnKind::Utf8 => Arc::new(string_builders[i].take().unwrap().finish()),
                ColumnKind::Int64 => Arc::new(int_builders[i].take().unwrap().finish()),
                ColumnKind::Float64 => Arc::new(float_builders[i].take().unwrap().finish()),
            };
            columns.push(array);
        }

        let batch = RecordBatch::try_new(self.schema.clone(), columns)
            .map_err(|e| NomadError::InvalidSchema(format!("{}: {e}", self.path.display())))?;
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn infers_int_and_string_columns() {
        let f = write_csv("a,b\n1,x\n2,y\n3,z\n");
        let opts = CsvOptions::default();
        let source = CsvSource::open(f.path(), opts, 1000, 100).unwrap();
        let schema = source.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
    }

    #[test]
    fn detects_duplicate_header_after_trim() {
        let f = write_csv("\"a\", a \nx,y\n");
        let opts = CsvOptions::default();
        let err = CsvSource::open(f.path(), opts, 1000, 100).unwrap_err();
        assert!(matches!(err, NomadError::InvalidSchema(_)));
    }

    #[test]
    fn ragged_rows_are_tolerated() {
        let f = write_csv("a,b,c\n1,2\n3,4,5,6\n");
        let opts = CsvOptions::default();
        let mut source = CsvSource::open(f.path(), opts, 1000, 100).unwrap();
        let batch = source.next_batch().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 2);
    }

    #[test]
    fn stray_quotes_auto_disable_quoting() {
        // Field `b` on the first data row opens a quote it never closes.
        // With the CSV reader's quoting convention active, that swallows
        // every line after it into one record; auto-detecting the stray
        // quote and disabling quoting keeps each physical line its own row.
        let f = write_csv("a,b\nx,\"partial\ny,z\n");
        let opts = CsvOptions::default();
        let mut source = CsvSource::open(f.path(), opts, 1000, 100).unwrap();
        let batch = source.next_batch().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 2);
    }

    #[test]
    fn null_tokens_become_null() {
        let f = write_csv("a\nNULL\nhello\n");
        let opts = CsvOptions::default();
        let mut source = CsvSource::open(f.path(), opts, 1000, 100).unwrap();
        let batch = source.next_batch().unwrap().unwrap();
        let col = batch.column(0).as_any().downcast_ref::<arrow_array::StringArray>().unwrap();
        assert!(col.is_null(0));
        assert_eq!(col.value(1), "hello");
    }
}
