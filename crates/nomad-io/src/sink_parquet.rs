//! Sink Writer (C7): streams the fully composed plan to a Parquet file.
//!
//! Writes to a tempfile adjacent to the final path and renames atomically
//! on success so a crash or early-exit never leaves a partially-written
//! file at the configured output path. No
//! runtime dependency on the `tempfile` crate is needed for this — a
//! sibling `<name>.tmp-<pid>` path plus `std::fs::rename` does the same
//! thing the corpus reserves `tempfile` for in tests only (see DESIGN.md).

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use nomad_core::{Compression as WorkflowCompression, NomadError};
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::info;

fn resolve_compression(choice: WorkflowCompression) -> Compression {
    match choice {
        WorkflowCompression::Zstd => Compression::ZSTD(
            parquet::basic::ZstdLevel::try_new(3).expect("zstd level 3 is always valid"),
        ),
        WorkflowCompression::Snappy => Compression::SNAPPY,
        WorkflowCompression::Gzip => Compression::GZIP(Default::default()),
        WorkflowCompression::None => Compression::UNCOMPRESSED,
    }
}

fn tmp_path_for(output: &Path) -> PathBuf {
    let mut tmp = output.as_os_str().to_os_string();
    tmp.push(format!(".tmp-{}", std::process::id()));
    PathBuf::from(tmp)
}

/// Streaming Parquet writer. One [`RecordBatch`] at a time reaches
/// `write`; the peak working set is bounded by a single row group.
pub struct SinkWriter {
    output_path: PathBuf,
    tmp_path: PathBuf,
    writer: Option<ArrowWriter<File>>,
}

impl SinkWriter {
    pub fn create(
        output_path: impl Into<PathBuf>,
        schema: SchemaRef,
        compression: WorkflowCompression,
    ) -> Result<Self, NomadError> {
        let output_path = output_path.into();
        let output_path = output_path.with_extension("parquet");

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| NomadError::SinkError(format!("{}: {e}", parent.display())))?;
            }
        }

        let tmp_path = tmp_path_for(&output_path);
        let file = File::create(&tmp_path)
            .map_err(|e| NomadError::SinkError(format!("{}: {e}", tmp_path.display())))?;

        let props = WriterProperties::builder()
            .set_compression(resolve_compression(compression))
            .build();
        let writer = ArrowWriter::try_new(file, schema, Some(props))
            .map_err(|e| NomadError::SinkError(format!("{e}")))?;

        Ok(SinkWriter {
            output_path,
            tmp_path,
            writer: Some(writer),
        })
    }

    pub fn write(&mut self, batch: &RecordBatch) -> Result<(), NomadError> {
        let writer = self.writer.as_mut().expect("write called after finish");
        info!(rows = batch.num_rows(), "writing batch");
        writer.write(batch).map_err(|e| NomadError::SinkError(format!("{e}")))
    }

    /// Flushes remaining data and atomically publishes the output file.
    pub fn finish(mut self) -> Result<PathBuf, NomadError> {
        let writer = self.writer.take().expect("finish called twice");
        writer.close().map_err(|e| NomadError::SinkError(format!("{e}")))?;
        std::fs::rename(&self.tmp_path, &self.output_path)
            .map_err(|e| NomadError::SinkError(format!("rename to {}: {e}", self.output_path.display())))?;
        Ok(self.output_path.clone())
    }

    /// Removes the partially-written tempfile on any non-`Done` exit path.
    pub fn abort(mut self) {
        self.writer.take();
        let _ = std::fs::remove_file(&self.tmp_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::Int64Array;
    use arrow_schema::{DataType, Field, Schema};
    use std::sync::Arc;

    fn sample_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, true)]))
    }

    #[test]
    fn writes_and_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("result.parquet");
        let schema = sample_schema();
        let mut sink = SinkWriter::create(&out, schema.clone(), WorkflowCompression::Zstd).unwrap();
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2, 3]))]).unwrap();
        sink.write(&batch).unwrap();
        let final_path = sink.finish().unwrap();
        assert_eq!(final_path, out);
        assert!(out.exists());
    }

    #[test]
    fn abort_leaves_no_tempfile() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("aborted.parquet");
        let schema = sample_schema();
        let sink = SinkWriter::create(&out, schema, WorkflowCompression::None).unwrap();
        let tmp = tmp_path_for(&out);
        assert!(tmp.exists());
        sink.abort();
        assert!(!tmp.exists());
        assert!(!out.exists());
    }

    #[test]
    fn forces_parquet_extension() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("result.csv");
        let schema = sample_schema();
        let sink = SinkWriter::create(&out, schema, WorkflowCompression::None).unwrap();
        sink.abort();
        assert_eq!(out.with_extension("parquet").extension().unwrap(), "parquet");
    }
}
