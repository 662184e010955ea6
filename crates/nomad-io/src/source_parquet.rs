//! Parquet half of the Source Reader (C2). Streams row groups through
//! `parquet::arrow`'s batch reader; non-textual columns keep their native
//! Arrow type (coerced to text only if a transform targets them).

use std::fs::File;
use std::path::Path;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use nomad_core::NomadError;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};

use crate::source::BatchSource;

pub struct ParquetSource {
    schema: SchemaRef,
    reader: ParquetRecordBatchReader,
}

impl ParquetSource {
    pub fn open(path: &Path, batch_size: usize) -> Result<Self, NomadError> {
        let file = File::open(path).map_err(|e| NomadError::SourceError(format!("{}: {e}", path.display())))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| NomadError::SourceError(format!("{}: {e}", path.display())))?
            .with_batch_size(batch_size);
        let schema = builder.schema().clone();
        let reader = builder
            .build()
            .map_err(|e| NomadError::SourceError(format!("{}: {e}", path.display())))?;
        Ok(ParquetSource { schema, reader })
    }
}

impl BatchSource for ParquetSource {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>, NomadError> {
        match self.reader.next() {
            Some(Ok(batch)) => Ok(Some(batch)),
            Some(Err(e)) => Err(NomadError::SourceError(format!("parquet read error: {e}"))),
            None => Ok(None),
        }
    }
}
