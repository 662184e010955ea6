//! Row Operator (C5): not-empty filtering and cross-batch deduplication.
//!
//! Filtering is a pure per-batch [`BatchTransform`]. Deduplication
//! cannot be: a row's fate depends on every row seen before it in the run,
//! so [`Deduplicator`] is modeled as a separate, explicitly stateful struct
//! the engine driver threads through the whole stream, applied after the
//! column operator and before the structure assembler.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use arrow_array::{Array, ArrayRef, RecordBatch, StringArray};
use arrow_cast::cast;
use arrow_schema::{DataType, Schema};
use arrow_select::filter::filter_record_batch;
use nomad_core::{NomadError, TransformErrorKind};

use crate::plan::BatchTransform;

/// Drops rows where any column named in `not_empty.columns` (or, if
/// empty, any column in the batch) is null.
pub struct NotEmptyFilter {
    columns: Vec<String>,
}

impl NotEmptyFilter {
    pub fn new(columns: Vec<String>) -> Self {
        NotEmptyFilter { columns }
    }

    fn target_indices(&self, schema: &Schema) -> Vec<usize> {
        if self.columns.is_empty() {
            (0..schema.fields().len()).collect()
        } else {
            self.columns
                .iter()
                .filter_map(|name| schema.fields().iter().position(|f| f.name() == name))
                .collect()
        }
    }
}

impl BatchTransform for NotEmptyFilter {
    fn output_schema(&self, input: &Schema) -> Result<Schema, NomadError> {
        Ok(input.clone())
    }

    fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, NomadError> {
        let indices = self.target_indices(batch.schema().as_ref());
        if indices.is_empty() {
            return Ok(batch.clone());
        }
        let rows = batch.num_rows();
        let mut keep = arrow_array::builder::BooleanBuilder::with_capacity(rows);
        for row in 0..rows {
            let any_null = indices.iter().any(|&i| batch.column(i).is_null(row));
            keep.append_value(!any_null);
        }
        filter_record_batch(batch, &keep.finish())
            .map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))
    }
}

/// Cross-batch row deduplication keyed on `unique_columns` (or, if empty,
/// every current column). Holds a running set of hashed key tuples across
/// the entire streamed run — the one piece of the pipeline the engine
/// driver must call in strict sequence rather than compose into a [`Plan`].
pub struct Deduplicator {
    columns: Vec<String>,
    seen: HashSet<u64>,
}

impl Deduplicator {
    pub fn new(columns: Vec<String>) -> Self {
        Deduplicator {
            columns,
            seen: HashSet::new(),
        }
    }

    fn key_indices(&self, schema: &Schema) -> Vec<usize> {
        if self.columns.is_empty() {
            (0..schema.fields().len()).collect()
        } else {
            self.columns
                .iter()
                .filter_map(|name| schema.fields().iter().position(|f| f.name() == name))
                .collect()
        }
    }

    fn row_key(arrays: &[StringArray], row: usize) -> u64 {
        let mut hasher = DefaultHasher::new();
        for arr in arrays {
            if arr.is_null(row) {
                0u8.hash(&mut hasher);
                continue;
            }
            1u8.hash(&mut hasher);
            arr.value(row).hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Filters `batch` down to rows not seen in any prior call, recording
    /// their keys. Row order within the batch is preserved.
    pub fn dedup(&mut self, batch: &RecordBatch) -> Result<RecordBatch, NomadError> {
        let indices = self.key_indices(batch.schema().as_ref());
        let key_arrays: Vec<StringArray> = indices
            .iter()
            .map(|&i| -> Result<StringArray, NomadError> {
                let col = batch.column(i);
                if col.data_type() == &DataType::Utf8 {
                    Ok(col.as_any().downcast_ref::<StringArray>().unwrap().clone())
                } else {
                    let casted = cast(col, &DataType::Utf8)
                        .map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))?;
                    Ok(casted.as_any().downcast_ref::<StringArray>().unwrap().clone())
                }
            })
            .collect::<Result<_, _>>()?;
        let rows = batch.num_rows();
        let mut keep = arrow_array::builder::BooleanBuilder::with_capacity(rows);
        for row in 0..rows {
            let key = Self::row_key(&key_arrays, row);
            keep.append_value(self.seen.insert(key));
        }
        filter_record_batch(batch, &keep.finish())
            .map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::{DataType, Field};
    use std::sync::Arc;

    fn batch(values: &[Option<&str>]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Utf8, true)]));
        let arr: ArrayRef = Arc::new(StringArray::from(values.to_vec()));
        RecordBatch::try_new(schema, vec![arr]).unwrap()
    }

    fn two_column_batch(a: &[Option<&str>], b: &[Option<&str>]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Utf8, true),
            Field::new("b", DataType::Utf8, true),
        ]));
        let arr_a: ArrayRef = Arc::new(StringArray::from(a.to_vec()));
        let arr_b: ArrayRef = Arc::new(StringArray::from(b.to_vec()));
        RecordBatch::try_new(schema, vec![arr_a, arr_b]).unwrap()
    }

    #[test]
    fn not_empty_drops_all_null_rows() {
        let filter = NotEmptyFilter::new(vec!["a".to_string()]);
        let out = filter.apply(&batch(&[Some("x"), None, Some("y")])).unwrap();
        assert_eq!(out.num_rows(), 2);
    }

    #[test]
    fn not_empty_drops_row_with_any_listed_column_null() {
        let filter = NotEmptyFilter::new(vec!["a".to_string(), "b".to_string()]);
        // row 0: both present, row 1: only "a" null, row 2: only "b" null, row 3: both present.
        let out = filter
            .apply(&two_column_batch(
                &[Some("x"), None, Some("y"), Some("z")],
                &[Some("1"), Some("2"), None, Some("4")],
            ))
            .unwrap();
        assert_eq!(out.num_rows(), 2);
        let a = out.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(a.value(0), "x");
        assert_eq!(a.value(1), "z");
    }

    #[test]
    fn dedup_drops_repeat_keys_across_batches() {
        let mut dedup = Deduplicator::new(vec!["a".to_string()]);
        let first = dedup.dedup(&batch(&[Some("x"), Some("y"), Some("x")])).unwrap();
        assert_eq!(first.num_rows(), 2);
        let second = dedup.dedup(&batch(&[Some("x"), Some("z")])).unwrap();
        assert_eq!(second.num_rows(), 1);
    }

    #[test]
    fn dedup_defaults_to_all_columns_when_unspecified() {
        let mut dedup = Deduplicator::new(vec![]);
        let first = dedup.dedup(&batch(&[Some("x")])).unwrap();
        assert_eq!(first.num_rows(), 1);
    }
}
