//! The lazy, immutable `Plan` abstraction.
//!
//! A `Plan` is a fixed sequence of [`BatchTransform`] steps whose combined
//! output schema is computed once, eagerly, from the input schema — never
//! from data. Running the plan over a batch never blocks and never
//! observes state outside the batch itself.

use arrow_array::RecordBatch;
use arrow_schema::{Schema, SchemaRef};
use nomad_core::NomadError;

/// One pure rewrite step in a column plan. `output_schema` must be
/// derivable without any data — it is how the engine satisfies schema
/// purity (P1): the final schema is known before a single row is read.
pub trait BatchTransform {
    fn output_schema(&self, input: &Schema) -> Result<Schema, NomadError>;
    fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, NomadError>;
}

/// An ordered, schema-checked composition of [`BatchTransform`] steps.
pub struct Plan {
    steps: Vec<Box<dyn BatchTransform>>,
    schema: SchemaRef,
}

impl Plan {
    /// Builds a plan from `steps`, folding the schema through each one in
    /// order. Fails fast on the first step whose schema computation fails
    /// (e.g. a rename collision) — no batch is ever touched at this point.
    pub fn new(input_schema: &Schema, steps: Vec<Box<dyn BatchTransform>>) -> Result<Self, NomadError> {
        let mut schema = input_schema.clone();
        for step in &steps {
            schema = step.output_schema(&schema)?;
        }
        Ok(Plan {
            steps,
            schema: std::sync::Arc::new(schema),
        })
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn apply(&self, batch: RecordBatch) -> Result<RecordBatch, NomadError> {
        let mut current = batch;
        for step in &self.steps {
            current = step.apply(&current)?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::Int64Array;
    use arrow_schema::{DataType, Field};
    use std::sync::Arc;

    struct Identity;
    impl BatchTransform for Identity {
        fn output_schema(&self, input: &Schema) -> Result<Schema, NomadError> {
            Ok(input.clone())
        }
        fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, NomadError> {
            Ok(batch.clone())
        }
    }

    #[test]
    fn schema_is_known_before_any_batch_runs() {
        let schema = Schema::new(vec![Field::new("n", DataType::Int64, true)]);
        let plan = Plan::new(&schema, vec![Box::new(Identity)]).unwrap();
        assert_eq!(plan.schema().fields().len(), 1);
    }

    #[test]
    fn apply_runs_steps_in_order() {
        let schema = Schema::new(vec![Field::new("n", DataType::Int64, true)]);
        let plan = Plan::new(&schema, vec![Box::new(Identity), Box::new(Identity)]).unwrap();
        let batch = RecordBatch::try_new(Arc::new(schema), vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
        let out = plan.apply(batch).unwrap();
        assert_eq!(out.num_rows(), 1);
    }
}
