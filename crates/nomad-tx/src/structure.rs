//! Structure Assembler (C6): reshapes the flat, cleaned batch into the
//! final output layout — `main_info` columns kept at the top level, the
//! rest of `structure.additional_info` nested under a single
//! `additional_info` struct column, and `year`/`country_code` appended as
//! constant metadata columns.

use std::sync::Arc;

use arrow_array::{ArrayRef, Int32Array, RecordBatch, StringArray, StructArray};
use arrow_schema::{DataType, Field, Fields, Schema};
use nomad_core::{AdditionalItem, NomadError, Structure, TransformErrorKind};

use crate::plan::BatchTransform;

/// A resolved plan for building the `additional_info` struct: flat fields
/// kept as-is, and named groups nested one level deeper.
struct AdditionalPlan {
    flat_fields: Vec<String>,
    groups: Vec<(String, Vec<String>)>,
}

impl AdditionalPlan {
    fn resolve(structure: &Structure, available: &[String]) -> Self {
        let group_keys: std::collections::HashSet<&String> = structure
            .additional_info
            .iter()
            .filter_map(|item| match item {
                AdditionalItem::Group(key, _) => Some(key),
                AdditionalItem::Field(_) => None,
            })
            .collect();

        let mut flat_fields = Vec::new();
        let mut groups = Vec::new();
        for item in &structure.additional_info {
            match item {
                AdditionalItem::Field(name) => {
                    if available.contains(name) && !group_keys.contains(name) {
                        flat_fields.push(name.clone());
                    }
                }
                AdditionalItem::Group(key, fields) => {
                    let valid: Vec<String> = fields.iter().filter(|f| available.contains(f)).cloned().collect();
                    if !valid.is_empty() {
                        groups.push((key.clone(), valid));
                    }
                }
            }
        }
        AdditionalPlan { flat_fields, groups }
    }

    fn is_empty(&self) -> bool {
        self.flat_fields.is_empty() && self.groups.is_empty()
    }
}

/// Assembles `structure.main_info`/`additional_info` when `structure` is
/// configured; otherwise this step is skipped by [`build_plan`].
pub struct NestStep {
    main_info: Vec<String>,
    plan: AdditionalPlan,
}

impl NestStep {
    pub fn new(structure: &Structure, available_columns: &[String]) -> Self {
        let plan = AdditionalPlan::resolve(structure, available_columns);
        let main_info = structure
            .main_info
            .iter()
            .filter(|c| c.as_str() != "additional_info" && available_columns.contains(c))
            .cloned()
            .collect();
        NestStep { main_info, plan }
    }

    fn group_field(&self, schema: &Schema, key: &str, fields: &[String]) -> Result<Field, NomadError> {
        let inner: Vec<Field> = fields
            .iter()
            .map(|name| {
                schema
                    .field_with_name(name)
                    .cloned()
                    .map_err(|_| NomadError::transform(TransformErrorKind::TypeCoerce, format!("missing column: {name}")))
            })
            .collect::<Result<_, _>>()?;
        Ok(Field::new(key, DataType::Struct(Fields::from(inner)), true))
    }

    fn additional_info_field(&self, schema: &Schema) -> Result<Field, NomadError> {
        if self.plan.is_empty() {
            return Ok(Field::new("additional_info", DataType::Null, true));
        }
        let mut fields = Vec::new();
        for name in &self.plan.flat_fields {
            fields.push(schema.field_with_name(name).cloned().map_err(|_| {
                NomadError::transform(TransformErrorKind::TypeCoerce, format!("missing column: {name}"))
            })?);
        }
        for (key, group_fields) in &self.plan.groups {
            fields.push(self.group_field(schema, key, group_fields)?);
        }
        Ok(Field::new("additional_info", DataType::Struct(Fields::from(fields)), true))
    }
}

impl BatchTransform for NestStep {
    fn output_schema(&self, input: &Schema) -> Result<Schema, NomadError> {
        let mut fields: Vec<Field> = self
            .main_info
            .iter()
            .map(|name| input.field_with_name(name).cloned())
            .collect::<Result<_, _>>()
            .map_err(|e: arrow_schema::ArrowError| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))?;
        fields.push(self.additional_info_field(input)?);
        Ok(Schema::new(fields))
    }

    fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, NomadError> {
        let schema = batch.schema();
        let rows = batch.num_rows();

        let mut columns: Vec<ArrayRef> = self
            .main_info
            .iter()
            .map(|name| {
                let idx = schema.index_of(name).map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))?;
                Ok(batch.column(idx).clone())
            })
            .collect::<Result<_, NomadError>>()?;

        let additional = if self.plan.is_empty() {
            Arc::new(arrow_array::NullArray::new(rows)) as ArrayRef
        } else {
            let mut inner_fields = Vec::new();
            let mut inner_arrays: Vec<ArrayRef> = Vec::new();
            for name in &self.plan.flat_fields {
                let idx = schema.index_of(name).map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))?;
                inner_fields.push(schema.field(idx).clone());
                inner_arrays.push(batch.column(idx).clone());
            }
            for (key, group_fields) in &self.plan.groups {
                let nested_field = self.group_field(schema.as_ref(), key, group_fields)?;
                let mut nested_fields = Vec::new();
                let mut nested_arrays: Vec<ArrayRef> = Vec::new();
                for name in group_fields {
                    let idx = schema.index_of(name).map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))?;
                    nested_fields.push(schema.field(idx).clone());
                    nested_arrays.push(batch.column(idx).clone());
                }
                let nested_struct = StructArray::new(Fields::from(nested_fields), nested_arrays, None);
                inner_fields.push(nested_field);
                inner_arrays.push(Arc::new(nested_struct));
            }
            Arc::new(StructArray::new(Fields::from(inner_fields), inner_arrays, None))
        };
        columns.push(additional);

        let new_schema = Arc::new(self.output_schema(schema.as_ref())?);
        RecordBatch::try_new(new_schema, columns)
            .map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))
    }
}

/// Appends constant `year`/`country_code` metadata columns.
pub struct MetadataStep {
    year: i32,
    country_code: String,
}

impl MetadataStep {
    pub fn new(year: i32, country_code: String) -> Self {
        MetadataStep { year, country_code }
    }
}

impl BatchTransform for MetadataStep {
    fn output_schema(&self, input: &Schema) -> Result<Schema, NomadError> {
        let mut fields: Vec<Field> = input.fields().iter().map(|f| f.as_ref().clone()).collect();
        fields.push(Field::new("year", DataType::Int32, false));
        fields.push(Field::new("country_code", DataType::Utf8, false));
        Ok(Schema::new(fields))
    }

    fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, NomadError> {
        let rows = batch.num_rows();
        let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
        columns.push(Arc::new(Int32Array::from(vec![self.year; rows])));
        columns.push(Arc::new(StringArray::from(vec![self.country_code.as_str(); rows])));
        let new_schema = Arc::new(self.output_schema(batch.schema().as_ref())?);
        RecordBatch::try_new(new_schema, columns)
            .map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::Int64Array;
    use nomad_core::Structure;

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("phone", DataType::Utf8, true),
            Field::new("city", DataType::Utf8, true),
            Field::new("street", DataType::Utf8, true),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(vec![1])),
            Arc::new(StringArray::from(vec!["123"])),
            Arc::new(StringArray::from(vec!["Almaty"])),
            Arc::new(StringArray::from(vec!["Abay"])),
        ];
        RecordBatch::try_new(schema, columns).unwrap()
    }

    #[test]
    fn nests_flat_and_group_fields() {
        let structure = Structure {
            main_info: vec!["id".to_string(), "additional_info".to_string()],
            additional_info: vec![
                AdditionalItem::Field("phone".to_string()),
                AdditionalItem::Group("address".to_string(), vec!["city".to_string(), "street".to_string()]),
            ],
        };
        let batch = sample_batch();
        let available: Vec<String> = batch.schema().fields().iter().map(|f| f.name().clone()).collect();
        let step = NestStep::new(&structure, &available);
        let out = step.apply(&batch).unwrap();
        let names: Vec<&str> = out.schema().fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["id", "additional_info"]);
        let additional = out.column(1).as_any().downcast_ref::<StructArray>().unwrap();
        assert_eq!(additional.num_columns(), 2);
    }

    #[test]
    fn metadata_step_appends_constants() {
        let batch = sample_batch();
        let step = MetadataStep::new(2024, "kz".to_string());
        let out = step.apply(&batch).unwrap();
        let year = out.column(out.num_columns() - 2).as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(year.value(0), 2024);
        let country = out.column(out.num_columns() - 1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(country.value(0), "kz");
    }
}
