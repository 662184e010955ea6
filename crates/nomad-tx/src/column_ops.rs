//! Column Operator (C4) — the heart of the engine.
//!
//! Builds a [`Plan`] that applies the column operator's seven steps in their
//! fixed canonical order. The order is baked into [`build_plan`]'s call sequence,
//! not left to the caller: pre-clean, concat, drop, regex, rename,
//! lowercase, normalise.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_cast::cast;
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use nomad_core::{Concatenation, NomadError, TransformErrorKind, Workflow};
use regex::Regex;
use tracing::warn;

use crate::plan::{BatchTransform, Plan};

/// The empty-token set textual values collapse to `null` against, per
/// the normalize step's final substep.
pub fn empty_tokens() -> &'static [&'static str] {
    &["", " ", "nan", "NaN", "none", "None", "null", "NULL", "0"]
}

fn cast_text(array: &ArrayRef) -> Result<StringArray, NomadError> {
    if array.data_type() == &DataType::Utf8 {
        return Ok(array.as_any().downcast_ref::<StringArray>().unwrap().clone());
    }
    let casted = cast(array, &DataType::Utf8).map_err(|e| {
        NomadError::transform(TransformErrorKind::TypeCoerce, format!("cast to text failed: {e}"))
    })?;
    Ok(casted.as_any().downcast_ref::<StringArray>().unwrap().clone())
}

fn replace_column(batch: &RecordBatch, index: usize, new_column: ArrayRef, new_schema: SchemaRef) -> Result<RecordBatch, NomadError> {
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    columns[index] = new_column;
    RecordBatch::try_new(new_schema, columns)
        .map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))
}

fn field_index(schema: &Schema, name: &str) -> Option<usize> {
    schema.fields().iter().position(|f| f.name() == name)
}

/// Step 1: pre-clean sources of concatenations whose target name also
/// appears in `regex_rules`, so the concatenation (step 2) is built from
/// already-cleaned inputs without a second cleaning pass over the target.
struct PreCleanSourcesStep {
    /// `(source_column, compiled_regex)`, one entry per unique source that
    /// needs pre-cleaning. If a source feeds more than one regex-bearing
    /// concat target, the patterns are unioned into a single regex so the
    /// source is only rewritten once.
    entries: Vec<(String, Regex)>,
}

impl BatchTransform for PreCleanSourcesStep {
    fn output_schema(&self, input: &Schema) -> Result<Schema, NomadError> {
        let fields: Vec<Field> = input
            .fields()
            .iter()
            .map(|f| {
                if self.entries.iter().any(|(name, _)| name == f.name()) {
                    Field::new(f.name(), DataType::Utf8, true)
                } else {
                    f.as_ref().clone()
                }
            })
            .collect();
        Ok(Schema::new(fields))
    }

    fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, NomadError> {
        let mut current = batch.clone();
        for (name, regex) in &self.entries {
            let Some(idx) = field_index(current.schema().as_ref(), name) else {
                continue;
            };
            let text = cast_text(current.column(idx))?;
            let cleaned = regex_keep(&text, regex);
            let new_schema = self.output_schema(current.schema().as_ref())?;
            current = replace_column(&current, idx, Arc::new(cleaned), Arc::new(new_schema))?;
        }
        Ok(current)
    }
}

/// Applies "keep" semantics: the value is reduced to
/// the concatenation of all non-overlapping matches of `regex`, in source
/// order. Null input becomes an empty string (collapsed to null later by
/// the normalise step).
fn regex_keep(values: &StringArray, regex: &Regex) -> StringArray {
    let mut builder = arrow_array::builder::StringBuilder::new();
    for i in 0..values.len() {
        if values.is_null(i) {
            builder.append_value("");
            continue;
        }
        let joined: String = regex.find_iter(values.value(i)).map(|m| m.as_str()).collect();
        builder.append_value(joined);
    }
    builder.finish()
}

/// Step 2: build `concatenations` columns from already-existing source
/// columns, preserving declaration order. Null inputs are treated as
/// empty strings.
struct ConcatStep {
    entries: Vec<Concatenation>,
}

impl BatchTransform for ConcatStep {
    fn output_schema(&self, input: &Schema) -> Result<Schema, NomadError> {
        let mut fields: Vec<Field> = input.fields().iter().map(|f| f.as_ref().clone()).collect();
        for c in &self.entries {
            fields.push(Field::new(&c.name, DataType::Utf8, true));
        }
        Ok(Schema::new(fields))
    }

    fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, NomadError> {
        let schema = batch.schema();
        let rows = batch.num_rows();
        let mut columns: Vec<ArrayRef> = batch.columns().to_vec();

        for c in &self.entries {
            let source_texts: Vec<StringArray> = c
                .source_columns
                .iter()
                .map(|name| {
                    let idx = field_index(schema.as_ref(), name).expect("validated at plan build time");
                    cast_text(batch.column(idx))
                })
                .collect::<Result<_, _>>()?;

            let mut builder = arrow_array::builder::StringBuilder::new();
            for row in 0..rows {
                let parts: Vec<&str> = source_texts
                    .iter()
                    .map(|arr| if arr.is_null(row) { "" } else { arr.value(row) })
                    .collect();
                builder.append_value(parts.join(&c.separator));
            }
            columns.push(Arc::new(builder.finish()));
        }

        let new_schema = Arc::new(self.output_schema(schema.as_ref())?);
        RecordBatch::try_new(new_schema, columns)
            .map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))
    }
}

/// Step 3: drop excluded columns that currently exist.
struct DropStep {
    names: HashSet<String>,
}

impl BatchTransform for DropStep {
    fn output_schema(&self, input: &Schema) -> Result<Schema, NomadError> {
        let fields: Vec<Field> = input
            .fields()
            .iter()
            .filter(|f| !self.names.contains(f.name()))
            .map(|f| f.as_ref().clone())
            .collect();
        Ok(Schema::new(fields))
    }

    fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, NomadError> {
        let schema = batch.schema();
        let keep_indices: Vec<usize> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| !self.names.contains(f.name()))
            .map(|(i, _)| i)
            .collect();
        let columns: Vec<ArrayRef> = keep_indices.iter().map(|&i| batch.column(i).clone()).collect();
        let new_schema = Arc::new(self.output_schema(schema.as_ref())?);
        RecordBatch::try_new(new_schema, columns)
            .map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))
    }
}

/// Step 4: remaining regex-keep rules, excluding targets already handled
/// by [`PreCleanSourcesStep`].
struct RegexStep {
    entries: Vec<(String, Regex)>,
}

impl BatchTransform for RegexStep {
    fn output_schema(&self, input: &Schema) -> Result<Schema, NomadError> {
        let fields: Vec<Field> = input
            .fields()
            .iter()
            .map(|f| {
                if self.entries.iter().any(|(name, _)| name == f.name()) {
                    Field::new(f.name(), DataType::Utf8, true)
                } else {
                    f.as_ref().clone()
                }
            })
            .collect();
        Ok(Schema::new(fields))
    }

    fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, NomadError> {
        let mut current = batch.clone();
        for (name, regex) in &self.entries {
            let Some(idx) = field_index(current.schema().as_ref(), name) else {
                continue;
            };
            let text = cast_text(current.column(idx))?;
            let cleaned = regex_keep(&text, regex);
            let new_schema = self.output_schema(current.schema().as_ref())?;
            current = replace_column(&current, idx, Arc::new(cleaned), Arc::new(new_schema))?;
        }
        Ok(current)
    }
}

/// Step 5: simultaneous display-name rename.
struct RenameStep {
    renames: HashMap<String, String>,
}

impl BatchTransform for RenameStep {
    fn output_schema(&self, input: &Schema) -> Result<Schema, NomadError> {
        let fields: Vec<Field> = input
            .fields()
            .iter()
            .map(|f| match self.renames.get(f.name()) {
                Some(new_name) => Field::new(new_name, f.data_type().clone(), f.is_nullable()),
                None => f.as_ref().clone(),
            })
            .collect();
        Ok(Schema::new(fields))
    }

    fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, NomadError> {
        let new_schema = Arc::new(self.output_schema(batch.schema().as_ref())?);
        RecordBatch::try_new(new_schema, batch.columns().to_vec())
            .map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))
    }
}

/// Step 6: Unicode simple lower-casing of every textual column.
struct LowercaseStep;

impl BatchTransform for LowercaseStep {
    fn output_schema(&self, input: &Schema) -> Result<Schema, NomadError> {
        Ok(input.clone())
    }

    fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, NomadError> {
        let schema = batch.schema();
        let columns: Vec<ArrayRef> = batch
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| {
                if schema.field(i).data_type() == &DataType::Utf8 {
                    let arr = col.as_any().downcast_ref::<StringArray>().unwrap();
                    let mut builder = arrow_array::builder::StringBuilder::new();
                    for row in 0..arr.len() {
                        if arr.is_null(row) {
                            builder.append_null();
                        } else {
                            builder.append_value(arr.value(row).to_lowercase());
                        }
                    }
                    Arc::new(builder.finish()) as ArrayRef
                } else {
                    col.clone()
                }
            })
            .collect();
        RecordBatch::try_new(schema, columns)
            .map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))
    }
}

/// Step 7: normalise whitespace/control characters and canonicalise
/// empty-ish tokens to true nulls, in the same substep order as normalize.
struct NormalizeStep {
    rules: Vec<(Regex, &'static str)>,
    collapse_whitespace: Regex,
    empty_tokens: HashSet<&'static str>,
}

impl NormalizeStep {
    fn new() -> Self {
        let rules = vec![
            (Regex::new(r"&nbsp;|\\n|\\t|\\r|\u{00A0}|\u{FEFF}").unwrap(), " "),
            (Regex::new(r"[\n\r\t]").unwrap(), " "),
            (Regex::new(r"[\u{00A0}\u{202F}\u{2007}\u{1680}\u{180E}\u{205F}]").unwrap(), " "),
            (
                Regex::new(r"[\u{200B}\u{200C}\u{200D}\u{2060}\u{00AD}\u{200E}\u{200F}\u{061C}]").unwrap(),
                "",
            ),
            (Regex::new(r"[\x00-\x1F\x7F]").unwrap(), ""),
        ];
        NormalizeStep {
            rules,
            collapse_whitespace: Regex::new(r"\s{2,}").unwrap(),
            empty_tokens: empty_tokens().iter().copied().collect(),
        }
    }

    fn normalize_value(&self, value: &str) -> Option<String> {
        let mut s = value.to_string();
        for (regex, repl) in &self.rules {
            s = regex.replace_all(&s, *repl).into_owned();
        }
        s = self.collapse_whitespace.replace_all(&s, " ").into_owned();
        s = s.trim().to_string();
        if s.is_empty() || self.empty_tokens.contains(s.as_str()) {
            None
        } else {
            Some(s)
        }
    }
}

impl BatchTransform for NormalizeStep {
    fn output_schema(&self, input: &Schema) -> Result<Schema, NomadError> {
        Ok(input.clone())
    }

    fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch, NomadError> {
        let schema = batch.schema();
        let columns: Vec<ArrayRef> = batch
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| {
                if schema.field(i).data_type() == &DataType::Utf8 {
                    let arr = col.as_any().downcast_ref::<StringArray>().unwrap();
                    let mut builder = arrow_array::builder::StringBuilder::new();
                    for row in 0..arr.len() {
                        if arr.is_null(row) {
                            builder.append_null();
                            continue;
                        }
                        match self.normalize_value(arr.value(row)) {
                            Some(v) => builder.append_value(v),
                            None => builder.append_null(),
                        }
                    }
                    Arc::new(builder.finish()) as ArrayRef
                } else {
                    col.clone()
                }
            })
            .collect();
        RecordBatch::try_new(schema, columns)
            .map_err(|e| NomadError::transform(TransformErrorKind::TypeCoerce, e.to_string()))
    }
}

/// Builds the Column Operator's [`Plan`] for `workflow` over `schema`, and
/// the rename map (old → new) so callers can propagate display-name
/// renames into `dedup`/`not_empty`/`structure` references.
pub fn build_plan(schema: &Schema, workflow: &Workflow) -> Result<(Plan, HashMap<String, String>, Vec<String>), NomadError> {
    let mut warnings = Vec::new();
    let mut current_names: HashSet<String> = schema.fields().iter().map(|f| f.name().clone()).collect();

    // Step 1 bookkeeping: per-source pre-clean regex for concat targets
    // that carry a regex rule of their own, unioned across targets sharing
    // a source.
    let mut source_patterns: HashMap<String, Vec<String>> = HashMap::new();
    for c in &workflow.concatenations {
        if let Some(keys) = workflow.regex_rules.get(&c.name) {
            if let Some(combined) = nomad_core::pattern::combine(keys) {
                for src in &c.source_columns {
                    if current_names.contains(src) {
                        source_patterns.entry(src.clone()).or_default().push(combined.clone());
                    }
                }
            }
        }
    }
    let mut preclean_entries = Vec::new();
    for (source, patterns) in &source_patterns {
        let joined = patterns.join("|");
        let regex = Regex::new(&joined)
            .map_err(|e| NomadError::transform(TransformErrorKind::RegexCompile, format!("{source}: {e}")))?;
        preclean_entries.push((source.clone(), regex));
    }
    let pre_clean = PreCleanSourcesStep { entries: preclean_entries };

    // Step 2: concatenations whose sources all currently exist.
    let mut concat_entries = Vec::new();
    for c in &workflow.concatenations {
        if c.source_columns.iter().all(|s| current_names.contains(s)) {
            if current_names.contains(&c.name) {
                return Err(NomadError::transform(
                    TransformErrorKind::RenameCollision,
                    format!("concatenation name collides with existing column: {}", c.name),
                ));
            }
            current_names.insert(c.name.clone());
            concat_entries.push(c.clone());
        } else {
            let msg = format!("concatenations[{}]: missing source column(s), skipped", c.name);
            warn!("{msg}");
            warnings.push(msg);
        }
    }
    let concat = ConcatStep { entries: concat_entries };

    // Step 3: drop excluded columns that currently exist.
    let mut drop_names = HashSet::new();
    for name in &workflow.exclude_columns {
        if current_names.remove(name) {
            drop_names.insert(name.clone());
        } else {
            let msg = format!("columns.exclude: missing column, skipped: {name}");
            warn!("{msg}");
            warnings.push(msg);
        }
    }
    let drop = DropStep { names: drop_names };

    // Step 4: regex rules, including concatenation targets. The separator
    // joining a concat's sources is only removed by running the target's
    // own regex over the assembled string, so this loop doesn't skip
    // concat targets the way the step-1 source preclean does.
    let mut regex_entries = Vec::new();
    for (col, keys) in &workflow.regex_rules {
        if !current_names.contains(col) {
            let msg = format!("regex_rules: missing column, skipped: {col}");
            warn!("{msg}");
            warnings.push(msg);
            continue;
        }
        if keys.is_empty() {
            continue;
        }
        let Some(combined) = nomad_core::pattern::combine(keys) else {
            continue;
        };
        let regex = Regex::new(&combined)
            .map_err(|e| NomadError::transform(TransformErrorKind::RegexCompile, format!("{col}: {e}")))?;
        regex_entries.push((col.clone(), regex));
    }
    let regex_step = RegexStep { entries: regex_entries };

    // Step 5: simultaneous rename with collision check.
    let mut renames = HashMap::new();
    let mut renamed_away = HashSet::new();
    for (old, new) in &workflow.display_names {
        if current_names.contains(old) {
            renames.insert(old.clone(), new.clone());
            renamed_away.insert(old.clone());
        } else {
            let msg = format!("display_names: missing column, skipped: {old}");
            warn!("{msg}");
            warnings.push(msg);
        }
    }
    let retained: HashSet<&String> = current_names.iter().filter(|n| !renamed_away.contains(*n)).collect();
    for new in renames.values() {
        if retained.contains(new) {
            return Err(NomadError::transform(
                TransformErrorKind::RenameCollision,
                format!("display_names target collides with retained column: {new}"),
            ));
        }
    }
    let rename_step = RenameStep { renames: renames.clone() };

    let steps: Vec<Box<dyn BatchTransform>> = vec![
        Box::new(pre_clean),
        Box::new(concat),
        Box::new(drop),
        Box::new(regex_step),
        Box::new(rename_step),
        Box::new(LowercaseStep),
        Box::new(NormalizeStep::new()),
    ];

    let plan = Plan::new(schema, steps)?;
    Ok((plan, renames, warnings))
}

/// Propagates a display-name rename map into the column-name references
/// carried by `dedup`, `not_empty`, and `structure`.
pub fn propagate_renames(workflow: &Workflow, renames: &HashMap<String, String>) -> Workflow {
    let mut wf = workflow.clone();
    let rename = |name: &str| renames.get(name).cloned().unwrap_or_else(|| name.to_string());

    wf.dedup.unique_columns = wf.dedup.unique_columns.iter().map(|n| rename(n)).collect();
    wf.not_empty.columns = wf.not_empty.columns.iter().map(|n| rename(n)).collect();
    if let Some(structure) = &mut wf.structure {
        structure.main_info = structure.main_info.iter().map(|n| rename(n)).collect();
        structure.additional_info = structure
            .additional_info
            .iter()
            .map(|item| match item {
                nomad_core::AdditionalItem::Field(n) => nomad_core::AdditionalItem::Field(rename(n)),
                nomad_core::AdditionalItem::Group(k, fields) => {
                    nomad_core::AdditionalItem::Group(k.clone(), fields.iter().map(|n| rename(n)).collect())
                }
            })
            .collect();
    }
    wf
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::Int64Array;
    use nomad_core::{Config, Workflow};
    use std::sync::Arc as StdArc;

    fn workflow_from(json: &str) -> Workflow {
        Workflow::parse(json, &Config::default()).unwrap()
    }

    fn batch_of(names: &[&str], values: &[&str]) -> (SchemaRef, RecordBatch) {
        let fields: Vec<Field> = names.iter().map(|n| Field::new(*n, DataType::Utf8, true)).collect();
        let schema = StdArc::new(Schema::new(fields));
        let columns: Vec<ArrayRef> = values
            .iter()
            .map(|v| StdArc::new(StringArray::from(vec![*v])) as ArrayRef)
            .collect();
        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
        (schema, batch)
    }

    #[test]
    fn trim_and_lowercase_scenario() {
        let wf = workflow_from("{}");
        let (schema, batch) = batch_of(&["a"], &[" Hello "]);
        let (plan, _, _) = build_plan(schema.as_ref(), &wf).unwrap();
        let out = plan.apply(batch).unwrap();
        let col = out.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(col.value(0), "hello");
    }

    #[test]
    fn regex_keep_digits() {
        let wf = workflow_from(r#"{"regex_rules": {"phone": ["digits"]}}"#);
        let (schema, batch) = batch_of(&["phone"], &["+7 (999) 123-45-67"]);
        let (plan, _, _) = build_plan(schema.as_ref(), &wf).unwrap();
        let out = plan.apply(batch).unwrap();
        let col = out.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(col.value(0), "79991234567");
    }

    #[test]
    fn empty_after_regex_becomes_null() {
        let wf = workflow_from(r#"{"regex_rules": {"phone": ["digits"]}}"#);
        let (schema, batch) = batch_of(&["phone"], &["abc"]);
        let (plan, _, _) = build_plan(schema.as_ref(), &wf).unwrap();
        let out = plan.apply(batch).unwrap();
        let col = out.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert!(col.is_null(0));
    }

    #[test]
    fn concat_with_target_regex_precleans_sources_once() {
        let wf = workflow_from(
            r#"{
            "concatenations": [{"name": "fio", "source_columns": ["first", "last"], "separator": " "}],
            "regex_rules": {"fio": ["cyrillic_common"]}
        }"#,
        );
        let (schema, batch) = batch_of(&["first", "last"], &["Иван1", "Петров2"]);
        let (plan, _, _) = build_plan(schema.as_ref(), &wf).unwrap();
        let out = plan.apply(batch).unwrap();
        let names: Vec<&str> = out.schema().fields().iter().map(|f| f.name().as_str()).collect();
        assert!(names.contains(&"fio"));
        let fio_idx = names.iter().position(|n| *n == "fio").unwrap();
        let fio = out.column(fio_idx).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(fio.value(0), "иванпетров");
        let first_idx = names.iter().position(|n| *n == "first").unwrap();
        let first = out.column(first_idx).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(first.value(0), "иван");
    }

    #[test]
    fn exclude_then_rename() {
        let wf = workflow_from(
            r#"{"columns": {"exclude": ["secret"]}, "display_names": {"name": "full_name"}}"#,
        );
        let fields = vec![
            Field::new("id", DataType::Int64, true),
            Field::new("secret", DataType::Utf8, true),
            Field::new("name", DataType::Utf8, true),
        ];
        let schema = StdArc::new(Schema::new(fields));
        let columns: Vec<ArrayRef> = vec![
            StdArc::new(Int64Array::from(vec![1])),
            StdArc::new(StringArray::from(vec!["shh"])),
            StdArc::new(StringArray::from(vec!["Alice"])),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
        let (plan, renames, warnings) = build_plan(schema.as_ref(), &wf).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(renames.get("name"), Some(&"full_name".to_string()));
        let out = plan.apply(batch).unwrap();
        let names: Vec<&str> = out.schema().fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["id", "full_name"]);
    }

    #[test]
    fn rename_collision_fails() {
        let wf = workflow_from(r#"{"display_names": {"a": "b"}}"#);
        let (schema, _batch) = batch_of(&["a", "b"], &["x", "y"]);
        let err = build_plan(schema.as_ref(), &wf).unwrap_err();
        assert!(matches!(
            err,
            NomadError::TransformError {
                kind: TransformErrorKind::RenameCollision,
                ..
            }
        ));
    }

    #[test]
    fn missing_column_references_warn_not_fail() {
        let wf = workflow_from(r#"{"columns": {"exclude": ["ghost"]}}"#);
        let (schema, _batch) = batch_of(&["a"], &["x"]);
        let (_plan, _renames, warnings) = build_plan(schema.as_ref(), &wf).unwrap();
        assert_eq!(warnings.len(), 1);
    }
}
