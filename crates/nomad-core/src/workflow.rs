//! Workflow Loader & Validator: the declarative document that drives a
//! single engine run.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::NomadError;

/// One `concatenations` entry: builds a new textual column from existing
/// ones joined by `separator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concatenation {
    pub name: String,
    pub source_columns: Vec<String>,
    #[serde(default)]
    pub separator: String,
}

/// `dedup.unique_columns`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dedup {
    #[serde(default)]
    pub unique_columns: Vec<String>,
}

/// `not_empty.columns`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotEmpty {
    #[serde(default)]
    pub columns: Vec<String>,
}

/// An entry of `structure.additional_info`: either a bare column name or a
/// `{key: [field, ...]}` nested-group directive.
///
/// `AdditionalItem = Field(name) | Group(key, [name])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdditionalItem {
    Field(String),
    Group(String, Vec<String>),
}

impl Serialize for AdditionalItem {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            AdditionalItem::Field(name) => serializer.serialize_str(name),
            AdditionalItem::Group(key, fields) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(key, fields)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for AdditionalItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Group(HashMap<String, Vec<String>>),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Name(name) => Ok(AdditionalItem::Field(name)),
            Raw::Group(mut map) => {
                let (key, fields) = map.drain().next().ok_or_else(|| {
                    serde::de::Error::custom("structure.additional_info group entry must have exactly one key")
                })?;
                Ok(AdditionalItem::Group(key, fields))
            }
        }
    }
}

/// `structure.{main_info, additional_info}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Structure {
    #[serde(default)]
    pub main_info: Vec<String>,
    #[serde(default)]
    pub additional_info: Vec<AdditionalItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Zstd,
    Snappy,
    Gzip,
    None,
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Zstd
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportParquet {
    #[serde(default)]
    pub compression: Compression,
    pub target_mb_per_file: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Export {
    #[serde(default = "default_export_format")]
    pub format: String,
    #[serde(default)]
    pub parquet: ExportParquet,
}

fn default_export_format() -> String {
    "parquet".to_string()
}

impl Default for Export {
    fn default() -> Self {
        Export {
            format: default_export_format(),
            parquet: ExportParquet::default(),
        }
    }
}

/// The JSON document as authored, before defaulting/validation. Mirrors the
/// schema; unknown keys are preserved by serde_json's default
/// deny-unknown-fields-off behavior (we don't opt into `deny_unknown_fields`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawWorkflow {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub columns: RawColumns,
    #[serde(default)]
    pub display_names: HashMap<String, String>,
    #[serde(default)]
    pub concatenations: Vec<Concatenation>,
    #[serde(default)]
    pub regex_rules: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub dedup: Dedup,
    #[serde(default)]
    pub not_empty: NotEmpty,
    #[serde(default)]
    pub structure: Option<Structure>,
    pub year: Option<i32>,
    pub country_code: Option<String>,
    pub output_filename: Option<String>,
    #[serde(default)]
    pub export: Export,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawColumns {
    #[serde(default)]
    pub standalone: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// The normalised, validated workflow the engine driver operates on.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub exclude_columns: Vec<String>,
    pub display_names: HashMap<String, String>,
    pub concatenations: Vec<Concatenation>,
    pub regex_rules: HashMap<String, Vec<String>>,
    pub dedup: Dedup,
    pub not_empty: NotEmpty,
    pub structure: Option<Structure>,
    pub year: i32,
    pub country_code: String,
    pub output_filename: Option<String>,
    pub export: Export,
}

impl Workflow {
    /// Parses JSON text into a validated, defaulted [`Workflow`].
    pub fn parse(json: &str, config: &Config) -> Result<Workflow, NomadError> {
        let raw: RawWorkflow = serde_json::from_str(json)
            .map_err(|e| NomadError::WorkflowInvalid(format!("invalid JSON: {e}")))?;
        Workflow::from_raw(raw, config)
    }

    fn from_raw(raw: RawWorkflow, config: &Config) -> Result<Workflow, NomadError> {
        if raw.export.format != "parquet" {
            return Err(NomadError::WorkflowInvalid(format!(
                "unsupported export format: {}",
                raw.export.format
            )));
        }

        let mut seen_display_values = HashSet::new();
        for v in raw.display_names.values() {
            if !seen_display_values.insert(v.as_str()) {
                return Err(NomadError::WorkflowInvalid(format!(
                    "display_names values must be unique, duplicate: {v}"
                )));
            }
        }

        let mut seen_concat_names = HashSet::new();
        for c in &raw.concatenations {
            if c.name.is_empty() {
                return Err(NomadError::WorkflowInvalid(
                    "concatenations entry missing name".to_string(),
                ));
            }
            if !seen_concat_names.insert(c.name.as_str()) {
                return Err(NomadError::WorkflowInvalid(format!(
                    "duplicate concatenations name: {}",
                    c.name
                )));
            }
        }

        let country_code = raw.country_code.unwrap_or_else(|| "ru".to_string()).to_lowercase();
        if !config.is_country_allowed(&country_code) {
            return Err(NomadError::WorkflowInvalid(format!(
                "country_code not in allowed set: {country_code}"
            )));
        }

        let year = raw.year.unwrap_or_else(|| chrono::Utc::now().format("%Y").to_string().parse().unwrap_or(1970));

        Ok(Workflow {
            exclude_columns: raw.columns.exclude,
            display_names: raw.display_names,
            concatenations: raw.concatenations,
            regex_rules: raw.regex_rules,
            dedup: raw.dedup,
            not_empty: raw.not_empty,
            structure: raw.structure,
            year,
            country_code,
            output_filename: raw.output_filename,
            export: raw.export,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_workflow_with_defaults() {
        let cfg = Config::default();
        let wf = Workflow::parse("{}", &cfg).unwrap();
        assert_eq!(wf.country_code, "ru");
        assert!(wf.exclude_columns.is_empty());
        assert!(wf.structure.is_none());
    }

    #[test]
    fn rejects_duplicate_display_name_targets() {
        let cfg = Config::default();
        let json = r#"{"display_names": {"a": "x", "b": "x"}}"#;
        let err = Workflow::parse(json, &cfg).unwrap_err();
        assert!(matches!(err, NomadError::WorkflowInvalid(_)));
    }

    #[test]
    fn rejects_unknown_country_code() {
        let cfg = Config::default();
        let json = r#"{"country_code": "zz"}"#;
        let err = Workflow::parse(json, &cfg).unwrap_err();
        assert!(matches!(err, NomadError::WorkflowInvalid(_)));
    }

    #[test]
    fn rejects_non_parquet_export_format() {
        let cfg = Config::default();
        let json = r#"{"export": {"format": "csv"}}"#;
        let err = Workflow::parse(json, &cfg).unwrap_err();
        assert!(matches!(err, NomadError::WorkflowInvalid(_)));
    }

    #[test]
    fn parses_mixed_additional_info_items() {
        let cfg = Config::default();
        let json = r#"{
            "structure": {
                "main_info": ["id", "additional_info"],
                "additional_info": ["phone", {"address": ["city", "street"]}]
            }
        }"#;
        let wf = Workflow::parse(json, &cfg).unwrap();
        let structure = wf.structure.unwrap();
        assert_eq!(
            structure.additional_info,
            vec![
                AdditionalItem::Field("phone".to_string()),
                AdditionalItem::Group("address".to_string(), vec!["city".to_string(), "street".to_string()]),
            ]
        );
    }
}
