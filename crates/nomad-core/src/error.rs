//! Error Reporter: the uniform failure taxonomy for the engine.
//!
//! Every fallible engine operation returns [`NomadError`]. The `kind()`
//! method gives the machine-readable classification used in the CLI's
//! `kind: message` stderr line.

use thiserror::Error;

/// Finer-grained classification for transform-stage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorKind {
    RegexCompile,
    RenameCollision,
    TypeCoerce,
}

impl std::fmt::Display for TransformErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransformErrorKind::RegexCompile => "RegexCompile",
            TransformErrorKind::RenameCollision => "RenameCollision",
            TransformErrorKind::TypeCoerce => "TypeCoerce",
        };
        f.write_str(s)
    }
}

/// The full error taxonomy for a `run` invocation.
#[derive(Debug, Error)]
pub enum NomadError {
    #[error("workflow invalid: {0}")]
    WorkflowInvalid(String),

    #[error("source error: {0}")]
    SourceError(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("transform error ({kind}): {message}")]
    TransformError {
        kind: TransformErrorKind,
        message: String,
    },

    #[error("sink error: {0}")]
    SinkError(String),

    #[error("memory exhausted: {0}")]
    MemoryExhausted(String),

    #[error("invalid country code: {0}")]
    InvalidCountry(String),
}

impl NomadError {
    /// Machine-readable kind string, as printed in the CLI's `kind:` prefix.
    pub fn kind(&self) -> &'static str {
        match self {
            NomadError::WorkflowInvalid(_) => "WorkflowInvalid",
            NomadError::SourceError(_) => "SourceError",
            NomadError::DecodeError(_) => "DecodeError",
            NomadError::InvalidSchema(_) => "InvalidSchema",
            NomadError::TransformError { .. } => "TransformError",
            NomadError::SinkError(_) => "SinkError",
            NomadError::MemoryExhausted(_) => "MemoryExhausted",
            NomadError::InvalidCountry(_) => "InvalidCountry",
        }
    }

    pub fn transform(kind: TransformErrorKind, message: impl Into<String>) -> Self {
        NomadError::TransformError {
            kind,
            message: message.into(),
        }
    }
}

pub type NomadResult<T> = std::result::Result<T, NomadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_match_taxonomy() {
        assert_eq!(NomadError::WorkflowInvalid("x".into()).kind(), "WorkflowInvalid");
        assert_eq!(
            NomadError::transform(TransformErrorKind::RenameCollision, "dup").kind(),
            "TransformError"
        );
    }

    #[test]
    fn display_includes_kind_for_transform_error() {
        let e = NomadError::transform(TransformErrorKind::RegexCompile, "bad pattern");
        let msg = format!("{e}");
        assert!(msg.contains("RegexCompile"));
        assert!(msg.contains("bad pattern"));
    }
}
