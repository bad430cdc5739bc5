//! Configuration resolution errors.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::schema::Violations;

/// Failure while expanding a template.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("undefined reference `{name}` at offset {offset}")]
    UndefinedReference { name: String, offset: usize },

    #[error("bad argument to {function}() at offset {offset}: {message}")]
    BadBuiltinArgument {
        function: String,
        offset: usize,
        message: String,
    },

    #[error("{function}() at offset {offset} failed: {source}")]
    BuiltinExecutionFailed {
        function: String,
        offset: usize,
        #[source]
        source: mu_core::Error,
    },

    #[error("malformed expression at offset {offset}: {message}")]
    MalformedExpression { offset: usize, message: String },
}

impl RenderError {
    /// Exit code of the failed `cmd()` subprocess, if it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RenderError::BuiltinExecutionFailed {
                source: mu_core::Error::ExitStatus { code, .. },
                ..
            } => *code,
            _ => None,
        }
    }
}

/// Failure while parsing rendered text as YAML.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{message}")]
    Malformed {
        message: String,
        line: Option<usize>,
        column: Option<usize>,
    },

    #[error("unsupported YAML content: {0}")]
    Unsupported(String),
}

impl From<serde_yaml::Error> for ParseError {
    fn from(err: serde_yaml::Error) -> Self {
        let location = err.location();
        ParseError::Malformed {
            message: err.to_string(),
            line: location.as_ref().map(|l| l.line()),
            column: location.as_ref().map(|l| l.column()),
        }
    }
}

/// The schema itself could not be loaded. Fatal for the gate.
#[derive(Debug, Error)]
pub enum SchemaLoadError {
    #[error("invalid schema {origin}: {reason}")]
    InvalidSchema { origin: String, reason: String },
}

/// Which stage of resolution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Source,
    Render,
    Parse,
    Validate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Source => "source",
            Stage::Render => "render",
            Stage::Parse => "parse",
            Stage::Validate => "validate",
        };
        f.write_str(name)
    }
}

/// Failure of a full resolution.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot read {}: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template error: {0}")]
    RenderFailed(#[from] RenderError),

    #[error("malformed document: {0}")]
    MalformedDocument(#[from] ParseError),

    #[error("schema violation ({} problem(s)):\n{violations}", .violations.len())]
    SchemaViolation { violations: Violations },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::SourceUnavailable { .. } => Stage::Source,
            PipelineError::RenderFailed(_) => Stage::Render,
            PipelineError::MalformedDocument(_) => Stage::Parse,
            PipelineError::SchemaViolation { .. } => Stage::Validate,
        }
    }
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_only_for_exit_status() {
        let err = RenderError::BuiltinExecutionFailed {
            function: "cmd".to_string(),
            offset: 0,
            source: mu_core::Error::ExitStatus {
                command: "exit 2".to_string(),
                code: Some(2),
                stderr: String::new(),
            },
        };
        assert_eq!(err.exit_code(), Some(2));

        let err = RenderError::UndefinedReference {
            name: "x".to_string(),
            offset: 3,
        };
        assert_eq!(err.exit_code(), None);
    }

    #[test]
    fn test_stage_names() {
        let err = PipelineError::SourceUnavailable {
            path: PathBuf::from("aliens.yml"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.stage(), Stage::Source);
        assert_eq!(err.stage().to_string(), "source");
        assert!(err.to_string().starts_with("cannot read aliens.yml"));
    }
}
