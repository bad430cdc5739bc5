//! # Schema gate
//!
//! Checks resolved documents against the mu JSON Schema.
//!
//! The schema is loaded and compiled once, when the gate is built. A missing
//! or broken schema is a [`SchemaLoadError`] at construction; after that,
//! [`SchemaGate::validate`] only ever answers yes or no. Nonconforming
//! documents are ordinary input, and [`SchemaGate::violations`] explains why
//! a document was rejected.
//!
//! The gate is `Send + Sync` and holds no mutable state, so concurrent
//! validations share one instance without locking.

use std::fmt;
use std::path::{Path, PathBuf};

use jsonschema::Validator;
use mu_core::StructuredValue;
use serde_json::Value;
use tracing::debug;

use crate::error::SchemaLoadError;

/// The schema shipped with this crate.
pub const BUNDLED_SCHEMA: &str = include_str!("../schemas/mu.schema.json");

/// Location of the bundled schema, relative to the crate root.
pub const SCHEMA_FILE: &str = "schemas/mu.schema.json";

/// Where a gate's schema comes from.
#[derive(Debug, Clone, Default)]
pub enum SchemaSource {
    /// The schema compiled into this crate.
    #[default]
    Bundled,
    /// A schema file on disk.
    File(PathBuf),
    /// Schema JSON held in memory.
    Inline(String),
}

impl SchemaSource {
    fn origin(&self) -> String {
        match self {
            SchemaSource::Bundled => format!("<bundled {SCHEMA_FILE}>"),
            SchemaSource::File(path) => path.display().to_string(),
            SchemaSource::Inline(_) => "<inline>".to_string(),
        }
    }
}

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON Pointer to the offending value in the document.
    pub instance_path: String,
    /// JSON Pointer to the schema keyword that rejected it.
    pub schema_path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "  (root): {}", self.message)
        } else {
            write!(f, "  {}: {}", self.instance_path, self.message)
        }
    }
}

/// Violations found in one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations {
    violations: Vec<Violation>,
}

impl Violations {
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// A compiled schema.
pub struct SchemaGate {
    validator: Validator,
    origin: String,
}

impl fmt::Debug for SchemaGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaGate")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl SchemaGate {
    /// Load and compile a schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaLoadError::InvalidSchema`] if the schema cannot be
    /// read, is not JSON, or is not a valid JSON Schema.
    pub fn new(source: SchemaSource) -> Result<Self, SchemaLoadError> {
        let origin = source.origin();
        let invalid = |reason: String| SchemaLoadError::InvalidSchema {
            origin: origin.clone(),
            reason,
        };

        let text = match &source {
            SchemaSource::Bundled => BUNDLED_SCHEMA.to_string(),
            SchemaSource::Inline(text) => text.clone(),
            SchemaSource::File(path) => std::fs::read_to_string(path)
                .map_err(|e| invalid(format!("cannot read schema file: {e}")))?,
        };

        let schema: Value =
            serde_json::from_str(&text).map_err(|e| invalid(format!("invalid JSON: {e}")))?;

        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| invalid(format!("invalid JSON Schema: {e}")))?;

        debug!(origin = %origin, "Loaded configuration schema");
        Ok(Self { validator, origin })
    }

    /// The schema compiled into this crate.
    pub fn bundled() -> Result<Self, SchemaLoadError> {
        Self::new(SchemaSource::Bundled)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaLoadError> {
        Self::new(SchemaSource::File(path.as_ref().to_path_buf()))
    }

    /// Where the schema was loaded from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether `value` conforms to the schema.
    pub fn validate(&self, value: &StructuredValue) -> bool {
        self.validator.is_valid(value)
    }

    /// Every reason `value` does not conform. Empty when it does.
    pub fn violations(&self, value: &StructuredValue) -> Violations {
        let violations = self
            .validator
            .iter_errors(value)
            .map(|e| Violation {
                instance_path: e.instance_path.to_string(),
                schema_path: e.schema_path.to_string(),
                message: e.to_string(),
            })
            .collect();
        Violations { violations }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gate() -> SchemaGate {
        SchemaGate::bundled().unwrap()
    }

    #[test]
    fn test_bundled_schema_matches_file() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(SCHEMA_FILE);
        let gate = SchemaGate::from_path(&path).unwrap();
        assert_eq!(gate.origin(), path.display().to_string());
        assert_eq!(std::fs::read_to_string(path).unwrap(), BUNDLED_SCHEMA);
    }

    #[test]
    fn test_valid_document() {
        let doc = json!({
            "version": "0.0.0",
            "mu": {"fargate": {"name": "app", "cpu": 256, "public": true}}
        });
        assert!(gate().validate(&doc));
        assert!(gate().violations(&doc).is_empty());
    }

    #[test]
    fn test_numeric_version_is_valid() {
        let doc = json!({"version": 0.1, "mu": {"fargate": {"name": "app"}}});
        assert!(gate().validate(&doc));
    }

    #[test]
    fn test_missing_required_keys_is_false_not_error() {
        let doc = json!({"mu": {"fargate": {"name": "app"}}});
        let gate = gate();
        assert!(!gate.validate(&doc));

        let violations = gate.violations(&doc);
        assert_eq!(violations.len(), 1);
        assert!(violations.violations()[0].message.contains("version"));
        assert!(violations.to_string().contains("(root)"));
    }

    #[test]
    fn test_unknown_top_level_key() {
        let doc = json!({
            "version": "1",
            "mu": {"fargate": {"name": "app"}},
            "aliens": true
        });
        assert!(!gate().validate(&doc));
    }

    #[test]
    fn test_nested_violation_path() {
        let doc = json!({
            "version": "1",
            "mu": {"fargate": {"name": "app", "containers": [{"name": "web", "port": 0}]}}
        });
        let violations = gate().violations(&doc);
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations.violations()[0].instance_path,
            "/mu/fargate/containers/0/port"
        );
    }

    #[test]
    fn test_non_object_documents() {
        let gate = gate();
        assert!(!gate.validate(&json!(null)));
        assert!(!gate.validate(&json!("hello")));
        assert!(!gate.validate(&json!([1, 2])));
    }

    #[test]
    fn test_missing_schema_file() {
        let err = SchemaGate::from_path("/nonexistent/mu.schema.json").unwrap_err();
        let SchemaLoadError::InvalidSchema { origin, reason } = err;
        assert_eq!(origin, "/nonexistent/mu.schema.json");
        assert!(reason.contains("cannot read"));
    }

    #[test]
    fn test_schema_not_json() {
        let err = SchemaGate::new(SchemaSource::Inline("{ not json".to_string())).unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_schema_not_a_json_schema() {
        let err =
            SchemaGate::new(SchemaSource::Inline(r#"{"type": 12}"#.to_string())).unwrap_err();
        assert!(err.to_string().contains("invalid JSON Schema"));
    }

    #[test]
    fn test_inline_schema() {
        let gate = SchemaGate::new(SchemaSource::Inline(
            r#"{"type": "object", "required": ["a"]}"#.to_string(),
        ))
        .unwrap();
        assert!(gate.validate(&json!({"a": 1})));
        assert!(!gate.validate(&json!({"b": 1})));
    }

    #[test]
    fn test_concurrent_validation() {
        let gate = std::sync::Arc::new(gate());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    let doc = json!({"version": i, "mu": {"fargate": {"name": format!("app-{i}")}}});
                    gate.validate(&doc)
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
