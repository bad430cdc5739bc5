//! Configuration resolution: read, render, parse, validate.
//!
//! Each stage runs only if the previous one succeeded, and a document is
//! returned only if it passed the schema gate.

use std::path::PathBuf;
use std::time::Duration;

use mu_core::{Context, StructuredValue};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, SchemaLoadError};
use crate::parse::parse;
use crate::render::{DEFAULT_COMMAND_TIMEOUT, Renderer};
use crate::schema::{SchemaGate, SchemaSource};

/// Settings for building a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Bound on each `cmd()` call in a template.
    pub command_timeout: Duration,
    /// Schema used to gate resolved documents.
    pub schema: SchemaSource,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            schema: SchemaSource::Bundled,
        }
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_schema(mut self, schema: SchemaSource) -> Self {
        self.schema = schema;
        self
    }
}

/// A configuration document to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Template text held in memory.
    Text(String),
    /// A template file on disk.
    File(PathBuf),
}

impl Source {
    pub fn text(text: impl Into<String>) -> Self {
        Source::Text(text.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Source::File(path.into())
    }

    fn describe(&self) -> String {
        match self {
            Source::Text(_) => "<text>".to_string(),
            Source::File(path) => path.display().to_string(),
        }
    }
}

/// Resolves configuration documents.
///
/// Holds only immutable parts, so one pipeline (behind an `Arc`) can serve
/// many concurrent resolutions.
#[derive(Debug)]
pub struct Pipeline {
    renderer: Renderer,
    gate: SchemaGate,
}

impl Pipeline {
    /// Build a pipeline, loading the configured schema.
    ///
    /// # Errors
    ///
    /// Fails with [`SchemaLoadError`] if the schema is missing or invalid.
    pub fn new(config: ResolverConfig) -> Result<Self, SchemaLoadError> {
        let gate = SchemaGate::new(config.schema)?;
        let renderer = Renderer::new().with_timeout(config.command_timeout);
        Ok(Self::from_parts(renderer, gate))
    }

    pub fn from_parts(renderer: Renderer, gate: SchemaGate) -> Self {
        Self { renderer, gate }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn gate(&self) -> &SchemaGate {
        &self.gate
    }

    async fn read(&self, source: &Source) -> Result<String, PipelineError> {
        match source {
            Source::Text(text) => Ok(text.clone()),
            Source::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                warn!(path = %path.display(), error = %e, "Configuration source unavailable");
                PipelineError::SourceUnavailable {
                    path: path.clone(),
                    source: e,
                }
            }),
        }
    }

    /// Read and render a source without parsing or validating it.
    pub async fn render_source(
        &self,
        source: &Source,
        context: &Context,
    ) -> Result<String, PipelineError> {
        let text = self.read(source).await?;
        Ok(self.renderer.render(&text, context).await?)
    }

    /// Resolve a source into a schema-valid document.
    pub async fn resolve(
        &self,
        source: &Source,
        context: &Context,
    ) -> Result<StructuredValue, PipelineError> {
        let origin = source.describe();
        debug!(source = %origin, "Resolving configuration");

        let rendered = self.render_source(source, context).await?;
        let value = parse(&rendered)?;

        if !self.gate.validate(&value) {
            let violations = self.gate.violations(&value);
            warn!(source = %origin, violations = violations.len(), "Configuration failed schema validation");
            return Err(PipelineError::SchemaViolation { violations });
        }

        info!(source = %origin, "Configuration resolved");
        Ok(value)
    }
}
