//! Configuration resolution for mu.
//!
//! This crate turns a templated `mu.yml` into a validated document:
//! - Template rendering with `{{ var }}`, `env()` and `cmd()`
//! - YAML parsing into a structured value
//! - JSON Schema validation
//! - The pipeline that runs these stages in order

pub mod error;
pub mod parse;
pub mod pipeline;
pub mod render;
pub mod schema;

pub use error::{ParseError, PipelineError, RenderError, SchemaLoadError, Stage};
pub use parse::parse;
pub use pipeline::{Pipeline, ResolverConfig, Source};
pub use render::{DEFAULT_COMMAND_TIMEOUT, Renderer, ShellRunner, Template, render};
pub use schema::{SchemaGate, SchemaSource, Violation, Violations};
