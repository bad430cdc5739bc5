//! Core types and traits for mu configuration resolution.
//!
//! This crate contains:
//! - The template context (caller-supplied variables)
//! - The structured value produced by parsing, and its flattening
//! - The command runner trait used by the `cmd()` template built-in

pub mod context;
pub mod error;
pub mod shell;
pub mod value;

pub use context::{Context, ContextBuilder};
pub use error::{Error, Result};
pub use shell::{CommandOutput, CommandRunner};
pub use value::{StructuredValue, flatten};
