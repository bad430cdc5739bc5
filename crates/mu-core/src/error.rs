//! Error types for mu.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("command `{command}` could not be started: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command `{command}` failed with {}: {stderr}", exit_label(.code))]
    ExitStatus {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("command `{command}` produced output that is not valid UTF-8: {source}")]
    InvalidOutput {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("command `{command}` timed out after {}s", .timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },

    #[error("invalid context entry `{0}`: expected KEY=VALUE")]
    InvalidContextEntry(String),

    #[error("invalid context variable name `{0}`")]
    InvalidVariableName(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
