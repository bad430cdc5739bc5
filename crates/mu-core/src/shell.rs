//! Command runner trait.
//!
//! The `cmd()` template built-in delegates to a [`CommandRunner`], which
//! runs a shell command to completion within a deadline.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Captured output of a successful command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Standard output with trailing whitespace removed.
    pub fn trimmed_stdout(&self) -> &str {
        self.stdout.trim_end()
    }
}

/// Trait for running template commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Name of this runner.
    fn name(&self) -> &'static str;

    /// Run `command` and wait for it to finish.
    ///
    /// Implementations must return an error for a non-zero exit status, and
    /// must terminate the process and return [`crate::Error::Timeout`] when
    /// `timeout` elapses first.
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;
}
