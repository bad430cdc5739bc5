//! Shell command runner backing the `cmd()` built-in.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use mu_core::{CommandOutput, CommandRunner, Error, Result};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

/// Runs commands through the platform shell (`sh -c` or `cmd /C`).
#[derive(Debug, Clone)]
pub struct ShellRunner {
    program: String,
    flag: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        if cfg!(windows) {
            Self::new("cmd", "/C")
        } else {
            Self::new("sh", "-c")
        }
    }
}

impl ShellRunner {
    pub fn new(program: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            flag: flag.into(),
        }
    }
}

/// How long pipes may stay open after the shell exits, e.g. held by a
/// background job, before the rest of the process group is killed.
const OUTPUT_GRACE: Duration = Duration::from_millis(100);

/// Every process started for one command.
///
/// On unix the shell leads its own process group, so pipeline stages,
/// subshells and `&` jobs are signalled together. Dropping the handle kills
/// whatever is left of the group.
struct ProcessGroup {
    #[cfg(unix)]
    pgid: Option<libc::pid_t>,
}

impl ProcessGroup {
    #[cfg(unix)]
    fn of(child: &Child) -> Self {
        Self {
            pgid: child.id().and_then(|id| libc::pid_t::try_from(id).ok()),
        }
    }

    #[cfg(not(unix))]
    fn of(_child: &Child) -> Self {
        Self {}
    }

    #[cfg(unix)]
    fn kill(&self) {
        if let Some(pgid) = self.pgid {
            // SAFETY: killpg only sends a signal. ESRCH for an empty group is expected.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn read_pipes(
    mut stdout: ChildStdout,
    mut stderr: ChildStderr,
) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut err = Vec::new();
    tokio::try_join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err))?;
    Ok((out, err))
}

fn spawn_error(command: &str, source: io::Error) -> Error {
    Error::Spawn {
        command: command.to_string(),
        source,
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    fn name(&self) -> &'static str {
        "shell"
    }

    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        debug!(shell = %self.program, command, timeout_ms = timeout.as_millis() as u64, "Running template command");

        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.flag)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| spawn_error(command, e))?;
        let group = ProcessGroup::of(&child);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(command, io::Error::other("stdout was not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error(command, io::Error::other("stderr was not captured")))?;
        let mut reads = tokio::spawn(read_pipes(stdout, stderr));

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status.map_err(|e| spawn_error(command, e))?,
            Err(_) => {
                warn!(command, timeout_ms = timeout.as_millis() as u64, "Template command timed out");
                group.kill();
                // kill() also reaps the shell.
                if let Err(e) = child.kill().await {
                    debug!(command, error = %e, "Failed to reap timed out command");
                }
                reads.abort();
                return Err(Error::Timeout {
                    command: command.to_string(),
                    timeout,
                });
            }
        };

        let joined = match tokio::time::timeout(OUTPUT_GRACE, &mut reads).await {
            Ok(joined) => joined,
            Err(_) => {
                debug!(command, "Command left processes holding its output; killing them");
                group.kill();
                match tokio::time::timeout(OUTPUT_GRACE, &mut reads).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        reads.abort();
                        return Err(spawn_error(
                            command,
                            io::Error::other("output pipes stayed open after the command exited"),
                        ));
                    }
                }
            }
        };
        let (stdout, stderr) = joined
            .map_err(io::Error::other)
            .and_then(|read| read)
            .map_err(|e| spawn_error(command, e))?;
        drop(group);

        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        if !status.success() {
            debug!(command, code = ?status.code(), stderr = %stderr.trim_end(), "Template command failed");
            return Err(Error::ExitStatus {
                command: command.to_string(),
                code: status.code(),
                stderr: stderr.trim_end().to_string(),
            });
        }

        let stdout = String::from_utf8(stdout).map_err(|source| Error::InvalidOutput {
            command: command.to_string(),
            source,
        })?;

        debug!(command, bytes = stdout.len(), "Template command succeeded");
        Ok(CommandOutput { stdout, stderr })
    }
}
