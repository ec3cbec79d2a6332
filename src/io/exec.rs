//! One-shot command execution
//!
//! Runs short-lived helper commands (`bundle list`, `rubocop -v`) through the
//! platform shell and captures their output. Unlike [`crate::io::process`],
//! nothing here outlives the call.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{Level, debug};

use crate::log_timing;

/// Captured output of a successful command, trimmed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A helper command that could not be run or exited unsuccessfully
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error(
        "Command `{command}` failed with exit code {}",
        .code.map_or_else(|| "?".to_string(), |c| c.to_string())
    )]
    Failed {
        command: String,
        cwd: PathBuf,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Command `{command}` could not be started: {source}")]
    Spawn {
        command: String,
        cwd: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ExecError {
    /// Trimmed stderr of a failed command, empty when it never ran
    pub fn stderr(&self) -> &str {
        match self {
            ExecError::Failed { stderr, .. } => stderr,
            ExecError::Spawn { .. } => "",
        }
    }

    /// Lines describing the failure for the output channel
    pub fn report_lines(&self) -> Vec<String> {
        match self {
            ExecError::Failed {
                cwd,
                stdout,
                stderr,
                ..
            } => {
                let mut lines = vec![format!("{} (cwd: {})", self, cwd.display())];
                if !stdout.is_empty() {
                    lines.push(format!("stdout:\n{stdout}"));
                }
                if !stderr.is_empty() {
                    lines.push(format!("stderr:\n{stderr}"));
                }
                lines
            }
            ExecError::Spawn { cwd, .. } => vec![format!("{} (cwd: {})", self, cwd.display())],
        }
    }
}

/// Runs a command line in a working directory
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, cwd: &Path) -> Result<ExecOutput, ExecError>;
}

/// Runs command lines through `sh -c` (or `cmd /C` on Windows)
#[derive(Debug, Default, Clone)]
pub struct ShellRunner;

impl ShellRunner {
    fn shell_command(command: &str) -> Command {
        #[cfg(windows)]
        {
            let mut shell = Command::new("cmd");
            shell.arg("/C").arg(command);
            shell
        }
        #[cfg(not(windows))]
        {
            let mut shell = Command::new("sh");
            shell.arg("-c").arg(command);
            shell
        }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, cwd: &Path) -> Result<ExecOutput, ExecError> {
        let start = Instant::now();
        debug!("Running `{}` in {}", command, cwd.display());

        let output = Self::shell_command(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ExecError::Spawn {
                command: command.to_string(),
                cwd: cwd.to_path_buf(),
                source,
            })?;

        log_timing!(Level::DEBUG, command, start.elapsed());

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            Ok(ExecOutput { stdout, stderr })
        } else {
            Err(ExecError::Failed {
                command: command.to_string(),
                cwd: cwd.to_path_buf(),
                code: output.status.code(),
                stdout,
                stderr,
            })
        }
    }
}
