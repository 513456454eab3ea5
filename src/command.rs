use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error};

use crate::contract::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::{PdfError, Result};

/// Runs commands as real child processes on the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let command_line = spec.display();
        debug!(command = %command_line, cwd = ?spec.cwd, "Spawning command");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        if spec.inherit_output {
            let status = cmd
                .stdin(Stdio::null())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(|e| {
                    error!(error = ?e, command = %command_line, "Failed to launch command");
                    PdfError::Io(e)
                })?;

            let code = status.code().unwrap_or(-1);
            if !status.success() {
                error!(command = %command_line, status = code, "Command exited with non-zero code");
                return Err(PdfError::Process {
                    command: command_line,
                    status: code,
                    stderr: String::from("<see inherited output>"),
                });
            }
            return Ok(CommandOutput {
                stdout: String::new(),
                status: code,
            });
        }

        let output = cmd.stdin(Stdio::null()).output().await.map_err(|e| {
            error!(error = ?e, command = %command_line, "Failed to launch command");
            PdfError::Io(e)
        })?;

        let code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(command = %command_line, status = code, stderr = %stderr, "Command exited with non-zero code");
            return Err(PdfError::Process {
                command: command_line,
                status: code,
                stderr,
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| PdfError::Process {
            command: command_line.clone(),
            status: code,
            stderr: format!("stdout is not valid UTF-8: {e}"),
        })?;
        debug!(command = %command_line, bytes = stdout.len(), "Command finished");

        Ok(CommandOutput {
            stdout,
            status: code,
        })
    }
}
