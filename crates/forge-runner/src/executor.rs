//! Shell-based step execution on the host.

use async_trait::async_trait;
use forge_core::ports::{CommandContext, CommandOutcome, OutputLine, OutputStream, StepExecutor};
use forge_core::{Error, Result};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Executes step commands through a shell in the job workspace.
///
/// The engine treats every command as opaque: this adapter spawns it,
/// streams its output into the outcome, and reports the exit code. Timeout
/// enforcement belongs to the surrounding execution environment.
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepExecutor for ShellExecutor {
    async fn execute(&self, ctx: &CommandContext) -> Result<CommandOutcome> {
        let start = std::time::Instant::now();

        info!(command = %ctx.command, workspace = %ctx.workspace.display(), "executing command");

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&ctx.command)
            .current_dir(&ctx.workspace)
            .envs(&ctx.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Executor(format!("Failed to spawn process: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Executor("Missing stdout pipe".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Executor("Missing stderr pipe".to_string()))?;

        let (tx, mut rx) = mpsc::channel::<OutputLine>(100);
        let stdout_handle = tokio::spawn(stream_lines(stdout, OutputStream::Stdout, tx.clone()));
        let stderr_handle = tokio::spawn(stream_lines(stderr, OutputStream::Stderr, tx));

        let mut output = Vec::new();
        while let Some(line) = rx.recv().await {
            debug!(stream = ?line.stream, "{}", line.line);
            output.push(line);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::Executor(format!("Failed to wait for process: {}", e)))?;
        let _ = stdout_handle.await;
        let _ = stderr_handle.await;

        let exit_code = status.code().unwrap_or(-1);
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(exit_code, duration_ms, "command completed");

        Ok(CommandOutcome {
            exit_code,
            duration_ms,
            output,
        })
    }
}

async fn stream_lines<R: AsyncRead + Unpin>(
    reader: R,
    stream: OutputStream,
    tx: mpsc::Sender<OutputLine>,
) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(OutputLine { stream, line }).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn ctx(command: &str) -> CommandContext {
        CommandContext {
            command: command.to_string(),
            workspace: PathBuf::from("/tmp"),
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_successful_command() {
        let outcome = ShellExecutor::new().execute(&ctx("echo hello")).await.unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.output[0].line, "hello");
        assert_eq!(outcome.output[0].stream, OutputStream::Stdout);
    }

    #[tokio::test]
    async fn test_nonzero_exit_code_is_observed_not_an_error() {
        let outcome = ShellExecutor::new().execute(&ctx("exit 3")).await.unwrap();
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, 3);
    }

    #[tokio::test]
    async fn test_env_is_passed_through() {
        let mut context = ctx("echo $FORGE_MATRIX_OS");
        context.env.insert("FORGE_MATRIX_OS".to_string(), "linux".to_string());
        let outcome = ShellExecutor::new().execute(&context).await.unwrap();
        assert_eq!(outcome.output[0].line, "linux");
    }

    #[tokio::test]
    async fn test_stderr_is_captured() {
        let outcome = ShellExecutor::new()
            .execute(&ctx("echo oops 1>&2"))
            .await
            .unwrap();
        assert!(outcome
            .output
            .iter()
            .any(|l| l.stream == OutputStream::Stderr && l.line == "oops"));
    }
}
