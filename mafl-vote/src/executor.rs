//! Command execution
//!
//! [`CommandExecutor`] is the seam between scheduling and the outside world.
//! [`ProcessExecutor`] spawns real subprocesses; [`DryRunExecutor`] only logs.

use crate::command::PlannedCommand;
use crate::error::{CommandFailure, FailureReason};
use std::process::Stdio;
use tokio::process::Command;

/// Lines of stderr kept in a failure report
const STDERR_TAIL_LINES: usize = 10;

/// Runs one planned command to completion
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute `command`, returning once it has exited
    ///
    /// # Errors
    /// Returns `CommandFailure` when the command cannot be started or exits
    /// unsuccessfully. There is no timeout; a hung command blocks its caller.
    async fn execute(&self, command: &PlannedCommand) -> Result<(), CommandFailure>;
}

/// Spawns each command as a child process
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, command: &PlannedCommand) -> Result<(), CommandFailure> {
        let invocation = command.invocation();
        let failure = |reason: FailureReason| CommandFailure {
            invocation: invocation.clone(),
            reason,
        };

        if let Some(parent) = command.output().parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                failure(FailureReason::Prepare {
                    message: format!("{}: {}", parent.display(), e),
                })
            })?;
        }

        tracing::debug!(command = %invocation, "Running");

        let output = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                failure(FailureReason::Spawn {
                    message: e.to_string(),
                })
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!(command = %invocation, stdout = %stdout.trim_end(), "Command output");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failure(FailureReason::Exit {
                code: output.status.code(),
                stderr: tail_lines(&stderr, STDERR_TAIL_LINES),
            }));
        }

        Ok(())
    }
}

/// Logs commands instead of running them
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor;

#[async_trait::async_trait]
impl CommandExecutor for DryRunExecutor {
    async fn execute(&self, command: &PlannedCommand) -> Result<(), CommandFailure> {
        tracing::info!("[dry run] {}", command.invocation());
        Ok(())
    }
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKey;
    use tempfile::TempDir;

    fn shell(script: &str, output: std::path::PathBuf) -> PlannedCommand {
        PlannedCommand::new(
            CommandKey::Vote {
                strategy: "majvote".to_string(),
                target: "X".to_string(),
            },
            "sh",
            vec!["-c".to_string(), script.to_string()],
            output,
        )
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail_lines("only", 5), "only");
        assert_eq!(tail_lines("", 5), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_creates_output_parent() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("fusion/majvote/X/labels.mnc");
        let script = format!("touch '{}'", output.display());

        ProcessExecutor::new()
            .execute(&shell(&script, output.clone()))
            .await
            .unwrap();

        assert!(output.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_reported() {
        let dir = TempDir::new().unwrap();
        let cmd = shell("echo broken >&2; exit 3", dir.path().join("out.mnc"));

        let failure = ProcessExecutor::new().execute(&cmd).await.unwrap_err();

        assert_eq!(failure.invocation, cmd.invocation());
        assert_eq!(
            failure.reason,
            FailureReason::Exit {
                code: Some(3),
                stderr: "broken".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let cmd = PlannedCommand::new(
            CommandKey::Extract {
                archive: dir.path().join("labels.tar.gz"),
            },
            "mafl-no-such-tool",
            vec![],
            dir.path().join("out"),
        );

        let failure = ProcessExecutor::new().execute(&cmd).await.unwrap_err();

        assert!(matches!(failure.reason, FailureReason::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("nested/labels.mnc");

        DryRunExecutor
            .execute(&shell("exit 1", output.clone()))
            .await
            .unwrap();

        assert!(!output.parent().unwrap().exists());
    }
}
