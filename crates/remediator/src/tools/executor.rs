//! Command execution against the cluster control plane.
//!
//! The executor only accepts [`ValidatedCommand`]s. Each command is run once
//! through a [`CommandRunner`], bounded by a timeout, and its outcome is
//! wrapped into a [`ToolResult`] via the error classifier. Nothing here
//! retries: a mutating command that timed out may or may not have been
//! applied, so the decision belongs to whoever plans the next step.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::classifier;
use super::command::ValidatedCommand;
use super::plan::RemediationPlan;
use super::result::{ErrorKind, ToolError, ToolResult};
use crate::config::ExecutionPolicy;

/// Raw process outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Exit code; `None` if terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[must_use]
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Seam between the executor and the process that talks to the cluster.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the control-plane CLI with `args`. Never through a shell.
    ///
    /// Dropping the returned future must terminate the child.
    async fn run(&self, args: Vec<String>) -> std::io::Result<RunOutput>;
}

/// Runs `kubectl` as a child process.
#[derive(Debug, Clone)]
pub struct KubectlRunner {
    program: String,
}

impl KubectlRunner {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for KubectlRunner {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

#[async_trait]
impl CommandRunner for KubectlRunner {
    async fn run(&self, args: Vec<String>) -> std::io::Result<RunOutput> {
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(RunOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Success payload of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

/// One executed command, in submission order.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub index: usize,
    pub command: ValidatedCommand,
    /// Rendered command line, for humans
    pub command_line: String,
    pub result: ToolResult<CommandOutput>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionRecord {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result.is_success()
    }
}

/// Executes validated commands.
#[derive(Clone)]
pub struct CommandExecutor {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl CommandExecutor {
    /// Create an executor with a per-command timeout.
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Run one command.
    pub async fn execute(&self, index: usize, command: &ValidatedCommand) -> ExecutionRecord {
        let command_line = command.to_string();
        let started_at = Utc::now();
        info!(index, command = %command_line, "Executing command");

        let result = match timeout(self.timeout, self.runner.run(command.to_args())).await {
            Ok(Ok(output)) => wrap_output(command, output),
            Ok(Err(e)) => {
                warn!(index, error = %e, "Failed to spawn command");
                ToolResult::Failure(
                    ToolError::new(ErrorKind::Unknown, format!("failed to run command: {e}"))
                        .with_raw(e.to_string()),
                )
            }
            Err(_) => {
                // Future dropped here; kill_on_drop reaps the child.
                warn!(index, timeout_secs = self.timeout.as_secs(), "Command timed out");
                ToolResult::Failure(
                    ToolError::new(
                        ErrorKind::Timeout,
                        format!("command timed out after {}s", self.timeout.as_secs()),
                    )
                    .with_suggestion(suggestion_for(ErrorKind::Timeout, command)),
                )
            }
        };

        match &result {
            ToolResult::Success(_) => debug!(index, "Command succeeded"),
            ToolResult::Failure(e) => warn!(index, kind = %e.kind, "Command failed: {}", e.message),
        }

        ExecutionRecord {
            index,
            command: command.clone(),
            command_line,
            result,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Run a plan's commands in order.
    ///
    /// With [`ExecutionPolicy::Abort`] nothing after the first failure runs
    /// and no record is produced for skipped commands.
    pub async fn execute_plan(
        &self,
        plan: &RemediationPlan,
        policy: ExecutionPolicy,
    ) -> Vec<ExecutionRecord> {
        let mut records = Vec::with_capacity(plan.len());
        for (index, command) in plan.commands().iter().enumerate() {
            let record = self.execute(index, command).await;
            let failed = !record.succeeded();
            records.push(record);
            if failed && policy == ExecutionPolicy::Abort {
                info!(
                    index,
                    skipped = plan.len() - index - 1,
                    "Aborting plan after failed command"
                );
                break;
            }
        }
        records
    }
}

fn wrap_output(command: &ValidatedCommand, output: RunOutput) -> ToolResult<CommandOutput> {
    if output.exit_code == Some(0) {
        return ToolResult::Success(CommandOutput {
            exit_code: 0,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }

    let kind = classifier::classify(output.exit_code, &output.stderr);
    let first_line = output
        .stderr
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("command failed without output");
    let message = match output.exit_code {
        Some(code) => format!("exit code {code}: {first_line}"),
        None => format!("terminated by signal: {first_line}"),
    };
    ToolResult::Failure(
        ToolError::new(kind, message)
            .with_raw(output.stderr)
            .with_suggestion(suggestion_for(kind, command)),
    )
}

fn suggestion_for(kind: ErrorKind, command: &ValidatedCommand) -> String {
    let target = command.target();
    classifier::suggestion(kind, Some(&target.namespace), Some(&target.to_string()))
}
