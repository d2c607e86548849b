//! Executor that runs an arbitrary program per task.

use std::process::Stdio;

use async_trait::async_trait;
use batchrun_core::TaskOutcome;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::executor::{ExecutorError, TaskContext, TaskExecutor};

/// Runs `program args...` in the task workspace with the task
/// specification on stdin.
///
/// The program can write its result line to the file named by
/// `BATCHRUN_OUTPUT`. If it leaves the channel empty, the first non-empty
/// line of its stdout is used instead. Exit status 0 means the task
/// completed; any other status is a failure.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl TaskExecutor for CommandExecutor {
    fn name(&self) -> &str {
        "command"
    }

    async fn execute(&self, ctx: TaskContext<'_>) -> Result<TaskOutcome, ExecutorError> {
        let identifier = ctx.item.identifier();
        debug!(program = %self.program, item = %identifier, "Spawning task command");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(ctx.workspace)
            .env("BATCHRUN_ITEM", identifier)
            .env("BATCHRUN_WORKSPACE", ctx.workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = ctx.channel.path() {
            cmd.env("BATCHRUN_OUTPUT", path);
        }

        let mut child = cmd.spawn().map_err(|source| ExecutorError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Stdin is fed while stdout and stderr drain.
        let stdin = child.stdin.take();
        let spec = ctx.spec.as_str().as_bytes();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(spec).await {
                    Ok(()) => {}
                    // Programs that ignore stdin may exit before reading it.
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        fed?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            warn!(program = %self.program, item = %identifier, code = %code, "Task command failed");
            return Ok(TaskOutcome::Failed(format!(
                "{} exited with {}: {}",
                self.program, code, tail
            )));
        }

        if ctx.channel.read_first_line().await.is_empty() {
            if let Some(line) = stdout.lines().find(|l| !l.trim().is_empty()) {
                ctx.channel.write_line(line).await?;
            }
        }

        info!(program = %self.program, item = %identifier, "Task command completed");
        Ok(TaskOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::MemoryChannel;
    use crate::channel::{ChannelProvider, IsolatedWorkspaces, OutputChannel};
    use std::time::Duration;
    use batchrun_core::{PromptTemplate, TaskSpecification, WorkItem};
    use tempfile::TempDir;

    fn spec_for(item: &WorkItem) -> TaskSpecification {
        PromptTemplate::with_default_placeholder("Look up {company_name}")
            .unwrap()
            .render(item.identifier())
    }

    fn sh(script: &str) -> CommandExecutor {
        CommandExecutor::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_writes_output_file() {
        let temp = TempDir::new().unwrap();
        let workspaces = IsolatedWorkspaces::new(temp.path(), true);
        let item = WorkItem::new("Acme");
        let slot = workspaces.open(0, &item).await.unwrap();
        let spec = spec_for(&item);

        let executor = sh(r#"printf '%s\tdone\n' "$BATCHRUN_ITEM" > "$BATCHRUN_OUTPUT""#);
        let outcome = executor
            .execute(TaskContext {
                item: &item,
                spec: &spec,
                workspace: &slot.workspace,
                channel: slot.channel.as_ref(),
            })
            .await
            .unwrap();

        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(slot.channel.read_first_line().await, "Acme\tdone");
    }

    #[tokio::test]
    async fn test_reads_spec_from_stdin_and_captures_stdout() {
        let temp = TempDir::new().unwrap();
        let item = WorkItem::new("Globex");
        let spec = spec_for(&item);
        let channel = MemoryChannel::default();

        let outcome = sh("cat")
            .execute(TaskContext {
                item: &item,
                spec: &spec,
                workspace: temp.path(),
                channel: &channel,
            })
            .await
            .unwrap();

        assert!(outcome.is_completed());
        assert_eq!(channel.read_first_line().await, "Look up Globex");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let temp = TempDir::new().unwrap();
        let item = WorkItem::new("Initech");
        let spec = spec_for(&item);
        let channel = MemoryChannel::default();

        let outcome = sh("echo partial; echo 'quota exceeded' >&2; exit 3")
            .execute(TaskContext {
                item: &item,
                spec: &spec,
                workspace: temp.path(),
                channel: &channel,
            })
            .await
            .unwrap();

        match outcome {
            TaskOutcome::Failed(reason) => {
                assert!(reason.contains("exited with 3"));
                assert!(reason.contains("quota exceeded"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(channel.read_first_line().await, "");
    }

    #[tokio::test]
    async fn test_missing_program_is_raised() {
        let temp = TempDir::new().unwrap();
        let item = WorkItem::new("Acme");
        let spec = spec_for(&item);
        let channel = MemoryChannel::default();

        let err = CommandExecutor::new("/nonexistent/batchrun-task", vec![])
            .execute(TaskContext {
                item: &item,
                spec: &spec,
                workspace: temp.path(),
                channel: &channel,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_large_stdin_and_stdout_do_not_block() {
        let temp = TempDir::new().unwrap();
        let item = WorkItem::new("Acme");
        let spec = PromptTemplate::with_default_placeholder(format!(
            "{}{{company_name}}",
            "y".repeat(300_000)
        ))
        .unwrap()
        .render(item.identifier());
        let channel = MemoryChannel::default();

        // Floods stdout before reading any of stdin.
        let executor = sh("head -c 300000 /dev/zero | tr '\\0' x; echo; wc -c > /dev/null");
        let outcome = tokio::time::timeout(
            Duration::from_secs(60),
            executor.execute(TaskContext {
                item: &item,
                spec: &spec,
                workspace: temp.path(),
                channel: &channel,
            }),
        )
        .await
        .expect("command blocked on a full pipe")
        .unwrap();

        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(channel.read_first_line().await.len(), 300_000);
    }
}
