//! Task executors.
//!
//! An executor runs one task specification to completion and reports a
//! [`TaskOutcome`]. Its result line goes into the output channel as a side
//! effect; the driver reads it back afterwards.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use batchrun_claude_sdk::{ClaudeExecutor, ClaudeMessage, ContentItem, MessageHandler, SdkError};
use batchrun_core::{TaskOutcome, TaskSpecification, WorkItem};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::channel::{OutputChannel, OUTPUT_FILE};
use crate::command::CommandExecutor;
use crate::config::ExecutorSpec;

/// Errors raised by an executor instead of reporting an outcome.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SDK error: {0}")]
    Sdk(#[from] SdkError),

    #[error("Executor raised: {0}")]
    Raised(String),

    #[error("Task timed out after {0:?}")]
    TimedOut(Duration),
}

/// Everything an executor gets for one invocation.
pub struct TaskContext<'a> {
    pub item: &'a WorkItem,
    pub spec: &'a TaskSpecification,
    /// Directory the executor runs in.
    pub workspace: &'a Path,
    pub channel: &'a dyn OutputChannel,
}

/// Runs a single task.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn execute(&self, ctx: TaskContext<'_>) -> Result<TaskOutcome, ExecutorError>;
}

/// Build the executor selected in the configuration.
pub fn build(spec: &ExecutorSpec) -> Arc<dyn TaskExecutor> {
    match spec {
        ExecutorSpec::Claude {
            claude_path,
            model,
            max_turns,
            permission_mode,
            capture_final_result,
        } => {
            let mut sdk = ClaudeExecutor::new(claude_path)
                .with_permission_mode(*permission_mode)
                .with_max_turns(*max_turns);
            if let Some(model) = model {
                sdk = sdk.with_model(model);
            }
            Arc::new(ClaudeAgentExecutor::new(sdk).with_capture_final_result(*capture_final_result))
        }
        ExecutorSpec::Command { program, args } => {
            Arc::new(CommandExecutor::new(program.clone(), args.clone()))
        }
    }
}

/// Handler that logs agent progress and counts tool calls.
struct ProgressHandler {
    identifier: String,
    tool_uses: AtomicU32,
}

impl ProgressHandler {
    fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            tool_uses: AtomicU32::new(0),
        }
    }

    fn tool_uses(&self) -> u32 {
        self.tool_uses.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageHandler for ProgressHandler {
    async fn on_message(&self, message: &ClaudeMessage) -> Result<(), SdkError> {
        match message {
            ClaudeMessage::System { session_id, model, .. } => {
                debug!(item = %self.identifier, session_id = ?session_id, model = ?model, "Agent session started");
            }
            ClaudeMessage::Assistant { message, .. } => {
                for content in &message.content {
                    if let ContentItem::ToolUse { name, .. } = content {
                        self.tool_uses.fetch_add(1, Ordering::Relaxed);
                        debug!(item = %self.identifier, tool = %name, "Agent tool use");
                    }
                }
            }
            ClaudeMessage::Result {
                is_error,
                num_turns,
                ..
            } => {
                info!(item = %self.identifier, is_error = ?is_error, num_turns = ?num_turns, "Agent result received");
            }
            ClaudeMessage::Unknown(value) => {
                let kind = value.get("type").and_then(|t| t.as_str()).unwrap_or("?");
                debug!(item = %self.identifier, kind = %kind, "Ignoring unknown agent message");
            }
            _ => {}
        }
        Ok(())
    }
}

/// Runs each task as a one-shot Claude Code agent inside the task workspace.
#[derive(Clone)]
pub struct ClaudeAgentExecutor {
    sdk: ClaudeExecutor,
    /// Fall back to the agent's final answer when it wrote no output file.
    capture_final_result: bool,
}

impl ClaudeAgentExecutor {
    pub fn new(sdk: ClaudeExecutor) -> Self {
        Self {
            sdk,
            capture_final_result: false,
        }
    }

    pub fn with_capture_final_result(mut self, enabled: bool) -> Self {
        self.capture_final_result = enabled;
        self
    }

    /// Instruction appended to the system prompt for every task.
    fn output_instruction(channel: &dyn OutputChannel) -> String {
        let target = channel
            .path()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| OUTPUT_FILE.to_string());
        format!(
            "When the task is done, write your answer as a single tab-separated line \
             to the file {} in the current working directory, then stop.",
            target
        )
    }
}

#[async_trait]
impl TaskExecutor for ClaudeAgentExecutor {
    fn name(&self) -> &str {
        "claude"
    }

    async fn execute(&self, ctx: TaskContext<'_>) -> Result<TaskOutcome, ExecutorError> {
        let identifier = ctx.item.identifier();
        info!(item = %identifier, prompt_len = ctx.spec.len(), "Starting agent execution");

        let mut sdk = self
            .sdk
            .clone()
            .with_append_system_prompt(Self::output_instruction(ctx.channel));
        if let Some(path) = ctx.channel.path() {
            sdk = sdk.with_env("BATCHRUN_OUTPUT", path.display().to_string());
        }

        let handler = Arc::new(ProgressHandler::new(identifier));
        let result = sdk
            .execute(ctx.workspace, ctx.spec.as_str(), handler.clone())
            .await?;

        info!(
            item = %identifier,
            session_id = ?result.session_id,
            model = ?result.model_used,
            duration_ms = result.duration_ms,
            tool_uses = handler.tool_uses(),
            "Agent execution finished"
        );

        if result.is_error {
            let reason = result
                .error_message
                .unwrap_or_else(|| "agent reported an error".to_string());
            return Ok(TaskOutcome::Failed(reason));
        }

        if self.capture_final_result && ctx.channel.read_first_line().await.is_empty() {
            let answer = result
                .result_text
                .as_deref()
                .and_then(|text| text.lines().find(|l| !l.trim().is_empty()));
            if let Some(line) = answer {
                warn!(item = %identifier, "Agent wrote no output file; using its final answer");
                ctx.channel.write_line(line.trim()).await?;
            }
        }

        Ok(TaskOutcome::Completed)
    }
}
