//! Claude Code executor for running agents via subprocess.
//!
//! This module provides the main `ClaudeExecutor` type for executing
//! Claude Code agents using one-shot mode with streaming JSON output.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::SdkError;
use crate::handler::MessageHandler;
use crate::types::{ClaudeMessage, PermissionMode};

/// Result of a Claude Code execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// The session ID reported by Claude Code.
    pub session_id: Option<String>,

    /// The model reported in the init message.
    pub model_used: Option<String>,

    /// Duration of execution in milliseconds.
    pub duration_ms: u64,

    /// Number of agent turns, when reported.
    pub num_turns: Option<u32>,

    /// Whether the final result message flagged an error.
    pub is_error: bool,

    /// Final result text of the run.
    pub result_text: Option<String>,

    /// Error message if `is_error` is true.
    pub error_message: Option<String>,
}

impl ExecutionResult {
    /// Fold one message into the summary.
    fn observe(&mut self, message: &ClaudeMessage) {
        if self.session_id.is_none() {
            if let Some(sid) = message.session_id() {
                self.session_id = Some(sid.to_string());
            }
        }

        match message {
            ClaudeMessage::System { model, .. } => {
                if model.is_some() {
                    self.model_used = model.clone();
                }
            }
            ClaudeMessage::Result {
                subtype,
                is_error,
                duration_ms,
                num_turns,
                result,
                error,
                ..
            } => {
                self.is_error = is_error.unwrap_or(false);
                if let Some(ms) = duration_ms {
                    self.duration_ms = *ms;
                }
                self.num_turns = *num_turns;
                self.result_text = result.as_ref().and_then(|v| v.as_str()).map(str::to_string);
                self.error_message = error.clone().or_else(|| {
                    self.is_error
                        .then(|| subtype.clone().unwrap_or_else(|| "error".to_string()))
                });
            }
            _ => {}
        }
    }
}

/// Executor for Claude Code agents.
///
/// # Example
///
/// ```rust,no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use batchrun_claude_sdk::{ClaudeExecutor, PermissionMode, TracingHandler};
///
/// async fn run() -> Result<(), Box<dyn std::error::Error>> {
///     let executor = ClaudeExecutor::new("claude")
///         .with_permission_mode(PermissionMode::BypassPermissions)
///         .with_max_turns(10);
///
///     let result = executor
///         .execute(Path::new("."), "What is 2 + 2?", Arc::new(TracingHandler::default()))
///         .await?;
///
///     println!("Result: {:?}", result.result_text);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ClaudeExecutor {
    /// Path to the Claude CLI executable.
    claude_path: String,

    /// Permission mode to use.
    permission_mode: PermissionMode,

    /// Model to use (optional).
    model: Option<String>,

    /// Maximum agent turns (optional).
    max_turns: Option<u32>,

    /// Text appended to the default system prompt (optional).
    append_system_prompt: Option<String>,

    /// Additional environment variables.
    env_vars: Vec<(String, String)>,
}

impl ClaudeExecutor {
    /// Create a new executor with the given path to the Claude CLI.
    ///
    /// The path can be just "claude" to use PATH lookup, or a full path.
    pub fn new(claude_path: impl Into<String>) -> Self {
        Self {
            claude_path: claude_path.into(),
            permission_mode: PermissionMode::Default,
            model: None,
            max_turns: None,
            append_system_prompt: None,
            env_vars: Vec::new(),
        }
    }

    /// Set the permission mode.
    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Cap the number of agent turns.
    pub fn with_max_turns(mut self, turns: u32) -> Self {
        self.max_turns = Some(turns);
        self
    }

    /// Append text to the system prompt.
    pub fn with_append_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.append_system_prompt = Some(prompt.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Command line arguments for a one-shot run of `prompt`.
    pub fn command_args(&self, prompt: &str) -> Vec<String> {
        // stream-json in print mode requires --verbose
        let mut args = vec![
            "--output-format=stream-json".to_string(),
            "--verbose".to_string(),
            "--permission-mode".to_string(),
            self.permission_mode.to_string(),
        ];

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if let Some(turns) = self.max_turns {
            args.push("--max-turns".to_string());
            args.push(turns.to_string());
        }

        if let Some(system) = &self.append_system_prompt {
            args.push("--append-system-prompt".to_string());
            args.push(system.clone());
        }

        args.push("--print".to_string());
        args.push(prompt.to_string());
        args
    }

    /// Execute a prompt with Claude Code in `working_dir`.
    ///
    /// Every parsed stdout message is passed to `handler` and folded into the
    /// returned summary. A non-zero exit is an error; an agent that exits
    /// cleanly but reports `is_error` is returned as `Ok` with the flag set.
    /// The child is killed if the returned future is dropped.
    pub async fn execute(
        &self,
        working_dir: &Path,
        prompt: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ExecutionResult, SdkError> {
        info!(
            claude_path = %self.claude_path,
            working_dir = %working_dir.display(),
            prompt_len = prompt.len(),
            "Preparing Claude execution"
        );

        let mut cmd = Command::new(&self.claude_path);
        cmd.args(self.command_args(prompt))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(working_dir)
            .kill_on_drop(true);

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        debug!("Full command: {:?}", cmd);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            error!(error = %e, "Failed to spawn Claude process");
            if e.kind() == std::io::ErrorKind::NotFound {
                SdkError::ClaudeNotFound(self.claude_path.clone())
            } else {
                SdkError::SpawnError(e)
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SdkError::ProtocolError("Failed to get stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SdkError::ProtocolError("Failed to get stderr".to_string()))?;

        // Stderr is logged and the tail kept for error reports
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();
            let mut tail = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            warn!(stderr = %trimmed, "Claude stderr");
                            tail = trimmed.to_string();
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Error reading Claude stderr");
                        break;
                    }
                }
            }
            tail
        });

        let stdout_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            let mut summary = ExecutionResult::default();
            let mut message_count = 0u64;

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!(total_messages = message_count, "Claude stdout closed (EOF)");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        message_count += 1;

                        match serde_json::from_str::<ClaudeMessage>(trimmed) {
                            Ok(message) => {
                                debug!(message_type = message.kind(), "Parsed Claude message");
                                summary.observe(&message);
                                if let Err(e) = handler.on_message(&message).await {
                                    warn!(error = %e, "Handler error processing message");
                                }
                            }
                            Err(e) => {
                                let preview: String = trimmed.chars().take(200).collect();
                                warn!(error = %e, preview = %preview, "Failed to parse Claude message");
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Error reading Claude stdout");
                        break;
                    }
                }
            }
            summary
        });

        let status = child.wait().await?;
        let exit_code = status.code().unwrap_or(-1);
        info!(exit_code = exit_code, success = status.success(), "Claude process exited");

        let mut summary = stdout_task
            .await
            .map_err(|e| SdkError::ProtocolError(format!("stdout reader failed: {}", e)))?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let detail = if stderr_tail.is_empty() {
                String::new()
            } else {
                format!(": {}", stderr_tail)
            };
            return Err(SdkError::ProcessError(format!(
                "Claude exited with code {}{}",
                exit_code, detail
            )));
        }

        if summary.duration_ms == 0 {
            summary.duration_ms = started.elapsed().as_millis() as u64;
        }
        Ok(summary)
    }
}

impl Default for ClaudeExecutor {
    fn default() -> Self {
        Self::new("claude")
    }
}
