//! Claude Code SDK for BatchRun
//!
//! This crate runs Claude Code agents as one-shot subprocesses and parses
//! their `stream-json` output into typed messages.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use batchrun_claude_sdk::{ClaudeExecutor, PermissionMode, TracingHandler};
//!
//! async fn run_agent() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = ClaudeExecutor::new("claude")
//!         .with_permission_mode(PermissionMode::BypassPermissions);
//!
//!     let result = executor
//!         .execute(Path::new("."), "What is 2 + 2?", Arc::new(TracingHandler::default()))
//!         .await?;
//!
//!     println!("Session ID: {:?}", result.session_id);
//!     Ok(())
//! }
//! ```

mod error;
mod executor;
mod handler;
mod types;

// Re-export main types
pub use error::SdkError;
pub use executor::{ClaudeExecutor, ExecutionResult};
pub use handler::{MessageHandler, TracingHandler};
pub use types::{AssistantMessage, ClaudeMessage, ContentItem, PermissionMode, UserMessage};
