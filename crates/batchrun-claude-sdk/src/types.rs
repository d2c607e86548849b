//! Type definitions for Claude Code `stream-json` output messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level message from Claude Code CLI stdout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeMessage {
    /// System initialization message.
    System {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        cwd: Option<String>,
    },

    /// Assistant response message.
    Assistant {
        message: AssistantMessage,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// User message (tool results echoed back to the model).
    User {
        message: UserMessage,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Execution result, always the last message of a run.
    Result {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default, alias = "isError")]
        is_error: Option<bool>,
        #[serde(default, alias = "durationMs")]
        duration_ms: Option<u64>,
        #[serde(default, alias = "numTurns")]
        num_turns: Option<u32>,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default, alias = "sessionId")]
        session_id: Option<String>,
    },

    /// Unknown message type (fallback).
    #[serde(untagged)]
    Unknown(Value),
}

impl ClaudeMessage {
    /// Extract session ID from any message type.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::System { session_id, .. } => session_id.as_deref(),
            Self::Assistant { session_id, .. } => session_id.as_deref(),
            Self::User { session_id, .. } => session_id.as_deref(),
            Self::Result { session_id, .. } => session_id.as_deref(),
            Self::Unknown(_) => None,
        }
    }

    /// Short type name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::System { .. } => "System",
            Self::Assistant { .. } => "Assistant",
            Self::User { .. } => "User",
            Self::Result { .. } => "Result",
            Self::Unknown(_) => "Unknown",
        }
    }
}

/// Assistant message content.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// User message content.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserMessage {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentItem>,
}

/// Content item in a message.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    /// Text content.
    Text { text: String },

    /// Thinking/reasoning content.
    Thinking { thinking: String },

    /// Tool use request.
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },

    /// Tool result.
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: Option<bool>,
    },

    /// Any other block type (images, documents, ...).
    #[serde(other)]
    Other,
}

/// Permission mode for Claude Code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Default mode - asks for permission.
    #[default]
    Default,
    /// Accept file edits automatically.
    AcceptEdits,
    /// Plan mode - requires approval to exit.
    Plan,
    /// Bypass all permissions (dangerous).
    BypassPermissions,
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::AcceptEdits => write!(f, "acceptEdits"),
            Self::Plan => write!(f, "plan"),
            Self::BypassPermissions => write!(f, "bypassPermissions"),
        }
    }
}

impl std::str::FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "acceptEdits" => Ok(Self::AcceptEdits),
            "plan" => Ok(Self::Plan),
            "bypassPermissions" => Ok(Self::BypassPermissions),
            other => Err(format!("unknown permission mode '{}'", other)),
        }
    }
}
