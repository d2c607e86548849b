//! Message callbacks for streaming Claude output.

use async_trait::async_trait;
use tracing::debug;

use crate::error::SdkError;
use crate::types::{ClaudeMessage, ContentItem};

/// Receives every message parsed from Claude's stdout, in order.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, message: &ClaudeMessage) -> Result<(), SdkError>;
}

/// Handler that only logs tool activity at debug level.
#[derive(Debug, Default, Clone)]
pub struct TracingHandler {
    label: String,
}

impl TracingHandler {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait]
impl MessageHandler for TracingHandler {
    async fn on_message(&self, message: &ClaudeMessage) -> Result<(), SdkError> {
        if let ClaudeMessage::Assistant { message, .. } = message {
            for item in &message.content {
                if let ContentItem::ToolUse { name, .. } = item {
                    debug!(label = %self.label, tool = %name, "Agent tool use");
                }
            }
        }
        Ok(())
    }
}
