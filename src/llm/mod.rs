//! Language model interfaces for the turn-based tool loop

mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiChat;

use crate::Result;
use crate::tools::ToolSpec;

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions
    System,
    /// The speaker or the editor context
    User,
    /// The model
    Assistant,
    /// A tool result
    Tool,
}

/// A model-issued request to invoke a named tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id assigned by the model
    pub id: String,
    /// Tool name
    pub name: String,
    /// Raw JSON argument text
    pub arguments: String,
}

impl ToolCall {
    /// Create a tool call
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One entry in the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Author
    pub role: Role,
    /// Message text
    pub text: String,
    /// Tool call this message answers (tool role only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Calls requested in this message (assistant role only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ConversationMessage {
    /// System message
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text)
    }

    /// User message
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text)
    }

    /// Assistant message, optionally carrying tool calls
    #[must_use]
    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            tool_call_id: None,
            tool_calls,
        }
    }

    /// Tool result for `call_id`
    #[must_use]
    pub fn tool(call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            text: text.into(),
            tool_call_id: Some(call_id.into()),
            tool_calls: Vec::new(),
        }
    }

    fn plain(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }
}

/// The model's answer to one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelTurn {
    /// Assistant text, if any
    pub text: Option<String>,
    /// Requested tool calls, in order
    pub tool_calls: Vec<ToolCall>,
}

impl ModelTurn {
    /// A text-only answer
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// An answer that only calls tools
    #[must_use]
    pub const fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls,
        }
    }
}

/// One-shot tool-calling completion
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the full history plus the tool catalog and return the next turn
    ///
    /// # Errors
    ///
    /// Returns `Error::Llm` if the request fails
    async fn complete(
        &self,
        messages: &[ConversationMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelTurn>;
}
