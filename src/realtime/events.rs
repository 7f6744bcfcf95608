//! Realtime session wire events

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Session settings sent on open
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfig {
    pub instructions: String,
    pub modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub tools: Vec<Value>,
    pub tool_choice: String,
}

impl SessionConfig {
    /// Text and audio session with automatic tool choice
    #[must_use]
    pub fn new(instructions: String, tools: Vec<Value>) -> Self {
        Self {
            instructions,
            modalities: vec!["text".to_string(), "audio".to_string()],
            voice: None,
            input_audio_format: "pcm16".to_string(),
            output_audio_format: "pcm16".to_string(),
            tools,
            tool_choice: "auto".to_string(),
        }
    }
}

/// Conversation item created by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    FunctionCallOutput { call_id: String, output: String },
}

/// Events sent to the server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "response.create")]
    ResponseCreate,

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
}

impl ClientEvent {
    /// Function call output for `call_id`
    #[must_use]
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }

    /// Wire name of the event
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::ResponseCreate => "response.create",
            Self::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            Self::ConversationItemCreate { .. } => "conversation.item.create",
        }
    }

    /// Serialize to wire JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Status block of a finished response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponseStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_details: Option<Value>,
}

impl ResponseStatus {
    /// Error message when the response failed
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        if self.status != "failed" {
            return None;
        }
        let message = self
            .status_details
            .as_ref()
            .and_then(|d| d.pointer("/error/message"))
            .and_then(Value::as_str)
            .unwrap_or("response failed");
        Some(message.to_string())
    }
}

/// Error payload of an `error` event
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// Item acknowledged by `conversation.item.created`
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct CreatedItem {
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub call_id: Option<String>,
}

/// Events received from the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },

    #[serde(rename = "response.audio.done")]
    AudioDone,

    #[serde(rename = "response.text.delta")]
    TextDelta { delta: String },

    #[serde(rename = "response.text.done")]
    TextDone {
        #[serde(default)]
        text: String,
    },

    #[serde(rename = "response.audio_transcript.delta")]
    TranscriptDelta { delta: String },

    #[serde(rename = "response.audio_transcript.done")]
    TranscriptDone {
        #[serde(default)]
        transcript: String,
    },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },

    #[serde(rename = "response.done")]
    ResponseDone { response: ResponseStatus },

    #[serde(rename = "error")]
    Error { error: ErrorDetail },

    #[serde(rename = "conversation.item.created")]
    ItemCreated {
        #[serde(default)]
        item: CreatedItem,
    },

    /// Any event this client does not act on
    #[serde(skip)]
    Other { event_type: String },
}

const HANDLED_EVENTS: [&str; 10] = [
    "response.audio.delta",
    "response.audio.done",
    "response.text.delta",
    "response.text.done",
    "response.audio_transcript.delta",
    "response.audio_transcript.done",
    "response.function_call_arguments.done",
    "response.done",
    "error",
    "conversation.item.created",
];

impl ServerEvent {
    /// Parse one wire message
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` if the text is not JSON, has no `type`, or a
    /// handled event is missing required fields
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("event is not JSON: {e}")))?;

        let event_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("event has no type".to_string()))?
            .to_string();

        if !HANDLED_EVENTS.contains(&event_type.as_str()) {
            return Ok(Self::Other { event_type });
        }

        serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("malformed {event_type} event: {e}")))
    }
}
