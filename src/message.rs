//! Transcript message types
//!
//! A chat run produces an append-only sequence of messages. Tool traffic is
//! first-class: an agent's turn may contain a tool-call message and one tool
//! result per requested call before its final text message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique name of a roster participant.
pub type AgentId = String;

/// Speaker id carried by the seed task message.
pub const SYSTEM_SPEAKER: &str = "system";

/// What a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain conversational text.
    Text,
    /// A request to invoke one or more tools.
    ToolCall,
    /// The outcome of a single tool invocation.
    ToolResult,
}

/// A single tool invocation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Correlation id, echoed by the matching tool result.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as a JSON value.
    pub arguments: Value,
}

/// One transcript entry. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Globally unique message id.
    pub id: String,

    /// Position in the transcript, assigned on append, starting at 1.
    pub sequence: u64,

    /// Who produced the message.
    pub speaker: AgentId,

    /// Payload discriminant.
    pub kind: MessageKind,

    /// Text content. For tool-call messages this is whatever text the model
    /// emitted alongside the request, often empty; for tool results it is the
    /// result payload or an error description.
    pub content: String,

    /// Requested invocations, present when kind is ToolCall.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Id of the call this message answers, present when kind is ToolResult.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Error payload when a tool invocation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// A plain text message. The sequence number is assigned by the
    /// transcript on append.
    pub fn text(speaker: impl Into<AgentId>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sequence: 0,
            speaker: speaker.into(),
            kind: MessageKind::Text,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// A tool-call request carrying every call of one generation round.
    pub fn tool_calls(
        speaker: impl Into<AgentId>,
        content: impl Into<String>,
        calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sequence: 0,
            speaker: speaker.into(),
            kind: MessageKind::ToolCall,
            content: content.into(),
            tool_calls: Some(calls),
            tool_call_id: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// A successful tool result answering `call_id`.
    pub fn tool_result(
        speaker: impl Into<AgentId>,
        call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sequence: 0,
            speaker: speaker.into(),
            kind: MessageKind::ToolResult,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            error: None,
            created_at: Utc::now(),
        }
    }

    /// A failed tool result. The error payload is also rendered into the
    /// content so the generation capability sees it on the next call.
    pub fn tool_error(
        speaker: impl Into<AgentId>,
        call_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        Self {
            id: Uuid::new_v4().to_string(),
            sequence: 0,
            speaker: speaker.into(),
            kind: MessageKind::ToolResult,
            content: format!("Error: {}", error),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            error: Some(error),
            created_at: Utc::now(),
        }
    }

    /// True for tool results carrying an error payload.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
