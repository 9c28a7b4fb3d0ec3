//! Run outcome types

use serde::{Deserialize, Serialize};

use crate::message::MessageKind;
use crate::transcript::Transcript;
use crate::usage::Usage;

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminationReason {
    /// A message contained the configured marker substring.
    TextMention { marker: String },

    /// The transcript reached the configured length, seed included.
    MaxMessages { limit: usize },

    /// The run was cancelled externally.
    Cancelled,
}

/// Outcome of one group chat run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    /// Everything said, in append order.
    pub transcript: Transcript,

    /// Which policy stopped the run, or Cancelled.
    pub reason: TerminationReason,

    /// Token usage summed across the run's agent turns.
    pub usage: Usage,
}

impl RunResult {
    /// Content of the last text message, if any.
    pub fn final_text(&self) -> Option<&str> {
        self.transcript
            .messages()
            .iter()
            .rev()
            .find(|m| m.kind == MessageKind::Text)
            .map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChatMessage, SYSTEM_SPEAKER};

    #[test]
    fn test_final_text_skips_tool_traffic() {
        let mut transcript = Transcript::new();
        transcript.append(ChatMessage::text(SYSTEM_SPEAKER, "task"));
        transcript.append(ChatMessage::text("alice", "summary TERMINATE"));
        transcript.append(ChatMessage::tool_result("alice", "call_1", "late result"));

        let result = RunResult {
            transcript,
            reason: TerminationReason::TextMention {
                marker: "TERMINATE".to_string(),
            },
            usage: Usage::empty(),
        };

        assert_eq!(result.final_text(), Some("summary TERMINATE"));
    }

    #[test]
    fn test_reason_serialization_tag() {
        let reason = TerminationReason::MaxMessages { limit: 25 };
        let json = serde_json::to_string(&reason).unwrap();
        assert!(json.contains("\"type\":\"max_messages\""));

        let back: TerminationReason = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reason);
    }
}
