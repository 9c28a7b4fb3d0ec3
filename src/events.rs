//! Events streamed to observers
//!
//! One event per appended message, bracketed by RunStarted and RunEnded.
//! Ordering matches the transcript; nothing is dropped or reordered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;
use crate::result::RunResult;

/// Events emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The transcript was seeded and the loop is about to start.
    RunStarted {
        task: String,
        started_at: DateTime<Utc>,
    },

    /// A message was appended to the transcript.
    MessageAppended { message: ChatMessage },

    /// The run finished, normally or by cancellation. Carries the full
    /// result.
    RunEnded { result: RunResult },

    /// The run aborted with an error. Terminal; no RunEnded follows.
    Error { message: String },
}
