//! Append-only transcript
//!
//! The transcript is the single shared state of a run. It only ever grows:
//! sequence numbers are assigned on append, starting at 1 for the seed task
//! message, strictly increasing with no gaps.

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;

/// Ordered, append-only message history of one chat run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    /// An empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, assigning the next sequence number. Returns the
    /// message as stored.
    pub fn append(&mut self, mut message: ChatMessage) -> ChatMessage {
        message.sequence = self.messages.len() as u64 + 1;
        let stored = message.clone();
        self.messages.push(message);
        stored
    }

    /// All messages in append order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages, seed included.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recently appended message.
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Iterate in append order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SYSTEM_SPEAKER;

    #[test]
    fn test_sequences_start_at_one_with_no_gaps() {
        let mut transcript = Transcript::new();
        transcript.append(ChatMessage::text(SYSTEM_SPEAKER, "task"));
        transcript.append(ChatMessage::text("alice", "first"));
        transcript.append(ChatMessage::text("bob", "second"));

        let sequences: Vec<u64> = transcript.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn test_append_returns_stored_message() {
        let mut transcript = Transcript::new();
        let stored = transcript.append(ChatMessage::text("alice", "hello"));
        assert_eq!(stored.sequence, 1);
        assert_eq!(transcript.last().map(|m| m.sequence), Some(1));
        assert_eq!(transcript.last().map(|m| m.content.as_str()), Some("hello"));
    }

    #[test]
    fn test_empty_transcript() {
        let transcript = Transcript::new();
        assert!(transcript.is_empty());
        assert_eq!(transcript.len(), 0);
        assert!(transcript.last().is_none());
    }
}
