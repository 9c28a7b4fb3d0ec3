//! # conclave
//!
//! A multi-agent group chat engine. A roster of agents shares one transcript;
//! a selector decides who speaks next, agents call tools mid-turn, and
//! composable termination policies decide when the conversation is over.
//!
//! ## Features
//!
//! - **Selector-driven turns**: round-robin out of the box, or let a model
//!   read the transcript and pick the next speaker
//! - **Tool calling**: agents resolve tool calls within their turn, with a
//!   configurable depth bound
//! - **Composable termination**: combine text-mention and message-count
//!   policies with `or`/`and`
//! - **Streaming events**: observe every message as it is appended
//! - **Cancellation and timeouts**: cooperative cancellation between turns,
//!   per-call bounds on selection, generation, and tools
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use conclave::{
//!     max_messages, text_mention, ChatAgent, GroupChat, ModelSelector, OpenAIClient,
//!     TerminationPolicyExt,
//! };
//!
//! #[tokio::main]
//! async fn main() -> conclave::Result<()> {
//!     let model = Arc::new(OpenAIClient::new("gpt-4o"));
//!
//!     let roster = vec![
//!         ChatAgent::new("poet", "Writes poems", "You are a poet. Say DONE when finished."),
//!         ChatAgent::new("critic", "Reviews poems", "You critique poems in one sentence."),
//!     ];
//!
//!     let selector = ModelSelector::new(model.clone());
//!     let termination = text_mention("DONE").or(max_messages(10));
//!
//!     let mut chat = GroupChat::new(roster, model, selector, termination);
//!     let result = chat.run("Write a haiku about autumn").await?;
//!
//!     for message in result.transcript.messages() {
//!         println!("[{}] {}", message.speaker, message.content);
//!     }
//!     println!("ended: {:?}", result.reason);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod engine;
pub mod error;
pub mod events;
pub mod message;
pub mod model;
pub mod result;
pub mod selector;
pub mod termination;
pub mod tool;
pub mod transcript;
pub mod usage;

pub use agent::ChatAgent;
pub use engine::{GroupChat, GroupChatConfig};
pub use error::{ChatError, Result};
pub use events::ChatEvent;
pub use message::{AgentId, ChatMessage, MessageKind, ToolCall, SYSTEM_SPEAKER};
pub use model::{Completion, ModelClient, OpenAIClient, PromptMessage, Role, ToolSchema};
pub use result::{RunResult, TerminationReason};
pub use selector::{ModelSelector, RoundRobinSelector, Selector, DEFAULT_SELECTOR_PROMPT};
pub use termination::{
    max_messages, text_mention, And, MaxMessages, Or, TerminationPolicy, TerminationPolicyExt,
    TextMention,
};
pub use tool::{FunctionTool, Tool, ToolInvoker};
pub use transcript::Transcript;
pub use usage::Usage;
