//! Agents and the turn loop
//!
//! An agent is a roster entry: an id the selector can pick, a description it
//! is advertised with, system instructions, and a tool set. Its turn runs the
//! generate, invoke tools, re-generate loop until a text-only completion,
//! bounded by the configured tool depth.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::GroupChatConfig;
use crate::error::{ChatError, Result};
use crate::message::{AgentId, ChatMessage, MessageKind};
use crate::model::{ModelClient, PromptMessage};
use crate::tool::{Tool, ToolInvoker};
use crate::transcript::Transcript;
use crate::usage::Usage;

/// One roster participant.
#[derive(Debug, Clone)]
pub struct ChatAgent {
    id: AgentId,
    description: String,
    instructions: String,
    tools: Vec<Arc<dyn Tool>>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl ChatAgent {
    /// An agent with no tools.
    pub fn new(
        id: impl Into<AgentId>,
        description: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            instructions: instructions.into(),
            tools: vec![],
            temperature: None,
            max_tokens: None,
        }
    }

    /// Add a tool to the agent's tool set.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Add several tools at once.
    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Sampling temperature for this agent's generation calls.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Completion token cap for this agent's generation calls.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// Run one turn. The full transcript is the context; requested tools run
    /// one at a time in the order requested; the turn ends with the first
    /// text-only completion. `pending` carries the turn's own messages so
    /// later generation calls within the turn see them.
    pub(crate) async fn step(
        &self,
        transcript: &Transcript,
        model: &Arc<dyn ModelClient>,
        config: &GroupChatConfig,
    ) -> Result<TurnOutput> {
        let invoker = ToolInvoker::new(self.tools.clone()).with_timeout(config.tool_timeout);
        let schemas = invoker.schemas();
        let mut pending: Vec<ChatMessage> = Vec::new();
        let mut usage = Usage::empty();
        let mut depth = 0usize;

        loop {
            let context = self.render_context(transcript, &pending);
            let completion_call =
                model.complete(context, &schemas, self.temperature, self.max_tokens);
            let (completion, call_usage) = match config.generation_timeout {
                Some(limit) => match tokio::time::timeout(limit, completion_call).await {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(ChatError::Timeout {
                            operation: format!("generation for agent {}", self.id),
                            seconds: limit.as_secs(),
                        })
                    }
                },
                None => completion_call.await?,
            };
            usage.add(&call_usage);

            if completion.has_tool_calls() {
                depth += 1;
                if depth > config.max_tool_depth {
                    return Err(ChatError::ToolLoop {
                        max_depth: config.max_tool_depth,
                    });
                }

                let text = completion.content.clone().unwrap_or_default();
                let calls = completion.tool_calls;
                debug!(agent = %self.id, calls = calls.len(), depth, "executing tool calls");
                pending.push(ChatMessage::tool_calls(&self.id, text, calls.clone()));

                for call in &calls {
                    match invoker.invoke(&call.name, call.arguments.clone()).await {
                        Ok(value) => {
                            let content = match value {
                                Value::String(s) => s,
                                other => other.to_string(),
                            };
                            pending.push(ChatMessage::tool_result(&self.id, &call.id, content));
                        }
                        Err(e) => {
                            warn!(agent = %self.id, tool = %call.name, error = %e, "tool invocation failed");
                            pending.push(ChatMessage::tool_error(&self.id, &call.id, e.to_string()));
                        }
                    }
                }
                continue;
            }

            if completion.has_content() {
                pending.push(ChatMessage::text(
                    &self.id,
                    completion.content.unwrap_or_default(),
                ));
            }
            break;
        }

        Ok(TurnOutput {
            messages: pending,
            usage,
        })
    }

    /// The transcript as this agent's context window: own messages as
    /// assistant and tool entries, everyone else's as named user entries.
    /// Other agents' empty tool-call shells are skipped.
    fn render_context(&self, transcript: &Transcript, pending: &[ChatMessage]) -> Vec<PromptMessage> {
        let mut context = vec![PromptMessage::system(&self.instructions)];
        for message in transcript.iter().chain(pending.iter()) {
            let own = message.speaker == self.id;
            match message.kind {
                MessageKind::Text => {
                    if own {
                        context.push(PromptMessage::assistant(&message.content));
                    } else {
                        context.push(PromptMessage::user_named(&message.speaker, &message.content));
                    }
                }
                MessageKind::ToolCall => {
                    if own {
                        context.push(PromptMessage::assistant_with_tool_calls(
                            &message.content,
                            message.tool_calls.clone().unwrap_or_default(),
                        ));
                    } else if !message.content.is_empty() {
                        context.push(PromptMessage::user_named(&message.speaker, &message.content));
                    }
                }
                MessageKind::ToolResult => {
                    if own {
                        context.push(PromptMessage::tool(
                            &message.content,
                            message.tool_call_id.clone().unwrap_or_default(),
                        ));
                    } else {
                        context.push(PromptMessage::user_named(&message.speaker, &message.content));
                    }
                }
            }
        }
        context
    }
}

/// Everything one turn produced.
#[derive(Debug)]
pub(crate) struct TurnOutput {
    pub messages: Vec<ChatMessage>,
    pub usage: Usage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SYSTEM_SPEAKER;
    use crate::model::{MockClient, Role};
    use crate::tool::FunctionTool;
    use serde_json::json;

    fn seeded() -> Transcript {
        let mut transcript = Transcript::new();
        transcript.append(ChatMessage::text(SYSTEM_SPEAKER, "look up the balance"));
        transcript
    }

    fn echo_tool() -> Arc<FunctionTool> {
        Arc::new(FunctionTool::simple("echo", "Echo the input", |s| s))
    }

    #[test]
    fn test_builder_accessors() {
        let agent = ChatAgent::new("worker", "Does the work", "You work.")
            .with_tool(echo_tool())
            .with_temperature(0.2)
            .with_max_tokens(256);

        assert_eq!(agent.id(), "worker");
        assert_eq!(agent.description(), "Does the work");
        assert_eq!(agent.instructions(), "You work.");
        assert_eq!(agent.tools().len(), 1);
    }

    #[tokio::test]
    async fn test_text_only_turn_yields_one_message() {
        let agent = ChatAgent::new("worker", "Worker", "You work.");
        let model: Arc<dyn ModelClient> = Arc::new(MockClient::new().with_message("All done"));
        let config = GroupChatConfig::default();

        let turn = agent.step(&seeded(), &model, &config).await.unwrap();
        assert_eq!(turn.messages.len(), 1);
        assert_eq!(turn.messages[0].kind, MessageKind::Text);
        assert_eq!(turn.messages[0].content, "All done");
        assert_eq!(turn.usage.request_count, 1);
    }

    #[tokio::test]
    async fn test_tool_turn_yields_call_result_text() {
        let agent = ChatAgent::new("worker", "Worker", "You work.").with_tool(echo_tool());
        let model: Arc<dyn ModelClient> = Arc::new(
            MockClient::new()
                .with_tool_call("echo", json!({"input": "ping"}))
                .with_message("The tool said ping"),
        );
        let config = GroupChatConfig::default();

        let turn = agent.step(&seeded(), &model, &config).await.unwrap();
        let kinds: Vec<MessageKind> = turn.messages.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![MessageKind::ToolCall, MessageKind::ToolResult, MessageKind::Text]
        );
        assert_eq!(turn.messages[1].content, "ping");
        assert_eq!(turn.usage.request_count, 2);
    }

    #[tokio::test]
    async fn test_tool_failure_becomes_error_payload() {
        let failing = Arc::new(FunctionTool::new(
            "flaky",
            "Always fails",
            json!({"type": "object", "properties": {}}),
            |_args| {
                Err(ChatError::ToolExecution {
                    message: "backend unavailable".to_string(),
                })
            },
        ));
        let agent = ChatAgent::new("worker", "Worker", "You work.").with_tool(failing);
        let model: Arc<dyn ModelClient> = Arc::new(
            MockClient::new()
                .with_tool_call("flaky", json!({}))
                .with_message("Could not fetch it"),
        );
        let config = GroupChatConfig::default();

        let turn = agent.step(&seeded(), &model, &config).await.unwrap();
        let result = &turn.messages[1];
        assert_eq!(result.kind, MessageKind::ToolResult);
        assert!(result.is_error());
        assert!(result.content.starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_tool_loop_depth_is_bounded() {
        let agent = ChatAgent::new("worker", "Worker", "You work.").with_tool(echo_tool());
        let model: Arc<dyn ModelClient> = Arc::new(
            MockClient::new()
                .with_tool_call("echo", json!({"input": "1"}))
                .with_tool_call("echo", json!({"input": "2"}))
                .with_tool_call("echo", json!({"input": "3"})),
        );
        let config = GroupChatConfig::default().with_max_tool_depth(2);

        let err = agent.step(&seeded(), &model, &config).await.unwrap_err();
        assert!(matches!(err, ChatError::ToolLoop { max_depth: 2 }));
    }

    #[tokio::test]
    async fn test_empty_completion_yields_empty_turn() {
        let agent = ChatAgent::new("worker", "Worker", "You work.");
        let model: Arc<dyn ModelClient> =
            Arc::new(MockClient::new().with_completion(crate::model::Completion::empty()));
        let config = GroupChatConfig::default();

        let turn = agent.step(&seeded(), &model, &config).await.unwrap();
        assert!(turn.messages.is_empty());
    }

    #[test]
    fn test_context_view_separates_speakers() {
        let agent = ChatAgent::new("worker", "Worker", "You work.");
        let mut transcript = seeded();
        transcript.append(ChatMessage::text("planner", "worker : fetch the id"));
        transcript.append(ChatMessage::text("worker", "On it"));

        let context = agent.render_context(&transcript, &[]);
        assert_eq!(context.len(), 4);
        assert_eq!(context[0].role, Role::System);
        assert_eq!(context[1].name.as_deref(), Some(SYSTEM_SPEAKER));
        assert_eq!(context[2].role, Role::User);
        assert_eq!(context[2].name.as_deref(), Some("planner"));
        assert_eq!(context[3].role, Role::Assistant);
    }
}
