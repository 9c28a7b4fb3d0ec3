//! Generation capability
//!
//! The narrow interface between the engine and a language model, plus the
//! OpenAI-backed implementation over async-openai and a scripted client for
//! tests. Context messages are the per-agent view of the transcript, not the
//! transcript itself.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolArgs,
        ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChatError, Result};
use crate::message::ToolCall;
use crate::usage::Usage;

/// Chat role of a context message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in the context window sent to a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,

    /// Speaker attribution for user-role messages in a multi-party chat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// For tool-role messages, the call being answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// For assistant-role messages that request invocations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl PromptMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create a user message attributed to a named speaker
    pub fn user_named(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: Some(name.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create an assistant message that requests tool invocations
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        }
    }

    /// Create a tool result message answering `tool_call_id`
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            name: None,
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }
}

/// What a generation call produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Completion {
    /// Text content, if any.
    pub content: Option<String>,

    /// Requested tool invocations, empty when none.
    pub tool_calls: Vec<ToolCall>,

    /// Provider finish reason, if reported.
    pub finish_reason: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Completion {
    /// A text-only completion.
    pub fn message(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
            finish_reason: Some("stop".to_string()),
            created_at: Utc::now(),
        }
    }

    /// A completion requesting tool invocations.
    pub fn with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
            finish_reason: Some("tool_calls".to_string()),
            created_at: Utc::now(),
        }
    }

    /// A completion carrying neither text nor tool calls.
    pub fn empty() -> Self {
        Self {
            content: None,
            tool_calls: vec![],
            finish_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn has_content(&self) -> bool {
        self.content.as_ref().map(|c| !c.is_empty()).unwrap_or(false)
    }
}

/// Schema advertisement for one tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object.
    pub parameters: Value,
}

/// Trait for text-generation clients
///
/// Implementations must be safe for concurrent use by multiple runs: no
/// per-run state behind the shared reference.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Generate one completion for the given context, optionally advertising
    /// invocable tools.
    async fn complete(
        &self,
        messages: Vec<PromptMessage>,
        tools: &[ToolSchema],
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<(Completion, Usage)>;

    /// Model name, used for logging.
    fn model_name(&self) -> &str;
}

/// OpenAI-backed client over async-openai
pub struct OpenAIClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIClient {
    /// Client for `model`, reading OPENAI_API_KEY from the environment.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
        }
    }

    /// Client with a custom underlying configuration.
    pub fn with_client(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Convert a context message to the request format
    fn convert_message(&self, msg: &PromptMessage) -> Result<ChatCompletionRequestMessage> {
        let converted = match msg.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content.clone())
                .build()?
                .into(),
            Role::User => {
                let mut builder = ChatCompletionRequestUserMessageArgs::default();
                builder.content(msg.content.clone());
                if let Some(name) = &msg.name {
                    builder.name(name.clone());
                }
                builder.build()?.into()
            }
            Role::Assistant => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                builder.content(msg.content.clone());
                if let Some(tool_calls) = &msg.tool_calls {
                    let calls: Vec<_> = tool_calls
                        .iter()
                        .map(|tc| async_openai::types::ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: async_openai::types::FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.to_string(),
                            },
                        })
                        .collect();
                    builder.tool_calls(calls);
                }
                builder.build()?.into()
            }
            Role::Tool => ChatCompletionRequestToolMessageArgs::default()
                .content(msg.content.clone())
                .tool_call_id(msg.tool_call_id.clone().unwrap_or_default())
                .build()?
                .into(),
        };
        Ok(converted)
    }

    /// Convert tool schemas to the request format
    fn convert_tools(&self, tools: &[ToolSchema]) -> Result<Vec<ChatCompletionTool>> {
        tools
            .iter()
            .map(|tool| -> Result<ChatCompletionTool> {
                Ok(ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(
                        FunctionObjectArgs::default()
                            .name(&tool.name)
                            .description(&tool.description)
                            .parameters(tool.parameters.clone())
                            .build()?,
                    )
                    .build()?)
            })
            .collect()
    }
}

#[async_trait]
impl ModelClient for OpenAIClient {
    async fn complete(
        &self,
        messages: Vec<PromptMessage>,
        tools: &[ToolSchema],
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<(Completion, Usage)> {
        let request_messages = messages
            .iter()
            .map(|msg| self.convert_message(msg))
            .collect::<Result<Vec<_>>>()?;

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(&self.model).messages(request_messages);

        if !tools.is_empty() {
            request.tools(self.convert_tools(tools)?);
        }
        if let Some(temp) = temperature {
            request.temperature(temp);
        }
        if let Some(max) = max_tokens {
            request.max_tokens(max);
        }

        let response = self.client.chat().create(request.build()?).await?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| ChatError::Generation {
                message: "no choices in response".to_string(),
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .as_ref()
            .map(|calls| {
                calls
                    .iter()
                    .map(|tc| ToolCall {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments: serde_json::from_str(&tc.function.arguments)
                            .unwrap_or(Value::Null),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let completion = Completion {
            content: choice.message.content.clone(),
            tool_calls,
            finish_reason: choice.finish_reason.as_ref().map(|r| format!("{:?}", r)),
            created_at: Utc::now(),
        };

        let usage = response
            .usage
            .map(|u| Usage::new(u.prompt_tokens as usize, u.completion_tokens as usize))
            .unwrap_or_else(Usage::empty);

        Ok((completion, usage))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Scripted client for tests: pops canned completions in order, falling back
/// to a default text response once the script runs out.
#[cfg(test)]
pub struct MockClient {
    model: String,
    responses: std::sync::Mutex<Vec<Completion>>,
}

#[cfg(test)]
impl MockClient {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: std::sync::Mutex::new(vec![]),
        }
    }

    pub fn with_completion(self, completion: Completion) -> Self {
        self.responses.lock().unwrap().push(completion);
        self
    }

    pub fn with_message(self, content: impl Into<String>) -> Self {
        self.with_completion(Completion::message(content))
    }

    pub fn with_tool_call(self, tool_name: impl Into<String>, args: Value) -> Self {
        let call = ToolCall {
            id: uuid::Uuid::new_v4().to_string(),
            name: tool_name.into(),
            arguments: args,
        };
        self.with_completion(Completion::with_tool_calls(vec![call]))
    }
}

#[cfg(test)]
#[async_trait]
impl ModelClient for MockClient {
    async fn complete(
        &self,
        _messages: Vec<PromptMessage>,
        _tools: &[ToolSchema],
        _temperature: Option<f32>,
        _max_tokens: Option<u32>,
    ) -> Result<(Completion, Usage)> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok((Completion::message("Default response"), Usage::new(10, 5)));
        }
        Ok((responses.remove(0), Usage::new(10, 5)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
