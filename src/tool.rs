//! Tools agents can invoke mid-turn
//!
//! A tool is a named function with a JSON Schema for its arguments. The
//! invoker resolves names within one agent's tool set and runs calls to
//! completion, turning unknown names, execution failures, and timeouts into
//! recoverable errors the engine folds into the transcript.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ChatError, Result};
use crate::model::ToolSchema;

/// Trait for invocable tools
#[async_trait]
pub trait Tool: Send + Sync + Debug {
    /// Unique name within one agent's tool set.
    fn name(&self) -> &str;

    /// Short description advertised to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. An Err is a recoverable failure: it becomes an error
    /// payload in the transcript, not an aborted run.
    async fn invoke(&self, arguments: Value) -> Result<Value>;

    /// Schema advertisement for generation calls.
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A tool backed by a plain function.
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
    function: Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>,
}

impl Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

impl FunctionTool {
    /// A tool with an explicit JSON Schema for its arguments.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        function: impl Fn(Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            function: Arc::new(function),
        }
    }

    /// A tool whose argument schema is derived from its parameter type.
    pub fn typed<P, F>(name: impl Into<String>, description: impl Into<String>, function: F) -> Self
    where
        P: JsonSchema + DeserializeOwned,
        F: Fn(P) -> Result<Value> + Send + Sync + 'static,
    {
        let parameters =
            serde_json::to_value(schemars::schema_for!(P)).unwrap_or(Value::Null);
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            function: Arc::new(move |args: Value| {
                let params: P = serde_json::from_value(args)?;
                function(params)
            }),
        }
    }

    /// A tool taking a single free-form string argument named `input`.
    pub fn simple<F>(name: impl Into<String>, description: impl Into<String>, function: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        Self::new(
            name,
            description,
            serde_json::json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" }
                },
                "required": ["input"]
            }),
            move |args: Value| {
                let input = args
                    .get("input")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                Ok(Value::String(function(input)))
            },
        )
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn invoke(&self, arguments: Value) -> Result<Value> {
        (self.function)(arguments)
    }
}

/// Resolves tool names within one agent's tool set and runs invocations.
pub struct ToolInvoker {
    tools: Vec<Arc<dyn Tool>>,
    timeout: Option<Duration>,
}

impl ToolInvoker {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            tools,
            timeout: None,
        }
    }

    /// Bound each invocation; elapsing counts as a tool failure.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Schemas of every tool in the set, in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run one named invocation to completion. Unknown names, execution
    /// failures, and timeouts all come back as Err for the caller to fold
    /// into the transcript as an error payload.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value> {
        let tool = match self.tools.iter().find(|t| t.name() == name) {
            Some(tool) => tool,
            None => {
                return Err(ChatError::ToolExecution {
                    message: format!("unknown tool: {}", name),
                })
            }
        };

        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, tool.invoke(arguments)).await {
                Ok(result) => result,
                Err(_) => Err(ChatError::ToolExecution {
                    message: format!("tool {} timed out after {:?}", name, limit),
                }),
            },
            None => tool.invoke(arguments).await,
        }
    }
}
