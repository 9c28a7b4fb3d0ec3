//! Bank balance group chat demo
//!
//! A planner agent breaks a customer request into subtasks and three
//! specialist agents resolve them with tools: one looks up the account ID,
//! the other two fetch the saving and investment balances. A model-driven
//! selector reads the transcript and picks each speaker.
//!
//! Requires OPENAI_API_KEY. Run with: cargo run --bin bank_balance

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use futures::StreamExt;

use conclave::{
    max_messages, text_mention, ChatAgent, ChatEvent, ChatMessage, FunctionTool, GroupChat,
    GroupChatConfig, MessageKind, ModelClient, ModelSelector, OpenAIClient, TerminationPolicyExt,
    Tool,
};

const ACCOUNT_ID: &str = "ACC-449127";
const SAVING_BALANCE: f64 = 2450.75;
const INVESTMENT_BALANCE: f64 = 8321.25;

const SELECTOR_PROMPT: &str = "Select an agent to perform task.

{roles}

Current conversation context:
{history}

Read the above conversation, then select an agent from {participants} to perform the next task.
Make sure the planner agent has assigned tasks before other agents start working.
Only select one agent.
";

const PLANNER_INSTRUCTIONS: &str = "You are a bank assistant.
Your job is to break down complex tasks into smaller, manageable subtasks.

Your team members are:
    account_agent: provides the account ID
    saving_account_agent: provides the saving account balance
    investment_agent: provides the investment account balance

You only plan and delegate tasks; you do not execute them yourself.

When assigning tasks, use this format:
<agent> : <task>

After all tasks are complete, provide your response as JSON:
{
    \"account_id\": \"<account id>\",
    \"saving_balance\": <saving balance>,
    \"investment_balance\": <investment balance>,
    \"total_balance\": <total balance>
}

Then end with \"TERMINATE\".
";

#[derive(Debug, Deserialize, JsonSchema)]
struct BalanceParams {
    /// Account ID returned by get_bank_account_id.
    account_id: String,
}

fn account_id_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        "get_bank_account_id",
        "Look up the customer's bank account ID",
        json!({"type": "object", "properties": {}}),
        |_args| Ok(json!({ "account_id": ACCOUNT_ID })),
    ))
}

fn saving_balance_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::typed(
        "get_saving_account_balance",
        "Fetch the saving account balance for an account ID",
        |params: BalanceParams| {
            let balance = if params.account_id == ACCOUNT_ID {
                SAVING_BALANCE
            } else {
                0.0
            };
            Ok(json!({ "account_id": params.account_id, "saving_balance": balance }))
        },
    ))
}

fn investment_balance_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::typed(
        "get_investment_account_balance",
        "Fetch the investment account balance for an account ID",
        |params: BalanceParams| {
            let balance = if params.account_id == ACCOUNT_ID {
                INVESTMENT_BALANCE
            } else {
                0.0
            };
            Ok(json!({ "account_id": params.account_id, "investment_balance": balance }))
        },
    ))
}

fn build_roster() -> Vec<ChatAgent> {
    let planner = ChatAgent::new(
        "customer_agent",
        "A bank assistant that plans and delegates tasks.",
        PLANNER_INSTRUCTIONS,
    );

    let account = ChatAgent::new(
        "account_agent",
        "Provides the bank account ID.",
        "You are an account agent who can provide the bank account ID. \
         Always use the provided tool to look it up.",
    )
    .with_tool(account_id_tool());

    let saving = ChatAgent::new(
        "saving_account_agent",
        "Provides the saving account balance.",
        "You are a saving account agent who can report the saving account balance. \
         The account ID is in the chat history. \
         Always use the provided tool to fetch the balance.",
    )
    .with_tool(saving_balance_tool());

    let investment = ChatAgent::new(
        "investment_agent",
        "Provides the investment account balance.",
        "You are an investment agent who can report the investment account balance. \
         The account ID is in the chat history. \
         Always use the provided tool to fetch the balance.",
    )
    .with_tool(investment_balance_tool());

    vec![planner, account, saving, investment]
}

fn render(message: &ChatMessage) {
    println!("---------- {} ----------", message.speaker);
    match message.kind {
        MessageKind::Text => println!("{}\n", message.content),
        MessageKind::ToolCall => {
            for call in message.tool_calls.iter().flatten() {
                println!("[tool call] {}({})", call.name, call.arguments);
            }
            println!();
        }
        MessageKind::ToolResult => {
            if message.is_error() {
                println!("[tool error] {}\n", message.content);
            } else {
                println!("[tool result] {}\n", message.content);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();

    let model: Arc<dyn ModelClient> = Arc::new(OpenAIClient::new("gpt-4o-mini"));

    let selector = ModelSelector::new(model.clone()).with_prompt(SELECTOR_PROMPT);
    let termination = text_mention("TERMINATE").or(max_messages(25));
    let config = GroupChatConfig::new().with_allow_repeated_speaker(true);

    let chat = GroupChat::new(build_roster(), model, selector, termination).with_config(config);

    let mut events = chat.run_stream(
        "Get the account ID and then get the saving balance and investment balance. \
         Both saving and investment accounts have the same account ID. \
         Sum the balances when they are available.",
    );

    while let Some(event) = events.next().await {
        match event {
            ChatEvent::RunStarted { .. } => {
                println!("=== Bank balance group chat ===\n");
            }
            ChatEvent::MessageAppended { message } => render(&message),
            ChatEvent::RunEnded { result } => {
                println!("==========================");
                println!("finished: {:?}", result.reason);
                println!(
                    "usage: {} prompt + {} completion tokens over {} requests",
                    result.usage.prompt_tokens,
                    result.usage.completion_tokens,
                    result.usage.request_count
                );
            }
            ChatEvent::Error { message } => {
                eprintln!("run failed: {}", message);
            }
        }
    }

    Ok(())
}
