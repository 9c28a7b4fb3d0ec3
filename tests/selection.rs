//! Integration tests for speaker selection through the engine

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use conclave::{
    max_messages, text_mention, AgentId, ChatAgent, ChatError, Completion, GroupChat,
    GroupChatConfig, ModelClient, ModelSelector, PromptMessage, RoundRobinSelector, Selector,
    TerminationPolicyExt, TerminationReason, ToolSchema, Transcript, Usage,
};

/// Serves completions from a fixed script. The last entry repeats once the
/// rest are consumed; an empty script always replies "ok".
#[derive(Debug)]
struct ScriptedClient {
    script: Mutex<Vec<Completion>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn new(script: Vec<Completion>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn complete(
        &self,
        _messages: Vec<PromptMessage>,
        _tools: &[ToolSchema],
        _temperature: Option<f32>,
        _max_tokens: Option<u32>,
    ) -> conclave::Result<(Completion, Usage)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let completion = if script.len() > 1 {
            script.remove(0)
        } else if let Some(last) = script.first() {
            last.clone()
        } else {
            Completion::message("ok")
        };
        Ok((completion, Usage::new(7, 3)))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Always names an agent that is not on the roster.
struct GhostSelector;

#[async_trait]
impl Selector for GhostSelector {
    async fn select_next(
        &mut self,
        _transcript: &Transcript,
        _roster: &[ChatAgent],
        _excluded: Option<&AgentId>,
    ) -> conclave::Result<AgentId> {
        Ok("ghost".to_string())
    }
}

/// Never answers.
struct StallSelector;

#[async_trait]
impl Selector for StallSelector {
    async fn select_next(
        &mut self,
        _transcript: &Transcript,
        _roster: &[ChatAgent],
        _excluded: Option<&AgentId>,
    ) -> conclave::Result<AgentId> {
        futures::future::pending::<()>().await;
        unreachable!()
    }
}

/// Picks its favorite whenever allowed, the fallback otherwise.
struct StickySelector {
    favorite: AgentId,
    fallback: AgentId,
}

#[async_trait]
impl Selector for StickySelector {
    async fn select_next(
        &mut self,
        _transcript: &Transcript,
        _roster: &[ChatAgent],
        excluded: Option<&AgentId>,
    ) -> conclave::Result<AgentId> {
        if excluded.is_some_and(|id| *id == self.favorite) {
            Ok(self.fallback.clone())
        } else {
            Ok(self.favorite.clone())
        }
    }
}

fn agent(id: &str) -> ChatAgent {
    ChatAgent::new(id, format!("The {} agent", id), "Reply briefly.")
}

#[tokio::test]
async fn test_unknown_selector_choice_fails_the_run() {
    let model = Arc::new(ScriptedClient::new(vec![]));
    let mut chat = GroupChat::new(vec![agent("alice")], model, GhostSelector, max_messages(5));

    let err = chat.run("task").await.unwrap_err();

    assert!(matches!(err, ChatError::Selection { .. }));
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test(start_paused = true)]
async fn test_selector_timeout_is_a_selection_error() {
    let model = Arc::new(ScriptedClient::new(vec![]));
    let mut chat = GroupChat::new(
        vec![agent("alice"), agent("bob")],
        model,
        StallSelector,
        max_messages(10),
    )
    .with_config(GroupChatConfig::new().with_selector_timeout(Duration::from_millis(100)));

    let err = chat.run("task").await.unwrap_err();

    assert!(matches!(err, ChatError::Selection { .. }));
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_a_stalled_selection() {
    let model = Arc::new(ScriptedClient::new(vec![]));
    let mut chat = GroupChat::new(
        vec![agent("alice"), agent("bob")],
        model,
        StallSelector,
        max_messages(10),
    );

    let token = CancellationToken::new();
    let canceller = token.clone();
    let (result, _) = tokio::join!(chat.run_with_token("task", token), async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });
    let result = result.unwrap();

    assert_eq!(result.reason, TerminationReason::Cancelled);
    assert_eq!(result.transcript.len(), 1);
}

#[tokio::test]
async fn test_exclusion_prevents_consecutive_repeats() {
    let model = Arc::new(ScriptedClient::new(vec![]));
    let mut chat = GroupChat::new(
        vec![agent("alice"), agent("bob")],
        model,
        StickySelector {
            favorite: "alice".to_string(),
            fallback: "bob".to_string(),
        },
        max_messages(7),
    );

    let result = chat.run("task").await.unwrap();

    let speakers: Vec<&str> = result.transcript.messages()[1..]
        .iter()
        .map(|m| m.speaker.as_str())
        .collect();
    assert_eq!(speakers, vec!["alice", "bob", "alice", "bob", "alice", "bob"]);
}

#[tokio::test]
async fn test_single_agent_roster_waives_exclusion() {
    let model = Arc::new(ScriptedClient::new(vec![]));
    let mut chat = GroupChat::new(
        vec![agent("solo")],
        model,
        RoundRobinSelector::new(),
        max_messages(4),
    );

    let result = chat.run("task").await.unwrap();

    // With a roster of one the previous-speaker exclusion is waived even
    // though repeats are disallowed, so the sole agent keeps the floor.
    assert_eq!(result.reason, TerminationReason::MaxMessages { limit: 4 });
    let speakers: Vec<&str> = result.transcript.messages()[1..]
        .iter()
        .map(|m| m.speaker.as_str())
        .collect();
    assert_eq!(speakers, vec!["solo", "solo", "solo"]);
}

#[tokio::test]
async fn test_allow_repeated_speaker_permits_repeats() {
    let model = Arc::new(ScriptedClient::new(vec![]));
    let mut chat = GroupChat::new(
        vec![agent("alice"), agent("bob")],
        model,
        StickySelector {
            favorite: "alice".to_string(),
            fallback: "bob".to_string(),
        },
        max_messages(4),
    )
    .with_config(GroupChatConfig::new().with_allow_repeated_speaker(true));

    let result = chat.run("task").await.unwrap();

    let speakers: Vec<&str> = result.transcript.messages()[1..]
        .iter()
        .map(|m| m.speaker.as_str())
        .collect();
    assert_eq!(speakers, vec!["alice", "alice", "alice"]);
}

#[tokio::test]
async fn test_model_selector_drives_the_engine() {
    let selector_model = Arc::new(ScriptedClient::new(vec![
        Completion::message("planner"),
        Completion::message("I think researcher should go next."),
        Completion::message("writer"),
    ]));
    let agent_model = Arc::new(ScriptedClient::new(vec![
        Completion::message("plan ready"),
        Completion::message("data gathered"),
        Completion::message("report done TERMINATE"),
    ]));
    let roster = vec![
        ChatAgent::new("planner", "Breaks the task into steps", "You plan."),
        ChatAgent::new("researcher", "Finds the facts", "You research."),
        ChatAgent::new("writer", "Writes the final answer", "You write."),
    ];
    let mut chat = GroupChat::new(
        roster,
        agent_model.clone(),
        ModelSelector::new(selector_model.clone()),
        text_mention("TERMINATE").or(max_messages(10)),
    );

    let result = chat.run("produce the report").await.unwrap();

    let speakers: Vec<&str> = result.transcript.messages()[1..]
        .iter()
        .map(|m| m.speaker.as_str())
        .collect();
    assert_eq!(speakers, vec!["planner", "researcher", "writer"]);
    assert_eq!(selector_model.calls(), 3);
    assert_eq!(agent_model.calls(), 3);
    // Selection traffic never counts toward the run's usage.
    assert_eq!(result.usage.request_count, 3);
}

#[tokio::test]
async fn test_model_selector_retries_then_shortcuts() {
    let selector_model = Arc::new(ScriptedClient::new(vec![
        Completion::message("hmm, let me think"),
        Completion::message("alice"),
    ]));
    let agent_model = Arc::new(ScriptedClient::new(vec![]));
    let mut chat = GroupChat::new(
        vec![agent("alice"), agent("bob")],
        agent_model,
        ModelSelector::new(selector_model.clone()),
        max_messages(3),
    );

    let result = chat.run("task").await.unwrap();

    let speakers: Vec<&str> = result.transcript.messages()[1..]
        .iter()
        .map(|m| m.speaker.as_str())
        .collect();
    assert_eq!(speakers, vec!["alice", "bob"]);
    // One retry for the first pick, then a single-candidate shortcut with no
    // model call at all.
    assert_eq!(selector_model.calls(), 2);
}

#[tokio::test]
async fn test_ambiguous_selection_fails_the_run() {
    let selector_model = Arc::new(ScriptedClient::new(vec![Completion::message(
        "either alice or bob works here",
    )]));
    let agent_model = Arc::new(ScriptedClient::new(vec![]));
    let mut chat = GroupChat::new(
        vec![agent("alice"), agent("bob")],
        agent_model,
        ModelSelector::new(selector_model),
        max_messages(10),
    );

    let err = chat.run("task").await.unwrap_err();

    assert!(matches!(err, ChatError::Selection { .. }));
    assert!(err.to_string().contains("ambiguous"));
}
