//! The group chat engine
//!
//! Owns the transcript and drives the loop: check termination, pick the next
//! speaker, run its turn, append and publish every message it produced.
//! Exactly one turn is in flight at a time; cancellation is checked before
//! selection and before each turn and races any in-flight call.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent::{ChatAgent, TurnOutput};
use crate::error::{ChatError, Result};
use crate::events::ChatEvent;
use crate::message::{AgentId, ChatMessage, SYSTEM_SPEAKER};
use crate::model::ModelClient;
use crate::result::{RunResult, TerminationReason};
use crate::selector::Selector;
use crate::termination::TerminationPolicy;
use crate::transcript::Transcript;
use crate::usage::Usage;

/// Engine knobs. Defaults: no repeated speakers, tool depth 10, no timeouts.
#[derive(Debug, Clone)]
pub struct GroupChatConfig {
    /// Allow the same agent to take two consecutive turns.
    pub allow_repeated_speaker: bool,

    /// Maximum generate-then-invoke rounds within a single turn.
    pub max_tool_depth: usize,

    /// Bound on each selector call; elapsing is a selection failure.
    pub selector_timeout: Option<Duration>,

    /// Bound on each generation call within a turn; elapsing fails the turn.
    pub generation_timeout: Option<Duration>,

    /// Bound on each tool invocation; elapsing is a recoverable tool failure.
    pub tool_timeout: Option<Duration>,
}

impl Default for GroupChatConfig {
    fn default() -> Self {
        Self {
            allow_repeated_speaker: false,
            max_tool_depth: 10,
            selector_timeout: None,
            generation_timeout: None,
            tool_timeout: None,
        }
    }
}

impl GroupChatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allow_repeated_speaker(mut self, allow: bool) -> Self {
        self.allow_repeated_speaker = allow;
        self
    }

    pub fn with_max_tool_depth(mut self, depth: usize) -> Self {
        self.max_tool_depth = depth;
        self
    }

    pub fn with_selector_timeout(mut self, timeout: Duration) -> Self {
        self.selector_timeout = Some(timeout);
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = Some(timeout);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }
}

/// A configured group chat, ready to run.
///
/// The roster is fixed for the lifetime of the chat. Runs are sequential;
/// a single instance can run several chats one after another, with policies
/// reset at each start.
pub struct GroupChat {
    roster: Vec<ChatAgent>,
    model: Arc<dyn ModelClient>,
    selector: Box<dyn Selector>,
    termination: Box<dyn TerminationPolicy>,
    config: GroupChatConfig,
}

impl GroupChat {
    pub fn new(
        roster: Vec<ChatAgent>,
        model: Arc<dyn ModelClient>,
        selector: impl Selector + 'static,
        termination: impl TerminationPolicy + 'static,
    ) -> Self {
        Self {
            roster,
            model,
            selector: Box::new(selector),
            termination: Box::new(termination),
            config: GroupChatConfig::default(),
        }
    }

    pub fn with_config(mut self, config: GroupChatConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed the transcript with `task` and run to completion.
    pub async fn run(&mut self, task: impl Into<String>) -> Result<RunResult> {
        self.run_with_token(task, CancellationToken::new()).await
    }

    /// Run to completion, honoring an external cancellation token. A
    /// cancelled run ends normally with TerminationReason::Cancelled and the
    /// transcript produced so far.
    pub async fn run_with_token(
        &mut self,
        task: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<RunResult> {
        self.run_loop(task.into(), cancel, None).await
    }

    /// Run while streaming events. The final RunEnded event carries the
    /// result; a failed run ends with an Error event instead. Consumes the
    /// chat because the run executes on a spawned task.
    pub fn run_stream(self, task: impl Into<String>) -> UnboundedReceiverStream<ChatEvent> {
        self.run_stream_with_token(task, CancellationToken::new())
    }

    /// Streaming variant honoring an external cancellation token.
    pub fn run_stream_with_token(
        mut self,
        task: impl Into<String>,
        cancel: CancellationToken,
    ) -> UnboundedReceiverStream<ChatEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = task.into();
        tokio::spawn(async move {
            if let Err(e) = self.run_loop(task, cancel, Some(tx.clone())).await {
                let _ = tx.send(ChatEvent::Error {
                    message: e.to_string(),
                });
            }
        });
        UnboundedReceiverStream::new(rx)
    }

    fn validate(&self) -> Result<()> {
        if self.roster.is_empty() {
            return Err(ChatError::Configuration {
                message: "roster is empty".to_string(),
            });
        }
        for (i, agent) in self.roster.iter().enumerate() {
            if self.roster[..i].iter().any(|a| a.id() == agent.id()) {
                return Err(ChatError::Configuration {
                    message: format!("duplicate agent id: {}", agent.id()),
                });
            }
        }
        if self.config.max_tool_depth == 0 {
            return Err(ChatError::Configuration {
                message: "max_tool_depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    async fn run_loop(
        &mut self,
        task: String,
        cancel: CancellationToken,
        sink: Option<UnboundedSender<ChatEvent>>,
    ) -> Result<RunResult> {
        self.validate()?;
        self.termination.reset();

        let mut transcript = Transcript::new();
        let mut usage = Usage::empty();
        let mut previous_speaker: Option<AgentId> = None;

        info!(participants = self.roster.len(), "group chat starting");
        emit(
            &sink,
            ChatEvent::RunStarted {
                task: task.clone(),
                started_at: Utc::now(),
            },
        );
        let seed = transcript.append(ChatMessage::text(SYSTEM_SPEAKER, task));
        emit(&sink, ChatEvent::MessageAppended { message: seed });

        let reason = loop {
            if cancel.is_cancelled() {
                info!("run cancelled before selection");
                break TerminationReason::Cancelled;
            }
            if let Some(reason) = self.termination.check(&transcript) {
                debug!(?reason, "termination policy fired");
                break reason;
            }

            let excluded = if self.config.allow_repeated_speaker || self.roster.len() <= 1 {
                None
            } else {
                previous_speaker.clone()
            };

            let speaker = match self
                .select_speaker(&transcript, excluded.as_ref(), &cancel)
                .await?
            {
                Some(id) => id,
                None => break TerminationReason::Cancelled,
            };

            if cancel.is_cancelled() {
                info!("run cancelled before turn");
                break TerminationReason::Cancelled;
            }

            let turn = match self.run_turn(&transcript, &speaker, &cancel).await? {
                Some(turn) => turn,
                None => break TerminationReason::Cancelled,
            };
            if turn.messages.is_empty() {
                return Err(ChatError::Protocol {
                    message: format!("agent {} produced an empty turn", speaker),
                });
            }
            usage.add(&turn.usage);
            debug!(agent = %speaker, messages = turn.messages.len(), "turn complete");

            for draft in turn.messages {
                let stored = transcript.append(draft);
                emit(&sink, ChatEvent::MessageAppended { message: stored });
            }
            previous_speaker = Some(speaker);
        };

        info!(?reason, messages = transcript.len(), "group chat finished");
        let result = RunResult {
            transcript,
            reason,
            usage,
        };
        emit(
            &sink,
            ChatEvent::RunEnded {
                result: result.clone(),
            },
        );
        Ok(result)
    }

    /// None means the token fired while the call was in flight.
    async fn select_speaker(
        &mut self,
        transcript: &Transcript,
        excluded: Option<&AgentId>,
        cancel: &CancellationToken,
    ) -> Result<Option<AgentId>> {
        let selector_timeout = self.config.selector_timeout;
        let selection = self.selector.select_next(transcript, &self.roster, excluded);
        let bounded = async {
            match selector_timeout {
                Some(limit) => match tokio::time::timeout(limit, selection).await {
                    Ok(result) => result,
                    Err(_) => Err(ChatError::Selection {
                        message: format!("selection timed out after {:?}", limit),
                    }),
                },
                None => selection.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            result = bounded => result.map(Some),
        }
    }

    /// None means the token fired while the turn was in flight. Nothing from
    /// a cancelled turn reaches the transcript.
    async fn run_turn(
        &self,
        transcript: &Transcript,
        speaker: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<TurnOutput>> {
        let agent = match self.roster.iter().find(|a| a.id() == speaker) {
            Some(agent) => agent,
            None => {
                return Err(ChatError::Selection {
                    message: format!("selector returned unknown agent: {}", speaker),
                })
            }
        };

        info!(agent = %speaker, "turn starting");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            result = agent.step(transcript, &self.model, &self.config) => result.map(Some),
        }
    }
}

fn emit(sink: &Option<UnboundedSender<ChatEvent>>, event: ChatEvent) {
    if let Some(tx) = sink {
        let _ = tx.send(event);
    }
}
