//! Speaker selection
//!
//! After every turn the engine asks a selector which roster member speaks
//! next. Round-robin covers deterministic schedules; the model-driven
//! selector asks a generation client and parses its reply against the roster
//! with a whole-token mention grammar.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::agent::ChatAgent;
use crate::error::{ChatError, Result};
use crate::message::AgentId;
use crate::model::{ModelClient, PromptMessage};
use crate::transcript::Transcript;

/// Default selection prompt. `{roles}`, `{participants}` and `{history}` are
/// substituted per call.
pub const DEFAULT_SELECTOR_PROMPT: &str = "You are in a role play game. The following roles are available:\n{roles}.\nRead the following conversation. Then select the next role from {participants} to play. Only return the role.\n\n{history}\n\nRead the above conversation. Then select the next role from {participants} to play. Only return the role.";

/// Picks the next speaker.
#[async_trait]
pub trait Selector: Send + Sync {
    /// Choose the next speaker from `roster`, never returning `excluded`.
    async fn select_next(
        &mut self,
        transcript: &Transcript,
        roster: &[ChatAgent],
        excluded: Option<&AgentId>,
    ) -> Result<AgentId>;
}

/// Cycles through the roster in order, skipping the excluded id.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    cursor: usize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Selector for RoundRobinSelector {
    async fn select_next(
        &mut self,
        _transcript: &Transcript,
        roster: &[ChatAgent],
        excluded: Option<&AgentId>,
    ) -> Result<AgentId> {
        if roster.is_empty() {
            return Err(ChatError::Selection {
                message: "roster is empty".to_string(),
            });
        }
        for _ in 0..roster.len() {
            let candidate = &roster[self.cursor % roster.len()];
            self.cursor += 1;
            if excluded.is_some_and(|id| id.as_str() == candidate.id()) {
                continue;
            }
            return Ok(candidate.id().to_string());
        }
        Err(ChatError::Selection {
            message: "no eligible speaker after exclusion".to_string(),
        })
    }
}

/// Asks a generation client to pick the next speaker.
///
/// The reply must mention exactly one candidate id. A reply mentioning none
/// triggers one corrective retry; a reply mentioning several fails as
/// ambiguous, and a still-invalid retry fails the run.
pub struct ModelSelector {
    model: Arc<dyn ModelClient>,
    prompt_template: String,
}

impl ModelSelector {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self {
            model,
            prompt_template: DEFAULT_SELECTOR_PROMPT.to_string(),
        }
    }

    /// Replace the default template. `{roles}`, `{participants}` and
    /// `{history}` are substituted per call.
    pub fn with_prompt(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }

    fn render_prompt(&self, transcript: &Transcript, candidates: &[&ChatAgent]) -> String {
        let roles = candidates
            .iter()
            .map(|a| format!("{}: {}", a.id(), a.description()))
            .collect::<Vec<_>>()
            .join("\n");
        let participants = candidates
            .iter()
            .map(|a| a.id().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let history = transcript
            .iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| format!("{}: {}", m.speaker, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        self.prompt_template
            .replace("{roles}", &roles)
            .replace("{participants}", &participants)
            .replace("{history}", &history)
    }
}

#[async_trait]
impl Selector for ModelSelector {
    async fn select_next(
        &mut self,
        transcript: &Transcript,
        roster: &[ChatAgent],
        excluded: Option<&AgentId>,
    ) -> Result<AgentId> {
        let candidates: Vec<&ChatAgent> = roster
            .iter()
            .filter(|a| !excluded.is_some_and(|id| id.as_str() == a.id()))
            .collect();
        if candidates.is_empty() {
            return Err(ChatError::Selection {
                message: "no eligible candidates".to_string(),
            });
        }
        if candidates.len() == 1 {
            debug!(selected = %candidates[0].id(), "single eligible candidate");
            return Ok(candidates[0].id().to_string());
        }

        let candidate_ids: Vec<&str> = candidates.iter().map(|a| a.id()).collect();
        let prompt = self.render_prompt(transcript, &candidates);
        let mut messages = vec![PromptMessage::system(prompt)];

        for attempt in 0..2 {
            let (completion, _usage) = self.model.complete(messages.clone(), &[], None, None).await?;
            let reply = completion.content.unwrap_or_default();
            let mentions = roster_mentions(&reply, &candidate_ids);

            match mentions.len() {
                1 => {
                    debug!(selected = %mentions[0], attempt, "selector picked next speaker");
                    return Ok(mentions[0].clone());
                }
                0 => {
                    warn!(
                        attempt,
                        reply = %truncate_for_log(&reply, 120),
                        "selector reply named no candidate"
                    );
                    if attempt == 0 {
                        messages.push(PromptMessage::assistant(&reply));
                        messages.push(PromptMessage::user(format!(
                            "That was not a valid choice. Reply with exactly one of: {}.",
                            candidate_ids.join(", ")
                        )));
                    }
                }
                n => {
                    return Err(ChatError::Selection {
                        message: format!(
                            "ambiguous selection: reply mentioned {} candidates ({})",
                            n,
                            mentions.join(", ")
                        ),
                    });
                }
            }
        }

        Err(ChatError::Selection {
            message: "selector failed to name a valid candidate after one retry".to_string(),
        })
    }
}

/// Find roster ids mentioned as whole tokens in a model reply.
///
/// An occurrence counts when both neighbors are non-identifier characters.
/// An occurrence lying inside a longer matched id's occurrence is subsumed
/// by it (longest match wins). The result keeps roster order, deduplicated.
pub(crate) fn roster_mentions(reply: &str, roster_ids: &[&str]) -> Vec<String> {
    let mut spans: Vec<(usize, usize, &str)> = Vec::new();
    for id in roster_ids {
        if id.is_empty() {
            continue;
        }
        let mut from = 0;
        while let Some(pos) = reply[from..].find(id) {
            let start = from + pos;
            let end = start + id.len();
            let before_ok = reply[..start]
                .chars()
                .next_back()
                .map(|c| !is_ident_char(c))
                .unwrap_or(true);
            let after_ok = reply[end..]
                .chars()
                .next()
                .map(|c| !is_ident_char(c))
                .unwrap_or(true);
            if before_ok && after_ok {
                spans.push((start, end, id));
            }
            from = end;
        }
    }

    let mut mentioned: Vec<String> = Vec::new();
    for &(start, end, id) in &spans {
        let inside_longer = spans
            .iter()
            .any(|&(s, e, other)| other != id && s <= start && end <= e && (e - s) > (end - start));
        if !inside_longer && !mentioned.iter().any(|m| m == id) {
            mentioned.push(id.to_string());
        }
    }
    mentioned
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn truncate_for_log(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(limit).collect();
        format!("{}...", prefix)
    }
}
