//! Termination policies
//!
//! A policy inspects the transcript after every appended turn and decides
//! whether the run stops. Policies compose with
//! [`or`](TerminationPolicyExt::or) and [`and`](TerminationPolicyExt::and).

use crate::result::TerminationReason;
use crate::transcript::Transcript;

/// Decides when a run stops.
///
/// `check` runs once per loop iteration, after the previous turn's messages
/// were appended; `reset` runs at chat start so a policy instance can be
/// reused across runs.
pub trait TerminationPolicy: Send + Sync {
    /// Some(reason) to stop, None to continue.
    fn check(&mut self, transcript: &Transcript) -> Option<TerminationReason>;

    /// Clear internal counters for a fresh run.
    fn reset(&mut self);
}

/// Stops when a message contains a marker substring.
///
/// Only messages appended since the previous check are scanned. Markers are
/// matched within a single message's content, never across messages.
#[derive(Debug, Clone)]
pub struct TextMention {
    marker: String,
    last_seen: u64,
}

impl TextMention {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            last_seen: 0,
        }
    }
}

impl TerminationPolicy for TextMention {
    fn check(&mut self, transcript: &Transcript) -> Option<TerminationReason> {
        // A caller that skipped `reset` may hand over a transcript shorter
        // than the one previously checked; treat that as nothing new.
        let new_messages = transcript
            .messages()
            .get(self.last_seen as usize..)
            .unwrap_or(&[]);
        let fired = new_messages
            .iter()
            .any(|m| m.content.contains(&self.marker));
        self.last_seen = transcript.len() as u64;

        if fired {
            Some(TerminationReason::TextMention {
                marker: self.marker.clone(),
            })
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.last_seen = 0;
    }
}

/// Stops once the transcript holds `limit` messages, counting the seed task.
#[derive(Debug, Clone)]
pub struct MaxMessages {
    limit: usize,
}

impl MaxMessages {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl TerminationPolicy for MaxMessages {
    fn check(&mut self, transcript: &Transcript) -> Option<TerminationReason> {
        if transcript.len() >= self.limit {
            Some(TerminationReason::MaxMessages { limit: self.limit })
        } else {
            None
        }
    }

    fn reset(&mut self) {}
}

/// Stops when either side stops.
///
/// Reports whichever side fired first across checks; when both fire on the
/// same check, TextMention takes precedence over MaxMessages.
pub struct Or {
    left: Box<dyn TerminationPolicy>,
    right: Box<dyn TerminationPolicy>,
}

impl Or {
    pub fn new(
        left: impl TerminationPolicy + 'static,
        right: impl TerminationPolicy + 'static,
    ) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

impl TerminationPolicy for Or {
    fn check(&mut self, transcript: &Transcript) -> Option<TerminationReason> {
        match (self.left.check(transcript), self.right.check(transcript)) {
            (Some(l), Some(r)) => Some(pick_by_precedence(l, r)),
            (Some(l), None) => Some(l),
            (None, Some(r)) => Some(r),
            (None, None) => None,
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

/// Fixed precedence for simultaneous firings: TextMention, then MaxMessages.
/// Ties keep the left side.
fn pick_by_precedence(a: TerminationReason, b: TerminationReason) -> TerminationReason {
    let rank = |r: &TerminationReason| match r {
        TerminationReason::TextMention { .. } => 0,
        TerminationReason::MaxMessages { .. } => 1,
        TerminationReason::Cancelled => 2,
    };
    if rank(&b) < rank(&a) {
        b
    } else {
        a
    }
}

/// Stops only when both sides have stopped.
///
/// Each side's firing is remembered across checks; the reported reason is
/// from the side that completed the conjunction.
pub struct And {
    left: Box<dyn TerminationPolicy>,
    right: Box<dyn TerminationPolicy>,
    left_fired: Option<TerminationReason>,
    right_fired: Option<TerminationReason>,
}

impl And {
    pub fn new(
        left: impl TerminationPolicy + 'static,
        right: impl TerminationPolicy + 'static,
    ) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
            left_fired: None,
            right_fired: None,
        }
    }
}

impl TerminationPolicy for And {
    fn check(&mut self, transcript: &Transcript) -> Option<TerminationReason> {
        let mut latest = None;
        if self.left_fired.is_none() {
            if let Some(reason) = self.left.check(transcript) {
                self.left_fired = Some(reason.clone());
                latest = Some(reason);
            }
        }
        if self.right_fired.is_none() {
            if let Some(reason) = self.right.check(transcript) {
                self.right_fired = Some(reason.clone());
                latest = Some(reason);
            }
        }

        if self.left_fired.is_some() && self.right_fired.is_some() {
            latest.or_else(|| self.right_fired.clone())
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
        self.left_fired = None;
        self.right_fired = None;
    }
}

/// Marker-substring policy.
pub fn text_mention(marker: impl Into<String>) -> TextMention {
    TextMention::new(marker)
}

/// Transcript-length policy, seed included.
pub fn max_messages(limit: usize) -> MaxMessages {
    MaxMessages::new(limit)
}

/// Combinators for composing policies.
pub trait TerminationPolicyExt: TerminationPolicy + Sized + 'static {
    /// Stop when either this or `other` stops.
    fn or(self, other: impl TerminationPolicy + 'static) -> Or {
        Or::new(self, other)
    }

    /// Stop only when both this and `other` have stopped.
    fn and(self, other: impl TerminationPolicy + 'static) -> And {
        And::new(self, other)
    }
}

impl<P: TerminationPolicy + Sized + 'static> TerminationPolicyExt for P {}
