//! Token usage accounting
//!
//! Every generation call reports how many tokens it consumed. The engine sums
//! these across a run and reports the total on the final
//! [`RunResult`](crate::result::RunResult).

use serde::{Deserialize, Serialize};

/// Token usage for one or more generation calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    /// Tokens in the prompt.
    pub prompt_tokens: usize,

    /// Tokens in the generated completion.
    pub completion_tokens: usize,

    /// Prompt plus completion.
    pub total_tokens: usize,

    /// Number of API requests covered by this record.
    pub request_count: usize,
}

impl Usage {
    /// Usage of a single call from its prompt and completion token counts.
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            request_count: 1,
        }
    }

    /// All-zero usage.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fold another record into this one.
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.request_count += other.request_count;
    }
}

// The trait stays out of scope by name: importing it would make method-call
// syntax resolve `add` on a `Usage` value to the by-value operator method
// instead of the inherent accumulator above.
impl std::ops::Add for Usage {
    type Output = Usage;

    fn add(mut self, other: Usage) -> Usage {
        Usage::add(&mut self, &other);
        self
    }
}
