//! Error types for the group chat engine
//!
//! One taxonomy for the whole crate. Configuration problems surface before a
//! run starts, selection and protocol violations abort a run, and tool
//! failures are recoverable payloads that never abort a run by themselves.
//! Cancellation is not an error; it is a normal
//! [`TerminationReason`](crate::result::TerminationReason).

use thiserror::Error;

/// Errors that can abort a group chat run
#[derive(Error, Debug)]
pub enum ChatError {
    /// Invalid engine configuration, detected before any turn runs
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The selector could not produce a valid roster member
    #[error("Selection error: {message}")]
    Selection { message: String },

    /// An agent turn violated the engine protocol
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// A single turn exceeded the tool-call depth bound
    #[error("Tool loop exceeded maximum depth of {max_depth}")]
    ToolLoop { max_depth: usize },

    /// A tool invocation failed. Recoverable: the engine folds it into the
    /// transcript as an error payload instead of aborting the run.
    #[error("Tool execution error: {message}")]
    ToolExecution { message: String },

    /// The generation capability returned an unusable response
    #[error("Generation error: {message}")]
    Generation { message: String },

    /// Errors from the OpenAI API
    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A bounded call did not finish in time
    #[error("Timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChatError::Configuration {
            message: "roster is empty".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: roster is empty");

        let err = ChatError::ToolLoop { max_depth: 10 };
        assert_eq!(err.to_string(), "Tool loop exceeded maximum depth of 10");

        let err = ChatError::Timeout {
            operation: "selection".to_string(),
            seconds: 30,
        };
        assert_eq!(err.to_string(), "Timed out after 30s: selection");
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: ChatError = parse_err.into();
        assert!(matches!(err, ChatError::Serialization(_)));
    }
}
