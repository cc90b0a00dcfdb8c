//! Actor Error Types
//!
//! Errors raised by the pipe actor runtime. Failures coming from the hosted
//! state machine arrive as `anyhow::Error` and are flattened into messages at
//! the boundary.

use crate::handle::ActorId;
use crate::pipe::Side;
use thiserror::Error;

/// Main actor runtime error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActorError {
    /// The state machine initializer refused to start
    #[error("Initialization failed: {message}")]
    Init { message: String },

    /// A transition handler failed while processing a payload
    #[error("Transition failed in state {state}: {message}")]
    Transition { state: String, message: String },

    /// The finalizer failed during shutdown
    #[error("Finalizer failed: {message}")]
    Finalize { message: String },

    /// The destination mailbox no longer accepts frames
    #[error("Mailbox closed: {actor}")]
    MailboxClosed { actor: ActorId },

    /// A tagged request was dropped without an acknowledgment
    #[error("No reply from {actor}")]
    NoReply { actor: ActorId },

    /// A reply of the wrong shape came back for a configuration request
    #[error("Unexpected {kind} reply from {actor}")]
    UnexpectedReply { actor: ActorId, kind: String },

    /// Configuration request addressed to a bare endpoint
    #[error("{actor} is an endpoint and takes no configuration requests")]
    Endpoint { actor: ActorId },

    /// Emit on a pipe side that has no peer
    #[error("Pipe side {side} is unbound")]
    Unbound { side: Side },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// The actor task panicked or was aborted
    #[error("Actor task failed: {message}")]
    Task { message: String },
}

/// Result type alias for actor operations
pub type Result<T> = std::result::Result<T, ActorError>;

impl ActorError {
    /// Create an initialization error from a state machine failure
    pub fn init(err: &anyhow::Error) -> Self {
        Self::Init {
            message: format!("{:#}", err),
        }
    }

    /// Create a transition error for the given state
    pub fn transition(state: impl std::fmt::Debug, err: &anyhow::Error) -> Self {
        Self::Transition {
            state: format!("{:?}", state),
            message: format!("{:#}", err),
        }
    }

    /// Create a finalizer error
    pub fn finalize(err: &anyhow::Error) -> Self {
        Self::Finalize {
            message: format!("{:#}", err),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// Short tag used in structured logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Transition { .. } => "transition",
            Self::Finalize { .. } => "finalize",
            Self::MailboxClosed { .. } => "mailbox",
            Self::NoReply { .. } => "no_reply",
            Self::UnexpectedReply { .. } => "unexpected_reply",
            Self::Endpoint { .. } => "endpoint",
            Self::Unbound { .. } => "unbound",
            Self::Configuration { .. } => "configuration",
            Self::Task { .. } => "task",
        }
    }

    /// Whether the error terminated the actor
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Init { .. } | Self::Transition { .. } | Self::Finalize { .. } | Self::Task { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_init_error_keeps_context_chain() {
        let err = anyhow!("disk missing").context("loading table");
        let actor_err = ActorError::init(&err);
        assert_eq!(
            actor_err.to_string(),
            "Initialization failed: loading table: disk missing"
        );
        assert!(actor_err.is_fatal());
    }

    #[test]
    fn test_transition_error_names_state() {
        #[derive(Debug)]
        enum State {
            Draining,
        }
        let err = ActorError::transition(State::Draining, &anyhow!("boom"));
        assert_eq!(err.category(), "transition");
        assert!(err.to_string().contains("Draining"));
    }

    #[test]
    fn test_configuration_error_field() {
        let err = ActorError::configuration("quota must be positive", Some("rate.quota"));
        match err {
            ActorError::Configuration { field, .. } => {
                assert_eq!(field.as_deref(), Some("rate.quota"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
