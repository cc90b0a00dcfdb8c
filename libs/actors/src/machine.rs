//! State Machine Contract
//!
//! A pipe actor hosts one [`StateMachine`]. The machine names its states with
//! an enum and handles each payload by matching on the current state, so
//! every state has a handler and the compiler checks it. State data belongs
//! to the machine; the actor only lends it out.
//!
//! ```ignore
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Phase { Open, Closed }
//!
//! struct Gate;
//!
//! #[async_trait]
//! impl StateMachine for Gate {
//!     type Message = String;
//!     type State = Phase;
//!     type Data = u64;
//!     type Args = ();
//!
//!     async fn init(&self, _: ()) -> anyhow::Result<(Phase, u64)> {
//!         Ok((Phase::Open, 0))
//!     }
//!
//!     async fn handle(
//!         &self,
//!         state: Phase,
//!         msg: String,
//!         pipe: &mut Pipe<String>,
//!         passed: &mut u64,
//!     ) -> anyhow::Result<Transition<Phase>> {
//!         match state {
//!             Phase::Open if msg == "close" => Ok(Transition::Next(Phase::Closed)),
//!             Phase::Open => {
//!                 *passed += 1;
//!                 pipe.emit(msg)?;
//!                 Ok(Transition::Next(Phase::Open))
//!             }
//!             Phase::Closed => Ok(Transition::Next(Phase::Closed)),
//!         }
//!     }
//! }
//! ```

use crate::pipe::Pipe;
use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Why an actor stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit shutdown or a clean stop
    Normal,
    /// Stop requested by the state machine with its own reason
    Other(String),
}

impl StopReason {
    pub fn other(reason: impl Into<String>) -> Self {
        Self::Other(reason.into())
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Suspend hint for the hosting runtime; the actor records it and passes
/// it on without interpreting it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    Hibernate,
    Timeout(Duration),
}

/// Result of a transition handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<S> {
    /// Continue in `S`
    Next(S),
    /// Continue in `S` with a suspend hint
    Suspend(S, Hint),
    /// Stop; the finalizer receives the data as the handler left it
    Stop(StopReason),
}

/// Pluggable state machine hosted by an actor
#[async_trait]
pub trait StateMachine: Send + Sync + 'static {
    /// Payload type carried by the pipeline
    type Message: Send + 'static;
    /// State identifier; selects the transition handler
    type State: Copy + Eq + fmt::Debug + Send + Sync + 'static;
    /// Opaque state data
    type Data: Send + 'static;
    /// Initializer arguments
    type Args: Send + 'static;

    /// Build the initial state; an error aborts the spawn
    async fn init(&self, args: Self::Args) -> anyhow::Result<(Self::State, Self::Data)>;

    /// Transition handler for `state`
    ///
    /// Errors are fatal to the actor.
    async fn handle(
        &self,
        state: Self::State,
        msg: Self::Message,
        pipe: &mut Pipe<Self::Message>,
        data: &mut Self::Data,
    ) -> anyhow::Result<Transition<Self::State>>;

    /// Finalizer, called once with the stop reason and the final data
    async fn free(&self, _reason: &StopReason, _data: Self::Data) -> anyhow::Result<()> {
        Ok(())
    }

    /// Apply a setting and return the replacement data
    fn configure_set(&self, key: &str, _value: Value, _data: &Self::Data) -> anyhow::Result<Self::Data> {
        Err(anyhow!("unsupported setting: {}", key))
    }

    /// Read a setting
    fn configure_get(&self, key: &str, _data: &Self::Data) -> anyhow::Result<Value> {
        Err(anyhow!("unsupported setting: {}", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Normal.to_string(), "normal");
        assert_eq!(StopReason::other("drained").to_string(), "drained");
        assert!(StopReason::Normal.is_normal());
        assert!(!StopReason::other("normal").is_normal());
    }
}
