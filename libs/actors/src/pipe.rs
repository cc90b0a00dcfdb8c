//! Pipe Routing
//!
//! An actor sits between two peers, side A and side B. A payload from one
//! side flows toward the other. While the actor is only partly wired the
//! sender stands in for the missing A side.
//!
//! ```text
//!   A ──▶ [actor] ──▶ B       from A: target B
//!   A ◀── [actor] ◀── B       from B: target A
//!   X ──▶ [actor] ──▶ B       A unbound: X is the implicit A, target B
//!   X ──▶ [actor] ──▶ A       A bound, X unknown: target A
//! ```

use crate::error::{ActorError, Result};
use crate::handle::ActorRef;
use crate::messages::Ack;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// One of the two pipe sides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "a"),
            Side::B => write!(f, "b"),
        }
    }
}

/// Target side of a message from `sender`, and the peer bound there
///
/// The source of the pipe is always the sender; only the target depends on
/// the binding.
pub fn route<'a, P: PartialEq>(sender: &P, a: Option<&'a P>, b: Option<&'a P>) -> (Side, Option<&'a P>) {
    match (a, b) {
        (Some(a), _) if a == sender => (Side::B, b),
        (_, Some(b)) if b == sender => (Side::A, a),
        (None, _) => (Side::B, b),
        (Some(a), _) => (Side::A, Some(a)),
    }
}

/// Directional context handed to a transition handler
#[derive(Debug)]
pub struct Pipe<M> {
    me: ActorRef<M>,
    source: ActorRef<M>,
    target_side: Side,
    target: Option<ActorRef<M>>,
    ack: Ack<M>,
}

impl<M> Pipe<M> {
    pub fn new(
        me: ActorRef<M>,
        source: ActorRef<M>,
        (target_side, target): (Side, Option<ActorRef<M>>),
        ack: Ack<M>,
    ) -> Self {
        Self {
            me,
            source,
            target_side,
            target,
            ack,
        }
    }

    /// The actor handling the message
    pub fn me(&self) -> &ActorRef<M> {
        &self.me
    }

    /// Where the message came from
    pub fn source(&self) -> &ActorRef<M> {
        &self.source
    }

    /// Where the message flows to, if that side is bound
    pub fn target(&self) -> Option<&ActorRef<M>> {
        self.target.as_ref()
    }

    /// Side the message flows toward
    pub fn target_side(&self) -> Side {
        self.target_side
    }

    /// Whether the sender is waiting for an acknowledgment
    pub fn is_request(&self) -> bool {
        self.ack.is_pending()
    }

    /// Pass a message downstream, toward the target
    pub fn emit(&self, msg: M) -> Result<()> {
        match &self.target {
            Some(target) => target.send(&self.me, msg),
            None => Err(ActorError::Unbound {
                side: self.target_side,
            }),
        }
    }

    /// Send a message back upstream, to the source
    pub fn reply(&self, msg: M) -> Result<()> {
        self.source.send(&self.me, msg)
    }

    /// Answer the sender's request; false if it was a plain notification or
    /// was already answered
    pub fn ack(&mut self, reply: M) -> bool {
        self.ack.send(reply)
    }
}

/// Wire `a` to `b`: `b` becomes A's downstream and `a` becomes B's upstream
///
/// Endpoints have no sides of their own; only the actor end of a pair is
/// bound.
pub async fn join<M>(a: &ActorRef<M>, b: &ActorRef<M>) -> Result<()> {
    if !a.is_endpoint() {
        a.bind(Side::B, b).await?;
    }
    if !b.is_endpoint() {
        b.bind(Side::A, a).await?;
    }
    debug!(upstream = %a.id(), downstream = %b.id(), "Joined pipe stages");
    Ok(())
}

/// Wire stages into a linear pipeline, in order
///
/// The first and last stages may be endpoints acting as source and sink.
pub async fn make<M>(stages: &[ActorRef<M>]) -> Result<()> {
    for pair in stages.windows(2) {
        join(&pair[0], &pair[1]).await?;
    }
    Ok(())
}
