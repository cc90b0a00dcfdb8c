//! Mailbox Frames
//!
//! Everything delivered to an actor's mailbox is a [`Frame`]. The actor
//! classifies frames by variant: shutdown, configuration (ioctl), credit
//! grant, or ordinary payload. Frames that expect an answer carry an
//! [`Ack`], the reply half of a oneshot channel.

use crate::handle::{ActorId, ActorRef};
use crate::pipe::Side;
use crate::rate::Rate;
use serde_json::Value;
use tokio::sync::oneshot;

/// Reply slot of a tagged request; empty for notifications
#[derive(Debug)]
pub struct Ack<R>(Option<oneshot::Sender<R>>);

impl<R> Ack<R> {
    /// Slot for a fire-and-forget frame
    pub fn none() -> Self {
        Self(None)
    }

    /// Slot plus the receiver the requester waits on
    pub fn channel() -> (Self, oneshot::Receiver<R>) {
        let (tx, rx) = oneshot::channel();
        (Self(Some(tx)), rx)
    }

    /// Answer the request; false if there was nobody to answer or it was
    /// already answered
    pub fn send(&mut self, reply: R) -> bool {
        match self.0.take() {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Whether a reply is still owed
    pub fn is_pending(&self) -> bool {
        self.0.is_some()
    }
}

/// Configuration request
#[derive(Debug)]
pub enum Ioctl<M> {
    /// Set a pipe side, reply with the previous peer
    Bind(Side, ActorRef<M>),
    /// Reply with the peer bound to a side
    ReadBind(Side),
    /// Replace the execution rate and restart the window; `None` disables
    /// rate limiting
    SetRate(Option<Rate>),
    /// Forward a key/value to the state machine
    Set(String, Value),
    /// Read a key from the state machine
    Get(String),
    /// Reply with the ledger balance of a peer
    ReadCredit(ActorId),
}

/// Acknowledgment of a configuration request
#[derive(Debug, Clone, PartialEq)]
pub enum IoctlReply<M> {
    Ok,
    Peer(Option<ActorRef<M>>),
    Value(Value),
    Credit(u64),
    /// No value: the state machine could not answer a `Get`
    Undefined,
}

/// Unit of delivery into an actor mailbox
#[derive(Debug)]
pub enum Frame<M> {
    /// Ordinary message; `ack` is pending when the sender used `call`
    Payload {
        from: ActorRef<M>,
        msg: M,
        ack: Ack<M>,
    },
    /// Configuration sub-protocol
    Ioctl {
        request: Ioctl<M>,
        ack: Ack<IoctlReply<M>>,
    },
    /// Credit replenishment from a peer
    Credit { from: ActorId, delta: u64 },
    /// Terminate with reason `normal`
    Shutdown,
}

impl<M> Frame<M> {
    /// Tag used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Payload { .. } => "payload",
            Frame::Ioctl { .. } => "ioctl",
            Frame::Credit { .. } => "credit",
            Frame::Shutdown => "shutdown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ack_answers_once() {
        let (mut ack, rx) = Ack::<u32>::channel();
        assert!(ack.is_pending());
        assert!(ack.send(7));
        assert!(!ack.is_pending());
        assert!(!ack.send(8));
        assert_eq!(rx.await.unwrap(), 7);
    }

    #[test]
    fn test_ack_none_and_dropped_receiver() {
        let mut ack = Ack::<u32>::none();
        assert!(!ack.send(1));

        let (mut ack, rx) = Ack::<u32>::channel();
        drop(rx);
        assert!(!ack.send(1));
    }

    #[test]
    fn test_frame_kind() {
        assert_eq!(Frame::<()>::Shutdown.kind(), "shutdown");
        let frame = Frame::<()>::Credit {
            from: ActorId::new(),
            delta: 1,
        };
        assert_eq!(frame.kind(), "credit");
    }
}
