//! Actor References
//!
//! [`ActorRef`] is the location of a mailbox: an identity plus the sending
//! half of an unbounded FIFO channel. References compare by identity, so the
//! pipe router can match a sender against the bound sides. Non-actor
//! participants (clients, sinks) get a bare mailbox from
//! [`ActorRef::endpoint`].

use crate::error::{ActorError, Result};
use crate::machine::StopReason;
use crate::messages::{Ack, Frame, Ioctl, IoctlReply};
use crate::pipe::Side;
use crate::rate::Rate;
use crate::system::ActorMetrics;
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Unique actor identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorId {
    id: Uuid,
}

impl ActorId {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self { id }
    }

    pub fn uuid(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.id.simple())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a mailbox
#[derive(Debug)]
pub struct MailboxReceiver<M> {
    rx: mpsc::UnboundedReceiver<Frame<M>>,
}

impl<M> MailboxReceiver<M> {
    /// Next frame in delivery order; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<Frame<M>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Frame<M>> {
        self.rx.try_recv().ok()
    }

    /// Next payload with its sender, discarding control frames
    pub async fn recv_message(&mut self) -> Option<(ActorId, M)> {
        while let Some(frame) = self.rx.recv().await {
            if let Frame::Payload { from, msg, .. } = frame {
                return Some((from.id, msg));
            }
        }
        None
    }
}

/// Location-transparent reference to a mailbox
pub struct ActorRef<M> {
    id: ActorId,
    mailbox: mpsc::UnboundedSender<Frame<M>>,
    hosted: bool,
}

impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            mailbox: self.mailbox.clone(),
            hosted: self.hosted,
        }
    }
}

impl<M> PartialEq for ActorRef<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for ActorRef<M> {}

impl<M> Hash for ActorRef<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<M> fmt::Debug for ActorRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.id)
            .field("endpoint", &!self.hosted)
            .field("closed", &self.mailbox.is_closed())
            .finish()
    }
}

impl<M> ActorRef<M> {
    /// Fresh identity and mailbox for a non-actor participant
    ///
    /// Nothing answers configuration requests sent to an endpoint, so
    /// [`ActorRef::ioctl_async`] refuses them.
    pub fn endpoint() -> (Self, MailboxReceiver<M>) {
        Self::with_mailbox(false)
    }

    /// Mailbox drained by a spawned actor
    pub(crate) fn hosted() -> (Self, MailboxReceiver<M>) {
        Self::with_mailbox(true)
    }

    fn with_mailbox(hosted: bool) -> (Self, MailboxReceiver<M>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor_ref = Self {
            id: ActorId::new(),
            mailbox: tx,
            hosted,
        };
        (actor_ref, MailboxReceiver { rx })
    }

    /// True for references created by [`ActorRef::endpoint`]
    pub fn is_endpoint(&self) -> bool {
        !self.hosted
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// True once the owning actor has terminated
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Put a raw frame in the mailbox
    pub fn deliver(&self, frame: Frame<M>) -> Result<()> {
        self.mailbox.send(frame).map_err(|_| ActorError::MailboxClosed {
            actor: self.id.clone(),
        })
    }

    /// Fire-and-forget payload
    pub fn send(&self, from: &ActorRef<M>, msg: M) -> Result<()> {
        self.deliver(Frame::Payload {
            from: from.clone(),
            msg,
            ack: Ack::none(),
        })
    }

    /// Tagged payload; resolves with the handler's acknowledgment
    pub async fn call(&self, from: &ActorRef<M>, msg: M) -> Result<M> {
        let (ack, rx) = Ack::channel();
        self.deliver(Frame::Payload {
            from: from.clone(),
            msg,
            ack,
        })?;
        self.await_reply(rx).await
    }

    /// Queue a configuration request; the reply arrives on the returned
    /// receiver once the actor reaches it in mailbox order
    pub fn ioctl_async(&self, request: Ioctl<M>) -> Result<oneshot::Receiver<IoctlReply<M>>> {
        if !self.hosted {
            return Err(ActorError::Endpoint {
                actor: self.id.clone(),
            });
        }
        let (ack, rx) = Ack::channel();
        self.deliver(Frame::Ioctl { request, ack })?;
        Ok(rx)
    }

    /// Configuration request awaited in place
    pub async fn ioctl(&self, request: Ioctl<M>) -> Result<IoctlReply<M>> {
        let rx = self.ioctl_async(request)?;
        self.await_reply(rx).await
    }

    /// Bind `peer` to `side`, returning the peer it replaced
    pub async fn bind(&self, side: Side, peer: &ActorRef<M>) -> Result<Option<ActorRef<M>>> {
        match self.ioctl(Ioctl::Bind(side, peer.clone())).await? {
            IoctlReply::Peer(previous) => Ok(previous),
            other => Err(self.unexpected(&other)),
        }
    }

    pub async fn read_bind(&self, side: Side) -> Result<Option<ActorRef<M>>> {
        match self.ioctl(Ioctl::ReadBind(side)).await? {
            IoctlReply::Peer(current) => Ok(current),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Replace the execution quota; `None` turns rate limiting off
    pub async fn set_rate(&self, rate: Option<Rate>) -> Result<()> {
        match self.ioctl(Ioctl::SetRate(rate)).await? {
            IoctlReply::Ok => Ok(()),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Forward a setting to the state machine; failures are masked by the actor
    pub async fn set(&self, key: impl Into<String>, value: Value) -> Result<()> {
        match self.ioctl(Ioctl::Set(key.into(), value)).await? {
            IoctlReply::Ok => Ok(()),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Read a setting; `None` when the state machine has no value for it
    pub async fn get(&self, key: impl Into<String>) -> Result<Option<Value>> {
        match self.ioctl(Ioctl::Get(key.into())).await? {
            IoctlReply::Value(value) => Ok(Some(value)),
            IoctlReply::Undefined => Ok(None),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Ledger balance this actor holds for `peer`
    pub async fn credit_of(&self, peer: &ActorId) -> Result<u64> {
        match self.ioctl(Ioctl::ReadCredit(peer.clone())).await? {
            IoctlReply::Credit(credit) => Ok(credit),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Replenish the credit this actor holds for `from`
    pub fn grant_credit(&self, from: &ActorId, delta: u64) -> Result<()> {
        self.deliver(Frame::Credit {
            from: from.clone(),
            delta,
        })
    }

    pub fn shutdown(&self) -> Result<()> {
        self.deliver(Frame::Shutdown)
    }

    async fn await_reply<R>(&self, rx: oneshot::Receiver<R>) -> Result<R> {
        rx.await.map_err(|_| ActorError::NoReply {
            actor: self.id.clone(),
        })
    }

    fn unexpected(&self, reply: &IoctlReply<M>) -> ActorError {
        let kind = match reply {
            IoctlReply::Ok => "ok",
            IoctlReply::Peer(_) => "peer",
            IoctlReply::Value(_) => "value",
            IoctlReply::Credit(_) => "credit",
            IoctlReply::Undefined => "undefined",
        };
        ActorError::UnexpectedReply {
            actor: self.id.clone(),
            kind: kind.to_string(),
        }
    }
}

/// Running actor: its reference, metrics and task
pub struct ActorHandle<M> {
    actor_ref: ActorRef<M>,
    metrics: Arc<ActorMetrics>,
    task: JoinHandle<Result<StopReason>>,
}

impl<M> ActorHandle<M> {
    pub(crate) fn new(
        actor_ref: ActorRef<M>,
        metrics: Arc<ActorMetrics>,
        task: JoinHandle<Result<StopReason>>,
    ) -> Self {
        Self {
            actor_ref,
            metrics,
            task,
        }
    }

    pub fn id(&self) -> &ActorId {
        self.actor_ref.id()
    }

    pub fn actor_ref(&self) -> &ActorRef<M> {
        &self.actor_ref
    }

    pub fn metrics(&self) -> Arc<ActorMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Wait for termination; resolves to the stop reason or the fatal error
    pub async fn join(self) -> Result<StopReason> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ActorError::Task {
                message: e.to_string(),
            }),
        }
    }
}

impl<M> fmt::Debug for ActorHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("actor_ref", &self.actor_ref)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}
