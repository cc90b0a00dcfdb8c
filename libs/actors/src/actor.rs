//! Pipe Actor
//!
//! Hosts one [`StateMachine`] and owns everything the machine must not see:
//! the pipe sides, the rate limiter, the credit ledger. Frames are processed
//! one at a time:
//!
//! ```text
//!   Frame::Payload ──▶ throttle ──▶ route ──▶ handle(state) ──▶ apply
//!   Frame::Ioctl   ──▶ bind / rate / set / get ──▶ ack
//!   Frame::Credit  ──▶ ledger
//!   Frame::Shutdown ─▶ stop(normal)
//! ```
//!
//! The throttle sleep happens inside the actor's own processing, so while an
//! actor waits for its window to roll over no other frame reaches it.

use crate::clock::Clock;
use crate::config::ActorConfig;
use crate::credit::CreditLedger;
use crate::error::{ActorError, Result};
use crate::handle::{ActorId, ActorRef};
use crate::machine::{Hint, StateMachine, StopReason, Transition};
use crate::messages::{Ack, Frame, Ioctl, IoctlReply};
use crate::pipe::{route, Pipe, Side};
use crate::rate::{Permit, RateLimiter};
use crate::system::ActorMetrics;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// What the run loop does after a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop(StopReason),
}

/// State machine host
pub struct Actor<S: StateMachine> {
    module: S,
    me: ActorRef<S::Message>,
    state: S::State,
    data: S::Data,
    peer_a: Option<ActorRef<S::Message>>,
    peer_b: Option<ActorRef<S::Message>>,
    limiter: Option<RateLimiter>,
    ledger: CreditLedger,
    last_hint: Option<Hint>,
    clock: Arc<dyn Clock>,
    metrics: Arc<ActorMetrics>,
}

impl<S: StateMachine> Actor<S> {
    /// Build the actor and run the state machine initializer
    ///
    /// The rate window, if any, opens before `init` runs.
    pub async fn init(
        module: S,
        args: S::Args,
        me: ActorRef<S::Message>,
        config: &ActorConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<ActorMetrics>,
    ) -> Result<Self> {
        let limiter = config.validate()?.map(|rate| RateLimiter::new(rate, clock.now()));

        let (state, data) = module.init(args).await.map_err(|e| {
            error!(
                actor_id = %me.id(),
                error = %e,
                "State machine failed to initialize"
            );
            ActorError::init(&e)
        })?;

        debug!(
            actor_id = %me.id(),
            state = ?state,
            rate_limited = limiter.is_some(),
            "State machine initialized"
        );

        Ok(Self {
            module,
            me,
            state,
            data,
            peer_a: None,
            peer_b: None,
            limiter,
            ledger: CreditLedger::new(config.max_credit),
            last_hint: None,
            clock,
            metrics,
        })
    }

    /// Classify a frame and handle it
    pub async fn process(&mut self, frame: Frame<S::Message>) -> Result<Flow> {
        match frame {
            Frame::Payload { from, msg, ack } => self.dispatch(from, msg, ack).await,
            Frame::Ioctl { request, mut ack } => {
                let reply = self.ioctl(request);
                if !ack.send(reply) {
                    trace!(actor_id = %self.me.id(), "Ioctl requester went away before the ack");
                }
                Ok(Flow::Continue)
            }
            Frame::Credit { from, delta } => {
                self.grant(&from, delta);
                Ok(Flow::Continue)
            }
            Frame::Shutdown => {
                debug!(actor_id = %self.me.id(), "Shutdown requested");
                Ok(Flow::Stop(StopReason::Normal))
            }
        }
    }

    /// Run the current transition handler for one payload
    ///
    /// Handler failures are returned as [`ActorError::Transition`] and end
    /// the actor.
    pub async fn dispatch(
        &mut self,
        from: ActorRef<S::Message>,
        msg: S::Message,
        ack: Ack<S::Message>,
    ) -> Result<Flow> {
        self.throttle().await;

        let (side, target) = route(&from, self.peer_a.as_ref(), self.peer_b.as_ref());
        let target = target.cloned();
        let mut pipe = Pipe::new(self.me.clone(), from, (side, target), ack);

        let state = self.state;
        let transition = self
            .module
            .handle(state, msg, &mut pipe, &mut self.data)
            .await
            .map_err(|e| ActorError::transition(state, &e))?;

        if let Some(limiter) = self.limiter.as_mut() {
            limiter.record();
        }
        self.metrics.record_dispatch();

        Ok(self.apply(transition))
    }

    /// Wait until the rate limiter admits one more transition
    async fn throttle(&mut self) {
        let Some(limiter) = self.limiter.as_mut() else {
            return;
        };
        loop {
            match limiter.check(self.clock.now()) {
                Permit::Ready => return,
                Permit::Wait(remaining) => {
                    debug!(
                        actor_id = %self.me.id(),
                        quota = limiter.rate().quota(),
                        wait_us = remaining.as_micros() as u64,
                        "Rate quota exhausted, waiting for window"
                    );
                    self.clock.sleep(remaining).await;
                    self.metrics.record_throttle(remaining);
                    limiter.rollover(self.clock.now());
                }
            }
        }
    }

    /// Fold a transition result into the actor
    pub fn apply(&mut self, transition: Transition<S::State>) -> Flow {
        match transition {
            Transition::Next(state) => {
                self.enter(state);
                Flow::Continue
            }
            Transition::Suspend(state, hint) => {
                self.enter(state);
                trace!(actor_id = %self.me.id(), hint = ?hint, "Suspend hint");
                self.last_hint = Some(hint);
                Flow::Continue
            }
            Transition::Stop(reason) => {
                debug!(actor_id = %self.me.id(), state = ?self.state, reason = %reason, "State machine stopped");
                Flow::Stop(reason)
            }
        }
    }

    fn enter(&mut self, state: S::State) {
        if state != self.state {
            trace!(actor_id = %self.me.id(), from = ?self.state, to = ?state, "State transition");
        }
        self.state = state;
    }

    /// Serve a configuration request
    ///
    /// State machine failures on `Set`/`Get` never escape: a failed `Set`
    /// keeps the old data and still answers `Ok`, a failed `Get` answers
    /// `Undefined`.
    pub fn ioctl(&mut self, request: Ioctl<S::Message>) -> IoctlReply<S::Message> {
        self.metrics.record_ioctl();
        match request {
            Ioctl::Bind(side, peer) => {
                info!(actor_id = %self.me.id(), side = %side, peer = %peer.id(), "Binding pipe side");
                let previous = self.side_mut(side).replace(peer);
                IoctlReply::Peer(previous)
            }
            Ioctl::ReadBind(side) => IoctlReply::Peer(self.peer(side).cloned()),
            Ioctl::SetRate(Some(rate)) => {
                debug!(
                    actor_id = %self.me.id(),
                    quota = rate.quota(),
                    period_us = rate.period().as_micros() as u64,
                    "Rate reconfigured"
                );
                self.limiter = Some(RateLimiter::new(rate, self.clock.now()));
                IoctlReply::Ok
            }
            Ioctl::SetRate(None) => {
                debug!(actor_id = %self.me.id(), "Rate limiting disabled");
                self.limiter = None;
                IoctlReply::Ok
            }
            Ioctl::Set(key, value) => {
                match self.module.configure_set(&key, value, &self.data) {
                    Ok(data) => self.data = data,
                    Err(e) => {
                        warn!(actor_id = %self.me.id(), key = %key, error = %e, "Ignoring failed setting");
                        self.metrics.record_masked_failure();
                    }
                }
                IoctlReply::Ok
            }
            Ioctl::Get(key) => match self.module.configure_get(&key, &self.data) {
                Ok(value) => IoctlReply::Value(value),
                Err(e) => {
                    debug!(actor_id = %self.me.id(), key = %key, error = %e, "Setting has no value");
                    self.metrics.record_masked_failure();
                    IoctlReply::Undefined
                }
            },
            Ioctl::ReadCredit(peer) => IoctlReply::Credit(self.ledger.credit(&peer)),
        }
    }

    /// Replenish a peer's credit; returns the new balance
    pub fn grant(&mut self, from: &ActorId, delta: u64) -> u64 {
        let credit = self.ledger.grant(from, delta);
        self.metrics.record_credit_grant();
        trace!(actor_id = %self.me.id(), peer = %from, delta, credit, "Credit granted");
        credit
    }

    /// Run the finalizer with the final data
    pub async fn terminate(self, reason: StopReason) -> Result<StopReason> {
        let id = self.me.id().clone();
        self.module.free(&reason, self.data).await.map_err(|e| {
            error!(actor_id = %id, reason = %reason, error = %e, "Finalizer failed");
            ActorError::finalize(&e)
        })?;
        debug!(actor_id = %id, reason = %reason, "Actor finalized");
        Ok(reason)
    }

    pub fn id(&self) -> &ActorId {
        self.me.id()
    }

    pub fn actor_ref(&self) -> &ActorRef<S::Message> {
        &self.me
    }

    pub fn state(&self) -> S::State {
        self.state
    }

    pub fn data(&self) -> &S::Data {
        &self.data
    }

    pub fn peer(&self, side: Side) -> Option<&ActorRef<S::Message>> {
        match side {
            Side::A => self.peer_a.as_ref(),
            Side::B => self.peer_b.as_ref(),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut Option<ActorRef<S::Message>> {
        match side {
            Side::A => &mut self.peer_a,
            Side::B => &mut self.peer_b,
        }
    }

    pub fn limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// Hint from the most recent `Suspend` transition
    pub fn last_hint(&self) -> Option<Hint> {
        self.last_hint
    }
}
