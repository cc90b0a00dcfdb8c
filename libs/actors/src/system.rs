//! Actor Spawning and Run Loop
//!
//! [`spawn`] runs the state machine initializer in the caller's task, so an
//! initializer failure comes straight back as an error and nothing is left
//! running. On success the actor moves into its own tokio task and drains
//! its mailbox one frame at a time until a shutdown frame or a stop
//! transition, then runs the finalizer exactly once.
//!
//! ## Ordering
//!
//! One mailbox, one FIFO: configuration and credit frames queue behind
//! payloads, including payloads waiting on the rate limiter.

use crate::actor::{Actor, Flow};
use crate::clock::{Clock, WallClock};
use crate::config::ActorConfig;
use crate::error::Result;
use crate::handle::{ActorHandle, ActorRef, MailboxReceiver};
use crate::machine::{StateMachine, StopReason};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Per-actor counters
#[derive(Debug, Default)]
pub struct ActorMetrics {
    pub messages_dispatched: AtomicU64,
    pub throttle_waits: AtomicU64,
    pub throttled_us_total: AtomicU64,
    pub ioctl_requests: AtomicU64,
    pub masked_failures: AtomicU64,
    pub credit_grants: AtomicU64,
}

impl ActorMetrics {
    pub fn record_dispatch(&self) {
        use std::sync::atomic::Ordering;
        self.messages_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rate-limiter wait
    pub fn record_throttle(&self, waited: Duration) {
        use std::sync::atomic::Ordering;
        self.throttle_waits.fetch_add(1, Ordering::Relaxed);
        self.throttled_us_total
            .fetch_add(waited.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_ioctl(&self) {
        use std::sync::atomic::Ordering;
        self.ioctl_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a configuration failure that was answered with a fixed reply
    pub fn record_masked_failure(&self) {
        use std::sync::atomic::Ordering;
        self.masked_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_credit_grant(&self) {
        use std::sync::atomic::Ordering;
        self.credit_grants.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ActorStats {
        use std::sync::atomic::Ordering;
        ActorStats {
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            throttle_waits: self.throttle_waits.load(Ordering::Relaxed),
            throttled_us_total: self.throttled_us_total.load(Ordering::Relaxed),
            ioctl_requests: self.ioctl_requests.load(Ordering::Relaxed),
            masked_failures: self.masked_failures.load(Ordering::Relaxed),
            credit_grants: self.credit_grants.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ActorMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActorStats {
    pub messages_dispatched: u64,
    pub throttle_waits: u64,
    pub throttled_us_total: u64,
    pub ioctl_requests: u64,
    pub masked_failures: u64,
    pub credit_grants: u64,
}

/// Spawn an actor on the wall clock
pub async fn spawn<S: StateMachine>(
    module: S,
    args: S::Args,
    config: ActorConfig,
) -> Result<ActorHandle<S::Message>> {
    spawn_with_clock(module, args, config, Arc::new(WallClock)).await
}

/// Spawn an actor on the given clock
pub async fn spawn_with_clock<S: StateMachine>(
    module: S,
    args: S::Args,
    config: ActorConfig,
    clock: Arc<dyn Clock>,
) -> Result<ActorHandle<S::Message>> {
    let start_time = Instant::now();
    let (actor_ref, mailbox) = ActorRef::hosted();
    let metrics = Arc::new(ActorMetrics::default());

    debug!(
        actor_id = %actor_ref.id(),
        module = std::any::type_name::<S>(),
        "Spawning new actor"
    );

    let actor = Actor::init(
        module,
        args,
        actor_ref.clone(),
        &config,
        clock,
        Arc::clone(&metrics),
    )
    .await?;

    let task = tokio::spawn(run(actor, mailbox));

    info!(
        actor_id = %actor_ref.id(),
        module = std::any::type_name::<S>(),
        spawn_duration_us = start_time.elapsed().as_micros() as u64,
        "Actor spawned successfully"
    );
    Ok(ActorHandle::new(actor_ref, metrics, task))
}

async fn run<S: StateMachine>(
    mut actor: Actor<S>,
    mut mailbox: MailboxReceiver<S::Message>,
) -> Result<StopReason> {
    let task_start = Instant::now();
    let actor_id = actor.id().clone();
    debug!(actor_id = %actor_id, "Entering message loop");

    let reason = loop {
        // unreachable while the actor holds its own reference
        let Some(frame) = mailbox.recv().await else {
            break StopReason::Normal;
        };
        let kind = frame.kind();
        match actor.process(frame).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop(reason)) => break reason,
            Err(e) => {
                error!(
                    actor_id = %actor_id,
                    error = %e,
                    error_category = e.category(),
                    frame = kind,
                    runtime_ms = task_start.elapsed().as_millis() as u64,
                    "Actor crashed while processing frame"
                );
                return Err(e);
            }
        }
    };

    // frames still queued are dropped with their acks
    drop(mailbox);

    let result = actor.terminate(reason).await;
    info!(
        actor_id = %actor_id,
        total_runtime_ms = task_start.elapsed().as_millis() as u64,
        clean = result.is_ok(),
        "Actor task execution completed"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, Timestamp};
    use crate::error::ActorError;
    use crate::machine::Transition;
    use crate::messages::{Ioctl, IoctlReply};
    use crate::pipe::{Pipe, Side};
    use anyhow::bail;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Mode {
        Echo,
    }

    /// Acks every request with the doubled payload and counts finalizer calls
    #[derive(Default)]
    struct Doubler {
        freed: Arc<Mutex<Vec<(StopReason, u64)>>>,
    }

    #[async_trait]
    impl StateMachine for Doubler {
        type Message = u64;
        type State = Mode;
        type Data = u64;
        type Args = bool;

        async fn init(&self, fail: bool) -> anyhow::Result<(Mode, u64)> {
            if fail {
                bail!("refusing to start");
            }
            Ok((Mode::Echo, 0))
        }

        async fn handle(
            &self,
            state: Mode,
            msg: u64,
            pipe: &mut Pipe<u64>,
            handled: &mut u64,
        ) -> anyhow::Result<Transition<Mode>> {
            match state {
                Mode::Echo => {
                    *handled += 1;
                    pipe.ack(msg * 2);
                    if msg == 0 {
                        return Ok(Transition::Stop(StopReason::other("done")));
                    }
                    Ok(Transition::Next(Mode::Echo))
                }
            }
        }

        async fn free(&self, reason: &StopReason, handled: u64) -> anyhow::Result<()> {
            self.freed.lock().push((reason.clone(), handled));
            Ok(())
        }
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = ActorMetrics::default();
        metrics.record_dispatch();
        metrics.record_throttle(Duration::from_millis(3));
        metrics.record_throttle(Duration::from_micros(10));
        metrics.record_credit_grant();
        let stats = metrics.snapshot();
        assert_eq!(stats.messages_dispatched, 1);
        assert_eq!(stats.throttle_waits, 2);
        assert_eq!(stats.throttled_us_total, 3_010);
        assert_eq!(stats.credit_grants, 1);
        assert_eq!(stats.ioctl_requests, 0);
    }

    #[tokio::test]
    async fn test_spawn_init_failure() {
        let result = spawn(Doubler::default(), true, ActorConfig::default()).await;
        assert!(matches!(result, Err(ActorError::Init { .. })));
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_rate() {
        let config = ActorConfig::default().with_rate(0, Duration::from_secs(1));
        let result = spawn(Doubler::default(), false, config).await;
        assert!(matches!(result, Err(ActorError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_call_and_stop_transition() {
        let module = Doubler::default();
        let freed = Arc::clone(&module.freed);
        let handle = spawn(module, false, ActorConfig::default()).await.unwrap();
        let (client, _client_rx) = ActorRef::endpoint();
        let actor = handle.actor_ref().clone();

        assert_eq!(actor.call(&client, 21).await.unwrap(), 42);
        assert_eq!(actor.call(&client, 0).await.unwrap(), 0);

        assert_eq!(handle.join().await.unwrap(), StopReason::other("done"));
        assert_eq!(freed.lock().as_slice(), &[(StopReason::other("done"), 2)]);

        // nothing is dispatched after the stop
        assert!(matches!(
            actor.send(&client, 5),
            Err(ActorError::MailboxClosed { .. })
        ));
        assert!(actor.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_finalizes_once() {
        let module = Doubler::default();
        let freed = Arc::clone(&module.freed);
        let handle = spawn(module, false, ActorConfig::default()).await.unwrap();
        let (client, _client_rx) = ActorRef::endpoint();
        let actor = handle.actor_ref().clone();

        actor.send(&client, 1).unwrap();
        actor.shutdown().unwrap();
        let late = actor.ioctl_async(Ioctl::ReadBind(Side::A));

        assert_eq!(handle.join().await.unwrap(), StopReason::Normal);
        assert_eq!(freed.lock().as_slice(), &[(StopReason::Normal, 1)]);

        // queued behind the shutdown: dropped without an ack
        match late {
            Ok(rx) => assert!(rx.await.is_err()),
            Err(e) => assert!(matches!(e, ActorError::MailboxClosed { .. })),
        }
        assert!(actor.shutdown().is_err());
    }

    #[tokio::test]
    async fn test_ioctl_waits_behind_throttled_payload() {
        let clock = ManualClock::new(Timestamp::new(50, 0));
        let config = ActorConfig::default().with_rate(1, Duration::from_secs(10));
        let handle = spawn_with_clock(Doubler::default(), false, config, Arc::new(clock.clone()))
            .await
            .unwrap();
        let (client, _client_rx) = ActorRef::endpoint();
        let actor = handle.actor_ref();

        actor.send(&client, 1).unwrap();
        actor.send(&client, 2).unwrap();
        let reply = actor.ioctl(Ioctl::ReadBind(Side::B)).await.unwrap();
        assert_eq!(reply, IoctlReply::Peer(None));

        // the second payload had to wait out the first window before the ioctl ran
        assert_eq!(clock.slept(), Duration::from_secs(10));
        let stats = handle.metrics().snapshot();
        assert_eq!(stats.messages_dispatched, 2);
        assert_eq!(stats.throttle_waits, 1);

        actor.shutdown().unwrap();
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_crash_ends_task_with_transition_error() {
        #[derive(Default)]
        struct Fragile;

        #[async_trait]
        impl StateMachine for Fragile {
            type Message = u64;
            type State = Mode;
            type Data = ();
            type Args = ();

            async fn init(&self, _: ()) -> anyhow::Result<(Mode, ())> {
                Ok((Mode::Echo, ()))
            }

            async fn handle(
                &self,
                _state: Mode,
                _msg: u64,
                _pipe: &mut Pipe<u64>,
                _data: &mut (),
            ) -> anyhow::Result<Transition<Mode>> {
                bail!("handler exploded")
            }
        }

        let handle = spawn(Fragile, (), ActorConfig::default()).await.unwrap();
        let (client, _client_rx) = ActorRef::endpoint();
        handle.actor_ref().send(&client, 1).unwrap();
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, ActorError::Transition { ref message, .. } if message == "handler exploded"));
    }
}
