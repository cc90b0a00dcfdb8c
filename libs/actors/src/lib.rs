//! Pipe Actor Runtime
//!
//! Hosts pluggable state machines inside tokio actors that sit in a
//! two-sided pipe. Every actor has an upstream side (A) and a downstream
//! side (B); a message arriving from one side is handed to the state
//! machine together with the opposite side as its target.
//!
//! # Architecture
//!
//! ```text
//!            A                         B
//!  ┌──────────┐    ┌──────────────────────┐    ┌────────────┐
//!  │ upstream │───▶│  Actor               │───▶│ downstream │
//!  │          │◀───│  ┌────────────────┐  │◀───│            │
//!  └──────────┘    │  │ StateMachine   │  │    └────────────┘
//!                  │  │ state + data   │  │
//!                  │  └────────────────┘  │
//!                  │  RateLimiter         │
//!                  │  CreditLedger        │
//!                  └──────────────────────┘
//!                        ▲
//!                        │ Ioctl: bind / rate / set / get / credit
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use pipe_actors::{pipe, spawn, ActorConfig, ActorRef};
//!
//! let first = spawn(Upcase, (), ActorConfig::default()).await?;
//! let second = spawn(Upcase, (), ActorConfig::default().with_rate(10, Duration::from_secs(1))).await?;
//! let (source, _replies) = ActorRef::endpoint();
//! let (sink, mut inbox) = ActorRef::endpoint();
//!
//! // endpoints at either end are left unbound; only the actors get sides
//! pipe::make(&[source.clone(), first.actor_ref().clone(), second.actor_ref().clone(), sink]).await?;
//! first.actor_ref().send(&source, "hello".to_string())?;
//! assert_eq!(inbox.recv_message().await.map(|(_, m)| m), Some("HELLO".to_string()));
//! ```

pub mod actor;
pub mod clock;
pub mod config;
pub mod credit;
pub mod error;
pub mod handle;
pub mod machine;
pub mod messages;
pub mod pipe;
pub mod rate;
pub mod system;

pub use clock::{Clock, ManualClock, Timestamp, WallClock};
pub use config::{ActorConfig, RateConfig};
pub use credit::{CreditLedger, DEFAULT_MAX_CREDIT};
pub use error::{ActorError, Result};
pub use handle::{ActorHandle, ActorId, ActorRef, MailboxReceiver};
pub use machine::{Hint, StateMachine, StopReason, Transition};
pub use messages::{Ack, Frame, Ioctl, IoctlReply};
pub use pipe::{Pipe, Side};
pub use rate::{Permit, Rate, RateLimiter};
pub use system::{spawn, spawn_with_clock, ActorMetrics, ActorStats};
