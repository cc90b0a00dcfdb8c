//! Execution Rate Limiter
//!
//! Fixed-window quota: at most `quota` transitions per `period`. The window
//! ends at `deadline`; once the quota is spent the caller either waits for
//! the deadline or, if it already passed, rolls the window over at once.

use crate::clock::Timestamp;
use crate::error::{ActorError, Result};
use std::num::NonZeroU32;
use std::time::Duration;

/// Validated rate option: `quota` transitions per `period`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    quota: NonZeroU32,
    period: Duration,
}

impl Rate {
    pub fn new(quota: u32, period: Duration) -> Result<Self> {
        let quota = NonZeroU32::new(quota)
            .ok_or_else(|| ActorError::configuration("rate quota must be positive", Some("quota")))?;
        if period.as_micros() == 0 {
            return Err(ActorError::configuration(
                "rate period must be at least one microsecond",
                Some("period"),
            ));
        }
        Ok(Self { quota, period })
    }

    pub fn quota(&self) -> u32 {
        self.quota.get()
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Outcome of asking the limiter for a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// Run the transition now
    Ready,
    /// Quota spent; sleep this long, roll over and ask again
    Wait(Duration),
}

/// Tick counter against a quota with a rotating deadline
#[derive(Debug, Clone)]
pub struct RateLimiter {
    rate: Rate,
    tick: u32,
    deadline: Timestamp,
}

impl RateLimiter {
    /// Open the first window at `now`
    pub fn new(rate: Rate, now: Timestamp) -> Self {
        Self {
            rate,
            tick: 0,
            deadline: now.add(rate.period),
        }
    }

    /// Ask for a slot at `now`
    ///
    /// An elapsed window is rolled over here; a live window with the quota
    /// spent yields the time left until its deadline.
    pub fn check(&mut self, now: Timestamp) -> Permit {
        if self.tick < self.rate.quota() {
            return Permit::Ready;
        }
        match now.until(self.deadline) {
            Some(remaining) => Permit::Wait(remaining),
            None => {
                self.rollover(now);
                Permit::Ready
            }
        }
    }

    /// Count a completed transition against the current window
    pub fn record(&mut self) {
        self.tick = self.tick.saturating_add(1);
    }

    /// Start a fresh window at `now`
    pub fn rollover(&mut self, now: Timestamp) {
        self.tick = 0;
        self.deadline = now.add(self.rate.period);
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn deadline(&self) -> Timestamp {
        self.deadline
    }
}
