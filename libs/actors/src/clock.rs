//! Wall Clock Abstraction
//!
//! Rate-limit windows are measured against wall-clock timestamps kept as a
//! `(secs, micros)` pair. Adding a duration carries whole seconds out of the
//! microsecond component, so rolling a window forward any number of times
//! lands on exactly the same instant as one addition of the total.
//!
//! All time reads and sleeps in the runtime go through [`Clock`]:
//!
//! - [`WallClock`]: production, `SystemTime` plus `tokio::time::sleep`
//! - [`ManualClock`]: deterministic, sleeping advances virtual time

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Microseconds per second, the modulus of the fine component
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Wall-clock instant as whole seconds plus microseconds within the second
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    secs: u64,
    micros: u32,
}

impl Timestamp {
    /// Build a timestamp, normalizing `micros` into `secs`
    pub fn new(secs: u64, micros: u64) -> Self {
        Self::default().add_micros(secs.saturating_mul(MICROS_PER_SEC)).add_micros(micros)
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn micros(&self) -> u32 {
        self.micros
    }

    /// Add `delta` microseconds with carry into the seconds component
    pub fn add_micros(self, delta: u64) -> Self {
        let fine = self.micros as u64 + delta % MICROS_PER_SEC;
        let carry = delta / MICROS_PER_SEC + fine / MICROS_PER_SEC;
        Self {
            secs: self.secs.saturating_add(carry),
            micros: (fine % MICROS_PER_SEC) as u32,
        }
    }

    /// Add a duration, truncated to microsecond resolution
    pub fn add(self, duration: Duration) -> Self {
        self.add_micros(duration.as_micros().min(u64::MAX as u128) as u64)
    }

    /// Time left until `later`, or `None` if `later` is not in the future
    pub fn until(&self, later: Timestamp) -> Option<Duration> {
        if later <= *self {
            return None;
        }
        let (mut secs, mut micros) = (later.secs - self.secs, later.micros as i64 - self.micros as i64);
        if micros < 0 {
            secs -= 1;
            micros += MICROS_PER_SEC as i64;
        }
        Some(Duration::from_secs(secs) + Duration::from_micros(micros as u64))
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            secs: since_epoch.as_secs(),
            micros: since_epoch.subsec_micros(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}

/// Time source for the actor runtime
///
/// Code that reads the current time or sleeps must use this trait so rate
/// limiting can be driven deterministically in tests.
#[async_trait]
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock instant
    fn now(&self) -> Timestamp;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

#[async_trait]
impl Clock for WallClock {
    fn now(&self) -> Timestamp {
        Timestamp::from(SystemTime::now())
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic clock; `sleep` returns immediately after advancing time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    now: Timestamp,
    slept: Duration,
    sleeps: u64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualState {
                now: start,
                ..ManualState::default()
            })),
        }
    }

    /// Move time forward without counting it as a sleep
    pub fn advance(&self, duration: Duration) {
        let mut state = self.inner.lock();
        state.now = state.now.add(duration);
    }

    /// Total time spent in `sleep`
    pub fn slept(&self) -> Duration {
        self.inner.lock().slept
    }

    /// Number of `sleep` calls
    pub fn sleeps(&self) -> u64 {
        self.inner.lock().sleeps
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.inner.lock().now
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.inner.lock();
        state.now = state.now.add(duration);
        state.slept += duration;
        state.sleeps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_carry_into_seconds() {
        let ts = Timestamp::new(10, 999_500);
        let next = ts.add_micros(700);
        assert_eq!(next, Timestamp::new(11, 200));
        assert_eq!(next.micros(), 200);
    }

    #[test]
    fn test_new_normalizes_micros() {
        let ts = Timestamp::new(1, 2_500_000);
        assert_eq!(ts.secs(), 3);
        assert_eq!(ts.micros(), 500_000);
        assert_eq!(ts.to_string(), "3.500000");
    }

    #[test]
    fn test_until() {
        let a = Timestamp::new(5, 900_000);
        let b = Timestamp::new(7, 100_000);
        assert_eq!(a.until(b), Some(Duration::from_millis(1_200)));
        assert_eq!(b.until(a), None);
        assert_eq!(a.until(a), None);
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new(Timestamp::new(100, 0));
        clock.sleep(Duration::from_millis(1_500)).await;
        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.now(), Timestamp::new(102, 0));
        assert_eq!(clock.slept(), Duration::from_millis(1_500));
        assert_eq!(clock.sleeps(), 1);
    }

    #[test]
    fn test_wall_clock_is_after_epoch() {
        assert!(WallClock.now() > Timestamp::new(1_600_000_000, 0));
    }

    proptest! {
        #[test]
        fn repeated_rollover_has_no_drift(
            secs in 0u64..1_000_000,
            micros in 0u64..1_000_000,
            period in 1u64..10_000_000,
            rollovers in 1u64..500,
        ) {
            let start = Timestamp::new(secs, micros);
            let stepped = (0..rollovers).fold(start, |ts, _| ts.add_micros(period));
            prop_assert_eq!(stepped, start.add_micros(period * rollovers));
        }

        #[test]
        fn until_inverts_add(secs in 0u64..1_000_000, micros in 0u64..1_000_000, delta in 1u64..100_000_000) {
            let start = Timestamp::new(secs, micros);
            prop_assert_eq!(start.until(start.add_micros(delta)), Some(Duration::from_micros(delta)));
        }
    }
}
