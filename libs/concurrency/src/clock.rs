//! Non-global clock owned by the operator.
//! Reading the system clock directly makes deadline-driven code
//! non-deterministic and hard to test, so every time read in the
//! operator goes through a [`Clock`].
//!
//! Clock provides 2 types of time reads:
//! 1. `now()` (aka POSIX CLOCK_MONOTONIC). Used for deadlines
//!    (leader rotation, balance refresh cool-down).
//! 2. `now_utc()` (aka POSIX CLOCK_REALTIME). Used whenever a timestamp
//!    is communicated over the network.
use crate::time;
use std::sync::{Arc, Mutex, OnceLock};

// Instant doesn't have a deterministic constructor.
// However since Instant is not convertible to an unix timestamp,
// we can snapshot Instant::now() once and treat it as a constant.
static FAKE_CLOCK_MONO_START: OnceLock<time::Instant> = OnceLock::new();

// An arbitrary non-trivial deterministic UTC timestamp, so that the tests
// using the manual clock have reproducible results.
const FAKE_CLOCK_UTC_START: time::Utc = time::Utc(time::Duration::new(891082933, 154890243));

/// Realtime clock.
#[derive(Debug, Clone)]
pub struct RealClock;

impl RealClock {
    /// Current time according to the monotone clock.
    pub fn now(&self) -> time::Instant {
        // We use `now()` from tokio, so that `tokio::time::pause()`
        // works in tests.
        tokio::time::Instant::now().into_std().into()
    }

    /// Current time according to the system/walltime clock.
    pub fn now_utc(&self) -> time::Utc {
        use std::time::SystemTime as T;
        time::Utc(match T::now().duration_since(T::UNIX_EPOCH) {
            Ok(duration) => time::Duration::try_from(duration).unwrap_or(time::Duration::MAX),
            Err(err) => -time::Duration::try_from(err.duration()).unwrap_or(time::Duration::MAX),
        })
    }
}

#[derive(Debug)]
struct ManualState {
    mono: time::Instant,
    utc: time::Utc,
}

/// Fake clock which supports manually advancing the time.
/// Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<Mutex<ManualState>>);

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Constructs a manual clock set to a fixed starting point.
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ManualState {
            mono: *FAKE_CLOCK_MONO_START.get_or_init(time::Instant::now),
            utc: FAKE_CLOCK_UTC_START,
        })))
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // The state is plain data, a panic while holding the lock cannot corrupt it.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current time according to the monotone clock.
    pub fn now(&self) -> time::Instant {
        self.state().mono
    }

    /// Current time according to the system/walltime clock.
    pub fn now_utc(&self) -> time::Utc {
        self.state().utc
    }

    /// Advances monotonic and utc clocks by `d`.
    /// Negative durations are ignored, the clock never goes back.
    pub fn advance(&self, d: time::Duration) {
        if d <= time::Duration::ZERO {
            return;
        }
        let mut this = self.state();
        this.mono += d;
        this.utc += d;
    }

    /// Advances monotonic and utc clocks to `t`.
    /// Noop if `t` is already in the past.
    pub fn advance_until(&self, t: time::Instant) {
        let mut this = self.state();
        if t <= this.mono {
            return;
        }
        let d = t - this.mono;
        this.mono = t;
        this.utc += d;
    }
}

/// An abstract clock.
/// We use a concrete enum rather than a trait to
/// avoid abstract method call in runtime.
#[derive(Debug, Clone)]
pub enum Clock {
    /// Realtime clock.
    Real(RealClock),
    /// Manual clock.
    Manual(ManualClock),
}

impl From<RealClock> for Clock {
    fn from(c: RealClock) -> Self {
        Self::Real(c)
    }
}

impl From<ManualClock> for Clock {
    fn from(c: ManualClock) -> Self {
        Self::Manual(c)
    }
}

impl Clock {
    /// Current time according to the monotone clock.
    pub fn now(&self) -> time::Instant {
        match self {
            Self::Real(c) => c.now(),
            Self::Manual(c) => c.now(),
        }
    }

    /// Current time according to the system/walltime clock.
    pub fn now_utc(&self) -> time::Utc {
        match self {
            Self::Real(c) => c.now_utc(),
            Self::Manual(c) => c.now_utc(),
        }
    }
}
