//! Well-defined alternatives to types in std::time.
//! Provides a signed Duration and UTC timestamps with
//! nanoseconds precision.

/// A signed Duration.
pub type Duration = time::Duration;

/// Monotonic clock time.
pub type Instant = time::Instant;

/// UTC time in nanoseconds precision.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Utc(pub(crate) Duration);

impl std::fmt::Debug for Utc {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        (std::time::SystemTime::UNIX_EPOCH + self.0).fmt(f)
    }
}

/// Start of the unix epoch.
pub const UNIX_EPOCH: Utc = Utc(Duration::ZERO);

impl Utc {
    /// Constructs a timestamp from nanoseconds since the unix epoch.
    pub fn from_unix_nanos(nanos: i64) -> Self {
        Self(Duration::nanoseconds(nanos))
    }

    /// Nanoseconds since the unix epoch.
    /// Timestamps are exchanged between peers in this form.
    pub fn unix_nanos(&self) -> i128 {
        self.0.whole_nanoseconds()
    }
}

/// Represents an optional deadline.
/// Isomorphic to `Option<time::Instant>`,
/// however the total ordering on `Deadline` is purposefully
/// defined, while on `Option<time::Instant>` it is accidental.
/// By the definition of derive(PartialEq), Finite(...) < Infinite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Deadline {
    /// Finite deadline.
    Finite(Instant),
    /// Infinite deadline.
    Infinite,
}

impl Deadline {
    /// Checks whether the deadline has passed at `now`.
    pub fn has_passed(&self, now: Instant) -> bool {
        match self {
            Self::Finite(t) => *t <= now,
            Self::Infinite => false,
        }
    }
}

impl From<Instant> for Deadline {
    fn from(t: Instant) -> Self {
        Self::Finite(t)
    }
}

impl std::ops::Add<Duration> for Utc {
    type Output = Self;

    fn add(self, d: Duration) -> Self {
        Self(self.0 + d)
    }
}

impl std::ops::AddAssign<Duration> for Utc {
    fn add_assign(&mut self, d: Duration) {
        self.0 += d;
    }
}

impl std::ops::Sub<Utc> for Utc {
    type Output = Duration;
    fn sub(self, b: Self) -> Duration {
        self.0 - b.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_ordering() {
        let now = Instant::now();
        assert!(Deadline::Finite(now) < Deadline::Infinite);
        assert!(Deadline::Finite(now).has_passed(now));
        assert!(!Deadline::Finite(now + Duration::seconds(1)).has_passed(now));
        assert!(!Deadline::Infinite.has_passed(now + Duration::seconds(1000)));
    }

    #[test]
    fn utc_nanos() {
        let t = Utc::from_unix_nanos(891_082_933_154_890_243);
        assert_eq!(t.unix_nanos(), 891_082_933_154_890_243);
        assert_eq!((t + Duration::nanoseconds(7)) - t, Duration::nanoseconds(7));
        assert_eq!(UNIX_EPOCH.unix_nanos(), 0);
    }
}
