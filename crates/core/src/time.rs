use chrono::{DateTime, Utc};

/// Wall clock used to stamp a session.
///
/// The countdown is tick-driven and never reads this clock; it only supplies
/// `started_at` / `submitted_at` and the wall time reported when a session
/// ends. Pinning it keeps those stamps deterministic in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Clock {
    pinned: Option<DateTime<Utc>>,
}

impl Clock {
    #[must_use]
    pub const fn system() -> Self {
        Self { pinned: None }
    }

    /// A clock that always reads `at`.
    #[must_use]
    pub const fn pinned(at: DateTime<Utc>) -> Self {
        Self { pinned: Some(at) }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.pinned.unwrap_or_else(Utc::now)
    }

    /// Whole seconds from `start` to now; zero if `start` lies ahead.
    #[must_use]
    pub fn secs_since(&self, start: DateTime<Utc>) -> u32 {
        let secs = (self.now() - start).num_seconds().max(0);
        u32::try_from(secs).unwrap_or(u32::MAX)
    }
}

/// Deterministic timestamp for tests (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::from_timestamp(FIXED_TEST_TIMESTAMP, 0).unwrap_or_default()
}

#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::pinned(fixed_now())
}
