//! When the daily reset fires.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Days, LocalResult, NaiveDateTime, TimeZone};

use crate::config::parse_duration;

/// Minimum allowed interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum allowed interval (one year).
pub const MAX_INTERVAL: Duration = Duration::from_secs(366 * 24 * 3600);

/// Config keyword selecting [`Schedule::Midnight`].
const MIDNIGHT: &str = "midnight";

/// Firing schedule for the reset scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    /// Once per calendar day at local midnight.
    #[default]
    Midnight,

    /// Fixed interval between resets, measured on the monotonic clock.
    ///
    /// Meant for development and tests. Build it through
    /// [`Schedule::interval`] to get the 1 second minimum applied.
    Interval(Duration),
}

impl Schedule {
    /// Create an interval schedule.
    ///
    /// Interval is clamped to between 1 second and one year.
    pub fn interval(duration: Duration) -> Self {
        if duration < MIN_INTERVAL {
            tracing::warn!(min_interval = ?MIN_INTERVAL,
                "Interval duration is less than minimum allowed. Using minimum duration."
            );
            Self::Interval(MIN_INTERVAL)
        } else if duration > MAX_INTERVAL {
            tracing::warn!(max_interval = ?MAX_INTERVAL,
                "Interval duration exceeds maximum allowed. Using maximum duration."
            );
            Self::Interval(MAX_INTERVAL)
        } else {
            Self::Interval(duration)
        }
    }

    /// Whether firing times are anchored to the wall clock.
    ///
    /// A wall-clock schedule re-checks the local time after waking and keeps
    /// waiting if the clock was adjusted and the slot is still in the future.
    pub fn is_wall_clock(&self) -> bool {
        matches!(self, Self::Midnight)
    }

    /// Compute the next firing time.
    ///
    /// `previous` is the slot that fired last, if any. For [`Schedule::Midnight`]
    /// the result is strictly after both `now` and `previous`, so a clock that
    /// steps backwards after a reset cannot schedule the same midnight twice.
    pub fn next_fire<Tz: TimeZone>(
        &self,
        now: DateTime<Tz>,
        previous: Option<DateTime<Tz>>,
    ) -> DateTime<Tz> {
        match self {
            Self::Midnight => {
                let from = match previous {
                    Some(prev) if prev > now => prev,
                    _ => now,
                };
                next_midnight(&from)
            }
            Self::Interval(d) => chrono::Duration::from_std(*d)
                .ok()
                .and_then(|delta| now.clone().checked_add_signed(delta))
                .unwrap_or(now),
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Midnight => write!(f, "daily at local midnight"),
            Self::Interval(d) => write!(f, "every {:?}", d),
        }
    }
}

impl FromStr for Schedule {
    type Err = String;

    /// Parse `midnight` or a humantime duration (`10m`, `1h30m`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(MIDNIGHT) {
            return Ok(Self::Midnight);
        }
        parse_duration(s)
            .map(Self::interval)
            .map_err(|e| format!("expected 'midnight' or a duration, got '{s}': {e}"))
    }
}

/// The first local midnight strictly after `now`.
///
/// Midnight can be skipped by a DST transition (clocks jump from 23:59 to
/// 01:00 in some zones); the first valid local time after the gap is used
/// instead. An ambiguous midnight resolves to its earliest instant.
pub fn next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();

    loop {
        date = date.checked_add_days(Days::new(1)).unwrap_or(date);
        let midnight = date.and_time(chrono::NaiveTime::MIN);
        if let Some(next) = resolve_local(&tz, midnight)
            && next > *now
        {
            return next;
        }
        if date == chrono::NaiveDate::MAX {
            return now.clone();
        }
    }
}

/// Map a naive local time to an instant, stepping forward through DST gaps.
fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    // DST gaps are at most a couple of hours; probe in 15 minute steps.
    (0..=12)
        .map(|step| local + chrono::Duration::minutes(15 * step))
        .find_map(|candidate| match tz.from_local_datetime(&candidate) {
            LocalResult::Single(t) => Some(t),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => None,
        })
}
