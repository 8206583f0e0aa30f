//! The Opening: a deterministic, recurring write window.
//!
//! # Responsibility
//! - Compute whether writes are accepted at a given instant.
//! - Compute the next instant at which that answer flips.
//!
//! # Invariants
//! - State is a pure function of the instant and the schedule constants.
//!   Nothing is persisted and nothing overrides it, so every process
//!   computes the same answer without coordination.
//! - The anchor offset is a fixed UTC offset; daylight saving never moves it.
//! - `opens_at <= now < next_open_at` for every computed state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

/// Derived Opening state for one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningState {
    pub is_open: bool,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub next_open_at: DateTime<Utc>,
}

/// Rejected schedule constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpeningScheduleError {
    NonPositivePeriod(i64),
    NonPositiveWindow(i64),
    WindowExceedsPeriod { window_minutes: i64, period_hours: i64 },
}

impl Display for OpeningScheduleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositivePeriod(value) => {
                write!(f, "opening period must be positive, got {value}h")
            }
            Self::NonPositiveWindow(value) => {
                write!(f, "opening window must be positive, got {value}m")
            }
            Self::WindowExceedsPeriod {
                window_minutes,
                period_hours,
            } => write!(
                f,
                "opening window {window_minutes}m does not fit in period {period_hours}h"
            ),
        }
    }
}

impl Error for OpeningScheduleError {}

/// Schedule constants for the Opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpeningSchedule {
    anchor_offset_minutes: i64,
    period_hours: i64,
    window_minutes: i64,
}

impl Default for OpeningSchedule {
    /// Midnight at UTC+01:00, every 12 hours, open for 30 minutes.
    fn default() -> Self {
        Self {
            anchor_offset_minutes: 60,
            period_hours: 12,
            window_minutes: 30,
        }
    }
}

impl OpeningSchedule {
    /// Builds a schedule after checking the constants can never divide by
    /// zero or produce overlapping windows.
    pub fn try_new(
        anchor_offset_minutes: i64,
        period_hours: i64,
        window_minutes: i64,
    ) -> Result<Self, OpeningScheduleError> {
        if period_hours <= 0 {
            return Err(OpeningScheduleError::NonPositivePeriod(period_hours));
        }
        if window_minutes <= 0 {
            return Err(OpeningScheduleError::NonPositiveWindow(window_minutes));
        }
        if window_minutes * MINUTE_MS > period_hours * HOUR_MS {
            return Err(OpeningScheduleError::WindowExceedsPeriod {
                window_minutes,
                period_hours,
            });
        }
        Ok(Self {
            anchor_offset_minutes,
            period_hours,
            window_minutes,
        })
    }

    pub fn anchor_offset_minutes(&self) -> i64 {
        self.anchor_offset_minutes
    }

    pub fn period_hours(&self) -> i64 {
        self.period_hours
    }

    pub fn window_minutes(&self) -> i64 {
        self.window_minutes
    }

    /// Computes the Opening state at `now`.
    ///
    /// `now` is shifted into the anchor-aligned timeline, floored to the
    /// period boundary, and shifted back.
    pub fn current_state(&self, now: DateTime<Utc>) -> OpeningState {
        let offset_ms = self.anchor_offset_minutes * MINUTE_MS;
        let period_ms = self.period_hours * HOUR_MS;
        let window_ms = self.window_minutes * MINUTE_MS;

        let now_ms = now.timestamp_millis();
        let local_ms = now_ms + offset_ms;
        let cycle_start_local_ms = local_ms.div_euclid(period_ms) * period_ms;

        let opens_at_ms = cycle_start_local_ms - offset_ms;
        let closes_at_ms = opens_at_ms + window_ms;
        let next_open_at_ms = opens_at_ms + period_ms;

        OpeningState {
            is_open: now_ms >= opens_at_ms && now_ms < closes_at_ms,
            opens_at: instant_from_millis(opens_at_ms),
            closes_at: instant_from_millis(closes_at_ms),
            next_open_at: instant_from_millis(next_open_at_ms),
        }
    }

    /// Returns the next instant strictly after `now` at which `is_open`
    /// changes.
    pub fn next_boundary(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let state = self.current_state(now);
        if state.is_open {
            state.closes_at
        } else {
            state.next_open_at
        }
    }
}

// Schedules are anchored near the present; out-of-range millis cannot occur
// for instants chrono itself can represent.
fn instant_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{OpeningSchedule, OpeningScheduleError};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    // Midnight at UTC+01:00 on 2026-03-01 is 23:00 UTC the day before.
    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 28, 23, 0, 0).unwrap()
    }

    #[test]
    fn open_at_anchor_instant() {
        let schedule = OpeningSchedule::default();
        let state = schedule.current_state(anchor());

        assert!(state.is_open);
        assert_eq!(state.opens_at, anchor());
        assert_eq!(state.closes_at, anchor() + Duration::minutes(30));
        assert_eq!(state.next_open_at, anchor() + Duration::hours(12));
    }

    #[test]
    fn closed_thirty_one_minutes_after_anchor() {
        let schedule = OpeningSchedule::default();
        let state = schedule.current_state(anchor() + Duration::minutes(31));

        assert!(!state.is_open);
        assert_eq!(state.opens_at, anchor());
        assert_eq!(state.next_open_at, anchor() + Duration::hours(12));
    }

    #[test]
    fn close_instant_is_exclusive() {
        let schedule = OpeningSchedule::default();
        let just_before = anchor() + Duration::minutes(30) - Duration::milliseconds(1);
        assert!(schedule.current_state(just_before).is_open);
        assert!(!schedule.current_state(anchor() + Duration::minutes(30)).is_open);
    }

    #[test]
    fn second_daily_cycle_opens_twelve_hours_later() {
        let schedule = OpeningSchedule::default();
        let state = schedule.current_state(anchor() + Duration::hours(12) + Duration::minutes(5));
        assert!(state.is_open);
        assert_eq!(state.opens_at, anchor() + Duration::hours(12));
    }

    #[test]
    fn same_instant_yields_same_state() {
        let schedule = OpeningSchedule::default();
        let now = anchor() + Duration::minutes(17) + Duration::milliseconds(123);
        assert_eq!(schedule.current_state(now), schedule.current_state(now));
    }

    #[test]
    fn sub_millisecond_precision_does_not_leak_into_boundaries() {
        let schedule = OpeningSchedule::default();
        let now = anchor() + Duration::nanoseconds(1_500);
        assert_eq!(schedule.current_state(now).opens_at, anchor());
    }

    #[test]
    fn instants_before_epoch_floor_correctly() {
        let schedule = OpeningSchedule::default();
        let now = Utc.with_ymd_and_hms(1969, 12, 31, 23, 10, 0).unwrap();
        let state = schedule.current_state(now);
        assert!(state.is_open);
        assert_eq!(
            state.opens_at,
            Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_boundary_alternates_between_close_and_open() {
        let schedule = OpeningSchedule::default();
        assert_eq!(
            schedule.next_boundary(anchor()),
            anchor() + Duration::minutes(30)
        );
        assert_eq!(
            schedule.next_boundary(anchor() + Duration::minutes(30)),
            anchor() + Duration::hours(12)
        );
    }

    #[test]
    fn rejects_degenerate_schedules() {
        assert_eq!(
            OpeningSchedule::try_new(0, 0, 30),
            Err(OpeningScheduleError::NonPositivePeriod(0))
        );
        assert_eq!(
            OpeningSchedule::try_new(0, 1, 0),
            Err(OpeningScheduleError::NonPositiveWindow(0))
        );
        assert!(matches!(
            OpeningSchedule::try_new(0, 1, 61),
            Err(OpeningScheduleError::WindowExceedsPeriod { .. })
        ));
        assert!(OpeningSchedule::try_new(-300, 24, 60).is_ok());
    }
}
