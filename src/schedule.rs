//! Window boundary math for the decision loop.
//!
//! The loop acts at fixed sub-hour boundaries (every `boundary_minutes`,
//! `boundary_offset_secs` past the minute). Instead of polling the clock in
//! a tight loop, the next boundary is computed and slept to directly; the
//! grace delay for upstream candle availability is applied by the engine
//! after waking.

use chrono::{DateTime, Duration, Timelike, Utc};

use crate::config::ScheduleConfig;

/// The next window boundary strictly after `now`.
///
/// With the defaults (15 minutes, 1 second offset) this is the next
/// hh:00:01 / hh:15:01 / hh:30:01 / hh:45:01 instant.
pub fn next_window(now: DateTime<Utc>, schedule: &ScheduleConfig) -> DateTime<Utc> {
    let boundary_secs = i64::from(schedule.boundary_minutes) * 60;
    let offset = i64::from(schedule.boundary_offset_secs);

    let hour_start = now
        - Duration::minutes(i64::from(now.minute()))
        - Duration::seconds(i64::from(now.second()))
        - Duration::nanoseconds(i64::from(now.nanosecond()));

    let windows_per_hour = 3600 / boundary_secs;
    for k in 0..=windows_per_hour {
        let candidate = hour_start + Duration::seconds(k * boundary_secs + offset);
        if candidate > now {
            return candidate;
        }
    }

    // Unreachable with offset < 60: the k == windows_per_hour candidate is
    // the next hour's first window.
    hour_start + Duration::seconds(3600 + offset)
}

/// Time remaining until the next window, as a std Duration for tokio::sleep
pub fn until_next_window(now: DateTime<Utc>, schedule: &ScheduleConfig) -> std::time::Duration {
    let target = next_window(now, schedule);
    (target - now)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}
