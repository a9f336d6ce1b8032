use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use skylock_core::Schedule;

/// Compute the next UTC tick for `schedule` strictly *after* `from`.
///
/// Returns `None` only when the schedule can't produce a valid instant
/// (a zero or overflowing period, or an out-of-range time of day).
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Interval { every_secs } => {
            if *every_secs == 0 {
                return None;
            }
            let period = Duration::try_seconds(i64::try_from(*every_secs).ok()?)?;
            from.checked_add_signed(period)
        }

        Schedule::Aligned { every_secs } => {
            // Next multiple of the period since the epoch, so every instance
            // lands on the same instant regardless of when it started.
            let period_ms = i64::try_from(*every_secs).ok()?.checked_mul(1000)?;
            if period_ms == 0 {
                return None;
            }
            let from_ms = from.timestamp_millis();
            let next_ms = (from_ms.div_euclid(period_ms) + 1).checked_mul(period_ms)?;
            Utc.timestamp_millis_opt(next_ms).single()
        }

        Schedule::Daily { hour, minute } => {
            // Build today's candidate at HH:MM:00 UTC.
            let candidate = from
                .date_naive()
                .and_hms_opt(u32::from(*hour), u32::from(*minute), 0)?
                .and_utc();
            if candidate > from {
                Some(candidate)
            } else {
                // Today's window has passed, so tomorrow.
                candidate.checked_add_signed(Duration::try_days(1)?)
            }
        }
    }
}

/// How long to sleep from `now` until the next tick.
///
/// Falls back to one minute for schedules that can't produce an instant, so a
/// misconfigured task idles instead of spinning.
pub fn delay_until_next(schedule: &Schedule, now: DateTime<Utc>) -> StdDuration {
    compute_next_run(schedule, now)
        .and_then(|next| (next - now).to_std().ok())
        .unwrap_or(StdDuration::from_secs(60))
}
