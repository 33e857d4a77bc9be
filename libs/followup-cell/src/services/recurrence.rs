use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::models::Recurrence;

/// Compute the next occurrence for a recurring task after a successful send.
///
/// The next due time is strictly after `now`, not merely after the old due
/// time: when the poller has been stalled for several intervals, the task
/// resumes its cadence from the present instead of firing a catch-up burst.
/// Returns `None` when the computed occurrence would land past `end_at`.
pub fn plan_next(
    recurrence: &Recurrence,
    old_due: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let next = match recurrence {
        Recurrence::FixedInterval { every_minutes, .. } => {
            let scheduled = old_due + Duration::minutes(*every_minutes);
            let floor = now + Duration::seconds(1);
            if scheduled > floor {
                scheduled
            } else {
                floor
            }
        }
        Recurrence::DailyAt { time, .. } => {
            let after = if old_due > now { old_due } else { now };
            next_daily_occurrence(after, *time)
        }
    };

    match recurrence.end_at() {
        Some(end_at) if next > end_at => None,
        _ => Some(next),
    }
}

fn next_daily_occurrence(after: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
    let same_day = after.date_naive().and_time(time).and_utc();
    if same_day > after {
        same_day
    } else {
        same_day + Duration::days(1)
    }
}
