//! Weekly time-window evaluation.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;

use crate::model::RoutingSchedule;

/// Minutes since midnight for a strict 24-hour `HH:MM` string.
pub fn parse_hhmm(value: &str) -> Option<u32> {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return None;
    }
    let (hours, minutes) = (value.get(0..2)?, value.get(3..5)?);
    if !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    (hours < 24 && minutes < 60).then_some(hours * 60 + minutes)
}

/// Resolve an IANA zone, falling back to UTC.
pub fn resolve_timezone(name: &str) -> Tz {
    name.parse::<Tz>().unwrap_or_else(|_| {
        tracing::error!(timezone = name, "Unknown timezone, evaluating schedule in UTC");
        Tz::UTC
    })
}

/// Whether `schedule`'s window contains `now`, in the schedule's own zone.
///
/// Overnight windows (`start > end`) stay active past midnight when the
/// previous weekday is listed. `start == end` covers the whole listed day.
/// Disabled schedules and unparseable times are never active.
pub fn is_window_active(now: DateTime<Utc>, schedule: &RoutingSchedule) -> bool {
    if !schedule.enabled {
        return false;
    }

    let (Some(start), Some(end)) = (
        parse_hhmm(&schedule.start_time),
        parse_hhmm(&schedule.end_time),
    ) else {
        tracing::error!(
            schedule_id = %schedule.id,
            start = %schedule.start_time,
            end = %schedule.end_time,
            "Invalid schedule times"
        );
        return false;
    };

    let local = now.with_timezone(&resolve_timezone(&schedule.timezone));
    let weekday = local.weekday().num_days_from_sunday() as u8;
    let previous = (weekday + 6) % 7;
    let minute = local.hour() * 60 + local.minute();
    let listed = |day: u8| schedule.days.contains(&day);

    if start < end {
        listed(weekday) && start <= minute && minute < end
    } else if start > end {
        (listed(weekday) && minute >= start) || (listed(previous) && minute < end)
    } else {
        listed(weekday)
    }
}
