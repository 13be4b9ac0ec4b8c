//! Schedule input validation.

use chrono_tz::Tz;
use serde::Deserialize;

use crate::model::RoutingSchedule;
use crate::scheduling::window::parse_hhmm;
use crate::scheduling::ScheduleError;

/// A schedule as submitted by a caller, before it has an ID.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleInput {
    pub routing_id: String,
    pub days: Vec<u8>,
    pub start_time: String,
    pub end_time: String,
    pub timezone: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ScheduleInput {
    /// Validate and assign a fresh ID.
    pub fn into_schedule(self) -> Result<RoutingSchedule, ScheduleError> {
        validate_schedule_input(&self)?;
        Ok(RoutingSchedule {
            id: uuid::Uuid::new_v4().to_string(),
            routing_id: self.routing_id,
            days: self.days,
            start_time: self.start_time,
            end_time: self.end_time,
            timezone: self.timezone,
            enabled: self.enabled,
            last_activated: None,
            last_deactivated: None,
        })
    }
}

pub fn validate_schedule_input(input: &ScheduleInput) -> Result<(), ScheduleError> {
    validate_fields(
        &input.routing_id,
        &input.days,
        &input.start_time,
        &input.end_time,
        &input.timezone,
    )
}

/// Validate a stored schedule with the same rules as new input.
pub fn validate_schedule(schedule: &RoutingSchedule) -> Result<(), ScheduleError> {
    validate_fields(
        &schedule.routing_id,
        &schedule.days,
        &schedule.start_time,
        &schedule.end_time,
        &schedule.timezone,
    )
}

fn validate_fields(
    routing_id: &str,
    days: &[u8],
    start_time: &str,
    end_time: &str,
    timezone: &str,
) -> Result<(), ScheduleError> {
    if routing_id.trim().is_empty() {
        return Err(ScheduleError::MissingRoutingId);
    }
    if days.is_empty() {
        return Err(ScheduleError::NoDays);
    }

    let mut seen = [false; 7];
    for &day in days {
        let slot = seen
            .get_mut(usize::from(day))
            .ok_or(ScheduleError::InvalidDay(day))?;
        if *slot {
            return Err(ScheduleError::DuplicateDay(day));
        }
        *slot = true;
    }

    for (field, value) in [("start_time", start_time), ("end_time", end_time)] {
        if parse_hhmm(value).is_none() {
            return Err(ScheduleError::InvalidTime {
                field,
                value: value.to_string(),
            });
        }
    }

    if timezone.is_empty() || timezone.parse::<Tz>().is_err() {
        return Err(ScheduleError::InvalidTimezone(timezone.to_string()));
    }

    Ok(())
}
