//! Wall-clock arithmetic for absolute triggers

use chrono::{
    Datelike, DateTime, Days, FixedOffset, Local, LocalResult, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Timelike, Utc, Weekday,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::TriggerRule;

/// Longest DST gap we step over when a local time does not exist
const MAX_GAP_MINUTES: i64 = 180;

/// Zone in which wall-clock triggers and hour windows are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScheduleZone {
    /// The host's local zone, including its DST rules
    Local,
    /// A fixed UTC offset
    Fixed(FixedOffset),
}

impl ScheduleZone {
    /// UTC as a fixed zone
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Local wall-clock reading of an instant
    pub fn local_naive(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            ScheduleZone::Local => instant.with_timezone(&Local).naive_local(),
            ScheduleZone::Fixed(offset) => instant.with_timezone(offset).naive_local(),
        }
    }

    /// Local hour of an instant
    pub fn hour(&self, instant: DateTime<Utc>) -> u32 {
        self.local_naive(instant).hour()
    }

    /// Map a local wall-clock time to an instant.
    ///
    /// Ambiguous times (DST fall-back) resolve to the earlier instant;
    /// times inside a DST gap move to the first valid minute after it.
    pub fn resolve(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            ScheduleZone::Local => resolve_in(&Local, naive),
            ScheduleZone::Fixed(offset) => resolve_in(offset, naive),
        }
    }
}

fn resolve_in<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    let earliest = |n: NaiveDateTime| match tz.from_local_datetime(&n) {
        LocalResult::Single(t) => Some(t.with_timezone(&Utc)),
        // The pair is not ordered by instant
        LocalResult::Ambiguous(a, b) => Some(a.with_timezone(&Utc).min(b.with_timezone(&Utc))),
        LocalResult::None => None,
    };

    earliest(naive).or_else(|| {
        (1..=MAX_GAP_MINUTES)
            .filter_map(|m| naive.checked_add_signed(chrono::Duration::minutes(m)))
            .find_map(earliest)
    })
}

impl FromStr for ScheduleZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "local" => return Ok(Self::Local),
            "utc" | "z" => return Ok(Self::utc()),
            _ => {}
        }

        let (sign, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (1, &trimmed[1..]),
            Some(b'-') => (-1, &trimmed[1..]),
            _ => return Err(format!("invalid timezone '{s}': expected 'local', 'utc' or +HH:MM")),
        };

        let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
        let hours: i32 = hours
            .parse()
            .map_err(|_| format!("invalid timezone hours in '{s}'"))?;
        let minutes: i32 = minutes
            .parse()
            .map_err(|_| format!("invalid timezone minutes in '{s}'"))?;
        if !(0..60).contains(&minutes) {
            return Err(format!("invalid timezone minutes in '{s}'"));
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self::Fixed)
            .ok_or_else(|| format!("timezone offset '{s}' out of range"))
    }
}

impl TryFrom<String> for ScheduleZone {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScheduleZone> for String {
    fn from(zone: ScheduleZone) -> Self {
        zone.to_string()
    }
}

impl fmt::Display for ScheduleZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleZone::Local => f.write_str("local"),
            ScheduleZone::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

/// First due instant of an absolute trigger strictly after `after`.
///
/// Computed from the calendar on every call, so repeated scheduling never
/// accumulates drift across day, week or DST boundaries. Relative triggers
/// return `None`.
pub fn next_due(
    trigger: &TriggerRule,
    after: DateTime<Utc>,
    zone: ScheduleZone,
) -> Option<DateTime<Utc>> {
    match zone {
        ScheduleZone::Local => next_due_in(trigger, after, &Local),
        ScheduleZone::Fixed(offset) => next_due_in(trigger, after, &offset),
    }
}

fn next_due_in<Tz: TimeZone>(
    trigger: &TriggerRule,
    after: DateTime<Utc>,
    tz: &Tz,
) -> Option<DateTime<Utc>> {
    let (slots, days) = match trigger {
        TriggerRule::FixedTime { hour, minute } => (time_slots(&[*hour], &[*minute]), None),
        TriggerRule::BusinessHoursPeriodic {
            days,
            hours,
            minutes,
        } => (time_slots(hours, minutes), Some(days.as_slice())),
        _ => return None,
    };
    if slots.is_empty() {
        return None;
    }

    let start = after.with_timezone(tz).naive_local().date();

    // Eight days always reach the next matching weekday
    (0..=8u64)
        .filter_map(|offset| start.checked_add_days(Days::new(offset)))
        .filter(|date| days.map_or(true, |d: &[Weekday]| d.contains(&date.weekday())))
        .flat_map(|date| slots.iter().map(move |time| date.and_time(*time)))
        .filter_map(|naive| resolve_in(tz, naive))
        .find(|instant| *instant > after)
}

fn time_slots(hours: &[u32], minutes: &[u32]) -> Vec<NaiveTime> {
    let mut slots: Vec<NaiveTime> = hours
        .iter()
        .flat_map(|h| minutes.iter().filter_map(move |m| NaiveTime::from_hms_opt(*h, *m, 0)))
        .collect();
    slots.sort_unstable();
    slots.dedup();
    slots
}
