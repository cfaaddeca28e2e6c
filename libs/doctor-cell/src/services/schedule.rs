//! Weekly availability resolution.
//!
//! A doctor declares recurring weekdays and a list of time ranges. The booking
//! flow turns the weekdays into concrete upcoming dates and, for a chosen date,
//! offers the declared start times that are not already booked.
//!
//! Everything here is pure; loading the doctor row and the booked appointments
//! happens in [`super::availability::AvailabilityService`].

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ScheduleError {
    #[error("Invalid weekday: '{0}'")]
    InvalidWeekday(String),

    #[error("Invalid time: '{0}'")]
    InvalidTime(String),

    #[error("Invalid time slot: '{0}'")]
    InvalidSlotRange(String),
}

// ==============================================================================
// WEEKDAYS
// ==============================================================================

/// Parses a weekday name, ignoring case and surrounding whitespace.
/// Accepts full English names and three-letter abbreviations.
pub fn parse_weekday(raw: &str) -> Result<Weekday, ScheduleError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Ok(Weekday::Mon),
        "tuesday" | "tue" => Ok(Weekday::Tue),
        "wednesday" | "wed" => Ok(Weekday::Wed),
        "thursday" | "thu" => Ok(Weekday::Thu),
        "friday" | "fri" => Ok(Weekday::Fri),
        "saturday" | "sat" => Ok(Weekday::Sat),
        "sunday" | "sun" => Ok(Weekday::Sun),
        _ => Err(ScheduleError::InvalidWeekday(raw.to_string())),
    }
}

/// Lower-case storage name for a weekday.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

// ==============================================================================
// TIME OF DAY
// ==============================================================================

/// Wall-clock time of a slot, minute precision, no timezone.
///
/// Parses both the 12-hour display form (`"9:00 AM"`) and the 24-hour storage
/// form (`"09:00:00"`, `"09:00"`, `"09:00:00.000"`). Displays and serializes
/// as the 12-hour form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotTime(NaiveTime);

impl SlotTime {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(SlotTime)
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        // seconds are dropped so stored times compare equal to declared ones
        SlotTime(time.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(time))
    }

    /// `"HH:MM:SS"`
    pub fn to_24h(&self) -> String {
        self.0.format("%H:%M:%S").to_string()
    }

    /// `"H:MM AM/PM"`
    pub fn to_ampm(&self) -> String {
        let hour = self.0.hour();
        let suffix = if hour >= 12 { "PM" } else { "AM" };
        let display_hour = if hour % 12 == 0 { 12 } else { hour % 12 };
        format!("{}:{:02} {}", display_hour, self.0.minute(), suffix)
    }

    fn parse_ampm(body: &str, pm: bool, raw: &str) -> Result<Self, ScheduleError> {
        let invalid = || ScheduleError::InvalidTime(raw.to_string());

        let (hour_str, minute_str) = match body.split_once(':') {
            Some((h, m)) => (h.trim(), m.trim()),
            None => (body.trim(), "0"),
        };
        let hour = parse_time_part(hour_str).ok_or_else(invalid)?;
        let minute = parse_time_part(minute_str).ok_or_else(invalid)?;

        if !(1..=12).contains(&hour) {
            return Err(invalid());
        }

        let hour24 = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        };

        Self::from_hm(hour24, minute).ok_or_else(invalid)
    }

    fn parse_24h(body: &str, raw: &str) -> Result<Self, ScheduleError> {
        let invalid = || ScheduleError::InvalidTime(raw.to_string());

        // "HH:MM:SS.ffffff" as produced by some serializers
        let body = body.split('.').next().unwrap_or(body);
        let mut parts = body.split(':');

        let hour = parts.next().and_then(parse_time_part).ok_or_else(invalid)?;
        let minute = parts.next().and_then(parse_time_part).ok_or_else(invalid)?;
        let second = match parts.next() {
            Some(s) => parse_time_part(s).ok_or_else(invalid)?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }

        NaiveTime::from_hms_opt(hour, minute, second)
            .map(Self::from_naive_time)
            .ok_or_else(invalid)
    }
}

/// One or two ASCII digits; rejects signs and other forms `u32` would accept.
fn parse_time_part(part: &str) -> Option<u32> {
    let part = part.trim();
    if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl FromStr for SlotTime {
    type Err = ScheduleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.len() >= 2 && trimmed.is_char_boundary(trimmed.len() - 2) {
            let (body, suffix) = trimmed.split_at(trimmed.len() - 2);
            if suffix.eq_ignore_ascii_case("am") {
                return Self::parse_ampm(body.trim(), false, raw);
            }
            if suffix.eq_ignore_ascii_case("pm") {
                return Self::parse_ampm(body.trim(), true, raw);
            }
        }
        Self::parse_24h(trimmed, raw)
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ampm())
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_ampm())
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// `"13:05:00"` → `"1:05 PM"`
pub fn time24_to_ampm(time24: &str) -> Result<String, ScheduleError> {
    time24.parse::<SlotTime>().map(|t| t.to_ampm())
}

/// `"1:05 PM"` → `"13:05:00"`
pub fn ampm_to_time24(ampm: &str) -> Result<String, ScheduleError> {
    ampm.parse::<SlotTime>().map(|t| t.to_24h())
}

// ==============================================================================
// DECLARED RANGES
// ==============================================================================

/// A declared consultation opening such as `"9:00 AM - 10:00 AM"`.
/// Only the start is bookable; the end is kept for display and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    pub start: SlotTime,
    pub end: Option<SlotTime>,
}

impl FromStr for SlotRange {
    type Err = ScheduleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidSlotRange(raw.to_string());

        let (start_part, end_part) = match raw.split_once('-') {
            Some((start, end)) => (start, Some(end)),
            None => (raw, None),
        };

        let start: SlotTime = start_part.parse().map_err(|_| invalid())?;
        let end = match end_part.map(str::trim).filter(|e| !e.is_empty()) {
            Some(end) => Some(end.parse::<SlotTime>().map_err(|_| invalid())?),
            None => None,
        };

        if let Some(end) = end {
            if end <= start {
                return Err(invalid());
            }
        }

        Ok(SlotRange { start, end })
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{} - {}", self.start, end),
            None => write!(f, "{}", self.start),
        }
    }
}

// ==============================================================================
// DOCTOR AVAILABILITY
// ==============================================================================

/// Typed form of a doctor's `available_days` / `available_time_slots` columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoctorAvailability {
    pub days: HashSet<Weekday>,
    pub slots: Vec<SlotRange>,
}

impl DoctorAvailability {
    /// Rejects the first weekday or slot that fails to parse.
    pub fn parse_strict<D, S>(days: &[D], slots: &[S]) -> Result<Self, ScheduleError>
    where
        D: AsRef<str>,
        S: AsRef<str>,
    {
        let days = days
            .iter()
            .map(|d| parse_weekday(d.as_ref()))
            .collect::<Result<HashSet<_>, _>>()?;
        let slots = slots
            .iter()
            .map(|s| s.as_ref().parse::<SlotRange>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { days, slots })
    }

    /// Skips entries that fail to parse, logging each one.
    pub fn parse_lenient<D, S>(days: &[D], slots: &[S]) -> Self
    where
        D: AsRef<str>,
        S: AsRef<str>,
    {
        let days = days
            .iter()
            .filter_map(|d| match parse_weekday(d.as_ref()) {
                Ok(day) => Some(day),
                Err(e) => {
                    warn!("Skipping stored availability day: {}", e);
                    None
                }
            })
            .collect();
        let slots = slots
            .iter()
            .filter_map(|s| match s.as_ref().parse::<SlotRange>() {
                Ok(range) => Some(range),
                Err(e) => {
                    warn!("Skipping stored availability slot: {}", e);
                    None
                }
            })
            .collect();

        Self { days, slots }
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty() || self.slots.is_empty()
    }

    pub fn offers(&self, date: NaiveDate) -> bool {
        self.days.contains(&date.weekday())
    }

    /// Weekday names in calendar order starting Monday, for storage.
    pub fn day_names(&self) -> Vec<String> {
        let mut days: Vec<Weekday> = self.days.iter().copied().collect();
        days.sort_by_key(|d| d.num_days_from_monday());
        days.into_iter().map(|d| weekday_name(d).to_string()).collect()
    }

    pub fn slot_labels(&self) -> Vec<String> {
        self.slots.iter().map(ToString::to_string).collect()
    }
}

// ==============================================================================
// RESOLUTION
// ==============================================================================

/// Walks forward from `from` over `window_days` calendar days, collecting each
/// date whose weekday is in `days`, and stops after `count` dates.
pub fn expand_weekdays_to_dates(
    days: &HashSet<Weekday>,
    from: NaiveDate,
    count: usize,
    window_days: u32,
) -> Vec<NaiveDate> {
    if days.is_empty() || count == 0 {
        return Vec::new();
    }

    from.iter_days()
        .take(window_days as usize)
        .filter(|date| days.contains(&date.weekday()))
        .take(count)
        .collect()
}

/// [`expand_weekdays_to_dates`] starting from today's local date.
pub fn upcoming_dates(days: &HashSet<Weekday>, count: usize, window_days: u32) -> Vec<NaiveDate> {
    expand_weekdays_to_dates(days, Local::now().date_naive(), count, window_days)
}

/// Declared start times that are not booked, in declared order.
pub fn resolve_bookable_slots(declared: &[SlotRange], booked: &[SlotTime]) -> Vec<SlotTime> {
    let booked: HashSet<SlotTime> = booked.iter().copied().collect();
    let mut offered = HashSet::new();

    declared
        .iter()
        .map(|range| range.start)
        .filter(|start| !booked.contains(start) && offered.insert(*start))
        .collect()
}
