//! Decoding of CF-convention time coordinates.
//!
//! NetCDF time axes store numeric offsets together with a `units`
//! attribute of the form `"<unit> since <reference>"`, e.g.
//! `"days since 1950-01-01 00:00:00"`. Only the standard (proleptic
//! Gregorian) calendar is supported.

use crate::error::{CoreError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

/// Calendars whose day arithmetic matches chrono's proleptic Gregorian calendar.
const SUPPORTED_CALENDARS: [&str; 3] = ["standard", "gregorian", "proleptic_gregorian"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "days" | "day" | "d" => Some(TimeUnit::Days),
            "hours" | "hour" | "hrs" | "hr" | "h" => Some(TimeUnit::Hours),
            "minutes" | "minute" | "mins" | "min" => Some(TimeUnit::Minutes),
            "seconds" | "second" | "secs" | "sec" | "s" => Some(TimeUnit::Seconds),
            _ => None,
        }
    }

    fn milliseconds(&self) -> f64 {
        match self {
            TimeUnit::Days => 86_400_000.0,
            TimeUnit::Hours => 3_600_000.0,
            TimeUnit::Minutes => 60_000.0,
            TimeUnit::Seconds => 1_000.0,
        }
    }
}

/// A parsed `units` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfTimeUnits {
    pub unit: TimeUnit,
    pub epoch: NaiveDateTime,
}

impl CfTimeUnits {
    /// Parse a units string, rejecting calendars other than the standard one.
    pub fn parse(units: &str, calendar: Option<&str>) -> Result<Self> {
        if let Some(calendar) = calendar {
            let calendar = calendar.trim().to_lowercase();
            if !SUPPORTED_CALENDARS.contains(&calendar.as_str()) {
                return Err(CoreError::TimeUnits(format!(
                    "unsupported calendar '{}'",
                    calendar
                )));
            }
        }
        let (unit_str, reference) = units
            .split_once(" since ")
            .ok_or_else(|| CoreError::TimeUnits(units.to_string()))?;
        let unit = TimeUnit::parse(unit_str)
            .ok_or_else(|| CoreError::TimeUnits(format!("unknown unit in '{}'", units)))?;
        let epoch = parse_reference(reference)
            .ok_or_else(|| CoreError::TimeUnits(format!("bad reference date in '{}'", units)))?;
        Ok(Self { unit, epoch })
    }

    pub fn decode(&self, offset: f64) -> Result<NaiveDateTime> {
        if !offset.is_finite() {
            return Err(CoreError::TimeUnits(format!("non-finite time offset {}", offset)));
        }
        let millis = (offset * self.unit.milliseconds()).round() as i64;
        TimeDelta::try_milliseconds(millis)
            .and_then(|delta| self.epoch.checked_add_signed(delta))
            .ok_or_else(|| CoreError::TimeUnits(format!("time offset {} out of range", offset)))
    }

    pub fn decode_all(&self, offsets: &[f64]) -> Result<Vec<NaiveDateTime>> {
        offsets.iter().map(|&offset| self.decode(offset)).collect()
    }
}

fn parse_reference(reference: &str) -> Option<NaiveDateTime> {
    let cleaned = reference
        .trim()
        .trim_end_matches("UTC")
        .trim_end_matches('Z')
        .trim()
        .replace('T', " ");
    let mut parts = cleaned.split_whitespace();
    let date = NaiveDate::parse_from_str(parts.next()?, "%Y-%m-%d").ok()?;
    let time = match parts.next() {
        None => NaiveTime::MIN,
        Some(t) => NaiveTime::parse_from_str(t, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S%.f"))
            .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
            .ok()?,
    };
    Some(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_days_since_date_only() {
        let units = CfTimeUnits::parse("days since 1950-01-01", None).unwrap();
        assert_eq!(units.unit, TimeUnit::Days);
        let t = units.decode(365.0).unwrap();
        assert_eq!(t, NaiveDate::from_ymd_opt(1951, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_hours_since_with_time_and_zone() {
        let units = CfTimeUnits::parse("hours since 2000-01-01T00:00:00Z", Some("gregorian")).unwrap();
        let t = units.decode(36.0).unwrap();
        assert_eq!(t, NaiveDate::from_ymd_opt(2000, 1, 2).unwrap().and_hms_opt(12, 0, 0).unwrap());
    }

    #[test]
    fn test_fractional_days() {
        let units = CfTimeUnits::parse("days since 2014-01-01 00:00:00", Some("standard")).unwrap();
        let t = units.decode(0.5).unwrap();
        assert_eq!(t, NaiveDate::from_ymd_opt(2014, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap());
    }

    #[test]
    fn test_single_digit_reference_fields() {
        let units = CfTimeUnits::parse("seconds since 1970-1-1 0:0:0", None).unwrap();
        let t = units.decode(86_400.0).unwrap();
        assert_eq!(t.date(), NaiveDate::from_ymd_opt(1970, 1, 2).unwrap());
    }

    #[test]
    fn test_rejects_non_standard_calendar() {
        let err = CfTimeUnits::parse("days since 2000-01-01", Some("noleap")).unwrap_err();
        assert!(matches!(err, CoreError::TimeUnits(_)));
    }

    #[test]
    fn test_rejects_malformed_units() {
        assert!(CfTimeUnits::parse("days after 2000-01-01", None).is_err());
        assert!(CfTimeUnits::parse("fortnights since 2000-01-01", None).is_err());
        assert!(CfTimeUnits::parse("days since yesterday", None).is_err());
    }

    #[test]
    fn test_decode_rejects_nan() {
        let units = CfTimeUnits::parse("days since 2000-01-01", None).unwrap();
        assert!(units.decode(f64::NAN).is_err());
    }
}
