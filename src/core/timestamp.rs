//! Conversion between logger clock fields and absolute time.
//!
//! Loggers report civil time as seven integer fields (two-digit year, month,
//! day, hour, minute, second, hundredth) in a fixed zone with no daylight
//! saving. Absolute time is expressed as fractional seconds since the Unix
//! epoch.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use thiserror::Error;

/// Default logger time zone (Brisbane, UTC+10, no DST).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 10;

/// Default century base for the two-digit year field.
pub const DEFAULT_YEAR_BASE: i32 = 2000;

/// Errors raised while converting clock fields.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeError {
    #[error("invalid {field} value {value}: not a non-negative integer")]
    NonIntegral { field: &'static str, value: f64 },

    #[error("invalid civil timestamp {0}")]
    InvalidCalendar(TimeFields),

    #[error("invalid UTC offset: {0} hours")]
    InvalidOffset(i32),

    #[error("absolute time {0} is out of range")]
    OutOfRange(f64),
}

/// Result type for time conversions.
pub type Result<T> = std::result::Result<T, TimeError>;

/// One resolved logger timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimeFields {
    /// Two-digit year, offset from the century base.
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    /// Hundredths of a second.
    pub hund: u32,
}

impl fmt::Display for TimeFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}-{:02}-{:02} {:02}:{:02}:{:02}.{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.hund
        )
    }
}

fn to_field(field: &'static str, value: f64) -> Result<u32> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Ok(value as u32)
    } else {
        Err(TimeError::NonIntegral { field, value })
    }
}

impl TimeFields {
    /// Builds fields from raw column values in
    /// (year, month, day, hour, minute, second, hund) order.
    ///
    /// Values must be finite non-negative integers; range checks happen
    /// at conversion time.
    pub fn from_values(values: [f64; 7]) -> Result<Self> {
        Ok(Self {
            year: to_field("year", values[0])?,
            month: to_field("month", values[1])?,
            day: to_field("day", values[2])?,
            hour: to_field("hour", values[3])?,
            minute: to_field("minute", values[4])?,
            second: to_field("second", values[5])?,
            hund: to_field("hund", values[6])?,
        })
    }
}

/// Converter from clock fields to absolute time in one fixed zone.
#[derive(Debug, Clone, Copy)]
pub struct ClockZone {
    offset_seconds: i32,
    year_base: i32,
}

impl ClockZone {
    /// Creates a zone `utc_offset_hours` east of UTC.
    pub fn new(utc_offset_hours: i32, year_base: i32) -> Result<Self> {
        let offset_seconds = utc_offset_hours
            .checked_mul(3600)
            .filter(|secs| FixedOffset::east_opt(*secs).is_some())
            .ok_or(TimeError::InvalidOffset(utc_offset_hours))?;
        Ok(Self {
            offset_seconds,
            year_base,
        })
    }

    fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.offset_seconds)
            .ok_or(TimeError::InvalidOffset(self.offset_seconds / 3600))
    }

    /// Converts clock fields to seconds since the epoch.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::InvalidCalendar`] when the fields do not name a
    /// real civil time (month 13, 31 April, hour 24, hundredth 100, ...).
    pub fn to_unix_time(&self, fields: &TimeFields) -> Result<f64> {
        let invalid = || TimeError::InvalidCalendar(*fields);

        if fields.hund > 99 {
            return Err(invalid());
        }
        let year = self
            .year_base
            .checked_add(i32::try_from(fields.year).map_err(|_| invalid())?)
            .ok_or_else(invalid)?;

        let naive = NaiveDate::from_ymd_opt(year, fields.month, fields.day)
            .and_then(|date| {
                date.and_hms_micro_opt(fields.hour, fields.minute, fields.second, fields.hund * 10_000)
            })
            .ok_or_else(invalid)?;

        let local = self
            .offset()?
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(invalid)?;

        Ok(local.timestamp() as f64 + f64::from(local.timestamp_subsec_micros()) / 1e6)
    }

    /// Converts raw column values, as read from a table row.
    pub fn values_to_unix_time(&self, values: [f64; 7]) -> Result<f64> {
        self.to_unix_time(&TimeFields::from_values(values)?)
    }

    /// Converts seconds since the epoch back to clock fields, rounded to the
    /// nearest hundredth.
    pub fn from_unix_time(&self, unix_time: f64) -> Result<TimeFields> {
        if !unix_time.is_finite() {
            return Err(TimeError::OutOfRange(unix_time));
        }
        let total_hund = (unix_time * 100.0).round() as i64;
        let secs = total_hund.div_euclid(100);
        let hund = total_hund.rem_euclid(100) as u32;

        let utc = DateTime::from_timestamp(secs, 0).ok_or(TimeError::OutOfRange(unix_time))?;
        let local = utc.with_timezone(&self.offset()?);

        use chrono::{Datelike, Timelike};
        let year = u32::try_from(local.year() - self.year_base)
            .map_err(|_| TimeError::OutOfRange(unix_time))?;

        Ok(TimeFields {
            year,
            month: local.month(),
            day: local.day(),
            hour: local.hour(),
            minute: local.minute(),
            second: local.second(),
            hund,
        })
    }
}

impl Default for ClockZone {
    fn default() -> Self {
        Self {
            offset_seconds: DEFAULT_UTC_OFFSET_HOURS * 3600,
            year_base: DEFAULT_YEAR_BASE,
        }
    }
}

/// Seconds since the epoch for `fields` in the default UTC+10 zone.
pub fn compute_unix_time(fields: &TimeFields) -> Result<f64> {
    ClockZone::default().to_unix_time(fields)
}
