//! Calendar bookkeeping for the coupling loop.
//!
//! Simulation time is measured in seconds since `date0`. The calendar tracks
//! the current date and the first day of the next month, which drives monthly
//! callbacks and boundary-data updates.

use crate::errors::{ESMCError, ESMCResult};
use crate::field::Time;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplerDates {
    /// Reference date corresponding to t = 0
    pub date0: NaiveDateTime,
    /// Date of the current coupling step
    pub date: NaiveDateTime,
    /// Midnight on the first day of the month following `date`
    pub next_month: NaiveDateTime,
}

impl CouplerDates {
    /// Start the calendar at `t_start` seconds after `date0`
    pub fn new(date0: NaiveDateTime, t_start: Time) -> ESMCResult<Self> {
        let date = offset(date0, t_start)?;
        Ok(Self {
            date0,
            date,
            next_month: first_of_next_month(date)?,
        })
    }

    /// Parse a reference date in `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS` form
    pub fn parse_date(value: &str) -> ESMCResult<NaiveDateTime> {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
            return Ok(datetime);
        }
        let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|e| ESMCError::Config(format!("invalid date '{}': {}", value, e)))?;
        date.and_hms_opt(0, 0, 0)
            .ok_or_else(|| ESMCError::Config(format!("invalid date '{}'", value)))
    }

    /// The date `t` seconds after the reference date
    pub fn date_at(&self, t: Time) -> ESMCResult<NaiveDateTime> {
        offset(self.date0, t)
    }

    /// Move the current date to `t`
    ///
    /// The calendar only moves forward.
    pub fn advance_to(&mut self, t: Time) -> ESMCResult<()> {
        let date = offset(self.date0, t)?;
        if date < self.date {
            return Err(ESMCError::Error(format!(
                "calendar cannot move backwards from {} to {}",
                self.date, date
            )));
        }
        self.date = date;
        Ok(())
    }

    /// Whether the current date has crossed into a new month
    pub fn is_new_month(&self) -> bool {
        self.date >= self.next_month
    }

    /// Acknowledge a month boundary by moving `next_month` on
    pub fn roll_month(&mut self) -> ESMCResult<()> {
        self.next_month = first_of_next_month(self.date)?;
        Ok(())
    }
}

fn offset(date0: NaiveDateTime, t: Time) -> ESMCResult<NaiveDateTime> {
    if !t.is_finite() {
        return Err(ESMCError::InvalidData(format!("non-finite time {}", t)));
    }
    let out_of_range = || ESMCError::InvalidData(format!("time {} s is out of the calendar range", t));
    let ms = (t * 1000.0).round();
    if ms.abs() >= i64::MAX as f64 {
        return Err(out_of_range());
    }
    Duration::try_milliseconds(ms as i64)
        .and_then(|delta| date0.checked_add_signed(delta))
        .ok_or_else(out_of_range)
}

fn first_of_next_month(date: NaiveDateTime) -> ESMCResult<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ESMCError::InvalidData(format!("no month follows {}", date)))
}
