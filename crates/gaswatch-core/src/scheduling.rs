// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of GasWatch.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Daily run-time scheduling in the account's local timezone.

use chrono::{DateTime, Days, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ScheduleError;

pub const DEFAULT_RUN_AT: &str = "07:00";
pub const DEFAULT_TIMEZONE: &str = "America/Chicago";

/// Fixed local time-of-day target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub run_at: NaiveTime,
    pub timezone: Tz,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            run_at: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN),
            timezone: chrono_tz::America::Chicago,
        }
    }
}

impl Schedule {
    /// Parse `HH:MM` (or `HH:MM:SS`) and an IANA timezone name.
    pub fn parse(run_at: &str, timezone: &str) -> Result<Self, ScheduleError> {
        let run_at_trimmed = run_at.trim();
        let time = NaiveTime::parse_from_str(run_at_trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(run_at_trimmed, "%H:%M:%S"))
            .map_err(|_| ScheduleError::InvalidTime(run_at.to_owned()))?;
        let tz = timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| ScheduleError::UnknownTimezone(timezone.to_owned()))?;

        Ok(Self {
            run_at: time,
            timezone: tz,
        })
    }

    /// First occurrence of the run time strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_run_after(now, self.run_at, self.timezone)
    }

    /// Calendar day of `now` in the schedule's timezone.
    pub fn local_date(&self, now: DateTime<Utc>) -> chrono::NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }
}

/// First local `run_at` strictly after `now`, rolling to the next day when
/// today's slot has passed.
///
/// A run time skipped by a DST transition moves forward by an hour; a time
/// that occurs twice uses the earlier instant.
pub fn next_run_after(now: DateTime<Utc>, run_at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let today = now.with_timezone(&tz).date_naive();

    for offset in 0..=2 {
        let Some(day) = today.checked_add_days(Days::new(offset)) else {
            break;
        };
        let local = day.and_time(run_at);
        let resolved = tz
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(local + TimeDelta::hours(1))).earliest());

        if let Some(candidate) = resolved.map(|dt| dt.with_timezone(&Utc))
            && candidate > now
        {
            return candidate;
        }
    }

    now + TimeDelta::days(1)
}
