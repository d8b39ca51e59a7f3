use chrono::{Datelike, Days, NaiveDate};

use crate::error::{Result, ScrapeError};

/// Monday-to-Sunday span of one ISO week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Month of `start`, 1–12.
    pub month: u32,
}

impl WeekSpan {
    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

/// Dates of ISO week `week` of `year`. Week 1 is the week holding January 4th.
///
/// Weeks past the year's last ISO week are not rejected; they simply land in
/// the following year.
pub fn week_dates(year: i32, week: i32) -> Result<WeekSpan> {
    let invalid = || ScrapeError::CalendarInputInvalid { year, week };
    if year <= 0 || week <= 0 {
        return Err(invalid());
    }

    let jan_4 = NaiveDate::from_ymd_opt(year, 1, 4).ok_or_else(invalid)?;
    let week_1_monday = jan_4
        .checked_sub_days(Days::new(jan_4.weekday().num_days_from_monday() as u64))
        .ok_or_else(invalid)?;
    let start = week_1_monday
        .checked_add_days(Days::new(7 * (week as u64 - 1)))
        .ok_or_else(invalid)?;
    let end = start.checked_add_days(Days::new(6)).ok_or_else(invalid)?;

    Ok(WeekSpan {
        start,
        end,
        month: start.month(),
    })
}

/// 52 or 53. December 28th always falls in the year's last ISO week.
pub fn iso_weeks_in_year(year: i32) -> u32 {
    NaiveDate::from_ymd_opt(year, 12, 28)
        .map(|d| d.iso_week().week())
        .unwrap_or(52)
}
