//! ISO-8601 week arithmetic
//!
//! Weeks start on Monday. Week 1 is the week containing the year's first
//! Thursday, so a week may straddle two calendar years and two months.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{ScoutingError, ScoutingResult};

/// One ISO week, Monday through Sunday inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsoWeekPeriod {
    pub year: i32,
    pub week: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl IsoWeekPeriod {
    pub fn new(year: i32, week: u32) -> ScoutingResult<Self> {
        let start = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(|| {
            ScoutingError::InvalidPeriod(format!("ISO week {} does not exist in {}", week, year))
        })?;
        let end = start
            .checked_add_days(Days::new(6))
            .ok_or_else(|| ScoutingError::InvalidPeriod(format!("week {}-W{} overflows", year, week)))?;
        Ok(Self { year, week, start, end })
    }

    /// ISO week containing `date`
    pub fn containing(date: NaiveDate) -> ScoutingResult<Self> {
        let iso = date.iso_week();
        Self::new(iso.year(), iso.week())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// First and last calendar day of a month
pub fn month_bounds(year: i32, month: u32) -> ScoutingResult<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ScoutingError::InvalidPeriod(format!("month {}-{:02} does not exist", year, month)))?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let last = next_first
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| ScoutingError::InvalidPeriod(format!("month {}-{:02} overflows", year, month)))?;
    Ok((first, last))
}

/// ISO weeks that share at least one day with the calendar month, in order
pub fn weeks_overlapping_month(year: i32, month: u32) -> ScoutingResult<Vec<IsoWeekPeriod>> {
    let (first, last) = month_bounds(year, month)?;

    let mut weeks = Vec::with_capacity(6);
    let mut current = IsoWeekPeriod::containing(first)?;
    while current.start <= last {
        weeks.push(current);
        let next_monday = current
            .end
            .succ_opt()
            .ok_or_else(|| ScoutingError::InvalidPeriod("date overflow".to_string()))?;
        current = IsoWeekPeriod::containing(next_monday)?;
    }

    Ok(weeks)
}
