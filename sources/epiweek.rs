//! MMWR epidemiological weeks.
//!
//! Week 1 of year `Y` is the Sunday-to-Saturday week containing January 4 of `Y`.
//! A year therefore has 52 or 53 weeks, and its first week may start in late December.

use chrono::{Datelike, Duration, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Epiweek {
    pub year: i32,
    pub week: u32,
}

/// The Sunday on which week 1 of `year` starts.
fn first_week_start(year: i32) -> Option<NaiveDate> {
    let jan4 = NaiveDate::from_ymd_opt(year, 1, 4)?;
    jan4.checked_sub_signed(Duration::days(jan4.weekday().num_days_from_sunday() as i64))
}

/// Number of epiweeks in `year`: 52 or 53.
pub fn weeks_in_year(year: i32) -> Option<u32> {
    let this_year = first_week_start(year)?;
    let next_year = first_week_start(year + 1)?;
    Some(((next_year - this_year).num_days() / 7) as u32)
}

impl Epiweek {
    /// Returns `None` when `week` is outside `1..=weeks_in_year(year)`.
    pub fn new(year: i32, week: u32) -> Option<Self> {
        (week >= 1 && week <= weeks_in_year(year)?).then_some(Self { year, week })
    }

    /// Parses the `YYYYWW` integer encoding used by surveillance feeds, e.g. `202003`.
    pub fn from_code(code: i64) -> Option<Self> {
        if code <= 0 {
            return None;
        }
        let year = i32::try_from(code / 100).ok()?;
        Self::new(year, (code % 100) as u32)
    }

    /// The Sunday this week starts on.
    pub fn start_date(&self) -> Option<NaiveDate> {
        first_week_start(self.year)?.checked_add_signed(Duration::weeks(self.week as i64 - 1))
    }

    /// The epiweek containing `date`.
    pub fn from_date(date: NaiveDate) -> Option<Self> {
        let mut year = date.year();
        if date >= first_week_start(year + 1)? {
            year += 1;
        } else if date < first_week_start(year)? {
            year -= 1;
        }
        let days = (date - first_week_start(year)?).num_days();
        Some(Self {
            year,
            week: (days / 7) as u32 + 1,
        })
    }
}
