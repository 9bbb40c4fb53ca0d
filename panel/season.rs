//! Flu-season labelling.
//!
//! Seasons run August through July. A season is labelled by the calendar year in
//! which it starts, so every week of one season shares a label across the New Year.

use super::types::Season;
use chrono::{Datelike, NaiveDate};

/// First calendar month (1-based) of a flu season.
pub const SEASON_START_MONTH: u32 = 8;

/// Returns the season label of `date`: its year from August on, the previous year before.
pub fn assign_season(date: NaiveDate) -> Season {
    if date.month() >= SEASON_START_MONTH {
        date.year()
    } else {
        date.year() - 1
    }
}

/// First day of the season labelled `season`.
pub fn season_start(season: Season) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(season, SEASON_START_MONTH, 1)
}
