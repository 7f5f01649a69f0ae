//! Date parsing, weekend/holiday classification and weekday grouping.
//!
//! Weekday numbering follows the specification's convention: 0 = Monday,
//! 6 = Sunday.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_holiday(date: NaiveDate, holidays: &BTreeSet<NaiveDate>) -> bool {
    holidays.contains(&date)
}

/// Weekend-or-holiday counts toward the weekend cap (rule 8 in the
/// constraint evaluator).
pub fn counts_as_weekend(date: NaiveDate, holidays: &BTreeSet<NaiveDate>) -> bool {
    is_weekend(date) || is_holiday(date, holidays)
}

pub fn days_between(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days().abs()
}

/// Inclusive iteration over `[start, end]`.
pub fn iter_dates(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let mut current = start;
    std::iter::from_fn(move || {
        if current > end {
            None
        } else {
            let out = current;
            current += Duration::days(1);
            Some(out)
        }
    })
}

/// Count weekend (or holiday) days within `[start, end]`, used to derive a
/// worker's proportional weekend cap from their target.
pub fn count_weekend_days(start: NaiveDate, end: NaiveDate, holidays: &BTreeSet<NaiveDate>) -> u32 {
    iter_dates(start, end)
        .filter(|d| counts_as_weekend(*d, holidays))
        .count() as u32
}

pub fn total_days(start: NaiveDate, end: NaiveDate) -> u32 {
    ((end - start).num_days() + 1).max(0) as u32
}
