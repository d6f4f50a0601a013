//! Period resolution: turns a week/month/custom selection into an inclusive
//! date interval, and buckets dates into week-of-month references.
//!
//! Weeks are fixed 7-day blocks counted from the 1st of the month
//! (`ceil(day / 7)`), so every month has at most five weeks and the fifth one
//! is partial or empty.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::OversightError;

pub const MAX_WEEKS_PER_MONTH: u32 = 5;
const DAYS_PER_WEEK: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PeriodMode {
    Week,
    Month,
    Custom,
}

/// What the user picked in the period filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodSelection {
    pub mode: PeriodMode,
    pub week: u32,
    pub month: u32,
    pub year: i32,
    /// Explicit `from`/`to` range. Takes precedence over `mode` when present.
    pub range: Option<(NaiveDate, Option<NaiveDate>)>,
}

impl PeriodSelection {
    pub fn week(year: i32, month: u32, week: u32) -> Self {
        Self {
            mode: PeriodMode::Week,
            week,
            month,
            year,
            range: None,
        }
    }

    pub fn month(year: i32, month: u32) -> Self {
        Self {
            mode: PeriodMode::Month,
            week: 1,
            month,
            year,
            range: None,
        }
    }

    pub fn custom(from: NaiveDate, to: Option<NaiveDate>) -> Self {
        Self {
            mode: PeriodMode::Custom,
            week: 1,
            month: from.month(),
            year: from.year(),
            range: Some((from, to)),
        }
    }
}

/// Resolved inclusive interval. `Empty` stands for an impossible selection
/// and yields no results downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Period {
    Empty,
    Range { start: NaiveDate, end: NaiveDate },
}

impl Period {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        if end < start {
            Period::Empty
        } else {
            Period::Range { start, end }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Period::Empty)
    }

    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        match *self {
            Period::Empty => None,
            Period::Range { start, end } => Some((start, end)),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match *self {
            Period::Empty => false,
            Period::Range { start, end } => start <= date && date <= end,
        }
    }

    pub fn overlaps(&self, other: &Period) -> bool {
        match (self.bounds(), other.bounds()) {
            (Some((a_start, a_end)), Some((b_start, b_end))) => a_start <= b_end && b_start <= a_end,
            _ => false,
        }
    }

    /// Whether a record tagged with `reference` falls inside this period.
    pub fn covers_ref(&self, reference: &PeriodRef) -> bool {
        self.overlaps(&reference.interval())
    }

    /// Every week reference touched by the period, in chronological order.
    pub fn covered_refs(&self) -> Vec<PeriodRef> {
        let Some((start, end)) = self.bounds() else {
            return Vec::new();
        };
        let mut refs: Vec<PeriodRef> = Vec::new();
        let mut day = Some(start);
        while let Some(current) = day.filter(|d| *d <= end) {
            let reference = PeriodRef::of(current);
            refs.push(reference);
            // next week starts the day after this one ends; None past the calendar
            day = reference
                .interval()
                .bounds()
                .and_then(|(_, week_end)| week_end.succ_opt());
        }
        refs
    }
}

/// Week/month/year integers stored alongside records at insert time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodRef {
    pub week: i32,
    pub month: i32,
    pub year: i32,
}

impl PeriodRef {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            week: week_of_month(date) as i32,
            month: date.month() as i32,
            year: date.year(),
        }
    }

    /// The dates this reference stands for.
    pub fn interval(&self) -> Period {
        match (u32::try_from(self.week), u32::try_from(self.month)) {
            (Ok(week), Ok(month)) => week_interval(self.year, month, week),
            _ => Period::Empty,
        }
    }
}

pub fn week_of_month(date: NaiveDate) -> u32 {
    date.day().div_ceil(DAYS_PER_WEEK)
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    if month == 12 {
        return NaiveDate::from_ymd_opt(year, 12, 31).map(|last| last.day());
    }
    let first_of_next = NaiveDate::from_ymd_opt(year, month.checked_add(1)?, 1)?;
    first_of_next.pred_opt().map(|last| last.day())
}

pub fn month_interval(year: i32, month: u32) -> Period {
    let Some(last_day) = last_day_of_month(year, month) else {
        return Period::Empty;
    };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(year, month, last_day),
    ) {
        (Some(start), Some(end)) => Period::between(start, end),
        _ => Period::Empty,
    }
}

pub fn week_interval(year: i32, month: u32, week: u32) -> Period {
    if week == 0 || week > MAX_WEEKS_PER_MONTH {
        return Period::Empty;
    }
    let Some(last_day) = last_day_of_month(year, month) else {
        return Period::Empty;
    };
    let start_day = 1 + (week - 1) * DAYS_PER_WEEK;
    let end_day = (start_day + DAYS_PER_WEEK - 1).min(last_day);
    if end_day < start_day {
        return Period::Empty;
    }
    match (
        NaiveDate::from_ymd_opt(year, month, start_day),
        NaiveDate::from_ymd_opt(year, month, end_day),
    ) {
        (Some(start), Some(end)) => Period::between(start, end),
        _ => Period::Empty,
    }
}

pub fn resolve(selection: &PeriodSelection) -> Period {
    if let Some((from, to)) = selection.range {
        return Period::between(from, to.unwrap_or(from));
    }
    match selection.mode {
        PeriodMode::Month => month_interval(selection.year, selection.month),
        PeriodMode::Week => week_interval(selection.year, selection.month, selection.week),
        // custom without a range has nothing to resolve
        PeriodMode::Custom => Period::Empty,
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, OversightError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| OversightError::InvalidDate(value.to_string()))
}
