use crate::domain::models::{Day, WeekRef};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

/// Grid granularity in minutes. Also the minimum length a clipped entry may keep.
pub const SLOT_MINUTES: u32 = 60;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Half-open minute interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn of(start_time: &str, end_time: &str) -> Option<Self> {
        Self::new(parse_hhmm(start_time)?, parse_hhmm(end_time)?)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn covers(&self, other: &Span) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    pub fn duration(&self) -> u32 {
        self.end - self.start
    }

    pub fn shifted(&self, offset: i64) -> Option<Self> {
        let start = u32::try_from(i64::from(self.start) + offset).ok()?;
        let end = u32::try_from(i64::from(self.end) + offset).ok()?;
        if end > MINUTES_PER_DAY {
            return None;
        }
        Self::new(start, end)
    }
}

/// Strict `HH:MM` parser returning minutes since midnight.
pub fn parse_hhmm(value: &str) -> Option<u32> {
    let (hour, minute) = value.split_once(':')?;
    if hour.len() != 2 || minute.len() != 2 {
        return None;
    }
    let hour = hour.parse::<u32>().ok()?;
    let minute = minute.parse::<u32>().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(hour * 60 + minute)
}

/// Formats minutes since midnight as `HH:MM`, capped at the end of the day.
pub fn minutes_to_time(minutes: u32) -> String {
    let minutes = minutes.min(MINUTES_PER_DAY);
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn week_of(date: NaiveDate) -> WeekRef {
    let iso = date.iso_week();
    WeekRef::new(iso.year(), iso.week())
}

/// ISO Monday of the week, `None` for a week the ISO year does not have.
pub fn week_start(week: WeekRef) -> Option<NaiveDate> {
    NaiveDate::from_isoywd_opt(week.year, week.week, Weekday::Mon)
}

pub fn day_date(week: WeekRef, day: Day) -> Option<NaiveDate> {
    week_start(week).map(|monday| monday + Duration::days(i64::from(day.index())))
}

/// Moves by whole weeks through the calendar so year boundaries roll over correctly.
pub fn shift_week(week: WeekRef, offset: i64) -> Option<WeekRef> {
    let monday = week_start(week)?;
    let shifted = monday.checked_add_signed(Duration::days(offset.checked_mul(7)?))?;
    Some(week_of(shifted))
}

pub fn today_in(timezone: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&timezone).date_naive()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}
