//! # Week Calculation Module
//!
//! Week boundaries for the weekly summary and the `Clock` capability that
//! tells the core what "today" is. Weeks start on Monday.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use chrono_tz::Tz;

/// Number of days in a reporting week
pub const DAYS_PER_WEEK: u64 = 7;

/// Source of the current date and time
pub trait Clock: Send + Sync {
    /// Current calendar date in the clock's timezone
    fn today(&self) -> NaiveDate;
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock evaluated in a configured timezone
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Current time in the clock's timezone
    pub fn local_now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        self.local_now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant, for tests and replays
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Clock reading midnight UTC of `date`
    pub fn on(date: NaiveDate) -> Self {
        Self {
            now: date.and_time(chrono::NaiveTime::MIN).and_utc(),
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

/// Monday on or before `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date - Days::new(offset)
}

/// Monday of the week containing the clock's current date
pub fn current_week_start(clock: &dyn Clock) -> NaiveDate {
    week_start(clock.today())
}

/// Half-open 7-day window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekInterval {
    pub fn starting(start: NaiveDate) -> Self {
        Self {
            start,
            end: start + Days::new(DAYS_PER_WEEK),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// The seven dates of the window, in order
    pub fn days(&self) -> Vec<NaiveDate> {
        self.start.iter_days().take(DAYS_PER_WEEK as usize).collect()
    }
}
