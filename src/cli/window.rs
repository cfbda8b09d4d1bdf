use crate::fetch::types::TimeWindow;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("date must be in YYYYMMDD format, got '{0}'")]
    InvalidDate(String),

    #[error("hours must be greater than zero")]
    ZeroHours,

    #[error("a window of {0} hours reaches before the earliest representable time")]
    HoursOutOfRange(u32),
}

/// How the user asked for the time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpec {
    /// One whole UTC day.
    Day(NaiveDate),
    /// The last N hours, ending now.
    LastHours(u32),
}

impl WindowSpec {
    pub fn from_args(date: Option<&str>, hours: u32) -> Result<Self, WindowError> {
        match date {
            Some(date) => NaiveDate::parse_from_str(date, "%Y%m%d")
                .map(WindowSpec::Day)
                .map_err(|_| WindowError::InvalidDate(date.to_string())),
            None if hours == 0 => Err(WindowError::ZeroHours),
            None => Ok(WindowSpec::LastHours(hours)),
        }
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> Result<TimeWindow, WindowError> {
        match self {
            WindowSpec::Day(day) => {
                let start = day.and_time(NaiveTime::MIN).and_utc();
                Ok(TimeWindow::new(start, start + Duration::days(1)))
            }
            WindowSpec::LastHours(hours) => now
                .checked_sub_signed(Duration::hours(i64::from(*hours)))
                .map(|start| TimeWindow::new(start, now))
                .ok_or(WindowError::HoursOutOfRange(*hours)),
        }
    }

    /// `<YYYYMMDD>_<suffix>`, dated by the requested day or by `now`.
    pub fn file_name(&self, now: DateTime<Utc>, suffix: &str) -> String {
        let date = match self {
            WindowSpec::Day(day) => *day,
            WindowSpec::LastHours(_) => now.date_naive(),
        };
        format!("{}_{}", date.format("%Y%m%d"), suffix)
    }

    pub fn describe(&self) -> String {
        match self {
            WindowSpec::Day(day) => day.format("%Y%m%d").to_string(),
            WindowSpec::LastHours(hours) => format!("the last {} hours", hours),
        }
    }
}
