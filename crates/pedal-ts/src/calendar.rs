//! Fixed calendar bucketing used when slicing prediction errors.

use chrono::Weekday;
use pedal_core::{PedalError, PedalResult};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeOfDay {
    Overnight,
    AmRush,
    MidDay,
    PmRush,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Overnight,
        TimeOfDay::AmRush,
        TimeOfDay::MidDay,
        TimeOfDay::PmRush,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TimeOfDay::Overnight => "Overnight",
            TimeOfDay::AmRush => "AM Rush",
            TimeOfDay::MidDay => "Mid-Day",
            TimeOfDay::PmRush => "PM Rush",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimeOfDay {
    type Err = PedalError;

    fn from_str(input: &str) -> PedalResult<Self> {
        let wanted = input.trim();
        TimeOfDay::ALL
            .into_iter()
            .find(|bucket| bucket.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                PedalError::Config(format!(
                    "unknown time-of-day bucket '{wanted}'; expected Overnight, AM Rush, Mid-Day or PM Rush"
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DayType {
    Weekday,
    Weekend,
}

impl DayType {
    pub fn label(&self) -> &'static str {
        match self {
            DayType::Weekday => "Weekday",
            DayType::Weekend => "Weekend",
        }
    }
}

impl fmt::Display for DayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// hour < 7 or > 18 is overnight; 7-9 AM rush; 10-14 mid-day; 15-18 PM rush.
pub fn time_of_day_bucket(hour: u32) -> TimeOfDay {
    match hour {
        7..=9 => TimeOfDay::AmRush,
        10..=14 => TimeOfDay::MidDay,
        15..=18 => TimeOfDay::PmRush,
        _ => TimeOfDay::Overnight,
    }
}

pub fn day_type(weekday: Weekday) -> DayType {
    match weekday {
        Weekday::Sat | Weekday::Sun => DayType::Weekend,
        _ => DayType::Weekday,
    }
}
