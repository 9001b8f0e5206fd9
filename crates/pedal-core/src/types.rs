//! Core data model: stations, intervals, trip events, weather and panel records.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use crate::error::{PedalError, PedalResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a docking station as it appears in the trip logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StationId(String);

impl StationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Census tract identifier (GEOID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TractId(String);

impl TractId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Tract-level demographic snapshot attached to a station.
///
/// Ratios are fractions in `[0, 1]`; `mean_commute_minutes` is the mean one-way
/// travel time of workers living in the tract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub population: f64,
    pub median_income: f64,
    pub median_age: f64,
    pub pct_white: f64,
    pub mean_commute_minutes: f64,
    pub pct_transit: f64,
}

/// A docking station. Immutable once the registry is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub coordinates: Coordinates,
    pub tract: Option<TractId>,
    pub demographics: Option<Demographics>,
}

impl Station {
    pub fn new(id: StationId, coordinates: Coordinates) -> Self {
        Self {
            id,
            coordinates,
            tract: None,
            demographics: None,
        }
    }

    pub fn with_tract(mut self, tract: TractId) -> Self {
        self.tract = Some(tract);
        self
    }
}

/// Discretized timestamp at the study resolution (e.g. top of the hour).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval(NaiveDateTime);

impl Interval {
    /// Wrap an already-floored timestamp. Use the time grid to floor raw times.
    pub fn from_start(start: NaiveDateTime) -> Self {
        Self(start)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.0
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn weekday(&self) -> Weekday {
        self.0.weekday()
    }

    pub fn week(&self) -> WeekKey {
        let iso = self.0.iso_week();
        WeekKey {
            year: iso.year(),
            week: iso.week(),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// ISO calendar week used for holdout windows and week-wise error reporting.
/// Orders chronologically; written and parsed as `2018-W21`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekKey {
    pub year: i32,
    pub week: u32,
}

impl WeekKey {
    pub fn new(year: i32, week: u32) -> PedalResult<Self> {
        if NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).is_none() {
            return Err(PedalError::Config(format!("{year} has no ISO week {week}")));
        }
        Ok(Self { year, week })
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekKey {
    type Err = PedalError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid =
            || PedalError::Config(format!("invalid ISO week '{input}'; expected e.g. 2018-W21"));
        let (year, week) = input.trim().split_once(['W', 'w']).ok_or_else(invalid)?;
        let year = year.strip_suffix('-').unwrap_or(year);
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let week: u32 = week.parse().map_err(|_| invalid())?;
        WeekKey::new(year, week)
    }
}

impl TryFrom<String> for WeekKey {
    type Error = PedalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WeekKey> for String {
    fn from(key: WeekKey) -> Self {
        key.to_string()
    }
}

/// A single raw trip, as handed over by the trip-log collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct TripEvent {
    pub station: StationId,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub origin: Option<Coordinates>,
    pub destination: Option<Coordinates>,
}

impl TripEvent {
    pub fn new(station: StationId, start: NaiveDateTime) -> Self {
        Self {
            station,
            start,
            end: None,
            origin: None,
            destination: None,
        }
    }
}

/// Weather attributes for one interval, shared by every station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub temperature: f64,
    pub precipitation: f64,
    pub wind_speed: f64,
}

/// Aggregated weather for one interval, keyed by interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherObservation {
    pub interval: Interval,
    pub weather: Weather,
}

/// Offset in days from the nearest configured holiday.
///
/// `Offset(d)` is positive after the holiday and negative before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HolidayProximity {
    Offset(i32),
    None,
}

impl HolidayProximity {
    pub fn label(&self) -> String {
        match self {
            HolidayProximity::Offset(d) if *d > 0 => format!("plus_{d}"),
            HolidayProximity::Offset(d) if *d < 0 => format!("minus_{}", d.abs()),
            HolidayProximity::Offset(_) => "holiday".to_string(),
            HolidayProximity::None => "none".to_string(),
        }
    }
}

/// Position of a record in the panel arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub usize);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trip count observed `offset` intervals earlier, `None` when the station's
/// history is too short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagValue {
    pub offset: usize,
    pub value: Option<u32>,
}

/// One (station, interval) cell of the panel.
///
/// Created by the panel builder; lag columns and holiday proximity are filled
/// in exactly once by the lag feature engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRecord {
    pub id: RecordId,
    pub station_index: usize,
    pub station: StationId,
    pub interval: Interval,
    pub trip_count: u32,
    pub weather: Option<Weather>,
    pub demographics: Option<Demographics>,
    pub lags: Vec<LagValue>,
    pub holiday: HolidayProximity,
}

impl PanelRecord {
    pub fn lag(&self, offset: usize) -> Option<u32> {
        self.lags
            .iter()
            .find(|lag| lag.offset == offset)
            .and_then(|lag| lag.value)
    }

    /// True once every configured lag offset has a defined value.
    pub fn has_full_history(&self) -> bool {
        self.lags.iter().all(|lag| lag.value.is_some())
    }
}

/// Parse a timestamp in any of the formats the collaborators emit.
///
/// Accepts RFC3339 (converted to naive UTC), `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SS`, `MM/DD/YYYY HH:MM` and bare `YYYY-MM-DD` (midnight).
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_utc());
    }
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%m/%d/%Y %H:%M",
        "%m/%d/%Y %H:%M:%S",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

pub fn lag_column_name(offset: usize) -> String {
    format!("lag_{offset}")
}
