//! Model Registry.
//!
//! A model is a named list of [`FeatureGroup`]s. Each group expands to a fixed
//! set of [`FeatureColumn`]s for a given panel layout; the estimator consumes
//! those columns directly and never parses a formula.

use crate::panel::Panel;
use chrono::Weekday;
use pedal_core::{
    lag_column_name, ExclusionCause, HolidayProximity, PanelRecord, PedalError, PedalResult,
    Station,
};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureGroup {
    /// Hour-of-day and day-of-week indicators
    Temporal,
    /// Station identity indicators
    Spatial,
    /// Temperature, precipitation, wind speed
    Weather,
    /// Lagged trip counts and holiday proximity
    Lag,
    /// Tract demographic snapshot
    Demographic,
}

impl FeatureGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureGroup::Temporal => "temporal",
            FeatureGroup::Spatial => "spatial",
            FeatureGroup::Weather => "weather",
            FeatureGroup::Lag => "lag",
            FeatureGroup::Demographic => "demographic",
        }
    }
}

impl fmt::Display for FeatureGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One design-matrix column. Categorical features are treatment-coded
/// against the first level, which has no column of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureColumn {
    Intercept,
    Hour(u32),
    Weekday(Weekday),
    Station(usize),
    Temperature,
    Precipitation,
    WindSpeed,
    Lag(usize),
    Holiday(i32),
    Population,
    MedianIncome,
    MedianAge,
    PctWhite,
    MeanCommute,
    PctTransit,
}

impl FeatureColumn {
    /// True for 0/1 indicator columns.
    pub fn is_indicator(&self) -> bool {
        matches!(
            self,
            FeatureColumn::Hour(_)
                | FeatureColumn::Weekday(_)
                | FeatureColumn::Station(_)
                | FeatureColumn::Holiday(_)
        )
    }

    /// Column value for a record, `None` when the underlying attribute is
    /// missing.
    pub fn value(&self, record: &PanelRecord) -> Option<f64> {
        let indicator = |on: bool| Some(if on { 1.0 } else { 0.0 });
        match *self {
            FeatureColumn::Intercept => Some(1.0),
            FeatureColumn::Hour(h) => indicator(record.interval.hour() == h),
            FeatureColumn::Weekday(day) => indicator(record.interval.weekday() == day),
            FeatureColumn::Station(index) => indicator(record.station_index == index),
            FeatureColumn::Temperature => record.weather.map(|w| w.temperature),
            FeatureColumn::Precipitation => record.weather.map(|w| w.precipitation),
            FeatureColumn::WindSpeed => record.weather.map(|w| w.wind_speed),
            FeatureColumn::Lag(offset) => record.lag(offset).map(f64::from),
            FeatureColumn::Holiday(offset) => {
                indicator(record.holiday == HolidayProximity::Offset(offset))
            }
            FeatureColumn::Population => record.demographics.map(|d| d.population),
            FeatureColumn::MedianIncome => record.demographics.map(|d| d.median_income),
            FeatureColumn::MedianAge => record.demographics.map(|d| d.median_age),
            FeatureColumn::PctWhite => record.demographics.map(|d| d.pct_white),
            FeatureColumn::MeanCommute => record.demographics.map(|d| d.mean_commute_minutes),
            FeatureColumn::PctTransit => record.demographics.map(|d| d.pct_transit),
        }
    }

    pub fn name(&self, stations: &[Station]) -> String {
        match *self {
            FeatureColumn::Intercept => "intercept".to_string(),
            FeatureColumn::Hour(h) => format!("hour_{h}"),
            FeatureColumn::Weekday(day) => format!("weekday_{day}"),
            FeatureColumn::Station(index) => match stations.get(index) {
                Some(station) => format!("station_{}", station.id),
                None => format!("station_#{index}"),
            },
            FeatureColumn::Temperature => "temperature".to_string(),
            FeatureColumn::Precipitation => "precipitation".to_string(),
            FeatureColumn::WindSpeed => "wind_speed".to_string(),
            FeatureColumn::Lag(offset) => lag_column_name(offset),
            FeatureColumn::Holiday(offset) => {
                format!("holiday_{}", HolidayProximity::Offset(offset).label())
            }
            FeatureColumn::Population => "population".to_string(),
            FeatureColumn::MedianIncome => "median_income".to_string(),
            FeatureColumn::MedianAge => "median_age".to_string(),
            FeatureColumn::PctWhite => "pct_white".to_string(),
            FeatureColumn::MeanCommute => "mean_commute".to_string(),
            FeatureColumn::PctTransit => "pct_transit".to_string(),
        }
    }
}

/// Panel dimensions that determine how groups expand into columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLayout {
    pub station_count: usize,
    pub lag_offsets: Vec<usize>,
    pub holiday_window_days: i64,
}

impl FeatureLayout {
    pub fn for_panel(panel: &Panel, holiday_window_days: i64) -> Self {
        Self {
            station_count: panel.station_count(),
            lag_offsets: panel.lag_offsets().to_vec(),
            holiday_window_days,
        }
    }
}

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub groups: Vec<FeatureGroup>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, groups: Vec<FeatureGroup>) -> Self {
        Self {
            name: name.into(),
            groups,
        }
    }

    pub fn requires(&self, group: FeatureGroup) -> bool {
        self.groups.contains(&group)
    }

    /// Design columns in a fixed order: intercept, then each group in the
    /// order the spec lists them.
    pub fn columns(&self, layout: &FeatureLayout) -> Vec<FeatureColumn> {
        let mut columns = vec![FeatureColumn::Intercept];
        for group in &self.groups {
            match group {
                FeatureGroup::Temporal => {
                    columns.extend((1..24).map(FeatureColumn::Hour));
                    columns.extend(WEEKDAYS[1..].iter().copied().map(FeatureColumn::Weekday));
                }
                FeatureGroup::Spatial => {
                    columns.extend((1..layout.station_count).map(FeatureColumn::Station));
                }
                FeatureGroup::Weather => columns.extend([
                    FeatureColumn::Temperature,
                    FeatureColumn::Precipitation,
                    FeatureColumn::WindSpeed,
                ]),
                FeatureGroup::Lag => {
                    columns.extend(layout.lag_offsets.iter().copied().map(FeatureColumn::Lag));
                    let window = i32::try_from(layout.holiday_window_days).unwrap_or(0);
                    columns.extend((-window..=window).map(FeatureColumn::Holiday));
                }
                FeatureGroup::Demographic => columns.extend([
                    FeatureColumn::Population,
                    FeatureColumn::MedianIncome,
                    FeatureColumn::MedianAge,
                    FeatureColumn::PctWhite,
                    FeatureColumn::MeanCommute,
                    FeatureColumn::PctTransit,
                ]),
            }
        }
        columns
    }

    /// `Ok` when the record carries every attribute this spec depends on,
    /// otherwise the first missing one.
    pub fn eligibility(&self, record: &PanelRecord) -> Result<(), ExclusionCause> {
        if self.requires(FeatureGroup::Weather) && record.weather.is_none() {
            return Err(ExclusionCause::JoinGapWeather);
        }
        if self.requires(FeatureGroup::Demographic) && record.demographics.is_none() {
            return Err(ExclusionCause::JoinGapDemographics);
        }
        if self.requires(FeatureGroup::Lag) && !record.has_full_history() {
            return Err(ExclusionCause::InsufficientHistory);
        }
        Ok(())
    }
}

/// Ordered, progressively richer list of model specs.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    specs: Vec<ModelSpec>,
}

impl ModelRegistry {
    pub fn new(specs: Vec<ModelSpec>) -> PedalResult<Self> {
        if specs.is_empty() {
            return Err(PedalError::Config("model registry cannot be empty".into()));
        }
        let mut names = HashSet::new();
        for spec in &specs {
            if !names.insert(spec.name.as_str()) {
                return Err(PedalError::Config(format!(
                    "duplicate model name '{}'",
                    spec.name
                )));
            }
            let groups: HashSet<_> = spec.groups.iter().collect();
            if groups.len() != spec.groups.len() {
                return Err(PedalError::Config(format!(
                    "model '{}' lists a feature group twice",
                    spec.name
                )));
            }
        }
        Ok(Self { specs })
    }

    /// Temporal only, then adding spatial, weather, demographic and finally
    /// lag features.
    pub fn default_registry() -> Self {
        use FeatureGroup::*;
        Self {
            specs: vec![
                ModelSpec::new("temporal", vec![Temporal]),
                ModelSpec::new("temporal_spatial", vec![Temporal, Spatial]),
                ModelSpec::new("temporal_spatial_weather", vec![Temporal, Spatial, Weather]),
                ModelSpec::new(
                    "temporal_spatial_weather_demographic",
                    vec![Temporal, Spatial, Weather, Demographic],
                ),
                ModelSpec::new("full", vec![Temporal, Spatial, Weather, Demographic, Lag]),
            ],
        }
    }

    pub fn specs(&self) -> &[ModelSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    /// Last registered spec, the one with the most feature groups.
    pub fn richest(&self) -> Option<&ModelSpec> {
        self.specs.last()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
