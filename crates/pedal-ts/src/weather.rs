//! Resample raw weather observations onto the study grid.

use crate::grid::floor_to_resolution;
use chrono::{Duration, NaiveDateTime};
use pedal_core::{Interval, Weather, WeatherObservation};
use std::collections::BTreeMap;
use tracing::debug;

/// One raw reading from the weather feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawWeather {
    pub timestamp: NaiveDateTime,
    /// `None` when the feed left the temperature blank
    pub temperature: Option<f64>,
    pub precipitation: f64,
    pub wind_speed: f64,
}

struct BucketStats {
    count: usize,
    max_temperature: Option<f64>,
    precipitation: f64,
    max_wind: f64,
}

impl Default for BucketStats {
    fn default() -> Self {
        BucketStats {
            count: 0,
            max_temperature: None,
            precipitation: 0.0,
            max_wind: f64::NEG_INFINITY,
        }
    }
}

/// Aggregate readings per bucket: max temperature, summed precipitation, max
/// wind speed. Buckets without a reading are absent from the output; nothing
/// is interpolated. A bucket whose readings all lack a temperature reports
/// `0.0`, the missing-temperature marker replaced at panel join time. Output
/// is ascending by interval.
pub fn resample_weather(
    readings: impl IntoIterator<Item = RawWeather>,
    resolution: Duration,
) -> Vec<WeatherObservation> {
    let mut buckets: BTreeMap<NaiveDateTime, BucketStats> = BTreeMap::new();
    for reading in readings {
        let bucket = floor_to_resolution(reading.timestamp, resolution);
        let entry = buckets.entry(bucket).or_default();
        entry.count += 1;
        if let Some(temperature) = reading.temperature {
            entry.max_temperature = Some(
                entry
                    .max_temperature
                    .map_or(temperature, |max| max.max(temperature)),
            );
        }
        entry.precipitation += reading.precipitation;
        entry.max_wind = entry.max_wind.max(reading.wind_speed);
    }

    let readings: usize = buckets.values().map(|stats| stats.count).sum();
    debug!(readings, buckets = buckets.len(), "weather resampled");

    buckets
        .into_iter()
        .map(|(start, stats)| WeatherObservation {
            interval: Interval::from_start(start),
            weather: Weather {
                temperature: stats.max_temperature.unwrap_or(0.0),
                precipitation: stats.precipitation,
                wind_speed: stats.max_wind,
            },
        })
        .collect()
}
