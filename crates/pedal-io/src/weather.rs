use crate::read_rows;
use anyhow::Result;
use pedal_core::{parse_timestamp, Diagnostics};
use pedal_ts::RawWeather;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct WeatherRow {
    timestamp: String,
    temperature: Option<f64>,
    precipitation: Option<f64>,
    wind_speed: Option<f64>,
}

/// Load raw weather readings.
///
/// An empty temperature stays unknown and is ignored by the resampler. An
/// empty precipitation is read as no precipitation. Rows without a parseable
/// timestamp or wind speed are dropped.
pub fn load_weather(path: &Path) -> Result<(Vec<RawWeather>, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let rows = read_rows::<WeatherRow>(path, "weather", &mut diagnostics)?;

    let mut readings = Vec::with_capacity(rows.len());
    for (line, row) in rows {
        let Some(timestamp) = parse_timestamp(&row.timestamp) else {
            diagnostics.add_warning_at_line(
                "parse",
                &format!("weather: invalid timestamp '{}'", row.timestamp),
                line,
            );
            continue;
        };
        let Some(wind_speed) = row.wind_speed else {
            diagnostics.add_warning_at_line("parse", "weather: missing wind speed", line);
            continue;
        };
        readings.push(RawWeather {
            timestamp,
            temperature: row.temperature,
            precipitation: row.precipitation.unwrap_or(0.0),
            wind_speed,
        });
    }
    Ok((readings, diagnostics))
}
