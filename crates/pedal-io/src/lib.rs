//! CSV loaders for the collaborator boundary.
//!
//! Each loader reads one headered CSV file and returns the parsed rows plus
//! [`Diagnostics`] for the rows it had to drop. A file that cannot be opened or
//! has no usable header is an error; a bad row never is.

pub mod demographics;
pub mod stations;
pub mod trips;
pub mod weather;

use anyhow::{Context, Result};
use chrono::Duration;
use csv::{ReaderBuilder, Trim};
use pedal_core::{Diagnostics, Severity, StationRegistry, TripEvent, WeatherObservation};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::info;

pub use demographics::{load_demographics, DemographicRow};
pub use stations::load_stations;
pub use trips::load_trips;
pub use weather::load_weather;

/// Paths of the four collaborator files for one run.
#[derive(Debug, Clone)]
pub struct InputPaths {
    pub stations: PathBuf,
    pub demographics: PathBuf,
    pub weather: PathBuf,
    pub trips: PathBuf,
}

/// Everything the panel builder needs, already in memory.
#[derive(Debug)]
pub struct LoadedInputs {
    pub registry: StationRegistry,
    pub weather: Vec<WeatherObservation>,
    pub trips: Vec<TripEvent>,
    pub diagnostics: Diagnostics,
}

impl LoadedInputs {
    /// Input rows dropped as unreadable or inconsistent with the schema.
    pub fn malformed_rows(&self) -> usize {
        self.diagnostics
            .issues
            .iter()
            .filter(|issue| issue.severity == Severity::Warning)
            .filter(|issue| issue.category == "parse" || issue.category == "schema")
            .count()
    }
}

/// Load all inputs, deduplicate the station roster, attach tract
/// demographics and resample weather to `resolution`.
pub fn load_inputs(paths: &InputPaths, resolution: Duration) -> Result<LoadedInputs> {
    let mut diagnostics = Diagnostics::new();

    let (stations, diag) = load_stations(&paths.stations)?;
    diagnostics.merge(diag);
    let mut registry = StationRegistry::from_stations(stations, &mut diagnostics);
    if registry.is_empty() {
        diagnostics.add_error(
            "schema",
            &format!("no usable stations in '{}'", paths.stations.display()),
        );
    }

    let (tracts, diag) = load_demographics(&paths.demographics)?;
    diagnostics.merge(diag);
    registry.attach_demographics(&tracts);

    let (readings, diag) = load_weather(&paths.weather)?;
    diagnostics.merge(diag);
    let weather = pedal_ts::resample_weather(readings, resolution);

    let (trips, diag) = load_trips(&paths.trips)?;
    diagnostics.merge(diag);

    info!(
        stations = registry.len(),
        tracts = tracts.len(),
        weather_intervals = weather.len(),
        trips = trips.len(),
        dropped_rows = diagnostics.warning_count(),
        "inputs loaded"
    );
    Ok(LoadedInputs {
        registry,
        weather,
        trips,
        diagnostics,
    })
}

/// Deserialize every row of a headered CSV file. Rows that fail to
/// deserialize are recorded in `diagnostics` with their line number and
/// skipped.
pub(crate) fn read_rows<T: DeserializeOwned>(
    path: &Path,
    label: &str,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<(usize, T)>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {label} CSV '{}'", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("reading {label} CSV header '{}'", path.display()))?
        .clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map(|p| p.line() as usize).unwrap_or(0);
                diagnostics.add_warning_at_line("parse", &format!("{label}: {err}"), line);
                continue;
            }
        };
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        match record.deserialize::<T>(Some(&headers)) {
            Ok(row) => rows.push((line, row)),
            Err(err) => {
                diagnostics.add_warning_at_line("parse", &format!("{label}: {err}"), line);
            }
        }
    }
    Ok(rows)
}
