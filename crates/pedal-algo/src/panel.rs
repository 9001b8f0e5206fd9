//! Panel Builder.
//!
//! The panel is a station-major arena: the record for station `s` at grid
//! position `p` lives at index `s * grid_len + p`, and its [`RecordId`] is that
//! index. Every (station, interval) pair exists exactly once whether or not a
//! trip was observed, and each station's records form one contiguous,
//! chronologically sorted partition.

use pedal_core::{
    ExclusionCause, ExclusionReport, HolidayProximity, PanelRecord, PedalError, PedalResult,
    RecordId, Station, StationRegistry, TripEvent, Weather, WeatherObservation, WeatherPolicy,
};
use pedal_ts::{LagFeatureEngine, TimeGrid};
use rayon::prelude::*;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Panel {
    records: Vec<PanelRecord>,
    stations: Vec<Station>,
    grid_len: usize,
    lag_offsets: Vec<usize>,
    lags_applied: bool,
}

/// What happened to the raw inputs while building the panel.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub events_total: usize,
    pub events_counted: usize,
    pub unknown_station: usize,
    pub outside_period: usize,
    /// Grid intervals with no weather observation
    pub weather_gaps: usize,
    /// Intervals whose zero temperature was replaced by the fallback
    pub zero_temperature_replaced: usize,
    /// Stations without a demographic snapshot
    pub demographic_gaps: usize,
    /// Input rows the loaders could not read
    pub malformed_rows: usize,
    pub exclusions: ExclusionReport,
}

impl BuildReport {
    /// Count input rows dropped before panel building as schema violations of
    /// the panel.
    pub fn record_malformed(&mut self, rows: usize) {
        self.malformed_rows += rows;
        self.exclusions
            .record(ExclusionReport::PANEL_SCOPE, ExclusionCause::SchemaViolation, rows);
        if rows > 0 {
            warn!(rows, "malformed input rows dropped");
        }
    }
}

/// Enumerate registry x grid, then join trip counts, weather and demographics
/// by index.
///
/// Trips at unknown stations or outside the study period are dropped and
/// counted as schema violations. Weather is joined by interval; a temperature
/// of exactly zero is replaced by `policy.zero_temperature_fallback` here and
/// nowhere else.
pub fn build_panel(
    registry: &StationRegistry,
    grid: &TimeGrid,
    trips: &[TripEvent],
    weather: &[WeatherObservation],
    policy: &WeatherPolicy,
) -> (Panel, BuildReport) {
    let grid_len = grid.len();
    let station_count = registry.len();
    let mut report = BuildReport {
        events_total: trips.len(),
        ..BuildReport::default()
    };

    let mut counts = vec![0u32; station_count * grid_len];
    for trip in trips {
        let Some(station) = registry.index_of(&trip.station) else {
            debug!(station = %trip.station, start = %trip.start, "trip at unknown station dropped");
            report.unknown_station += 1;
            continue;
        };
        let Some(position) = grid.position(trip.start) else {
            debug!(station = %trip.station, start = %trip.start, "trip outside study period dropped");
            report.outside_period += 1;
            continue;
        };
        counts[station * grid_len + position] += 1;
        report.events_counted += 1;
    }

    let mut weather_by_position: Vec<Option<Weather>> = vec![None; grid_len];
    for observation in weather {
        if let Some(position) = grid.position(observation.interval.start()) {
            let mut joined = observation.weather;
            if joined.temperature == 0.0 {
                joined.temperature = policy.zero_temperature_fallback;
                report.zero_temperature_replaced += 1;
            }
            weather_by_position[position] = Some(joined);
        }
    }
    report.weather_gaps = weather_by_position.iter().filter(|w| w.is_none()).count();

    let stations = registry.stations();
    report.demographic_gaps = stations.iter().filter(|s| s.demographics.is_none()).count();

    let records: Vec<PanelRecord> = (0..station_count * grid_len)
        .into_par_iter()
        .map(|index| {
            let station_index = index / grid_len;
            let position = index % grid_len;
            let station = &stations[station_index];
            PanelRecord {
                id: RecordId(index),
                station_index,
                station: station.id.clone(),
                interval: grid.intervals()[position],
                trip_count: counts[index],
                weather: weather_by_position[position],
                demographics: station.demographics,
                lags: Vec::new(),
                holiday: HolidayProximity::None,
            }
        })
        .collect();

    let dropped = report.unknown_station + report.outside_period;
    report
        .exclusions
        .record(ExclusionReport::PANEL_SCOPE, ExclusionCause::SchemaViolation, dropped);
    if report.unknown_station > 0 {
        warn!(
            events = report.unknown_station,
            "trip events referencing unknown stations dropped"
        );
    }
    if report.outside_period > 0 {
        warn!(
            events = report.outside_period,
            "trip events outside the study period dropped"
        );
    }
    if report.weather_gaps > 0 {
        warn!(intervals = report.weather_gaps, "intervals without weather");
    }
    info!(
        stations = station_count,
        intervals = grid_len,
        records = records.len(),
        trips = report.events_counted,
        "panel built"
    );

    let panel = Panel {
        records,
        stations: stations.to_vec(),
        grid_len,
        lag_offsets: Vec::new(),
        lags_applied: false,
    };
    (panel, report)
}

impl Panel {
    /// Run the lag engine over every station partition in parallel. Allowed
    /// once per panel.
    pub fn apply_lag_features(&mut self, engine: &LagFeatureEngine) -> PedalResult<()> {
        if self.lags_applied {
            return Err(PedalError::Validation(
                "lag features already applied to this panel".into(),
            ));
        }
        if self.grid_len > 0 {
            self.records
                .par_chunks_mut(self.grid_len)
                .try_for_each(|partition| engine.apply_partition(partition))?;
        }
        self.lag_offsets = engine.offsets().to_vec();
        self.lags_applied = true;
        debug!(offsets = ?self.lag_offsets, "lag features applied");
        Ok(())
    }

    pub fn records(&self) -> &[PanelRecord] {
        &self.records
    }

    pub fn record(&self, id: RecordId) -> Option<&PanelRecord> {
        self.records.get(id.0)
    }

    /// Records of one station in chronological order.
    pub fn partition(&self, station_index: usize) -> &[PanelRecord] {
        let start = (station_index * self.grid_len).min(self.records.len());
        let end = (start + self.grid_len).min(self.records.len());
        &self.records[start..end]
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn grid_len(&self) -> usize {
        self.grid_len
    }

    pub fn lag_offsets(&self) -> &[usize] {
        &self.lag_offsets
    }

    pub fn lags_applied(&self) -> bool {
        self.lags_applied
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_trips(&self) -> u64 {
        self.records.iter().map(|r| u64::from(r.trip_count)).sum()
    }
}
