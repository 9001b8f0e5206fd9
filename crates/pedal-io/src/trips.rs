use crate::read_rows;
use anyhow::Result;
use pedal_core::{parse_timestamp, Coordinates, Diagnostics, StationId, TripEvent};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// `station_id,start_time` followed by optional end time and coordinates.
#[derive(Debug, Deserialize)]
struct TripRow {
    station_id: String,
    start_time: String,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    start_lat: Option<f64>,
    #[serde(default)]
    start_lon: Option<f64>,
    #[serde(default)]
    end_lat: Option<f64>,
    #[serde(default)]
    end_lon: Option<f64>,
}

fn coordinates(lat: Option<f64>, lon: Option<f64>) -> Option<Coordinates> {
    Some(Coordinates::new(lat?, lon?))
}

/// Load trip events. Station membership and study-period bounds are checked
/// later by the panel builder.
pub fn load_trips(path: &Path) -> Result<(Vec<TripEvent>, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let rows = read_rows::<TripRow>(path, "trips", &mut diagnostics)?;

    let mut trips = Vec::with_capacity(rows.len());
    for (line, row) in rows {
        if row.station_id.is_empty() {
            diagnostics.add_warning_at_line("schema", "trip without a start station", line);
            continue;
        }
        let Some(start) = parse_timestamp(&row.start_time) else {
            diagnostics.add_warning_at_line(
                "parse",
                &format!("trips: invalid start time '{}'", row.start_time),
                line,
            );
            continue;
        };
        trips.push(TripEvent {
            station: StationId::new(row.station_id),
            start,
            end: row.end_time.as_deref().and_then(parse_timestamp),
            origin: coordinates(row.start_lat, row.start_lon),
            destination: coordinates(row.end_lat, row.end_lon),
        });
    }
    debug!(trips = trips.len(), dropped = diagnostics.warning_count(), "trip log parsed");
    Ok((trips, diagnostics))
}
