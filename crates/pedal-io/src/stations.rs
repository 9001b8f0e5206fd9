use crate::read_rows;
use anyhow::Result;
use pedal_core::{Coordinates, Diagnostics, Station, StationId, TractId};
use serde::Deserialize;
use std::path::Path;

/// `station_id,lat,lon,tract_id`; `tract_id` is empty when the geocoder could
/// not place the station.
#[derive(Debug, Deserialize)]
pub struct StationRow {
    pub station_id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub tract_id: Option<String>,
}

/// Load the station roster in file order. Duplicates are kept here; the
/// registry decides which one wins.
pub fn load_stations(path: &Path) -> Result<(Vec<Station>, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let rows = read_rows::<StationRow>(path, "stations", &mut diagnostics)?;

    let mut stations = Vec::with_capacity(rows.len());
    for (line, row) in rows {
        if row.station_id.is_empty() {
            diagnostics.add_warning_at_line("schema", "station row without an id", line);
            continue;
        }
        if !row.lat.is_finite() || !row.lon.is_finite() {
            diagnostics.add_warning_at_line(
                "schema",
                &format!("station '{}' has non-finite coordinates", row.station_id),
                line,
            );
            continue;
        }
        let station = Station::new(
            StationId::new(row.station_id),
            Coordinates::new(row.lat, row.lon),
        );
        stations.push(match row.tract_id.filter(|t| !t.is_empty()) {
            Some(tract) => station.with_tract(TractId::new(tract)),
            None => station,
        });
    }
    Ok((stations, diagnostics))
}
