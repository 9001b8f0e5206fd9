use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Result;
use pedal_algo::{FeatureLayout, ModelRegistry};
use pedal_io::load_stations;
use tabwriter::TabWriter;

use crate::commands::study::load_config;

pub fn handle(config: &Path, stations: Option<&PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let station_count = match stations {
        Some(path) => load_stations(path)?.0.len(),
        None => 1,
    };
    let layout = FeatureLayout {
        station_count,
        lag_offsets: config.features.lag_offsets.clone(),
        holiday_window_days: config.features.holiday_window_days,
    };
    let registry = ModelRegistry::default_registry();

    let mut tw = TabWriter::new(io::stdout());
    writeln!(tw, "MODEL\tGROUPS\tCOLUMNS")?;
    for spec in registry.specs() {
        let groups: Vec<&str> = spec.groups.iter().map(|g| g.as_str()).collect();
        writeln!(
            tw,
            "{}\t{}\t{}",
            spec.name,
            groups.join("+"),
            spec.columns(&layout).len()
        )?;
    }
    tw.flush()?;
    println!(
        "{} models, {} station(s), lags {:?}",
        registry.len(),
        station_count,
        layout.lag_offsets
    );
    Ok(())
}
