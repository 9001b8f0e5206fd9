use std::{path::Path, sync::Arc};

use anyhow::{anyhow, Context, Result};
use pedal_algo::{build_panel, BuildReport, FeatureLayout, Panel};
use pedal_cli::cli::InputArgs;
use pedal_core::{Diagnostics, LinearSystemBackend, Severity, SolverKind, StudyConfig};
use pedal_io::{load_inputs, InputPaths};
use pedal_ts::{parse_resolution, LagFeatureEngine, TimeGrid};
use tracing::{info, warn};

/// Everything a data-driven command needs after loading and panel building.
pub struct Study {
    pub config: StudyConfig,
    pub panel: Panel,
    pub report: BuildReport,
    pub diagnostics: Diagnostics,
}

impl Study {
    pub fn layout(&self) -> FeatureLayout {
        FeatureLayout::for_panel(&self.panel, self.config.features.holiday_window_days)
    }

    pub fn solver(&self) -> Result<Arc<dyn LinearSystemBackend>> {
        let kind: SolverKind = self.config.solver.parse()?;
        Ok(kind.build_solver())
    }
}

pub fn load_config(path: &Path) -> Result<StudyConfig> {
    StudyConfig::from_path(path).with_context(|| format!("loading {}", path.display()))
}

pub fn load_study(config_path: &Path, inputs: &InputArgs) -> Result<Study> {
    let config = load_config(config_path)?;
    let resolution = parse_resolution(&config.study.resolution)?;
    let grid = TimeGrid::new(config.start()?, config.end()?, resolution)?;
    let paths = InputPaths {
        stations: inputs.stations.clone(),
        demographics: inputs.demographics.clone(),
        weather: inputs.weather.clone(),
        trips: inputs.trips.clone(),
    };
    let loaded = load_inputs(&paths, resolution)?;
    if loaded.diagnostics.error_count() > 0 {
        let errors: Vec<String> = loaded
            .diagnostics
            .issues
            .iter()
            .filter(|issue| issue.severity == Severity::Error)
            .map(ToString::to_string)
            .collect();
        return Err(anyhow!("unusable inputs: {}", errors.join("; ")));
    }

    let (mut panel, mut report) = build_panel(
        &loaded.registry,
        &grid,
        &loaded.trips,
        &loaded.weather,
        &config.weather,
    );
    report.record_malformed(loaded.malformed_rows());
    panel.apply_lag_features(&LagFeatureEngine::from_config(&config)?)?;
    if loaded.diagnostics.warning_count() > 0 {
        warn!(
            warnings = loaded.diagnostics.warning_count(),
            "input rows were skipped or repaired while loading"
        );
    }
    info!(
        records = panel.len(),
        stations = panel.station_count(),
        intervals = panel.grid_len(),
        trips = panel.total_trips(),
        "panel ready"
    );
    Ok(Study {
        config,
        panel,
        report,
        diagnostics: loaded.diagnostics,
    })
}
