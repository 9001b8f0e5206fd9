//! # pedal-core: data model for station-level bike-share demand panels
//!
//! Shared types for every stage of the pipeline:
//!
//! - [`Station`], [`StationRegistry`]: the fixed roster that indexes the panel
//! - [`Interval`], [`WeekKey`]: discretized, totally ordered time buckets
//! - [`PanelRecord`]: one (station, interval) cell with trip count, weather,
//!   demographics and lag features
//! - [`StudyConfig`]: every tunable of a run, loaded from TOML
//! - [`PedalError`], [`ExclusionReport`]: fatal errors vs. counted row exclusions
//! - [`solver`]: dense linear-system backends for the least-squares fit

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod solver;
pub mod stations;
pub mod types;

pub use config::{
    AnalysisConfig, CvConfig, FeatureConfig, HoldoutWindows, StudyConfig, StudyPeriod,
    WeatherPolicy,
};
pub use diagnostics::{DiagnosticIssue, Diagnostics, ExclusionCause, ExclusionReport, Severity};
pub use error::{PedalError, PedalResult};
pub use solver::{FaerSolver, GaussSolver, LinearSystemBackend, SolverKind};
pub use stations::StationRegistry;
pub use types::*;
