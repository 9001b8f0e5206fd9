//! Panel construction, model fitting and evaluation for station demand
//! forecasting.
//!
//! Pipeline: [`panel::build_panel`] materializes every station x interval
//! record, [`panel::Panel::apply_lag_features`] adds per-station lags,
//! [`models::ModelRegistry`] defines the competing feature sets,
//! [`evaluate`] fits them under week holdout and k-fold protocols, and
//! [`analysis`] slices the resulting errors for reporting.

pub mod analysis;
pub mod evaluate;
pub mod folds;
pub mod io;
pub mod models;
pub mod ols;
pub mod panel;

pub use analysis::{ErrorMetrics, TimeOfDay};
pub use evaluate::{
    cross_validate, CvOutcome, FoldScore, HoldoutEvaluator, HoldoutOutcome, HoldoutState,
    PredictionResult,
};
pub use folds::{holdout_split, kfold_splits, validate_folds, Split};
pub use io::{persist_dataframe, OutputStage};
pub use models::{FeatureColumn, FeatureGroup, FeatureLayout, ModelRegistry, ModelSpec};
pub use ols::OlsModel;
pub use panel::{build_panel, BuildReport, Panel};
