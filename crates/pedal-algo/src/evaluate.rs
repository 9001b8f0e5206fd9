//! Fold Evaluator: week holdout and k-fold cross-validation over every
//! registered model.
//!
//! Fits are independent per (model, split) pair and run on the rayon pool.
//! Results are collected from indexed parallel iterators, so their order is
//! registry order and fold order regardless of scheduling.

use crate::analysis::{by_model_week, cv_summary, CvSummary, ErrorMetrics, ModelWeekError};
use crate::folds::{holdout_split, kfold_splits, Split};
use crate::models::{FeatureColumn, FeatureLayout, ModelRegistry, ModelSpec};
use crate::ols::OlsModel;
use crate::panel::Panel;
use pedal_core::{
    CvConfig, ExclusionCause, ExclusionReport, HoldoutWindows, Interval, LinearSystemBackend,
    PanelRecord, PedalError, PedalResult, RecordId, WeekKey,
};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One scored (or failed) prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub record: RecordId,
    pub model: String,
    pub station_index: usize,
    pub interval: Interval,
    pub observed: u32,
    /// `None` when the model could not score the row
    pub predicted: Option<f64>,
}

impl PredictionResult {
    pub fn signed_error(&self) -> Option<f64> {
        self.predicted
            .map(|predicted| f64::from(self.observed) - predicted)
    }

    pub fn absolute_error(&self) -> Option<f64> {
        self.signed_error().map(f64::abs)
    }

    pub fn week(&self) -> WeekKey {
        self.interval.week()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoldScore {
    pub model: String,
    /// 1-based fold number
    pub fold: usize,
    pub train_rows: usize,
    pub metrics: ErrorMetrics,
}

/// Sizes of one model's holdout split and how its fit went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSummary {
    pub model: String,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Columns dropped as aliased; `None` when the fit failed
    pub aliased_columns: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct HoldoutOutcome {
    pub splits: Vec<SplitSummary>,
    /// Grouped by model in registry order, then by test week
    pub predictions: Vec<PredictionResult>,
    pub weekly: Vec<ModelWeekError>,
    pub exclusions: ExclusionReport,
}

#[derive(Debug, Clone)]
pub struct CvOutcome {
    pub universe: usize,
    pub folds: Vec<FoldScore>,
    pub summary: Vec<CvSummary>,
    pub exclusions: ExclusionReport,
}

/// Fit on the split's training ids. A degenerate fit is not an error: it
/// yields `None` and every prediction of the split is reported as failed.
fn fit_split(
    spec: &ModelSpec,
    columns: &[FeatureColumn],
    panel: &Panel,
    train: &[RecordId],
    solver: &dyn LinearSystemBackend,
) -> PedalResult<Option<OlsModel>> {
    let rows: Vec<&PanelRecord> = train.iter().filter_map(|id| panel.record(*id)).collect();
    match OlsModel::fit(columns, &rows, solver) {
        Ok(model) => Ok(Some(model)),
        Err(err) if !err.is_fatal() => {
            warn!(model = %spec.name, error = %err, "fit failed; predictions reported as failed");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn predict_ids(
    spec: &ModelSpec,
    model: Option<&OlsModel>,
    panel: &Panel,
    ids: &[RecordId],
) -> Vec<PredictionResult> {
    ids.iter()
        .filter_map(|id| panel.record(*id))
        .map(|record| PredictionResult {
            record: record.id,
            model: spec.name.clone(),
            station_index: record.station_index,
            interval: record.interval,
            observed: record.trip_count,
            predicted: model.and_then(|m| m.predict(record)),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldoutState {
    Idle,
    Split,
    FitPerModel,
    PredictPerWeek,
    Score,
}

/// Train on a contiguous block of weeks, test on a later block, and report
/// errors per test week.
pub struct HoldoutEvaluator {
    windows: HoldoutWindows,
    layout: FeatureLayout,
    solver: Arc<dyn LinearSystemBackend>,
    state: HoldoutState,
}

impl HoldoutEvaluator {
    pub fn new(
        windows: HoldoutWindows,
        layout: FeatureLayout,
        solver: Arc<dyn LinearSystemBackend>,
    ) -> Self {
        Self {
            windows,
            layout,
            solver,
            state: HoldoutState::Idle,
        }
    }

    pub fn state(&self) -> HoldoutState {
        self.state
    }

    fn advance(&mut self, next: HoldoutState) {
        debug!(from = ?self.state, to = ?next, "holdout state");
        self.state = next;
    }

    pub fn run(&mut self, panel: &Panel, registry: &ModelRegistry) -> PedalResult<HoldoutOutcome> {
        self.state = HoldoutState::Idle;
        self.advance(HoldoutState::Split);
        self.windows.validate()?;

        let mut exclusions = ExclusionReport::default();
        let mut splits: Vec<Split> = Vec::with_capacity(registry.len());
        for spec in registry.specs() {
            let mut eligible = Vec::new();
            for record in panel.records() {
                let week = record.interval.week();
                if !self.windows.contains_train(week) && !self.windows.contains_test(week) {
                    continue;
                }
                match spec.eligibility(record) {
                    Ok(()) => eligible.push(record),
                    Err(cause) => exclusions.record(&spec.name, cause, 1),
                }
            }
            let mut split = holdout_split(eligible, &self.windows)?;
            split.label = spec.name.clone();
            splits.push(split);
        }

        self.advance(HoldoutState::FitPerModel);
        let columns: Vec<Vec<FeatureColumn>> = registry
            .specs()
            .iter()
            .map(|spec| spec.columns(&self.layout))
            .collect();
        let solver = self.solver.as_ref();
        let models: Vec<Option<OlsModel>> = registry
            .specs()
            .par_iter()
            .zip(columns.par_iter())
            .zip(splits.par_iter())
            .map(|((spec, columns), split)| fit_split(spec, columns, panel, &split.train, solver))
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<PedalResult<_>>()?;

        self.advance(HoldoutState::PredictPerWeek);
        let per_model: Vec<Vec<PredictionResult>> = registry
            .specs()
            .par_iter()
            .zip(models.par_iter())
            .zip(splits.par_iter())
            .map(|((spec, model), split)| {
                let mut by_week: BTreeMap<WeekKey, Vec<RecordId>> = BTreeMap::new();
                for id in &split.test {
                    if let Some(record) = panel.record(*id) {
                        by_week.entry(record.interval.week()).or_default().push(*id);
                    }
                }
                by_week
                    .values()
                    .flat_map(|ids| predict_ids(spec, model.as_ref(), panel, ids))
                    .collect()
            })
            .collect();

        self.advance(HoldoutState::Score);
        let mut summaries = Vec::with_capacity(registry.len());
        for (((spec, model), split), predictions) in registry
            .specs()
            .iter()
            .zip(&models)
            .zip(&splits)
            .zip(&per_model)
        {
            let failed = predictions.iter().filter(|p| p.predicted.is_none()).count();
            exclusions.record(&spec.name, ExclusionCause::ModelDegeneracy, failed);
            let metrics = ErrorMetrics::from_predictions(predictions);
            info!(
                model = %spec.name,
                train = split.train.len(),
                test = split.test.len(),
                failed,
                mae = metrics.mae.unwrap_or(f64::NAN),
                "holdout scored"
            );
            summaries.push(SplitSummary {
                model: spec.name.clone(),
                train_rows: split.train.len(),
                test_rows: split.test.len(),
                aliased_columns: model.as_ref().map(OlsModel::aliased_count),
            });
        }
        let predictions: Vec<PredictionResult> = per_model.into_iter().flatten().collect();
        let weekly = by_model_week(&predictions);

        Ok(HoldoutOutcome {
            splits: summaries,
            predictions,
            weekly,
            exclusions,
        })
    }
}

/// K-fold cross-validation over the records every registered model can use,
/// so all models are scored on identical folds.
///
/// A record left out of the universe is counted, for every model, under the
/// first cause (in registry order) that made some model reject it.
pub fn cross_validate(
    panel: &Panel,
    registry: &ModelRegistry,
    layout: &FeatureLayout,
    cv: &CvConfig,
    solver: &dyn LinearSystemBackend,
) -> PedalResult<CvOutcome> {
    let mut exclusions = ExclusionReport::default();
    let mut universe = Vec::new();
    for record in panel.records() {
        let cause = registry
            .specs()
            .iter()
            .find_map(|spec| spec.eligibility(record).err());
        match cause {
            None => universe.push(record.id),
            Some(cause) => {
                for spec in registry.specs() {
                    exclusions.record(&spec.name, cause, 1);
                }
            }
        }
    }
    if universe.is_empty() {
        return Err(PedalError::SplitViolation(
            "no record is eligible for every model; nothing to cross-validate".into(),
        ));
    }

    let splits = kfold_splits(&universe, cv.folds, cv.seed)?;
    info!(
        universe = universe.len(),
        folds = splits.len(),
        seed = cv.seed,
        "cross-validation folds assigned"
    );

    let columns: Vec<Vec<FeatureColumn>> = registry
        .specs()
        .iter()
        .map(|spec| spec.columns(layout))
        .collect();
    let jobs: Vec<(usize, usize)> = (0..registry.len())
        .flat_map(|spec| (0..splits.len()).map(move |fold| (spec, fold)))
        .collect();
    let folds: Vec<FoldScore> = jobs
        .par_iter()
        .map(|&(spec_index, fold)| {
            let spec = &registry.specs()[spec_index];
            let split = &splits[fold];
            let model = fit_split(spec, &columns[spec_index], panel, &split.train, solver)?;
            let predictions = predict_ids(spec, model.as_ref(), panel, &split.test);
            Ok(FoldScore {
                model: spec.name.clone(),
                fold: fold + 1,
                train_rows: split.train.len(),
                metrics: ErrorMetrics::from_predictions(&predictions),
            })
        })
        .collect::<Vec<PedalResult<FoldScore>>>()
        .into_iter()
        .collect::<PedalResult<_>>()?;

    for score in &folds {
        exclusions.record(&score.model, ExclusionCause::ModelDegeneracy, score.metrics.failed);
    }
    let summary = cv_summary(&folds);
    for row in &summary {
        info!(
            model = %row.model,
            mae = ?row.mae_mean,
            mae_sd = ?row.mae_sd,
            rmse = ?row.rmse_mean,
            "cross-validation scored"
        );
    }
    Ok(CvOutcome {
        universe: universe.len(),
        folds,
        summary,
        exclusions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureGroup;
    use crate::panel::build_panel;
    use chrono::{Datelike, Duration, NaiveDate};
    use pedal_core::{
        Coordinates, Diagnostics, FaerSolver, Station, StationId, StationRegistry, TripEvent,
        Weather, WeatherObservation, WeatherPolicy,
    };
    use pedal_ts::{LagFeatureEngine, TimeGrid};

    // 2018-04-30 is the Monday of ISO week 18
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 4, 30).unwrap()
    }

    fn panel(weeks: i64) -> Panel {
        hourly_panel(weeks, LagFeatureEngine::new(vec![1, 24], Vec::new(), 3), &[])
    }

    fn hourly_panel(
        weeks: i64,
        engine: LagFeatureEngine,
        weather: &[WeatherObservation],
    ) -> Panel {
        let stations = ["A", "B"]
            .iter()
            .map(|id| Station::new(StationId::new(*id), Coordinates::new(39.95, -75.16)));
        let registry = StationRegistry::from_stations(stations, &mut Diagnostics::new());
        let start = monday().and_hms_opt(0, 0, 0).unwrap();
        let end = start + Duration::weeks(weeks);
        let grid = TimeGrid::new(start, end, Duration::hours(1)).unwrap();
        let trips: Vec<TripEvent> = grid
            .intervals()
            .iter()
            .flat_map(|interval| {
                let n = match interval.hour() {
                    8 => 4,
                    17 => 3,
                    h if h % 5 == 0 => 1,
                    _ => 0,
                };
                (0..n).map(move |_| TripEvent::new(StationId::new("A"), interval.start()))
            })
            .collect();
        let (mut panel, _) =
            build_panel(&registry, &grid, &trips, weather, &WeatherPolicy::default());
        panel.apply_lag_features(&engine).unwrap();
        panel
    }

    fn layout(panel: &Panel) -> FeatureLayout {
        FeatureLayout::for_panel(panel, 3)
    }

    fn weeks(first: &str, last: &str) -> [WeekKey; 2] {
        [first.parse().unwrap(), last.parse().unwrap()]
    }

    #[test]
    fn holdout_walks_states_and_groups_by_week() {
        let panel = panel(4);
        let registry = ModelRegistry::new(vec![
            ModelSpec::new("temporal", vec![FeatureGroup::Temporal]),
            ModelSpec::new("lagged", vec![FeatureGroup::Temporal, FeatureGroup::Lag]),
        ])
        .unwrap();
        let windows = HoldoutWindows {
            train_weeks: weeks("2018-W18", "2018-W20"),
            test_weeks: weeks("2018-W21", "2018-W21"),
        };
        let mut evaluator = HoldoutEvaluator::new(windows, layout(&panel), Arc::new(FaerSolver));
        assert_eq!(evaluator.state(), HoldoutState::Idle);
        let outcome = evaluator.run(&panel, &registry).unwrap();
        assert_eq!(evaluator.state(), HoldoutState::Score);

        assert_eq!(outcome.splits[0].train_rows, 2 * 24 * 21);
        assert_eq!(outcome.splits[0].test_rows, 2 * 24 * 7);
        // first 24 hours of each station lack lag_24
        assert_eq!(outcome.splits[1].train_rows, 2 * 24 * 20);
        assert_eq!(
            outcome
                .exclusions
                .count("lagged", ExclusionCause::InsufficientHistory),
            48
        );
        assert_eq!(outcome.weekly.len(), 2);
        assert!(outcome.weekly.iter().all(|w| w.week.week == 21));
        assert!(outcome.weekly.iter().all(|w| w.metrics.mae.unwrap() >= 0.0));
    }

    #[test]
    fn overlapping_holdout_fails_before_fitting() {
        let panel = panel(2);
        let windows = HoldoutWindows {
            train_weeks: weeks("2018-W18", "2018-W19"),
            test_weeks: weeks("2018-W19", "2018-W19"),
        };
        let mut evaluator = HoldoutEvaluator::new(windows, layout(&panel), Arc::new(FaerSolver));
        let err = evaluator
            .run(&panel, &ModelRegistry::default_registry())
            .unwrap_err();
        assert!(matches!(err, PedalError::SplitViolation(_)));
        assert_eq!(evaluator.state(), HoldoutState::Split);
    }

    #[test]
    fn cross_validation_scores_every_model_on_shared_folds() {
        let panel = panel(2);
        let registry = ModelRegistry::new(vec![
            ModelSpec::new("temporal", vec![FeatureGroup::Temporal]),
            ModelSpec::new("lagged", vec![FeatureGroup::Temporal, FeatureGroup::Lag]),
        ])
        .unwrap();
        let cv = CvConfig { folds: 4, seed: 42 };
        let outcome = cross_validate(&panel, &registry, &layout(&panel), &cv, &FaerSolver).unwrap();
        assert_eq!(outcome.universe, panel.len() - 48);
        assert_eq!(outcome.folds.len(), 8);
        assert_eq!(outcome.summary.len(), 2);
        // the temporal model loses the same rows as the lagged one
        assert_eq!(
            outcome
                .exclusions
                .count("temporal", ExclusionCause::InsufficientHistory),
            48
        );
        let again = cross_validate(&panel, &registry, &layout(&panel), &cv, &FaerSolver).unwrap();
        assert_eq!(outcome.folds, again.folds);
    }

    #[test]
    fn unseen_holiday_levels_fail_without_sinking_the_run() {
        // Wednesday of week 21: offsets -1..=1 only ever occur in the test week
        let holiday = NaiveDate::from_ymd_opt(2018, 5, 23).unwrap();
        let panel = hourly_panel(4, LagFeatureEngine::new(vec![1, 24], vec![holiday], 1), &[]);
        let registry = ModelRegistry::new(vec![
            ModelSpec::new("temporal", vec![FeatureGroup::Temporal]),
            ModelSpec::new("lagged", vec![FeatureGroup::Temporal, FeatureGroup::Lag]),
        ])
        .unwrap();
        let windows = HoldoutWindows {
            train_weeks: weeks("2018-W18", "2018-W20"),
            test_weeks: weeks("2018-W21", "2018-W21"),
        };
        let mut evaluator = HoldoutEvaluator::new(
            windows,
            FeatureLayout::for_panel(&panel, 1),
            Arc::new(FaerSolver),
        );
        let outcome = evaluator.run(&panel, &registry).unwrap();

        let near_holiday = 2 * 24 * 3;
        let failed: Vec<&PredictionResult> = outcome
            .predictions
            .iter()
            .filter(|p| p.model == "lagged" && p.predicted.is_none())
            .collect();
        assert_eq!(failed.len(), near_holiday);
        assert!(failed
            .iter()
            .all(|p| (22..=24).contains(&p.interval.start().day())));
        assert_eq!(
            outcome
                .exclusions
                .count("lagged", ExclusionCause::ModelDegeneracy),
            near_holiday
        );
        assert_eq!(
            outcome.exclusions.count("temporal", ExclusionCause::ModelDegeneracy),
            0
        );

        let lagged = outcome.weekly.iter().find(|w| w.model == "lagged").unwrap();
        assert_eq!(lagged.metrics.failed, near_holiday);
        assert_eq!(lagged.metrics.count, 2 * 24 * 7 - near_holiday);
        assert!(lagged.metrics.mae.unwrap() >= 0.0);
        let temporal = outcome.weekly.iter().find(|w| w.model == "temporal").unwrap();
        assert_eq!(temporal.metrics.failed, 0);
        assert!(temporal.metrics.mae.unwrap().is_finite());
    }

    #[test]
    fn empty_training_set_fails_every_prediction_of_that_model() {
        // weather arrives only in the test week
        let weather: Vec<WeatherObservation> = (0..7 * 24)
            .map(|h| {
                let start = monday().and_hms_opt(0, 0, 0).unwrap()
                    + Duration::weeks(3)
                    + Duration::hours(h);
                WeatherObservation {
                    interval: Interval::from_start(start),
                    weather: Weather {
                        temperature: 50.0 + (h % 12) as f64,
                        precipitation: 0.0,
                        wind_speed: 4.0,
                    },
                }
            })
            .collect();
        let panel = hourly_panel(4, LagFeatureEngine::new(vec![1, 24], Vec::new(), 3), &weather);
        let registry = ModelRegistry::new(vec![
            ModelSpec::new("temporal", vec![FeatureGroup::Temporal]),
            ModelSpec::new("weather", vec![FeatureGroup::Temporal, FeatureGroup::Weather]),
        ])
        .unwrap();
        let windows = HoldoutWindows {
            train_weeks: weeks("2018-W18", "2018-W20"),
            test_weeks: weeks("2018-W21", "2018-W21"),
        };
        let mut evaluator = HoldoutEvaluator::new(windows, layout(&panel), Arc::new(FaerSolver));
        let outcome = evaluator.run(&panel, &registry).unwrap();

        let test_rows = 2 * 24 * 7;
        let split = &outcome.splits[1];
        assert_eq!((split.train_rows, split.test_rows), (0, test_rows));
        assert_eq!(split.aliased_columns, None);
        assert!(outcome
            .predictions
            .iter()
            .filter(|p| p.model == "weather")
            .all(|p| p.predicted.is_none()));
        assert_eq!(
            outcome
                .exclusions
                .count("weather", ExclusionCause::ModelDegeneracy),
            test_rows
        );
        assert_eq!(
            outcome
                .exclusions
                .count("weather", ExclusionCause::JoinGapWeather),
            2 * 24 * 21
        );
        let weather_week = outcome.weekly.iter().find(|w| w.model == "weather").unwrap();
        assert_eq!(weather_week.metrics.failed, test_rows);
        assert_eq!(weather_week.metrics.mae, None);

        let temporal = &outcome.splits[0];
        assert_eq!(temporal.train_rows, 2 * 24 * 21);
        let temporal_week = outcome.weekly.iter().find(|w| w.model == "temporal").unwrap();
        assert_eq!(temporal_week.metrics.failed, 0);
        assert!(temporal_week.metrics.mae.is_some());
    }

    #[test]
    fn cross_validation_counts_failed_folds_as_degeneracy() {
        let registry = StationRegistry::from_stations(
            [Station::new(StationId::new("A"), Coordinates::new(39.95, -75.16))],
            &mut Diagnostics::new(),
        );
        let start = monday().and_hms_opt(0, 0, 0).unwrap();
        let grid = TimeGrid::new(start, start + Duration::weeks(8), Duration::days(1)).unwrap();
        let trips: Vec<TripEvent> = grid
            .intervals()
            .iter()
            .enumerate()
            .flat_map(|(i, interval)| {
                (0..(2 + i % 5)).map(move |_| TripEvent::new(StationId::new("A"), interval.start()))
            })
            .collect();
        let (mut panel, _) = build_panel(&registry, &grid, &trips, &[], &WeatherPolicy::default());
        // each holiday offset level lands on exactly one day
        let holiday = NaiveDate::from_ymd_opt(2018, 5, 23).unwrap();
        panel
            .apply_lag_features(&LagFeatureEngine::new(vec![1], vec![holiday], 1))
            .unwrap();

        let models = ModelRegistry::new(vec![
            ModelSpec::new("temporal", vec![FeatureGroup::Temporal]),
            ModelSpec::new("lagged", vec![FeatureGroup::Temporal, FeatureGroup::Lag]),
        ])
        .unwrap();
        let cv = CvConfig { folds: 5, seed: 42 };
        let outcome = cross_validate(
            &panel,
            &models,
            &FeatureLayout::for_panel(&panel, 1),
            &cv,
            &FaerSolver,
        )
        .unwrap();
        assert_eq!(outcome.universe, 55);

        let failed = |model: &str| -> usize {
            outcome
                .folds
                .iter()
                .filter(|f| f.model == model)
                .map(|f| f.metrics.failed)
                .sum()
        };
        assert_eq!(failed("lagged"), 3);
        assert_eq!(
            outcome.exclusions.count("lagged", ExclusionCause::ModelDegeneracy),
            3
        );
        assert_eq!(failed("temporal"), 0);
        assert_eq!(
            outcome
                .exclusions
                .count("temporal", ExclusionCause::ModelDegeneracy),
            0
        );
        let lagged = outcome.summary.iter().find(|row| row.model == "lagged").unwrap();
        assert!(lagged.mae_mean.unwrap().is_finite());
    }
}
