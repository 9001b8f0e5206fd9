//! Error Analyzer: absolute-error statistics sliced by week, time-of-day
//! bucket, station and tract covariates.
//!
//! Failed predictions (`predicted == None`) never enter a mean; they are
//! counted in `failed` next to the metric they were excluded from.

use crate::evaluate::{FoldScore, PredictionResult};
use pedal_core::{Coordinates, Station, StationId, WeekKey};
pub use pedal_ts::{day_type, time_of_day_bucket, DayType, TimeOfDay};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ErrorMetrics {
    /// Scored predictions
    pub count: usize,
    /// Predictions that failed and were left out
    pub failed: usize,
    pub mae: Option<f64>,
    pub rmse: Option<f64>,
    /// Mean of observed - predicted
    pub mean_signed_error: Option<f64>,
}

impl ErrorMetrics {
    pub fn from_predictions<'a>(predictions: impl IntoIterator<Item = &'a PredictionResult>) -> Self {
        let mut metrics = ErrorMetrics::default();
        let (mut abs_sum, mut sq_sum, mut signed_sum) = (0.0, 0.0, 0.0);
        for prediction in predictions {
            match prediction.signed_error() {
                Some(error) => {
                    metrics.count += 1;
                    abs_sum += error.abs();
                    sq_sum += error * error;
                    signed_sum += error;
                }
                None => metrics.failed += 1,
            }
        }
        if metrics.count > 0 {
            let n = metrics.count as f64;
            metrics.mae = Some(abs_sum / n);
            metrics.rmse = Some((sq_sum / n).sqrt());
            metrics.mean_signed_error = Some(signed_sum / n);
        }
        metrics
    }
}

/// |observed - predicted| per prediction, aligned with the input.
pub fn absolute_errors(predictions: &[PredictionResult]) -> Vec<Option<f64>> {
    predictions.iter().map(PredictionResult::absolute_error).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelWeekError {
    pub model: String,
    pub week: WeekKey,
    pub metrics: ErrorMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelBucketError {
    pub model: String,
    pub time_of_day: TimeOfDay,
    pub day_type: DayType,
    pub metrics: ErrorMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationBucketError {
    pub station: StationId,
    pub coordinates: Coordinates,
    pub time_of_day: TimeOfDay,
    pub day_type: DayType,
    pub metrics: ErrorMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CovariatePoint {
    pub station: StationId,
    pub median_income: f64,
    pub pct_transit: f64,
    pub pct_white: f64,
    pub metrics: ErrorMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CvSummary {
    pub model: String,
    pub folds: usize,
    /// `None` when no fold of the model scored a single row
    pub mae_mean: Option<f64>,
    pub mae_sd: Option<f64>,
    pub rmse_mean: Option<f64>,
    pub rmse_sd: Option<f64>,
    pub failed: usize,
}

/// Model names in order of first appearance, which is registry order for
/// evaluator output.
fn model_order(predictions: &[PredictionResult]) -> Vec<&str> {
    let mut order: Vec<&str> = Vec::new();
    for prediction in predictions {
        if !order.contains(&prediction.model.as_str()) {
            order.push(prediction.model.as_str());
        }
    }
    order
}

fn rank_of(order: &[&str], model: &str) -> usize {
    order.iter().position(|m| *m == model).unwrap_or(order.len())
}

pub fn by_model_week(predictions: &[PredictionResult]) -> Vec<ModelWeekError> {
    let order = model_order(predictions);
    let mut groups: BTreeMap<(usize, WeekKey), Vec<&PredictionResult>> = BTreeMap::new();
    for prediction in predictions {
        groups
            .entry((rank_of(&order, &prediction.model), prediction.interval.week()))
            .or_default()
            .push(prediction);
    }
    groups
        .into_iter()
        .map(|((model, week), group)| ModelWeekError {
            model: order[model].to_string(),
            week,
            metrics: ErrorMetrics::from_predictions(group),
        })
        .collect()
}

pub fn by_model_bucket(predictions: &[PredictionResult]) -> Vec<ModelBucketError> {
    let order = model_order(predictions);
    let mut groups: BTreeMap<(usize, TimeOfDay, DayType), Vec<&PredictionResult>> =
        BTreeMap::new();
    for prediction in predictions {
        let key = (
            rank_of(&order, &prediction.model),
            time_of_day_bucket(prediction.interval.hour()),
            day_type(prediction.interval.weekday()),
        );
        groups.entry(key).or_default().push(prediction);
    }
    groups
        .into_iter()
        .map(|((model, time_of_day, day_type), group)| ModelBucketError {
            model: order[model].to_string(),
            time_of_day,
            day_type,
            metrics: ErrorMetrics::from_predictions(group),
        })
        .collect()
}

/// Per-station errors of one model, with coordinates for mapping.
pub fn by_station_bucket(
    predictions: &[PredictionResult],
    stations: &[Station],
    model: &str,
) -> Vec<StationBucketError> {
    let mut groups: BTreeMap<(usize, TimeOfDay, DayType), Vec<&PredictionResult>> =
        BTreeMap::new();
    for prediction in predictions.iter().filter(|p| p.model == model) {
        let key = (
            prediction.station_index,
            time_of_day_bucket(prediction.interval.hour()),
            day_type(prediction.interval.weekday()),
        );
        groups.entry(key).or_default().push(prediction);
    }
    groups
        .into_iter()
        .filter_map(|((station, time_of_day, day_type), group)| {
            let station = stations.get(station)?;
            Some(StationBucketError {
                station: station.id.clone(),
                coordinates: station.coordinates,
                time_of_day,
                day_type,
                metrics: ErrorMetrics::from_predictions(group),
            })
        })
        .collect()
}

/// Per-station errors of one model within one time-of-day bucket, paired
/// with the station's tract covariates. Stations without demographics are
/// left out.
pub fn covariate_scatter(
    predictions: &[PredictionResult],
    stations: &[Station],
    model: &str,
    bucket: TimeOfDay,
) -> Vec<CovariatePoint> {
    let mut groups: BTreeMap<usize, Vec<&PredictionResult>> = BTreeMap::new();
    for prediction in predictions
        .iter()
        .filter(|p| p.model == model && time_of_day_bucket(p.interval.hour()) == bucket)
    {
        groups.entry(prediction.station_index).or_default().push(prediction);
    }
    groups
        .into_iter()
        .filter_map(|(station, group)| {
            let station = stations.get(station)?;
            let demographics = station.demographics?;
            Some(CovariatePoint {
                station: station.id.clone(),
                median_income: demographics.median_income,
                pct_transit: demographics.pct_transit,
                pct_white: demographics.pct_white,
                metrics: ErrorMetrics::from_predictions(group),
            })
        })
        .collect()
}

fn mean_sd(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (Some(mean), Some(0.0));
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (Some(mean), Some(variance.sqrt()))
}

/// Mean and sample standard deviation of per-fold MAE and RMSE per model.
/// Folds where nothing could be scored are left out of the moments.
pub fn cv_summary(scores: &[FoldScore]) -> Vec<CvSummary> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: BTreeMap<&str, Vec<&FoldScore>> = BTreeMap::new();
    for score in scores {
        if !groups.contains_key(score.model.as_str()) {
            order.push(score.model.as_str());
        }
        groups.entry(score.model.as_str()).or_default().push(score);
    }
    order
        .into_iter()
        .map(|model| {
            let folds = &groups[model];
            let maes: Vec<f64> = folds.iter().filter_map(|s| s.metrics.mae).collect();
            let rmses: Vec<f64> = folds.iter().filter_map(|s| s.metrics.rmse).collect();
            let (mae_mean, mae_sd) = mean_sd(&maes);
            let (rmse_mean, rmse_sd) = mean_sd(&rmses);
            CvSummary {
                model: model.to_string(),
                folds: folds.len(),
                mae_mean,
                mae_sd,
                rmse_mean,
                rmse_sd,
                failed: folds.iter().map(|s| s.metrics.failed).sum(),
            }
        })
        .collect()
}
