use crate::analysis::{
    CovariatePoint, CvSummary, ErrorMetrics, ModelBucketError, ModelWeekError, StationBucketError,
};
use crate::evaluate::FoldScore;
use crate::panel::Panel;
use anyhow::{anyhow, Context, Result};
use pedal_core::{lag_column_name, ExclusionReport};
use polars::prelude::*;
use std::{
    ffi::OsStr,
    fs::{self, File},
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy)]
pub enum OutputStage {
    Panel,
    HoldoutWeekly,
    HoldoutBuckets,
    HoldoutStations,
    HoldoutCovariates,
    CvFolds,
    CvSummary,
    Exclusions,
}

impl OutputStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStage::Panel => "panel",
            OutputStage::HoldoutWeekly => "holdout-weekly",
            OutputStage::HoldoutBuckets => "holdout-buckets",
            OutputStage::HoldoutStations => "holdout-stations",
            OutputStage::HoldoutCovariates => "holdout-covariates",
            OutputStage::CvFolds => "cv-folds",
            OutputStage::CvSummary => "cv-summary",
            OutputStage::Exclusions => "exclusions",
        }
    }
}

pub fn staged_output_path(output: &Path, stage: &str) -> PathBuf {
    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    let file_name = output.file_name().unwrap_or_else(|| OsStr::new("output"));
    parent.join(stage).join(file_name)
}

/// Write `df` under `<parent>/<stage>/<file>` and copy it to `output`. The
/// extension of `output` picks the format: `.parquet` or `.csv`.
pub fn persist_dataframe(df: &mut DataFrame, output: &Path, stage: OutputStage) -> Result<()> {
    let extension = output
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    if extension != "parquet" && extension != "csv" {
        return Err(anyhow!(
            "unsupported output extension for {}; use .csv or .parquet",
            output.display()
        ));
    }

    let staged = staged_output_path(output, stage.as_str());
    if let Some(parent) = staged.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory '{}'", parent.display()))?;
    }
    let mut file = File::create(&staged)
        .with_context(|| format!("creating output '{}'", staged.display()))?;
    if extension == "parquet" {
        ParquetWriter::new(&mut file)
            .finish(df)
            .context("writing Parquet output")?;
    } else {
        CsvWriter::new(&mut file)
            .finish(df)
            .context("writing CSV output")?;
    }
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory '{}'", parent.display()))?;
    }
    fs::copy(&staged, output)
        .with_context(|| format!("copying {} to {}", staged.display(), output.display()))?;
    Ok(())
}

fn metric_series(metrics: &[ErrorMetrics]) -> Vec<Series> {
    vec![
        Series::new(
            "count",
            metrics.iter().map(|m| m.count as u64).collect::<Vec<_>>(),
        ),
        Series::new(
            "failed",
            metrics.iter().map(|m| m.failed as u64).collect::<Vec<_>>(),
        ),
        Series::new("mae", metrics.iter().map(|m| m.mae).collect::<Vec<_>>()),
        Series::new("rmse", metrics.iter().map(|m| m.rmse).collect::<Vec<_>>()),
        Series::new(
            "mean_signed_error",
            metrics
                .iter()
                .map(|m| m.mean_signed_error)
                .collect::<Vec<_>>(),
        ),
    ]
}

/// One row per panel record, with one column per lag offset.
pub fn panel_frame(panel: &Panel) -> Result<DataFrame> {
    let records = panel.records();
    let mut columns = vec![
        Series::new(
            "station_id",
            records.iter().map(|r| r.station.to_string()).collect::<Vec<_>>(),
        ),
        Series::new(
            "interval",
            records.iter().map(|r| r.interval.to_string()).collect::<Vec<_>>(),
        ),
        Series::new(
            "trip_count",
            records.iter().map(|r| r.trip_count).collect::<Vec<_>>(),
        ),
        Series::new(
            "temperature",
            records
                .iter()
                .map(|r| r.weather.map(|w| w.temperature))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "precipitation",
            records
                .iter()
                .map(|r| r.weather.map(|w| w.precipitation))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "wind_speed",
            records
                .iter()
                .map(|r| r.weather.map(|w| w.wind_speed))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "median_income",
            records
                .iter()
                .map(|r| r.demographics.map(|d| d.median_income))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "holiday",
            records.iter().map(|r| r.holiday.label()).collect::<Vec<_>>(),
        ),
    ];
    for &offset in panel.lag_offsets() {
        columns.push(Series::new(
            &lag_column_name(offset),
            records.iter().map(|r| r.lag(offset)).collect::<Vec<_>>(),
        ));
    }
    DataFrame::new(columns).context("building panel frame")
}

pub fn model_week_frame(rows: &[ModelWeekError]) -> Result<DataFrame> {
    let metrics: Vec<ErrorMetrics> = rows.iter().map(|r| r.metrics).collect();
    let mut columns = vec![
        Series::new("model", rows.iter().map(|r| r.model.as_str()).collect::<Vec<_>>()),
        Series::new(
            "week",
            rows.iter().map(|r| r.week.to_string()).collect::<Vec<_>>(),
        ),
    ];
    columns.extend(metric_series(&metrics));
    DataFrame::new(columns).context("building weekly error frame")
}

pub fn model_bucket_frame(rows: &[ModelBucketError]) -> Result<DataFrame> {
    let metrics: Vec<ErrorMetrics> = rows.iter().map(|r| r.metrics).collect();
    let mut columns = vec![
        Series::new("model", rows.iter().map(|r| r.model.as_str()).collect::<Vec<_>>()),
        Series::new(
            "time_of_day",
            rows.iter().map(|r| r.time_of_day.label()).collect::<Vec<_>>(),
        ),
        Series::new(
            "day_type",
            rows.iter().map(|r| r.day_type.label()).collect::<Vec<_>>(),
        ),
    ];
    columns.extend(metric_series(&metrics));
    DataFrame::new(columns).context("building bucket error frame")
}

pub fn station_bucket_frame(rows: &[StationBucketError]) -> Result<DataFrame> {
    let metrics: Vec<ErrorMetrics> = rows.iter().map(|r| r.metrics).collect();
    let mut columns = vec![
        Series::new(
            "station_id",
            rows.iter().map(|r| r.station.to_string()).collect::<Vec<_>>(),
        ),
        Series::new("lat", rows.iter().map(|r| r.coordinates.lat).collect::<Vec<_>>()),
        Series::new("lon", rows.iter().map(|r| r.coordinates.lon).collect::<Vec<_>>()),
        Series::new(
            "time_of_day",
            rows.iter().map(|r| r.time_of_day.label()).collect::<Vec<_>>(),
        ),
        Series::new(
            "day_type",
            rows.iter().map(|r| r.day_type.label()).collect::<Vec<_>>(),
        ),
    ];
    columns.extend(metric_series(&metrics));
    DataFrame::new(columns).context("building station error frame")
}

pub fn covariate_frame(rows: &[CovariatePoint]) -> Result<DataFrame> {
    let metrics: Vec<ErrorMetrics> = rows.iter().map(|r| r.metrics).collect();
    let mut columns = vec![
        Series::new(
            "station_id",
            rows.iter().map(|r| r.station.to_string()).collect::<Vec<_>>(),
        ),
        Series::new(
            "median_income",
            rows.iter().map(|r| r.median_income).collect::<Vec<_>>(),
        ),
        Series::new(
            "pct_transit",
            rows.iter().map(|r| r.pct_transit).collect::<Vec<_>>(),
        ),
        Series::new("pct_white", rows.iter().map(|r| r.pct_white).collect::<Vec<_>>()),
    ];
    columns.extend(metric_series(&metrics));
    DataFrame::new(columns).context("building covariate frame")
}

pub fn fold_frame(rows: &[FoldScore]) -> Result<DataFrame> {
    let metrics: Vec<ErrorMetrics> = rows.iter().map(|r| r.metrics).collect();
    let mut columns = vec![
        Series::new("model", rows.iter().map(|r| r.model.as_str()).collect::<Vec<_>>()),
        Series::new("fold", rows.iter().map(|r| r.fold as u32).collect::<Vec<_>>()),
        Series::new(
            "train_rows",
            rows.iter().map(|r| r.train_rows as u64).collect::<Vec<_>>(),
        ),
    ];
    columns.extend(metric_series(&metrics));
    DataFrame::new(columns).context("building fold frame")
}

pub fn cv_summary_frame(rows: &[CvSummary]) -> Result<DataFrame> {
    DataFrame::new(vec![
        Series::new("model", rows.iter().map(|r| r.model.as_str()).collect::<Vec<_>>()),
        Series::new("folds", rows.iter().map(|r| r.folds as u32).collect::<Vec<_>>()),
        Series::new("mae_mean", rows.iter().map(|r| r.mae_mean).collect::<Vec<_>>()),
        Series::new("mae_sd", rows.iter().map(|r| r.mae_sd).collect::<Vec<_>>()),
        Series::new("rmse_mean", rows.iter().map(|r| r.rmse_mean).collect::<Vec<_>>()),
        Series::new("rmse_sd", rows.iter().map(|r| r.rmse_sd).collect::<Vec<_>>()),
        Series::new(
            "failed",
            rows.iter().map(|r| r.failed as u64).collect::<Vec<_>>(),
        ),
    ])
    .context("building cv summary frame")
}

pub fn exclusion_frame(report: &ExclusionReport) -> Result<DataFrame> {
    let entries: Vec<_> = report.entries().collect();
    DataFrame::new(vec![
        Series::new(
            "scope",
            entries.iter().map(|(scope, _, _)| *scope).collect::<Vec<_>>(),
        ),
        Series::new(
            "cause",
            entries.iter().map(|(_, cause, _)| cause.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            "rows",
            entries.iter().map(|(_, _, rows)| *rows as u64).collect::<Vec<_>>(),
        ),
    ])
    .context("building exclusion frame")
}
