use std::{
    io::{self, Write},
    path::Path,
    time::Instant,
};

use anyhow::{anyhow, Result};
use pedal_algo::{
    analysis::{by_model_bucket, by_station_bucket, covariate_scatter},
    io::{covariate_frame, exclusion_frame, model_bucket_frame, model_week_frame, station_bucket_frame},
    HoldoutEvaluator, ModelRegistry, OutputStage, TimeOfDay,
};
use pedal_cli::cli::{InputArgs, TableFormat};
use tabwriter::TabWriter;
use tracing::info;

use crate::commands::{
    study::load_study,
    telemetry::record_run_timed,
    util::{display, fmt_metric, print_exclusions, write_table},
};

pub fn handle(config: &Path, inputs: &InputArgs, out_dir: &Path, format: TableFormat) -> Result<()> {
    let start = Instant::now();
    let mut outputs = Vec::new();
    let res = run(config, inputs, out_dir, format, &mut outputs);
    let config_str = display(config);
    let out_str = display(out_dir);
    record_run_timed(
        out_dir,
        "holdout",
        &outputs,
        &[
            ("config", config_str.as_str()),
            ("stations", &display(&inputs.stations)),
            ("demographics", &display(&inputs.demographics)),
            ("weather", &display(&inputs.weather)),
            ("trips", &display(&inputs.trips)),
            ("out_dir", out_str.as_str()),
            ("format", format.extension()),
        ],
        start,
        &res,
    );
    res
}

fn run(
    config: &Path,
    inputs: &InputArgs,
    out_dir: &Path,
    format: TableFormat,
    outputs: &mut Vec<String>,
) -> Result<()> {
    let study = load_study(config, inputs)?;
    let registry = ModelRegistry::default_registry();
    let station_model = match &study.config.analysis.station_model {
        Some(name) => registry
            .get(name)
            .ok_or_else(|| anyhow!("analysis.station_model '{name}' is not a registered model"))?,
        None => registry
            .richest()
            .ok_or_else(|| anyhow!("model registry is empty"))?,
    };
    let bucket: TimeOfDay = study.config.analysis.covariate_bucket.parse()?;

    let mut evaluator = HoldoutEvaluator::new(study.config.holdout, study.layout(), study.solver()?);
    let mut outcome = evaluator.run(&study.panel, &registry)?;
    outcome.exclusions.merge(&study.report.exclusions);

    let stations = study.panel.stations();
    let buckets = by_model_bucket(&outcome.predictions);
    let per_station = by_station_bucket(&outcome.predictions, stations, &station_model.name);
    let covariates = covariate_scatter(&outcome.predictions, stations, &station_model.name, bucket);
    info!(
        predictions = outcome.predictions.len(),
        station_model = %station_model.name,
        covariate_points = covariates.len(),
        "holdout analysis complete"
    );

    let tables = [
        ("holdout_weekly", OutputStage::HoldoutWeekly, model_week_frame(&outcome.weekly)?),
        ("holdout_buckets", OutputStage::HoldoutBuckets, model_bucket_frame(&buckets)?),
        ("holdout_stations", OutputStage::HoldoutStations, station_bucket_frame(&per_station)?),
        ("holdout_covariates", OutputStage::HoldoutCovariates, covariate_frame(&covariates)?),
        ("exclusions", OutputStage::Exclusions, exclusion_frame(&outcome.exclusions)?),
    ];
    for (name, stage, df) in tables {
        let path = write_table(out_dir, name, format, stage, df)?;
        outputs.push(display(&path));
    }

    let mut tw = TabWriter::new(io::stdout());
    writeln!(tw, "MODEL\tTRAIN\tTEST\tALIASED\tWEEK\tMAE\tRMSE\tFAILED")?;
    for split in &outcome.splits {
        let aliased = split
            .aliased_columns
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        for week in outcome.weekly.iter().filter(|w| w.model == split.model) {
            writeln!(
                tw,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                split.model,
                split.train_rows,
                split.test_rows,
                aliased,
                week.week,
                fmt_metric(week.metrics.mae),
                fmt_metric(week.metrics.rmse),
                week.metrics.failed
            )?;
        }
    }
    tw.flush()?;
    print_exclusions(&outcome.exclusions)?;
    println!("Holdout reports written to {}", out_dir.display());
    Ok(())
}
