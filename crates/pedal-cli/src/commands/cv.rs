use std::{
    io::{self, Write},
    path::Path,
    time::Instant,
};

use anyhow::Result;
use pedal_algo::{
    cross_validate,
    io::{cv_summary_frame, exclusion_frame, fold_frame},
    ModelRegistry, OutputStage,
};
use pedal_cli::cli::{InputArgs, TableFormat};
use tabwriter::TabWriter;

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
        "cv",
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
    let solver = study.solver()?;
    let mut outcome = cross_validate(
        &study.panel,
        &registry,
        &study.layout(),
        &study.config.cv,
        solver.as_ref(),
    )?;
    outcome.exclusions.merge(&study.report.exclusions);

    let tables = [
        ("cv_folds", OutputStage::CvFolds, fold_frame(&outcome.folds)?),
        ("cv_summary", OutputStage::CvSummary, cv_summary_frame(&outcome.summary)?),
        ("exclusions", OutputStage::Exclusions, exclusion_frame(&outcome.exclusions)?),
    ];
    for (name, stage, df) in tables {
        let path = write_table(out_dir, name, format, stage, df)?;
        outputs.push(display(&path));
    }

    println!(
        "{}-fold cross-validation over {} records (seed {})",
        study.config.cv.folds, outcome.universe, study.config.cv.seed
    );
    let mut tw = TabWriter::new(io::stdout());
    writeln!(tw, "MODEL\tFOLDS\tMAE\tMAE SD\tRMSE\tRMSE SD\tFAILED")?;
    for row in &outcome.summary {
        writeln!(
            tw,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            row.model,
            row.folds,
            fmt_metric(row.mae_mean),
            fmt_metric(row.mae_sd),
            fmt_metric(row.rmse_mean),
            fmt_metric(row.rmse_sd),
            row.failed
        )?;
    }
    tw.flush()?;
    print_exclusions(&outcome.exclusions)?;
    println!("Cross-validation reports written to {}", out_dir.display());
    Ok(())
}
