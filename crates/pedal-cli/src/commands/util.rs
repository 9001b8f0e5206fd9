use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Result;
use pedal_algo::{persist_dataframe, OutputStage};
use pedal_cli::cli::TableFormat;
use pedal_core::ExclusionReport;
use polars::prelude::DataFrame;
use rayon::ThreadPoolBuilder;
use tabwriter::TabWriter;

pub fn configure_threads(spec: &str) {
    let count = if spec.eq_ignore_ascii_case("auto") {
        num_cpus::get()
    } else {
        spec.parse().unwrap_or_else(|_| num_cpus::get())
    };
    let _ = ThreadPoolBuilder::new().num_threads(count).build_global();
}

pub fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Persist one report table as `<out_dir>/<name>.<ext>` and return its path.
pub fn write_table(
    out_dir: &Path,
    name: &str,
    format: TableFormat,
    stage: OutputStage,
    mut df: DataFrame,
) -> Result<PathBuf> {
    let path = out_dir.join(format!("{name}.{}", format.extension()));
    persist_dataframe(&mut df, &path, stage)?;
    Ok(path)
}

pub fn print_exclusions(report: &ExclusionReport) -> Result<()> {
    if report.is_empty() {
        println!("No records excluded");
        return Ok(());
    }
    let mut tw = TabWriter::new(io::stdout());
    writeln!(tw, "SCOPE\tCAUSE\tROWS")?;
    for (scope, cause, rows) in report.entries() {
        writeln!(tw, "{scope}\t{cause}\t{rows}")?;
    }
    tw.flush()?;
    Ok(())
}

pub fn fmt_metric(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}
