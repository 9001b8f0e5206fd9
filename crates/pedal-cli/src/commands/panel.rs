use std::{path::Path, time::Instant};

use anyhow::Result;
use pedal_algo::{io::panel_frame, persist_dataframe, OutputStage};
use pedal_cli::cli::InputArgs;
use tracing::info;

use crate::commands::{study::load_study, telemetry::record_run_timed, util::display};

pub fn handle(config: &Path, inputs: &InputArgs, out: &Path) -> Result<()> {
    let start = Instant::now();
    let res = (|| -> Result<()> {
        let study = load_study(config, inputs)?;
        let mut df = panel_frame(&study.panel)?;
        persist_dataframe(&mut df, out, OutputStage::Panel)?;
        info!(
            rows = df.height(),
            columns = df.width(),
            "wrote panel to {}",
            out.display()
        );
        println!(
            "Panel: {} stations x {} intervals = {} records, {} trips ({} dropped, {} input warnings)",
            study.panel.station_count(),
            study.panel.grid_len(),
            study.panel.len(),
            study.panel.total_trips(),
            study.report.events_total - study.report.events_counted,
            study.diagnostics.warning_count()
        );
        Ok(())
    })();
    let manifest_dir = out.parent().unwrap_or_else(|| Path::new("."));
    let (config_str, out_str) = (display(config), display(out));
    record_run_timed(
        manifest_dir,
        "panel",
        &[out_str.clone()],
        &[
            ("config", config_str.as_str()),
            ("stations", &display(&inputs.stations)),
            ("demographics", &display(&inputs.demographics)),
            ("weather", &display(&inputs.weather)),
            ("trips", &display(&inputs.trips)),
            ("out", out_str.as_str()),
        ],
        start,
        &res,
    );
    res
}
