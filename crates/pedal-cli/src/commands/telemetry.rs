use pedal_cli::manifest::{record_manifest, ManifestTelemetry, Param};
use std::{env, path::Path, time::Instant};

const TELEMETRY_ENV_KEYS: &[&str] = &[
    "PEDAL_ENV",
    "PEDAL_RELEASE_VERSION",
    "GITHUB_RUN_ID",
    "GITHUB_WORKFLOW",
    "GITHUB_SHA",
];

fn collect_telemetry_env() -> Vec<Param> {
    TELEMETRY_ENV_KEYS
        .iter()
        .filter_map(|key| {
            env::var(key).ok().map(|value| Param {
                name: key.to_string(),
                value,
            })
        })
        .collect()
}

fn correlation_id() -> Option<String> {
    env::var("PEDAL_CORRELATION_ID")
        .or_else(|_| env::var("GITHUB_RUN_ID"))
        .ok()
}

/// Record a manifest for a finished run. A manifest that cannot be written is
/// reported but never fails the run.
pub fn record_run_timed(
    dir: &Path,
    command: &str,
    outputs: &[String],
    params: &[(&str, &str)],
    start: Instant,
    result: &anyhow::Result<()>,
) {
    let telemetry = ManifestTelemetry {
        status: if result.is_ok() { "success" } else { "failure" }.to_string(),
        duration_ms: Some(start.elapsed().as_millis()),
        env: collect_telemetry_env(),
        correlation_id: correlation_id(),
    };
    if let Err(err) = record_manifest(dir, command, outputs, params, telemetry) {
        eprintln!("Failed to record run manifest: {err}");
    }
}
