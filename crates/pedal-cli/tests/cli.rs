use assert_cmd::Command;
use chrono::{Duration, NaiveDate};
use predicates::prelude::*;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const STUDY: &str = r#"
solver = "faer"

[study]
start = "2018-04-30 00:00:00"
end = "2018-05-28 00:00:00"
resolution = "1h"

[features]
lag_offsets = [1, 24]
holidays = ["2018-05-28"]

[holdout]
train_weeks = ["2018-W18", "2018-W20"]
test_weeks = ["2018-W21", "2018-W21"]

[cv]
folds = 3
seed = 7
"#;

struct Fixture {
    config: PathBuf,
    stations: PathBuf,
    demographics: PathBuf,
    weather: PathBuf,
    trips: PathBuf,
}

impl Fixture {
    fn input_args(&self) -> Vec<String> {
        vec![
            "--config".into(),
            self.config.display().to_string(),
            "--stations".into(),
            self.stations.display().to_string(),
            "--demographics".into(),
            self.demographics.display().to_string(),
            "--weather".into(),
            self.weather.display().to_string(),
            "--trips".into(),
            self.trips.display().to_string(),
        ]
    }
}

// Four weeks of hourly trips at two stations with rush-hour peaks.
fn fixture(dir: &Path, study: &str) -> Fixture {
    let write = |name: &str, body: &str| {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    };
    let start = NaiveDate::from_ymd_opt(2018, 4, 30)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    let mut trips = String::from("station_id,start_time\n");
    let mut weather = String::from("timestamp,temperature,precipitation,wind_speed\n");
    for i in 0..(28 * 24) {
        let ts = start + Duration::hours(i);
        let hour = i % 24;
        let day = i / 24;
        let base = match hour {
            7..=9 | 16..=18 => 4 + day % 3,
            10..=15 => 2,
            _ => i % 2,
        };
        for (station, extra) in [("3010", 0), ("3021", 1)] {
            for minute in 0..(base + extra * (hour % 2)) {
                let at = ts + Duration::minutes(minute * 5);
                writeln!(trips, "{station},{}", at.format("%Y-%m-%d %H:%M:%S")).unwrap();
            }
        }
        let reading = ts + Duration::minutes(10);
        writeln!(
            weather,
            "{},{},{},{}",
            reading.format("%Y-%m-%d %H:%M:%S"),
            48 + (hour + day) % 20,
            if day % 5 == 0 { "0.2" } else { "0" },
            4 + day % 4
        )
        .unwrap();
    }
    trips.push_str("3010,not-a-time\n");

    Fixture {
        config: write("study.toml", study),
        stations: write(
            "stations.csv",
            "station_id,lat,lon,tract_id\n3010,39.95,-75.16,t1\n3021,39.96,-75.17,t2\n",
        ),
        demographics: write(
            "demographics.csv",
            "tract_id,total_pop,median_income,median_age,white_pop,travel_time_total,commuters,transit_commuters\n\
             t1,4000,52000,34,2000,56000,2000,600\n\
             t2,3000,61000,38,2100,45000,1500,300\n",
        ),
        weather: write("weather.csv", &weather),
        trips: write("trips.csv", &trips),
    }
}

fn manifests(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("run-"))
        .count()
}

#[test]
fn models_lists_default_registry() {
    let dir = tempdir().unwrap();
    let fx = fixture(dir.path(), STUDY);
    Command::cargo_bin("pedal")
        .unwrap()
        .args([
            "models",
            "--config",
            fx.config.to_str().unwrap(),
            "--stations",
            fx.stations.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("temporal_spatial_weather_demographic"))
        .stdout(predicate::str::contains("5 models, 2 station(s)"));
}

#[test]
fn panel_writes_table_and_manifest() {
    let dir = tempdir().unwrap();
    let fx = fixture(dir.path(), STUDY);
    let out = dir.path().join("out").join("panel.csv");
    Command::cargo_bin("pedal")
        .unwrap()
        .arg("panel")
        .args(fx.input_args())
        .args(["--out", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 stations x 672 intervals = 1344 records"));

    assert!(out.exists());
    assert!(dir.path().join("out").join("panel").join("panel.csv").exists());
    let header = fs::read_to_string(&out).unwrap();
    assert!(header.lines().next().unwrap().contains("lag_24"));
    assert_eq!(manifests(&dir.path().join("out")), 1);
}

#[test]
fn holdout_writes_reports() {
    let dir = tempdir().unwrap();
    let fx = fixture(dir.path(), STUDY);
    let out_dir = dir.path().join("reports");
    Command::cargo_bin("pedal")
        .unwrap()
        .arg("holdout")
        .args(fx.input_args())
        .args(["--out-dir", out_dir.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("2018-W21"))
        .stdout(predicate::str::contains("insufficient_history"))
        .stdout(predicate::str::contains("schema_violation"));

    for name in [
        "holdout_weekly.csv",
        "holdout_buckets.csv",
        "holdout_stations.csv",
        "holdout_covariates.csv",
        "exclusions.csv",
    ] {
        assert!(out_dir.join(name).exists(), "missing {name}");
    }
    assert_eq!(manifests(&out_dir), 1);
}

#[test]
fn cv_writes_summary() {
    let dir = tempdir().unwrap();
    let fx = fixture(dir.path(), STUDY);
    let out_dir = dir.path().join("cv");
    Command::cargo_bin("pedal")
        .unwrap()
        .args(["--threads", "2", "cv"])
        .args(fx.input_args())
        .args(["--out-dir", out_dir.to_str().unwrap(), "--format", "parquet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3-fold cross-validation"))
        .stdout(predicate::str::contains("MAE SD"));

    assert!(out_dir.join("cv_folds.parquet").exists());
    assert!(out_dir.join("cv_summary.parquet").exists());
    assert!(out_dir.join("exclusions.parquet").exists());
}

#[test]
fn overlapping_holdout_weeks_fail() {
    let dir = tempdir().unwrap();
    let fx = fixture(
        dir.path(),
        &STUDY.replace(r#"test_weeks = ["2018-W21""#, r#"test_weeks = ["2018-W20""#),
    );
    let out_dir = dir.path().join("reports");
    Command::cargo_bin("pedal")
        .unwrap()
        .arg("holdout")
        .args(fx.input_args())
        .args(["--out-dir", out_dir.to_str().unwrap()])
        .assert()
        .failure();
    assert!(!out_dir.join("holdout_weekly.csv").exists());
}
