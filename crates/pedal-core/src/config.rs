//! Study configuration loaded from TOML.
//!
//! Every knob of a run lives here: study period, grid resolution, lag offsets,
//! holiday list, holdout windows, fold count and seed. Nothing downstream
//! hard-codes these values.

use crate::error::{PedalError, PedalResult};
use crate::types::{parse_timestamp, WeekKey};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    pub study: StudyPeriod,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub weather: WeatherPolicy,
    pub holdout: HoldoutWindows,
    #[serde(default)]
    pub cv: CvConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default = "default_solver")]
    pub solver: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyPeriod {
    /// Inclusive start of the study period
    pub start: String,
    /// Exclusive end of the study period
    pub end: String,
    #[serde(default = "default_resolution")]
    pub resolution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_lag_offsets")]
    pub lag_offsets: Vec<usize>,
    #[serde(default)]
    pub holidays: Vec<String>,
    #[serde(default = "default_holiday_window")]
    pub holiday_window_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherPolicy {
    /// Replacement for a resampled temperature of exactly zero, which the
    /// weather feed uses to mark a missing reading.
    #[serde(default = "default_zero_temperature_fallback")]
    pub zero_temperature_fallback: f64,
}

/// Inclusive ISO week ranges for the holdout protocol, written as
/// `["2018-W18", "2018-W20"]`. Weeks carry their ISO year, so a study that
/// spans a year boundary never matches the same week number twice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HoldoutWindows {
    pub train_weeks: [WeekKey; 2],
    pub test_weeks: [WeekKey; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvConfig {
    #[serde(default = "default_folds")]
    pub folds: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_covariate_bucket")]
    pub covariate_bucket: String,
    /// Model whose errors are broken down per station; the richest registered
    /// model when unset.
    #[serde(default)]
    pub station_model: Option<String>,
}

fn default_solver() -> String {
    "faer".to_string()
}

fn default_resolution() -> String {
    "1h".to_string()
}

fn default_lag_offsets() -> Vec<usize> {
    vec![1, 2, 3, 4, 12, 24]
}

fn default_holiday_window() -> i64 {
    3
}

fn default_zero_temperature_fallback() -> f64 {
    42.0
}

fn default_folds() -> usize {
    5
}

fn default_seed() -> u64 {
    42
}

fn default_covariate_bucket() -> String {
    "AM Rush".to_string()
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lag_offsets: default_lag_offsets(),
            holidays: Vec::new(),
            holiday_window_days: default_holiday_window(),
        }
    }
}

impl Default for WeatherPolicy {
    fn default() -> Self {
        Self {
            zero_temperature_fallback: default_zero_temperature_fallback(),
        }
    }
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            folds: default_folds(),
            seed: default_seed(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            covariate_bucket: default_covariate_bucket(),
            station_model: None,
        }
    }
}

impl HoldoutWindows {
    pub fn contains_train(&self, week: WeekKey) -> bool {
        (self.train_weeks[0]..=self.train_weeks[1]).contains(&week)
    }

    pub fn contains_test(&self, week: WeekKey) -> bool {
        (self.test_weeks[0]..=self.test_weeks[1]).contains(&week)
    }

    /// Reject inverted ranges, overlapping ranges, and a test window that does
    /// not strictly follow the training window.
    pub fn validate(&self) -> PedalResult<()> {
        let [train_first, train_last] = self.train_weeks;
        let [test_first, test_last] = self.test_weeks;
        if train_first > train_last || test_first > test_last {
            return Err(PedalError::SplitViolation(format!(
                "holdout week ranges must be ascending (train {train_first}-{train_last}, test {test_first}-{test_last})"
            )));
        }
        if test_first <= train_last {
            return Err(PedalError::SplitViolation(format!(
                "test weeks {test_first}-{test_last} must start after training weeks {train_first}-{train_last}"
            )));
        }
        Ok(())
    }
}

impl StudyConfig {
    pub fn from_path(path: &Path) -> PedalResult<Self> {
        let data = fs::read_to_string(path).map_err(|err| {
            PedalError::Config(format!("reading study config '{}': {err}", path.display()))
        })?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(data: &str) -> PedalResult<Self> {
        let config: StudyConfig = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn start(&self) -> PedalResult<NaiveDateTime> {
        parse_timestamp(&self.study.start).ok_or_else(|| {
            PedalError::Config(format!("invalid study start '{}'", self.study.start))
        })
    }

    pub fn end(&self) -> PedalResult<NaiveDateTime> {
        parse_timestamp(&self.study.end)
            .ok_or_else(|| PedalError::Config(format!("invalid study end '{}'", self.study.end)))
    }

    pub fn holiday_dates(&self) -> PedalResult<Vec<NaiveDate>> {
        let mut dates = self
            .features
            .holidays
            .iter()
            .map(|raw| {
                NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                    .map_err(|err| PedalError::Config(format!("invalid holiday '{raw}': {err}")))
            })
            .collect::<PedalResult<Vec<_>>>()?;
        dates.sort();
        dates.dedup();
        Ok(dates)
    }

    pub fn validate(&self) -> PedalResult<()> {
        let start = self.start()?;
        let end = self.end()?;
        if end <= start {
            return Err(PedalError::Config(format!(
                "study end {end} must be after start {start}"
            )));
        }

        let offsets = &self.features.lag_offsets;
        if offsets.iter().any(|&k| k == 0) {
            return Err(PedalError::Config("lag offsets must be positive".into()));
        }
        let unique: HashSet<_> = offsets.iter().collect();
        if unique.len() != offsets.len() {
            return Err(PedalError::Config("lag offsets must be unique".into()));
        }
        if self.features.holiday_window_days < 0 {
            return Err(PedalError::Config(
                "holiday_window_days cannot be negative".into(),
            ));
        }
        self.holiday_dates()?;

        if self.cv.folds < 2 {
            return Err(PedalError::Config(format!(
                "cv.folds must be at least 2 (got {})",
                self.cv.folds
            )));
        }
        self.holdout.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
solver = "gauss"

[study]
start = "2018-05-01 00:00:00"
end = "2018-06-01 00:00:00"

[features]
holidays = ["2018-05-28"]

[holdout]
train_weeks = ["2018-W18", "2018-W20"]
test_weeks = ["2018-W21", "2018-W22"]
"#;

    #[test]
    fn defaults_fill_unspecified_sections() {
        let config = StudyConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.study.resolution, "1h");
        assert_eq!(config.features.lag_offsets, vec![1, 2, 3, 4, 12, 24]);
        assert_eq!(config.features.holiday_window_days, 3);
        assert_eq!(config.weather.zero_temperature_fallback, 42.0);
        assert_eq!(config.cv.folds, 5);
        assert_eq!(config.cv.seed, 42);
        assert_eq!(config.analysis.covariate_bucket, "AM Rush");
        assert_eq!(config.solver, "gauss");
        assert_eq!(config.holiday_dates().unwrap().len(), 1);
    }

    #[test]
    fn overlapping_holdout_is_split_violation() {
        let raw = MINIMAL.replace(
            r#"test_weeks = ["2018-W21", "2018-W22"]"#,
            r#"test_weeks = ["2018-W20", "2018-W22"]"#,
        );
        let err = StudyConfig::from_toml_str(&raw).unwrap_err();
        assert!(matches!(err, PedalError::SplitViolation(_)));
    }

    #[test]
    fn holdout_weeks_keep_their_year() {
        let config = StudyConfig::from_toml_str(MINIMAL).unwrap();
        let windows = config.holdout;
        assert!(windows.contains_train(WeekKey::new(2018, 20).unwrap()));
        assert!(!windows.contains_train(WeekKey::new(2019, 20).unwrap()));
        assert!(!windows.contains_test(WeekKey::new(2019, 21).unwrap()));

        // week 21 of 2018 precedes week 20 of 2019
        let raw = MINIMAL.replace(
            r#"train_weeks = ["2018-W18", "2018-W20"]"#,
            r#"train_weeks = ["2018-W18", "2019-W20"]"#,
        );
        assert!(matches!(
            StudyConfig::from_toml_str(&raw),
            Err(PedalError::SplitViolation(_))
        ));

        let bare = MINIMAL.replace(r#"["2018-W21", "2018-W22"]"#, "[21, 22]");
        assert!(StudyConfig::from_toml_str(&bare).is_err());
        let bad = MINIMAL.replace(r#""2018-W22""#, r#""2018-W54""#);
        assert!(StudyConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn inverted_period_rejected() {
        let raw = MINIMAL.replace("2018-06-01 00:00:00", "2018-04-01 00:00:00");
        assert!(matches!(
            StudyConfig::from_toml_str(&raw),
            Err(PedalError::Config(_))
        ));
    }

    #[test]
    fn duplicate_or_zero_lags_rejected() {
        let dup = MINIMAL.replace(
            "holidays = [\"2018-05-28\"]",
            "holidays = []\nlag_offsets = [1, 1]",
        );
        assert!(StudyConfig::from_toml_str(&dup).is_err());
        let zero = MINIMAL.replace(
            "holidays = [\"2018-05-28\"]",
            "holidays = []\nlag_offsets = [0, 1]",
        );
        assert!(StudyConfig::from_toml_str(&zero).is_err());
    }

    #[test]
    fn single_fold_rejected() {
        let raw = format!("{MINIMAL}\n[cv]\nfolds = 1\n");
        assert!(StudyConfig::from_toml_str(&raw).is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = StudyConfig::from_path(&path).unwrap();
        assert_eq!(config.holiday_dates().unwrap().len(), 1);

        let missing = StudyConfig::from_path(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(PedalError::Config(_))));
    }
}
