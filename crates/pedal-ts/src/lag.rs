//! Lag Feature Engine.
//!
//! Works on one station partition at a time: a slice of panel records for a
//! single station, sorted ascending by interval. Lags are shifts by position
//! within that slice, so a partition can never read another station's counts
//! and never reads forward in time.

use chrono::NaiveDate;
use pedal_core::{
    HolidayProximity, LagValue, PanelRecord, PedalError, PedalResult, StudyConfig,
};

#[derive(Debug, Clone)]
pub struct LagFeatureEngine {
    offsets: Vec<usize>,
    holidays: Vec<NaiveDate>,
    window_days: i64,
}

impl LagFeatureEngine {
    pub fn new(offsets: Vec<usize>, mut holidays: Vec<NaiveDate>, window_days: i64) -> Self {
        holidays.sort();
        holidays.dedup();
        Self {
            offsets,
            holidays,
            window_days: window_days.max(0),
        }
    }

    pub fn from_config(config: &StudyConfig) -> PedalResult<Self> {
        Ok(Self::new(
            config.features.lag_offsets.clone(),
            config.holiday_dates()?,
            config.features.holiday_window_days,
        ))
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Fill lag columns and holiday proximity for one station partition.
    ///
    /// Fails if the partition mixes stations, is not strictly ascending by
    /// interval, or has already been processed.
    pub fn apply_partition(&self, partition: &mut [PanelRecord]) -> PedalResult<()> {
        let Some(first) = partition.first() else {
            return Ok(());
        };
        let station = first.station_index;
        for pair in partition.windows(2) {
            if pair[1].station_index != station {
                return Err(PedalError::Validation(format!(
                    "lag partition for station '{}' contains records of station '{}'",
                    pair[0].station, pair[1].station
                )));
            }
            if pair[1].interval <= pair[0].interval {
                return Err(PedalError::Validation(format!(
                    "lag partition for station '{}' is not ascending at {}",
                    pair[0].station, pair[1].interval
                )));
            }
        }
        if partition.iter().any(|record| !record.lags.is_empty()) {
            return Err(PedalError::Validation(format!(
                "lag features already applied to station '{}'",
                first.station
            )));
        }

        let counts: Vec<u32> = partition.iter().map(|record| record.trip_count).collect();
        for (i, record) in partition.iter_mut().enumerate() {
            record.lags = self
                .offsets
                .iter()
                .map(|&offset| LagValue {
                    offset,
                    value: i.checked_sub(offset).map(|j| counts[j]),
                })
                .collect();
            record.holiday = self.holiday_proximity(record.interval.date());
        }
        Ok(())
    }

    /// Day offset from the nearest holiday within the window, positive after
    /// the holiday. Equidistant holidays resolve to the earlier one.
    pub fn holiday_proximity(&self, date: NaiveDate) -> HolidayProximity {
        self.holidays
            .iter()
            .map(|holiday| (date - *holiday).num_days())
            .filter(|offset| offset.abs() <= self.window_days)
            .min_by_key(|offset| (offset.abs(), *offset < 0))
            .and_then(|offset| i32::try_from(offset).ok())
            .map_or(HolidayProximity::None, HolidayProximity::Offset)
    }
}
