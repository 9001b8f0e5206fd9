use chrono::{DateTime, Duration, NaiveDateTime};
use pedal_core::{Interval, PedalError, PedalResult};
use tracing::debug;

/// Parse a resolution rule such as `"1h"`, `"15m"`, `"1d"` or `"3600"` (seconds).
pub fn parse_resolution(rule: &str) -> PedalResult<Duration> {
    let trimmed = rule.trim();
    if trimmed.is_empty() {
        return Err(PedalError::Config("resolution cannot be empty".into()));
    }
    let (value_str, unit) = match trimmed.chars().last() {
        Some(ch) if ch.is_ascii_alphabetic() => (&trimmed[..trimmed.len() - 1], Some(ch)),
        _ => (trimmed, None),
    };

    let value = value_str
        .trim()
        .parse::<i64>()
        .map_err(|err| PedalError::Config(format!("parsing resolution '{rule}': {err}")))?;
    if value <= 0 {
        return Err(PedalError::Config(format!(
            "resolution '{rule}' must be positive"
        )));
    }
    let multiplier = match unit.unwrap_or('s') {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        other => {
            return Err(PedalError::Config(format!(
                "unsupported time unit '{other}'; expected s/m/h/d"
            )));
        }
    };
    Ok(Duration::seconds(value * multiplier))
}

/// Floor a timestamp to the start of its bucket, with buckets aligned to the
/// Unix epoch.
pub fn floor_to_resolution(ts: NaiveDateTime, resolution: Duration) -> NaiveDateTime {
    let period = resolution.num_seconds().max(1);
    let secs = ts.and_utc().timestamp();
    let floored = secs - secs.rem_euclid(period);
    DateTime::from_timestamp(floored, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or(ts)
}

/// The complete, ordered sequence of intervals covering `[start, end)`.
///
/// Generated once per run and never mutated. Positions are dense: the
/// interval at position `i` starts at `start + i * resolution`.
#[derive(Debug, Clone)]
pub struct TimeGrid {
    start: NaiveDateTime,
    end: NaiveDateTime,
    resolution: Duration,
    intervals: Vec<Interval>,
}

impl TimeGrid {
    /// Build the grid over `[start, end)`. Both bounds must sit on a bucket
    /// boundary so that grid positions agree with [`floor_to_resolution`] and
    /// no bucket reaches outside the study period.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, resolution: Duration) -> PedalResult<Self> {
        if resolution.num_seconds() <= 0 {
            return Err(PedalError::Config("grid resolution must be positive".into()));
        }
        for (label, bound) in [("start", start), ("end", end)] {
            if floor_to_resolution(bound, resolution) != bound {
                return Err(PedalError::Config(format!(
                    "study {label} {bound} is not aligned to the {}s grid resolution",
                    resolution.num_seconds()
                )));
            }
        }
        if end <= start {
            return Err(PedalError::Config(format!(
                "study period [{start}, {end}) is empty"
            )));
        }

        let mut intervals = Vec::new();
        let mut cursor = start;
        while cursor < end {
            intervals.push(Interval::from_start(cursor));
            cursor += resolution;
        }
        debug!(
            intervals = intervals.len(),
            resolution_secs = resolution.num_seconds(),
            "time grid generated"
        );
        Ok(Self {
            start,
            end,
            resolution,
            intervals,
        })
    }

    /// Grid position of the interval containing `ts`, or `None` outside the
    /// study period.
    pub fn position(&self, ts: NaiveDateTime) -> Option<usize> {
        if ts < self.start || ts >= self.end {
            return None;
        }
        let offset = (ts - self.start).num_seconds() / self.resolution.num_seconds();
        usize::try_from(offset)
            .ok()
            .filter(|&pos| pos < self.intervals.len())
    }

    pub fn interval(&self, position: usize) -> Option<Interval> {
        self.intervals.get(position).copied()
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn resolution(&self) -> Duration {
        self.resolution
    }
}
