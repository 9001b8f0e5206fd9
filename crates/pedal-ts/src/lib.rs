//! Time handling for station panels: the study grid, calendar buckets, weather
//! resampling and the per-station lag feature engine.

pub mod calendar;
pub mod grid;
pub mod lag;
pub mod weather;

pub use calendar::{day_type, time_of_day_bucket, DayType, TimeOfDay};
pub use grid::{floor_to_resolution, parse_resolution, TimeGrid};
pub use lag::LagFeatureEngine;
pub use weather::{resample_weather, RawWeather};
