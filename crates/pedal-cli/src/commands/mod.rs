pub mod cv;
pub mod holdout;
pub mod models;
pub mod panel;
pub mod study;
pub mod telemetry;
pub mod util;
