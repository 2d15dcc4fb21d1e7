//! Review tooling for robot health-check runs.
//!
//! A run arrives as a payload of test cases and telemetry samples. The two are
//! joined into a single sorted [`MergedTable`] indexed by
//! `(controller_measured, case)`, wrapped in a [`HealthCheck`] handle that
//! answers subsystem and case queries, computes plot ranges and threshold
//! lines, persists Parquet snapshots, and lays out charts.

pub use chart::{ChartOptions, ChartPlan};
pub use config::Config;
pub use error::Error;
pub use health_check::HealthCheck;
pub use limits::{CaseLimits, LimitLines, YLimits};
pub use loaders::{load_json, load_path, load_roborio};
pub use metric::Metric;
pub use payload::{Payload, RunCase, Sample};
pub use query::{CaseSummary, SubsystemLookup};
pub use snapshot::load_snapshot;
pub use swerve::SwerveDriveHealthCheck;
pub use table::{Categorical, JoinReport, MergedTable};

pub mod chart;
pub mod config;
mod error;
mod health_check;
pub mod limits;
pub mod loaders;
mod metric;
pub mod payload;
pub mod query;
pub mod render;
pub mod snapshot;
pub mod swerve;
pub mod table;

pub const SNAPSHOT_EXTENSION: &str = "parquet";
