use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::loaders::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT};
use crate::snapshot::DEFAULT_HISTORY_DIR;
use crate::swerve::DEFAULT_SWERVE_SUBSYSTEM;
use crate::{Error, HealthCheck};

pub const CONFIG_ENV: &str = "HEALTHCHECK_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./healthcheck.toml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub history_dir: PathBuf,
    pub swerve_subsystem: String,
    pub limits: Vec<LimitConfig>,
}

/// Threshold lines for one case, as written in the config file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub case: i64,
    pub supply_current: Option<Vec<f64>>,
    pub stator_current: Option<Vec<f64>>,
    pub speed: Option<Vec<f64>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            history_dir: PathBuf::from(DEFAULT_HISTORY_DIR),
            swerve_subsystem: DEFAULT_SWERVE_SUBSYSTEM.to_string(),
            limits: Vec::new(),
        }
    }
}

impl Config {
    /// Reads the config from `path`, falling back to `$HEALTHCHECK_CONFIG` and
    /// then `./healthcheck.toml`. An explicit `path` must exist; without one a
    /// missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::ConfigNotFound(path.to_path_buf()));
            }
            return Self::read(path);
        }
        let candidates = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .into_iter()
            .chain([PathBuf::from(DEFAULT_CONFIG_PATH)]);
        for candidate in candidates {
            if candidate.exists() {
                return Self::read(&candidate);
            }
        }
        debug!("no config file found, using defaults");
        Ok(Config::default())
    }

    fn read(path: &Path) -> Result<Self, Error> {
        debug!(path = %path.display(), "reading config");
        let config = std::fs::read_to_string(path)?;
        Self::parse(&config)
    }

    pub fn parse(config: &str) -> Result<Self, Error> {
        Ok(toml::from_str(config)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Installs the configured threshold lines on `health_check`.
    pub fn apply_limits(&self, health_check: &mut HealthCheck) -> Result<(), Error> {
        let pair = |values: &Option<Vec<f64>>| -> Vec<Option<f64>> {
            values
                .iter()
                .flatten()
                .copied()
                .map(Some)
                .collect()
        };
        for limit in &self.limits {
            health_check.set_case_limits(
                limit.case,
                &pair(&limit.supply_current),
                &pair(&limit.stator_current),
                &pair(&limit.speed),
            )?;
        }
        Ok(())
    }
}
