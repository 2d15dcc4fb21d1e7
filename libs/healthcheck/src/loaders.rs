use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::payload::Payload;
use crate::snapshot::load_snapshot;
use crate::{Error, HealthCheck};

pub const DEFAULT_ENDPOINT: &str = "http://10.27.67.2:2767/data";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Parses a health-check document from disk.
pub fn load_json(path: impl AsRef<Path>) -> Result<HealthCheck, Error> {
    let path = path.as_ref();
    info!(path = %path.display(), "loading json");
    HealthCheck::from_payload(Payload::from_json_file(path)?)
}

/// Fetches the health-check document from the robot.
pub fn load_roborio(endpoint: &str, timeout: Duration) -> Result<HealthCheck, Error> {
    info!(%endpoint, "fetching health check");
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;
    let payload: Payload = client.get(endpoint).send()?.error_for_status()?.json()?;
    HealthCheck::from_payload(payload)
}

/// Loads `.json` files as documents and anything else as a snapshot.
pub fn load_path(path: impl AsRef<Path>) -> Result<HealthCheck, Error> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => load_json(path),
        _ => load_snapshot(path),
    }
}
