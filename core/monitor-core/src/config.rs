//! Runtime configuration.
//!
//! Loaded from `~/.blinkrise/monitor.toml`. Every section is optional and a
//! missing file yields the defaults, which point at a backend on localhost.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

const CONFIG_DIR: &str = ".blinkrise";
const CONFIG_FILE: &str = "monitor.toml";

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_TELEMETRY_URL: &str = "ws://127.0.0.1:8000/ws/drowsiness";
const DEFAULT_GRACE_DELAY_MS: u64 = 300;
const DEFAULT_READINESS_TIMEOUT_MS: u64 = 2500;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct MonitorConfig {
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Base for the control endpoint and the image stream.
    pub api_base_url: String,
    pub telemetry_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            telemetry_url: DEFAULT_TELEMETRY_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait after a stop request before local state is reset, giving the
    /// backend time to release the camera.
    pub grace_delay_ms: u64,
    pub readiness_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            grace_delay_ms: DEFAULT_GRACE_DELAY_MS,
            readiness_timeout_ms: DEFAULT_READINESS_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl TimingConfig {
    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Returns the path to the monitor configuration file.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
    Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
}

pub fn load_config(path: Option<PathBuf>) -> Result<MonitorConfig, ConfigError> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(MonitorConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.clone(),
        source,
    })?;
    toml::from_str::<MonitorConfig>(&content).map_err(|source| ConfigError::Parse {
        path: config_path,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("missing.toml");
        let config = load_config(Some(path)).expect("load config");
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.timing.grace_delay(), Duration::from_millis(300));
        assert_eq!(config.timing.readiness_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn load_config_merges_partial_sections() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("monitor.toml");
        fs_err::write(
            &path,
            r#"
[endpoints]
api_base_url = "http://camera.local:9000"

[timing]
grace_delay_ms = 750
"#,
        )
        .expect("write config");

        let config = load_config(Some(path)).expect("load config");
        assert_eq!(config.endpoints.api_base_url, "http://camera.local:9000");
        assert_eq!(config.endpoints.telemetry_url, DEFAULT_TELEMETRY_URL);
        assert_eq!(config.timing.grace_delay_ms, 750);
        assert_eq!(
            config.timing.request_timeout_ms,
            DEFAULT_REQUEST_TIMEOUT_MS
        );
    }

    #[test]
    fn load_config_reports_malformed_file() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("monitor.toml");
        fs_err::write(&path, "[timing]\ngrace_delay_ms = \"soon\"\n").expect("write config");

        let err = load_config(Some(path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
