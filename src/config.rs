use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::backend::{DEFAULT_SYSFS_ROOT, SettlePolicy, SysfsPaths};
use crate::error::AppError;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub unix_socket: Option<String>,
    pub host: Option<String>,
    pub path: String,
    /// Upper bound in seconds for a single GPIO operation.
    pub timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GpioConfig {
    pub root: PathBuf,
    pub settle_attempts: u32,
    pub settle_interval_ms: u64,
}

impl Default for GpioConfig {
    fn default() -> Self {
        let settle = SettlePolicy::default();
        Self {
            root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            settle_attempts: settle.attempts,
            settle_interval_ms: settle.interval.as_millis() as u64,
        }
    }
}

impl GpioConfig {
    pub fn paths(&self) -> SysfsPaths {
        SysfsPaths::new(&self.root)
    }

    pub fn settle_policy(&self) -> SettlePolicy {
        SettlePolicy {
            attempts: self.settle_attempts,
            interval: Duration::from_millis(self.settle_interval_ms),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProfilesConfig {
    pub path: PathBuf,
    /// Profile applied once at startup.
    pub startup: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    #[serde(default)]
    pub gpio: GpioConfig,
    #[serde(default)]
    pub profiles: Option<ProfilesConfig>,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        let config: AppConfig = serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Invalid config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.http.unix_socket.is_none() && self.http.host.is_none() {
            return Err(AppError::Config(
                "either 'unix_socket' or 'host' must be specified".into(),
            ));
        }
        if !self.http.path.starts_with('/') {
            return Err(AppError::Config(format!(
                "http path '{}' must start with '/'",
                self.http.path
            )));
        }
        if self.http.timeout == 0 {
            return Err(AppError::Config("http timeout must be positive".into()));
        }
        if self.gpio.settle_attempts == 0 {
            return Err(AppError::Config(
                "gpio settle_attempts must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout)
    }
}
