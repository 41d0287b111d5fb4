//! Layered configuration.
//!
//! Sources, lowest priority first:
//!
//! 1. built-in defaults
//! 2. an optional config file (format chosen by extension)
//! 3. `SENSORBEE_*` environment variables, e.g. `SENSORBEE_URI`
//! 4. command line flags
//!
//! ```toml
//! uri = "http://localhost:15601/"
//! topology = "demo"
//! interval = 2.0
//! filter = "src,box"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::data::{MonitoringState, Visibility, MIN_INTERVAL};
use crate::error::IotopError;

pub const DEFAULT_URI: &str = "http://localhost:15601/";
pub const DEFAULT_API_VERSION: &str = "v1";
pub const DEFAULT_INTERVAL_SECS: f64 = 5.0;

/// What ingest does with a record that cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Log a warning and keep going.
    #[default]
    Skip,
    /// End the session.
    Abort,
}

/// Values given on the command line. `None` leaves lower layers in effect.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub uri: Option<String>,
    pub api_version: Option<String>,
    pub topology: Option<String>,
    pub interval: Option<f64>,
    pub filter: Option<String>,
    pub connect: Option<String>,
    pub strict: bool,
    pub log_file: Option<PathBuf>,
}

/// Validated settings for one run.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Base URI of the SensorBee server.
    pub uri: String,
    pub api_version: String,
    #[serde(default)]
    pub topology: Option<String>,
    /// Refresh interval in seconds.
    pub interval: f64,
    /// Initial category filter, as typed at the `u` prompt.
    #[serde(default)]
    pub filter: Option<String>,
    /// Read records from a TCP relay instead of the HTTP API.
    #[serde(default)]
    pub connect: Option<String>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Settings {
    /// Merge every source and validate the result.
    pub fn load(config_file: Option<&Path>, cli: CliOverrides) -> Result<Self, IotopError> {
        let mut builder = Config::builder()
            .set_default("uri", DEFAULT_URI)?
            .set_default("api_version", DEFAULT_API_VERSION)?
            .set_default("interval", DEFAULT_INTERVAL_SECS)?
            .set_default("strict", false)?;

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(Environment::with_prefix("SENSORBEE").try_parsing(true))
            .set_override_option("uri", cli.uri)?
            .set_override_option("api_version", cli.api_version)?
            .set_override_option("topology", cli.topology)?
            .set_override_option("interval", cli.interval)?
            .set_override_option("filter", cli.filter)?
            .set_override_option("connect", cli.connect)?
            .set_override_option("strict", cli.strict.then_some(true))?
            .set_override_option(
                "log_file",
                cli.log_file.map(|p| p.to_string_lossy().into_owned()),
            )?
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), IotopError> {
        self.interval()?;
        self.visibility()?;
        if self.connect.is_none() && self.topology.as_deref().map_or(true, str::is_empty) {
            return Err(IotopError::InvalidSetting(
                "topology name is required (--topology)".to_string(),
            ));
        }
        Ok(())
    }

    /// Refresh interval; at least one second.
    pub fn interval(&self) -> Result<Duration, IotopError> {
        let interval = Duration::try_from_secs_f64(self.interval)
            .map_err(|e| IotopError::InvalidSetting(format!("invalid interval, {}", e)))?;
        if interval < MIN_INTERVAL {
            return Err(IotopError::InvalidSetting(format!(
                "interval must be at least 1 second, got {}",
                self.interval
            )));
        }
        Ok(interval)
    }

    pub fn visibility(&self) -> Result<Visibility, IotopError> {
        match self.filter.as_deref() {
            Some(filter) => Visibility::parse(filter)
                .map_err(|e| IotopError::InvalidSetting(format!("invalid filter, {}", e))),
            None => Ok(Visibility::all()),
        }
    }

    pub fn decode_policy(&self) -> DecodePolicy {
        if self.strict {
            DecodePolicy::Abort
        } else {
            DecodePolicy::Skip
        }
    }

    /// State the dashboard starts with.
    ///
    /// The status source samples at the start-up interval, so rates keep
    /// dividing by it after the refresh interval changes. A relayed stream
    /// has no known sampling period.
    pub fn initial_state(&self) -> Result<MonitoringState, IotopError> {
        let interval = self.interval()?;
        let state = MonitoringState::new(interval).with_visibility(self.visibility()?);
        Ok(match self.connect {
            Some(_) => state,
            None => state.with_sample_period(interval),
        })
    }
}
