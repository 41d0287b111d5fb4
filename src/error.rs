//! Error types for the monitoring session.

use thiserror::Error;

/// Errors that can occur while monitoring a topology.
///
/// Only [`IotopError::InputParse`] is always recoverable. Whether a
/// [`IotopError::Decode`] ends the session depends on the configured
/// [`DecodePolicy`](crate::settings::DecodePolicy).
#[derive(Debug, Error)]
pub enum IotopError {
    /// A node status record could not be decoded.
    #[error("cannot decode node status, {0}")]
    Decode(#[from] serde_json::Error),

    /// The monitoring feed failed or was closed.
    #[error("{0}")]
    Feed(String),

    /// Interactive input was rejected.
    #[error("{0}")]
    InputParse(String),

    /// Keyboard events could not be read.
    #[error("cannot get key events to operate, {0}")]
    InputRead(String),

    /// Drawing to the terminal failed.
    #[error("terminal error: {0}")]
    Terminal(#[source] std::io::Error),

    /// Configuration sources could not be merged.
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// A configuration value is out of range.
    #[error("{0}")]
    InvalidSetting(String),
}

impl IotopError {
    /// Returns true if the session can carry on after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IotopError::InputParse(_))
    }
}

impl From<reqwest::Error> for IotopError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            IotopError::Feed(format!("cannot connect to the server, {}", err))
        } else if err.is_decode() {
            IotopError::Feed(format!("cannot read the response, {}", err))
        } else {
            IotopError::Feed(format!("request failed, {}", err))
        }
    }
}
