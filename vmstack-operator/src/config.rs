//! Operator configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::stack::{GROUP_TEMPLATE, NETWORK_TEMPLATE, SERVER_TEMPLATE};

pub const DEFAULT_POLLING_PERIOD: &str = "5s";
pub const DEFAULT_SCRATCH_DIR: &str = "/tmp";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid polling period {value:?}: {source}")]
    InvalidPollingPeriod {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("polling period must be greater than zero")]
    ZeroPollingPeriod,
}

/// Source files of the three stack templates.
#[derive(Debug, Clone)]
pub struct TemplatePaths {
    pub network: PathBuf,
    pub server: PathBuf,
    /// Entry-point template aggregating the other two.
    pub group: PathBuf,
}

impl TemplatePaths {
    /// Logical template name and source path of every template.
    pub fn entries(&self) -> [(&'static str, &Path); 3] {
        [
            (NETWORK_TEMPLATE, self.network.as_path()),
            (SERVER_TEMPLATE, self.server.as_path()),
            (GROUP_TEMPLATE, self.group.as_path()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub templates: TemplatePaths,
    /// Writable directory rendered templates are written to.
    pub scratch_dir: PathBuf,
    pub polling_period: Duration,
}

/// Parse a human-readable duration such as `5s` or `1m 30s`.
pub fn parse_polling_period(value: &str) -> Result<Duration, ConfigError> {
    let period = humantime::parse_duration(value).map_err(|source| ConfigError::InvalidPollingPeriod {
        value: value.to_string(),
        source,
    })?;
    if period.is_zero() {
        return Err(ConfigError::ZeroPollingPeriod);
    }
    Ok(period)
}
