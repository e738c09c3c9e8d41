//! Report configuration
//!
//! Everything here has a default, so an empty JSON object (or no file at
//! all) yields a working configuration:
//!
//! ```json
//! {
//!   "framing": { "mode": "padded", "width": 149 },
//!   "clock": { "hz": 250, "user_hz": 100 },
//!   "max_namespaces": 4096
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::extract::TickClock;
use crate::record::RowFraming;

/// Default registry capacity
pub const DEFAULT_MAX_NAMESPACES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    #[serde(default)]
    pub framing: RowFraming,
    #[serde(default)]
    pub clock: TickClock,
    #[serde(default = "default_max_namespaces")]
    pub max_namespaces: usize,
}

#[must_use]
pub const fn default_max_namespaces() -> usize {
    DEFAULT_MAX_NAMESPACES
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            framing: RowFraming::default(),
            clock: TickClock::default(),
            max_namespaces: DEFAULT_MAX_NAMESPACES,
        }
    }
}

impl ReportConfig {
    /// Parse and validate a JSON document
    ///
    /// # Errors
    ///
    /// `ConfigError::Json` for malformed input, `ConfigError::Invalid` for
    /// out-of-range values.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    ///
    /// # Errors
    ///
    /// `ConfigError::Io` if the file cannot be read, plus everything
    /// [`ReportConfig::from_json`] returns.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// # Errors
    ///
    /// `ConfigError::Invalid` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.clock.validate()?;
        if let RowFraming::Padded { width: 0 } = self.framing {
            return Err(ConfigError::Invalid(
                "padded framing needs a non-zero width".to_string(),
            ));
        }
        if self.max_namespaces == 0 {
            return Err(ConfigError::Invalid(
                "max_namespaces must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
