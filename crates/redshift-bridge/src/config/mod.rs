//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{BridgeError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Warehouse settings, or an error naming the operation that needs them.
    pub fn require_warehouse(&self, operation: &str) -> Result<&WarehouseConfig> {
        self.warehouse.as_ref().ok_or_else(|| {
            BridgeError::Config(format!("a warehouse section is required for {}", operation))
        })
    }
}
