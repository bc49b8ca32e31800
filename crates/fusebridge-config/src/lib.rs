mod defaults;
mod env;
pub mod types;
mod validation;

use std::path::Path;

pub use env::interpolate_env;
pub use types::*;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Missing environment variables: {0:?}")]
    MissingEnvVars(Vec<String>),

    #[error("Duplicate mount point: {0}")]
    DuplicateMountPoint(String),

    #[error("Invalid mount point '{0}': {1}")]
    InvalidMountPoint(String, String),

    #[error("Unknown mount '{0}'")]
    UnknownMount(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Parse a configuration from a YAML string.
    /// Environment variables in the format `${VAR_NAME}` will be interpolated.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let interpolated = env::interpolate_env(yaml)?;
        let config: BridgeConfig = serde_yaml::from_str(&interpolated)?;
        Ok(config)
    }

    /// Load a configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Look up a mount by name, failing with `UnknownMount`.
    pub fn require_mount(&self, name: &str) -> Result<&MountConfig, ConfigError> {
        self.mount(name)
            .ok_or_else(|| ConfigError::UnknownMount(name.to_string()))
    }
}
