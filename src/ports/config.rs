use crate::domain::stream::{Application, Channels, Server};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error reading config file {path:?}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("error parsing config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Validated configuration, immutable once loaded.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub application: Application,
    pub server: Server,
    pub channels: Channels,
}

pub trait ConfigurationPort {
    fn load(&self, path: &Path) -> Result<LoadedConfig, ConfigError>;
}
