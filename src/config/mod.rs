mod schema;

pub use schema::*;

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to parse config: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("Unsupported config format: {0} (expected .yml, .yaml or .toml)")]
    UnsupportedFormat(String),
    #[error("no replicas configured")]
    Empty,
    #[error("port not specified for {0}")]
    MissingPort(String),
    #[error("invalid healthcheck path {path:?} for {replica}: must start with '/'")]
    InvalidPath { replica: String, path: String },
}

/// Load the replica map, picking the parser from the file extension
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let config: Config = match extension.as_str() {
        "yml" | "yaml" => serde_yaml::from_str(&content)?,
        "toml" => toml::from_str(&content)?,
        other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
    };
    Ok(config)
}
