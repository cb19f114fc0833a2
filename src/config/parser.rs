use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Hex-encoded SHA-256 of configuration text
pub fn hash_config_text(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored with every run so that runs made under different settings can be told apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_config_text(&std::fs::read_to_string(path)?))
}

/// Loads a configuration and returns both the config and the hash of the text it was parsed from
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_config_text(&content)))
}
