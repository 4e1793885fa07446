//! Engine configuration.
//!
//! Layered lowest to highest: built-in defaults, an optional TOML file, then
//! environment variables.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path_de;

/// Nesting limit for validation, conversion and decoding.
pub const DEFAULT_MAX_DEPTH: usize = 500;

pub const ENV_MAX_DEPTH: &str = "CTY_MAX_DEPTH";

/// Largest decimal exponent, in either direction, a number may carry.
pub const DEFAULT_MAX_NUMBER_EXPONENT: u32 = crate::value::number::DEFAULT_MAX_EXPONENT;

pub const ENV_MAX_NUMBER_EXPONENT: &str = "CTY_MAX_NUMBER_EXPONENT";

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "cty.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub max_depth: usize,
    /// Numbers such as `1e2000000` expand to their full digits on the wire;
    /// anything whose exponent lies beyond this bound is rejected on input.
    pub max_number_exponent: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config { max_depth: DEFAULT_MAX_DEPTH, max_number_exponent: DEFAULT_MAX_NUMBER_EXPONENT }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: path_de::PathError,
    },
    #[error("{var}={value:?} is not a valid limit")]
    Env { var: &'static str, value: String },
}

impl Config {
    pub fn from_toml_str(src: &str) -> Result<Self, path_de::PathError> {
        path_de::from_toml_with_path(src)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Config::from_toml_str(&src).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Defaults, then `path` (or `cty.toml` if present), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(p) => Config::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Config::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Config::default(),
        };
        base.apply_env(|var| std::env::var(var).ok())
    }

    /// Overlay variables resolved through `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_DEPTH) {
            self.max_depth = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { var: ENV_MAX_DEPTH, value: raw.clone() })?;
        }
        if let Some(raw) = lookup(ENV_MAX_NUMBER_EXPONENT) {
            self.max_number_exponent = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { var: ENV_MAX_NUMBER_EXPONENT, value: raw.clone() })?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(Config::default().max_depth, 500);
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn toml_overrides_defaults() {
        let cfg = Config::from_toml_str("max_depth = 64\n").unwrap();
        assert_eq!(cfg.max_depth, 64);
        assert_eq!(cfg.max_number_exponent, DEFAULT_MAX_NUMBER_EXPONENT);
        let cfg = Config::from_toml_str("max_number_exponent = 20\n").unwrap();
        assert_eq!(cfg.max_number_exponent, 20);
    }

    #[test]
    fn unknown_keys_are_rejected_with_a_path() {
        let err = Config::from_toml_str("max_dpeth = 3\n").unwrap_err();
        assert!(err.message.contains("max_dpeth"), "{err}");
        let err = Config::from_toml_str("max_depth = \"deep\"\n").unwrap_err();
        assert_eq!(err.path, "max_depth");
    }

    #[test]
    fn environment_wins() {
        let cfg = Config::default().apply_env(|v| (v == ENV_MAX_DEPTH).then(|| "12".to_string())).unwrap();
        assert_eq!(cfg.max_depth, 12);
        let cfg = Config::default()
            .apply_env(|v| (v == ENV_MAX_NUMBER_EXPONENT).then(|| "30".to_string()))
            .unwrap();
        assert_eq!(cfg.max_number_exponent, 30);
        let err = Config::default().apply_env(|_| Some("lots".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }
}
