//! # Configuration Module
//!
//! Server and pipeline settings, loaded from an optional YAML file and then
//! overridden from the environment.
//!
//! ## Environment Variables
//!
//! | variable            | field                   | default          |
//! |---------------------|-------------------------|------------------|
//! | `BRRTD_BIND`        | `bind`                  | `127.0.0.1:8080` |
//! | `BRRTD_ACCEPTORS`   | `acceptors`             | `1`              |
//! | `BRRTD_BUFFER_SIZE` | `pipeline.buffer_size`  | `1024`           |
//! | `BRRTD_WORKERS`     | `pipeline.workers`      | `4`              |
//! | `BRRTD_STACK_SIZE`  | `pipeline.stack_size`   | `0x40000`        |
//!
//! `BRRTD_STACK_SIZE` accepts decimal (`262144`) or hex (`0x40000`).
//!
//! ## File Format
//!
//! ```yaml
//! bind: 0.0.0.0:8080
//! acceptors: 2
//! shutdown: graceful
//! pipeline:
//!   buffer_size: 2048
//!   workers: 8
//!   stack_size: 0x40000
//! ```
//!
//! Every key is optional.

use crate::error::ConfigError;
use crate::pipeline::ShutdownMode;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_BUFFER_SIZE: usize = 1024;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_STACK_SIZE: usize = 0x40000; // 256KB

/// Ring and worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Ring slots; must be a power of two
    pub buffer_size: usize,
    /// Worker threads in the dispatch group
    pub workers: usize,
    /// Worker thread stack size in bytes
    #[serde(deserialize_with = "deserialize_size")]
    pub stack_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            workers: DEFAULT_WORKERS,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 || !self.buffer_size.is_power_of_two() {
            return Err(ConfigError::Invalid {
                key: "pipeline.buffer_size",
                reason: format!("{} is not a non-zero power of two", self.buffer_size),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                key: "pipeline.workers",
                reason: "at least one worker is required".into(),
            });
        }
        Ok(())
    }
}

/// Top-level server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    /// Threads calling `wait_for_incoming_request`
    pub acceptors: usize,
    pub pipeline: PipelineConfig,
    /// How the pipeline stops when the server does
    pub shutdown: ShutdownMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            acceptors: 1,
            pipeline: PipelineConfig::default(),
            shutdown: ShutdownMode::Graceful,
        }
    }
}

impl ServerConfig {
    /// Defaults, then `path` if given, then the environment. Validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        info!(
            bind = %config.bind,
            acceptors = config.acceptors,
            buffer_size = config.pipeline.buffer_size,
            workers = config.pipeline.workers,
            stack_size = config.pipeline.stack_size,
            shutdown = ?config.shutdown,
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Reading config file");
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `BRRTD_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("BRRTD_BIND") {
            self.bind = bind;
        }
        if let Some(v) = lookup("BRRTD_ACCEPTORS") {
            self.acceptors = parse_count("BRRTD_ACCEPTORS", &v)?;
        }
        if let Some(v) = lookup("BRRTD_BUFFER_SIZE") {
            self.pipeline.buffer_size = parse_count("BRRTD_BUFFER_SIZE", &v)?;
        }
        if let Some(v) = lookup("BRRTD_WORKERS") {
            self.pipeline.workers = parse_count("BRRTD_WORKERS", &v)?;
        }
        if let Some(v) = lookup("BRRTD_STACK_SIZE") {
            self.pipeline.stack_size = parse_size(&v).ok_or_else(|| ConfigError::Invalid {
                key: "BRRTD_STACK_SIZE",
                reason: format!("`{v}` is not a decimal or 0x-prefixed size"),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "bind",
                reason: "address is empty".into(),
            });
        }
        if self.acceptors == 0 {
            return Err(ConfigError::Invalid {
                key: "acceptors",
                reason: "at least one acceptor is required".into(),
            });
        }
        self.pipeline.validate()
    }
}

fn parse_count(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        reason: format!("`{value}` is not a number"),
    })
}

/// Decimal or `0x` hex byte count.
pub fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(usize),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Number(n) => Ok(n),
        Size::Text(s) => parse_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid size `{s}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "127.0.0.1:8080");
        assert_eq!(config.acceptors, 1);
        assert_eq!(config.pipeline.buffer_size, 1024);
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.pipeline.stack_size, 0x40000);
        assert_eq!(config.shutdown, ShutdownMode::Graceful);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("0x4000"), Some(16384));
        assert_eq!(parse_size("32768"), Some(32768));
        assert_eq!(parse_size("lots"), None);
    }

    #[test]
    fn test_yaml_partial_file() {
        let config = ServerConfig::from_yaml(
            "acceptors: 2\nshutdown: forceful\npipeline:\n  workers: 8\n  stack_size: 0x8000\n",
        )
        .unwrap();
        assert_eq!(config.acceptors, 2);
        assert_eq!(config.shutdown, ShutdownMode::Forceful);
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.pipeline.stack_size, 0x8000);
        assert_eq!(config.pipeline.buffer_size, 1024);
        assert_eq!(config.bind, DEFAULT_BIND);
    }

    #[test]
    fn test_yaml_rejects_unknown_keys() {
        assert!(matches!(
            ServerConfig::from_yaml("workerz: 3\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind: 0.0.0.0:9000\npipeline:\n  workers: 2").unwrap();
        let mut config = ServerConfig::from_file(file.path()).unwrap();

        let env: HashMap<&str, &str> = [("BRRTD_WORKERS", "6"), ("BRRTD_STACK_SIZE", "0x10000")]
            .into_iter()
            .collect();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.pipeline.workers, 6);
        assert_eq!(config.pipeline.stack_size, 0x10000);
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_overrides(|k| (k == "BRRTD_ACCEPTORS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "BRRTD_ACCEPTORS",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_bad_buffer() {
        let mut config = ServerConfig::default();
        config.pipeline.buffer_size = 1000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "pipeline.buffer_size",
                ..
            })
        ));
        config.pipeline.buffer_size = 512;
        config.pipeline.workers = 0;
        assert!(config.validate().is_err());
        config.pipeline.workers = 1;
        config.acceptors = 0;
        assert!(config.validate().is_err());
    }
}
