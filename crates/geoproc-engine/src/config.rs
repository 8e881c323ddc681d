// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for geoproc-engine.

use std::path::PathBuf;
use std::time::Duration;

use crate::engine::DEFAULT_WORKERS;
use crate::types::{InstanceId, ServiceKind};

/// Default timeout for command payloads (1 hour).
pub const DEFAULT_PAYLOAD_TIMEOUT_SECS: u64 = 3600;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Id of this service instance; only processes assigned to it are run
    pub instance_id: InstanceId,
    /// Human-readable instance name, reported in logs and status
    pub instance_name: String,
    /// Kind of service this instance runs
    pub service_kind: ServiceKind,
    /// Number of parallel workers
    pub workers: usize,
    /// PostgreSQL URL for the execution log (in-memory log when unset)
    pub database_url: Option<String>,
    /// JSON file with process definitions loaded at startup
    pub processes_file: Option<PathBuf>,
    /// Timeout applied by the command payload
    pub payload_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance_id: InstanceId(1),
            instance_name: "geoproc".to_string(),
            service_kind: ServiceKind::Collector,
            workers: DEFAULT_WORKERS,
            database_url: None,
            processes_file: None,
            payload_timeout: Duration::from_secs(DEFAULT_PAYLOAD_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through a variable lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let instance_id = match var("GEOPROC_INSTANCE_ID") {
            Some(v) => InstanceId(parse(&v, "GEOPROC_INSTANCE_ID")?),
            None => defaults.instance_id,
        };

        let instance_name = var("GEOPROC_INSTANCE_NAME").unwrap_or(defaults.instance_name);

        let service_kind = match var("GEOPROC_SERVICE_KIND") {
            Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                name: "GEOPROC_SERVICE_KIND",
                value: v,
            })?,
            None => defaults.service_kind,
        };

        let workers = match var("GEOPROC_WORKERS") {
            Some(v) => parse(&v, "GEOPROC_WORKERS")?,
            None => defaults.workers,
        };
        if workers == 0 {
            return Err(ConfigError::InvalidValue {
                name: "GEOPROC_WORKERS",
                value: "0".to_string(),
            });
        }

        let payload_timeout = match var("GEOPROC_PAYLOAD_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse(&v, "GEOPROC_PAYLOAD_TIMEOUT_SECS")?),
            None => defaults.payload_timeout,
        };

        Ok(Self {
            instance_id,
            instance_name,
            service_kind,
            workers,
            database_url: var("GEOPROC_DATABASE_URL"),
            processes_file: var("GEOPROC_PROCESSES_FILE").map(PathBuf::from),
            payload_timeout,
        })
    }
}

fn parse<T: std::str::FromStr>(value: &str, name: &'static str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// An environment variable has an unusable value.
    #[error("Invalid value '{value}' for {name}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Value found.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&'static str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.instance_id, InstanceId(1));
        assert_eq!(config.workers, 4);
        assert_eq!(config.payload_timeout, Duration::from_secs(3600));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_all_variables() {
        let config = load(&[
            ("GEOPROC_INSTANCE_ID", "3"),
            ("GEOPROC_INSTANCE_NAME", "interp-eu-west"),
            ("GEOPROC_SERVICE_KIND", "interpolator"),
            ("GEOPROC_WORKERS", "8"),
            ("GEOPROC_DATABASE_URL", "postgres://localhost/geoproc"),
            ("GEOPROC_PROCESSES_FILE", "/etc/geoproc/processes.json"),
            ("GEOPROC_PAYLOAD_TIMEOUT_SECS", "120"),
        ])
        .unwrap();

        assert_eq!(config.instance_id, InstanceId(3));
        assert_eq!(config.instance_name, "interp-eu-west");
        assert_eq!(config.service_kind, ServiceKind::Interpolator);
        assert_eq!(config.workers, 8);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/geoproc")
        );
        assert_eq!(
            config.processes_file,
            Some(PathBuf::from("/etc/geoproc/processes.json"))
        );
        assert_eq!(config.payload_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let config = load(&[("GEOPROC_DATABASE_URL", ""), ("GEOPROC_WORKERS", " ")]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.workers, DEFAULT_WORKERS);
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = load(&[("GEOPROC_WORKERS", "many")]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value 'many' for GEOPROC_WORKERS");

        let err = load(&[("GEOPROC_WORKERS", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                name: "GEOPROC_WORKERS",
                ..
            }
        ));

        let err = load(&[("GEOPROC_SERVICE_KIND", "gui")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                name: "GEOPROC_SERVICE_KIND",
                ..
            }
        ));

        assert!(load(&[("GEOPROC_INSTANCE_ID", "-1")]).is_err());
    }
}
