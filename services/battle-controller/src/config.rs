//! Configuration for the battle controller.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use warstage_id::PlayerId;
use warstage_reconcile::CommanderPolicy;

/// Errors that prevent the controller from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed formation template: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid formation template: {0}")]
    Template(String),
}

/// Battle controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Player hosting the deployment units.
    pub host_player_id: PlayerId,

    /// Formation template file. The built-in samurai table is used if unset.
    pub formation_path: Option<PathBuf>,

    /// Handling of commanders whose slot was vacated.
    pub commander_policy: CommanderPolicy,

    /// Delay before the first retry after a failed pass.
    pub retry_base: Duration,

    /// Retries after consecutive failed passes before waiting for the next trigger.
    pub max_retries: u32,

    /// Capacity of the controller event queue.
    pub queue_capacity: usize,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Player that hosts deployment units unless configured otherwise.
pub const DEFAULT_HOST_PLAYER_ID: &str = "host";

pub const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(250);

pub const DEFAULT_MAX_RETRIES: u32 = 5;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host_player_id = lookup("WARSTAGE_HOST_PLAYER_ID")
            .unwrap_or_else(|| DEFAULT_HOST_PLAYER_ID.to_string());
        let host_player_id = PlayerId::new(host_player_id).map_err(|e| ConfigError::Env {
            var: "WARSTAGE_HOST_PLAYER_ID",
            reason: e.to_string(),
        })?;

        let formation_path = lookup("WARSTAGE_FORMATION_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let commander_policy = match lookup("WARSTAGE_COMMANDER_POLICY") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Env {
                var: "WARSTAGE_COMMANDER_POLICY",
                reason,
            })?,
            None => CommanderPolicy::default(),
        };

        let retry_base = parse_var(&lookup, "WARSTAGE_RETRY_BASE_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RETRY_BASE);

        let max_retries =
            parse_var(&lookup, "WARSTAGE_MAX_RETRIES")?.unwrap_or(DEFAULT_MAX_RETRIES);

        let queue_capacity =
            parse_var(&lookup, "WARSTAGE_QUEUE_CAPACITY")?.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        if queue_capacity == 0 {
            return Err(ConfigError::Env {
                var: "WARSTAGE_QUEUE_CAPACITY",
                reason: "must be greater than zero".to_string(),
            });
        }

        let log_level = lookup("WARSTAGE_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            host_player_id,
            formation_path,
            commander_policy,
            retry_base,
            max_retries,
            queue_capacity,
            log_level,
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(var)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Env {
                var,
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.host_player_id.as_str(), "host");
        assert_eq!(config.commander_policy, CommanderPolicy::Prune);
        assert_eq!(config.retry_base, Duration::from_millis(250));
        assert_eq!(config.queue_capacity, 1024);
        assert!(config.formation_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("WARSTAGE_HOST_PLAYER_ID", "alice"),
            ("WARSTAGE_COMMANDER_POLICY", "retain"),
            ("WARSTAGE_RETRY_BASE_MS", "10"),
            ("WARSTAGE_MAX_RETRIES", "2"),
            ("WARSTAGE_FORMATION_PATH", "/etc/warstage/formation.toml"),
        ]))
        .unwrap();

        assert_eq!(config.host_player_id.as_str(), "alice");
        assert_eq!(config.commander_policy, CommanderPolicy::Retain);
        assert_eq!(config.retry_base, Duration::from_millis(10));
        assert_eq!(config.max_retries, 2);
        assert_eq!(
            config.formation_path,
            Some(PathBuf::from("/etc/warstage/formation.toml"))
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = Config::from_lookup(lookup(&[("WARSTAGE_MAX_RETRIES", "lots")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Env {
                var: "WARSTAGE_MAX_RETRIES",
                ..
            }
        ));

        let err = Config::from_lookup(lookup(&[("WARSTAGE_COMMANDER_POLICY", "keep")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));

        let err = Config::from_lookup(lookup(&[("WARSTAGE_QUEUE_CAPACITY", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));

        let err = Config::from_lookup(lookup(&[("WARSTAGE_HOST_PLAYER_ID", "")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }
}
