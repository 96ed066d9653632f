//! Service Configuration Settings
//!
//! Configuration types for the stream engine, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// RESTCONF HTTP port.
    pub http_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 8181,
            health_port: 8182,
        }
    }
}

/// Per-subscriber delivery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverySettings {
    /// Documents queued per subscriber before new ones are dropped.
    pub subscriber_buffer: usize,
    /// Interval between keepalive comments on idle streams.
    pub keepalive_interval: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            subscriber_buffer: 1024,
            keepalive_interval: Duration::from_secs(15),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Delivery settings.
    pub delivery: DeliverySettings,
    /// Schema file to load at startup. An empty schema is used when unset.
    pub model_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but empty or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but empty or malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let server = ServerSettings {
            http_port: parse_var(&lookup, "RESTCONF_HTTP_PORT")?
                .unwrap_or(defaults.server.http_port),
            health_port: parse_var(&lookup, "RESTCONF_HEALTH_PORT")?
                .unwrap_or(defaults.server.health_port),
        };

        let subscriber_buffer: usize = parse_var(&lookup, "RESTCONF_SUBSCRIBER_BUFFER")?
            .unwrap_or(defaults.delivery.subscriber_buffer);
        if subscriber_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RESTCONF_SUBSCRIBER_BUFFER".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let keepalive_interval = match parse_var::<u64>(&lookup, "RESTCONF_KEEPALIVE_SECS")? {
            None => defaults.delivery.keepalive_interval,
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "RESTCONF_KEEPALIVE_SECS".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
        };

        let model_path = non_empty_var(&lookup, "RESTCONF_MODEL_PATH")?.map(PathBuf::from);

        Ok(Self {
            server,
            delivery: DeliverySettings {
                subscriber_buffer,
                keepalive_interval,
            },
            model_path,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} is invalid: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

fn non_empty_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<String>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Some(value) => Ok(Some(value.trim().to_string())),
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    non_empty_var(lookup, key)?
        .map(|value| {
            value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("'{value}': {e}"),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ServiceConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.server.http_port, 8181);
        assert_eq!(config.server.health_port, 8182);
        assert_eq!(config.delivery.subscriber_buffer, 1024);
        assert_eq!(config.delivery.keepalive_interval, Duration::from_secs(15));
        assert!(config.model_path.is_none());
    }

    #[test]
    fn values_are_read() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("RESTCONF_HTTP_PORT", "9000"),
            ("RESTCONF_HEALTH_PORT", "9001"),
            ("RESTCONF_SUBSCRIBER_BUFFER", "16"),
            ("RESTCONF_KEEPALIVE_SECS", "5"),
            ("RESTCONF_MODEL_PATH", "models/toaster.json"),
        ]))
        .unwrap();
        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.server.health_port, 9001);
        assert_eq!(config.delivery.subscriber_buffer, 16);
        assert_eq!(config.delivery.keepalive_interval, Duration::from_secs(5));
        assert_eq!(config.model_path, Some(PathBuf::from("models/toaster.json")));
    }

    #[test]
    fn empty_value_is_rejected() {
        let err = ServiceConfig::from_lookup(lookup_from(&[("RESTCONF_MODEL_PATH", " ")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::EmptyValue("RESTCONF_MODEL_PATH".to_string()));
    }

    #[test]
    fn malformed_port_is_rejected() {
        let err = ServiceConfig::from_lookup(lookup_from(&[("RESTCONF_HTTP_PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "RESTCONF_HTTP_PORT"));
    }

    #[test]
    fn zero_buffer_and_keepalive_are_rejected() {
        assert!(ServiceConfig::from_lookup(lookup_from(&[("RESTCONF_SUBSCRIBER_BUFFER", "0")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup_from(&[("RESTCONF_KEEPALIVE_SECS", "0")])).is_err());
    }
}
