use std::{fs::File, io::BufReader, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    channel::{ReconnectPolicy, StompConfig},
    map::IconUrls,
    tracking::DEFAULT_TOPIC_PREFIX,
    utils::location::GeoPoint,
};

use super::config_error::ConfigError;

const CONNECT_TIMEOUT_MS: u64 = 5000;

/// Fuente de las lecturas que usa el visor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    Realtime,
    Polling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// Origen y destino de la ruta, como `[lat, lng]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub start: [f64; 2],
    pub end: [f64; 2],
}

impl Default for RouteConfig {
    fn default() -> Self {
        RouteConfig {
            start: [10.762622, 106.660172],
            end: [10.823099, 106.629664],
        }
    }
}

/// Configuracion del tracker, levantada desde un JSON. Todos los campos son opcionales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_broker_address")]
    pub broker_address: String,
    #[serde(default = "default_broker_host")]
    pub broker_host: String,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub passcode: Option<String>,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default = "default_mode")]
    pub mode: TrackingMode,
    #[serde(default)]
    pub icons: IconUrls,
    #[serde(default)]
    pub route: RouteConfig,
}

fn default_api_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_broker_address() -> String {
    "127.0.0.1:61613".to_string()
}

fn default_broker_host() -> String {
    "/".to_string()
}

fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

fn default_heartbeat_ms() -> u64 {
    10000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_delay_ms() -> u64 {
    3000
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_http_timeout_ms() -> u64 {
    10000
}

fn default_mode() -> TrackingMode {
    TrackingMode::Realtime
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            api_base_url: default_api_base_url(),
            broker_address: default_broker_address(),
            broker_host: default_broker_host(),
            login: None,
            passcode: None,
            topic_prefix: default_topic_prefix(),
            heartbeat_ms: default_heartbeat_ms(),
            reconnect: ReconnectConfig::default(),
            poll_interval_ms: default_poll_interval_ms(),
            http_timeout_ms: default_http_timeout_ms(),
            mode: default_mode(),
            icons: IconUrls::default(),
            route: RouteConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Lee la configuracion de un archivo json y la valida.
    pub fn from_file(path: &str) -> Result<TrackerConfig, ConfigError> {
        let file = File::open(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;

        let reader = BufReader::new(file);
        let config: TrackerConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        debug!(path, mode = ?config.mode, "configuracion cargada");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                message: "debe ser mayor a cero".to_string(),
            });
        }
        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "reconnect.max_attempts",
                message: "debe ser mayor a cero".to_string(),
            });
        }
        self.route_points()?;
        Ok(())
    }

    /// Origen y destino de la ruta ya validados.
    pub fn route_points(&self) -> Result<(GeoPoint, GeoPoint), ConfigError> {
        let start = GeoPoint::new(self.route.start[0], self.route.start[1]).map_err(|e| {
            ConfigError::Invalid {
                field: "route.start",
                message: e.to_string(),
            }
        })?;
        let end = GeoPoint::new(self.route.end[0], self.route.end[1]).map_err(|e| {
            ConfigError::Invalid {
                field: "route.end",
                message: e.to_string(),
            }
        })?;
        Ok((start, end))
    }

    pub fn stomp_config(&self) -> StompConfig {
        StompConfig {
            address: self.broker_address.clone(),
            host: self.broker_host.clone(),
            login: self.login.clone(),
            passcode: self.passcode.clone(),
            heartbeat: Duration::from_millis(self.heartbeat_ms),
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect.max_attempts,
            delay: Duration::from_millis(self.reconnect.delay_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_01_empty_object_uses_defaults() {
        let config: TrackerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.topic_prefix, "/topic/drone/");
        assert_eq!(config.reconnect_policy().max_attempts, 5);
        assert_eq!(config.reconnect_policy().delay, Duration::from_millis(3000));
        assert_eq!(config.poll_interval(), Duration::from_millis(5000));
        assert_eq!(config.mode, TrackingMode::Realtime);
    }

    #[test]
    fn test_02_partial_overrides() {
        let config: TrackerConfig = serde_json::from_str(
            r#"{"mode": "polling", "reconnect": {"max_attempts": 2}, "heartbeat_ms": 0}"#,
        )
        .unwrap();
        assert_eq!(config.mode, TrackingMode::Polling);
        assert_eq!(config.reconnect.max_attempts, 2);
        assert_eq!(config.reconnect.delay_ms, 3000);
        assert_eq!(config.stomp_config().heartbeat, Duration::ZERO);
    }

    #[test]
    fn test_03_validate_rejects_bad_values() {
        let mut config = TrackerConfig::default();
        config.poll_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "poll_interval_ms", .. })
        ));

        let mut config = TrackerConfig::default();
        config.route.end = [91.0, 0.0];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "route.end", .. })
        ));

        let mut config = TrackerConfig::default();
        config.reconnect.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_04_sample_file_is_valid() {
        assert!(TrackerConfig::from_file("./config/tracker_config.json").is_ok());
        assert!(matches!(
            TrackerConfig::from_file("este/es/un/path/feo"),
            Err(ConfigError::Read { .. })
        ));
    }
}
