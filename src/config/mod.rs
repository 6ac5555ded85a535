pub mod config_error;
pub mod tracker_config;

pub use config_error::ConfigError;
pub use tracker_config::{ReconnectConfig, RouteConfig, TrackerConfig, TrackingMode};
