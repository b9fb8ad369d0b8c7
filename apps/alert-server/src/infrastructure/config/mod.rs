//! Configuration Module
//!
//! Configuration loading for the alert server.

mod settings;

pub use settings::{
    AlertServerConfig, ConfigError, MonitorSettings, PriceSourceKind, ServerSettings,
    UpstreamSettings,
};
