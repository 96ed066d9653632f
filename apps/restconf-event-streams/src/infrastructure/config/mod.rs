//! Configuration Module
//!
//! Configuration loading for the stream engine service.

mod settings;

pub use settings::{ConfigError, DeliverySettings, ServerSettings, ServiceConfig};
