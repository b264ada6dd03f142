//! Transport layer: message adapter, Redis request loop, health endpoints,
//! local notification logging and configuration.

pub mod adapter;
pub mod config;
pub mod health;
pub mod notifications;
pub mod server;

pub use adapter::{HandledMessage, UserNotificationEnvelope, UserRequestHandler};
pub use config::{ConfigError, ServiceConfig};
