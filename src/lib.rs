/// Library items, users and host events
pub mod data;

/// Plugin configuration with backward compatibility support
pub mod config;

/// Host side collaborators: the event bus
pub mod host;

/// Plugin system and the Last.fm scrobbler plugin
pub mod plugins;

/// Last.fm API client and HTTP transport
pub mod helpers;

/// Logging configuration and utilities
pub mod logging;

pub use crate::config::PluginConfiguration;
pub use crate::host::EventBus;
pub use crate::plugins::PluginRegistry;
