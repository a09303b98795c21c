//! Plugin system: lifecycle trait, event bus plumbing and the Last.fm scrobbler

pub mod event_plugin;
pub mod plugin;
pub mod registry;
pub mod scrobbler;

pub use plugin::Plugin;
pub use registry::{PluginError, PluginRegistry};
