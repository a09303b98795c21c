// Configuration for the Last.fm scrobbler plugin
//
// The host persists plugin configuration as JSON. The plugin section lives in
// the "services" subtree, with a fallback to the legacy top-level key.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{ScrobbleUser, UserId};
use crate::helpers::lastfm::LASTFM_API_ROOT;

/// Key of the plugin section in the host configuration document
pub const PLUGIN_CONFIG_KEY: &str = "lastfm_scrobbler";

/// Default cap on simultaneous requests to Last.fm
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Missing configuration section '{0}'")]
    Missing(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Plugin configuration as persisted by the host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginConfiguration {
    pub api_key: String,

    pub api_secret: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Upper bound for simultaneous in-flight Last.fm requests
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Host users linked to a Last.fm account
    #[serde(default)]
    pub users: Vec<ScrobbleUser>,
}

fn default_api_url() -> String {
    LASTFM_API_ROOT.to_string()
}

fn default_max_concurrent_requests() -> usize {
    DEFAULT_MAX_CONCURRENT_REQUESTS
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl PluginConfiguration {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            api_url: default_api_url(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_secs: default_request_timeout_secs(),
            users: Vec::new(),
        }
    }

    /// Builder style helper to add a linked user
    pub fn with_user(mut self, user: ScrobbleUser) -> Self {
        self.users.push(user);
        self
    }

    /// Extract and validate the plugin section from a host configuration document
    pub fn from_host_config(config: &serde_json::Value) -> Result<Self, ConfigError> {
        let section = get_service_config(config, PLUGIN_CONFIG_KEY)
            .ok_or_else(|| ConfigError::Missing(PLUGIN_CONFIG_KEY.to_string()))?;

        let plugin_config: PluginConfiguration = serde_json::from_value(section.clone())?;
        plugin_config.validate()?;
        Ok(plugin_config)
    }

    /// Load the host configuration file and extract the plugin section
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        let document: serde_json::Value = serde_json::from_str(&content)?;
        Self::from_host_config(&document)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("api_key is required".to_string()));
        }
        if self.api_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("api_secret is required".to_string()));
        }
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_url must not be empty".to_string()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_requests must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if !seen.insert(&user.host_user_id) {
                warn!(
                    "Host user {} is linked more than once, only the first entry is used",
                    user.host_user_id
                );
            }
            if !user.has_session_key() {
                warn!("Last.fm user {} has no session key and will be skipped", user.username);
            }
        }

        Ok(())
    }

    /// Linked user for a host user id; the first matching entry wins
    pub fn find_user(&self, host_user_id: &UserId) -> Option<&ScrobbleUser> {
        self.users.iter().find(|u| &u.host_user_id == host_user_id)
    }
}

/// Helper function to get service configuration with backward compatibility
///
/// This function first tries to find the service in the "services" structure,
/// then falls back to the old top-level structure.
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use lastfm_scrobbler::config::get_service_config;
///
/// let config = json!({
///   "services": {
///     "lastfm_scrobbler": { "api_key": "k" }
///   }
/// });
///
/// let section = get_service_config(&config, "lastfm_scrobbler").unwrap();
/// assert_eq!(section["api_key"], "k");
///
/// let old_config = json!({ "lastfm_scrobbler": { "api_key": "old" } });
/// assert_eq!(get_service_config(&old_config, "lastfm_scrobbler").unwrap()["api_key"], "old");
/// ```
pub fn get_service_config<'a>(config: &'a serde_json::Value, service_name: &str) -> Option<&'a serde_json::Value> {
    if let Some(services) = config.get("services") {
        if let Some(service_config) = services.get(service_name) {
            debug!("Found {} configuration in services section", service_name);
            return Some(service_config);
        }
    }

    if let Some(service_config) = config.get(service_name) {
        debug!("Found {} configuration at top level (legacy structure)", service_name);
        return Some(service_config);
    }

    debug!("No {} configuration found in either services section or top level", service_name);
    None
}
