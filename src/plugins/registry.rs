use std::sync::Arc;

use log::{error, info, warn};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;

use crate::config::{ConfigError, PluginConfiguration};
use crate::helpers::lastfm::{LastfmApiClient, LastfmError, ScrobbleApi};
use crate::host::EventBus;
use crate::plugins::plugin::Plugin;
use crate::plugins::scrobbler::{LastfmScrobbler, PluginState};

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Plugin is already running")]
    AlreadyRunning,

    #[error("Plugin is not running")]
    NotRunning,

    #[error("Plugin failed to initialize")]
    InitFailed,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lastfm(#[from] LastfmError),
}

struct ActivePlugin {
    state: Arc<PluginState>,
    scrobbler: LastfmScrobbler,
}

/// Host-owned home of the scrobbler's process-wide state.
///
/// `start` initializes the state and subscribes the plugin, `shutdown`
/// tears both down. Each registry is independent, so tests create their own.
pub struct PluginRegistry {
    event_bus: EventBus,
    runtime: Handle,
    active: Mutex<Option<ActivePlugin>>,
}

impl PluginRegistry {
    pub fn new(event_bus: EventBus, runtime: Handle) -> Self {
        Self {
            event_bus,
            runtime,
            active: Mutex::new(None),
        }
    }

    /// Start the plugin with a Last.fm client built from the configuration
    pub fn start_from_config(&self, config: PluginConfiguration) -> Result<Arc<PluginState>, PluginError> {
        let client = LastfmApiClient::from_config(&config)?;
        self.start(config, Arc::new(client))
    }

    /// Initialize the plugin state and subscribe the plugin to host events
    pub fn start(&self, config: PluginConfiguration, api: Arc<dyn ScrobbleApi>) -> Result<Arc<PluginState>, PluginError> {
        config.validate()?;

        let mut active = self.active.lock();
        if active.is_some() {
            return Err(PluginError::AlreadyRunning);
        }

        let linked_users = config.users.len();
        let state = Arc::new(PluginState::new(config, api, self.runtime.clone()));
        let mut scrobbler = LastfmScrobbler::new(Arc::clone(&state), self.event_bus.clone());

        if !scrobbler.init() {
            error!("Plugin '{}' failed to initialize", scrobbler.name());
            state.close();
            return Err(PluginError::InitFailed);
        }

        info!(
            "Plugin '{}' v{} started with {} linked users",
            scrobbler.name(),
            scrobbler.version(),
            linked_users
        );
        *active = Some(ActivePlugin { state: Arc::clone(&state), scrobbler });
        Ok(state)
    }

    /// State of the running plugin
    pub fn state(&self) -> Option<Arc<PluginState>> {
        self.active.lock().as_ref().map(|a| Arc::clone(&a.state))
    }

    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Replace the configuration snapshot and notify the plugin
    pub fn update_configuration(&self, config: PluginConfiguration) -> Result<(), PluginError> {
        config.validate()?;

        let active = self.active.lock();
        let active = active.as_ref().ok_or(PluginError::NotRunning)?;

        let old = active.state.replace_config(config);
        let new = active.state.config();
        active.scrobbler.on_configuration_updated(&old, &new);
        Ok(())
    }

    /// Unsubscribe the plugin and close the request gate right away.
    /// Calls still waiting for a permit are abandoned.
    /// Returns false if the plugin was not running.
    pub fn shutdown(&self) -> bool {
        self.stop(false)
    }

    /// Unsubscribe the plugin, let every accepted call finish, then close the
    /// request gate. The wait is bounded by [`PluginState::drain_budget`].
    /// Returns false if the plugin was not running.
    pub fn shutdown_with_drain(&self) -> bool {
        self.stop(true)
    }

    fn stop(&self, drain: bool) -> bool {
        let Some(mut active) = self.active.lock().take() else {
            return false;
        };

        // Joins the listener, so every event already published has been routed
        active.scrobbler.shutdown();

        if drain {
            let timeout = active.state.drain_budget();
            if !active.state.drain(timeout) {
                warn!(
                    "Abandoning {} pending Last.fm calls after {:?}",
                    active.state.pending_calls(),
                    timeout
                );
            }
        }

        active.state.close();
        info!("Plugin '{}' shut down", active.scrobbler.name());
        true
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
