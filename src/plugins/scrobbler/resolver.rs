use std::sync::Arc;

use crate::data::{ScrobbleUser, UserId};

use super::state::PluginState;

/// Maps a host user id to the Last.fm identity linked to it
pub trait UserResolver: Send + Sync {
    fn resolve(&self, host_user_id: &UserId) -> Option<ScrobbleUser>;
}

/// Resolves users against the plugin's current configuration snapshot.
/// Every lookup reads the latest snapshot, so configuration updates apply
/// to the next event.
pub struct ConfiguredUserResolver {
    state: Arc<PluginState>,
}

impl ConfiguredUserResolver {
    pub fn new(state: Arc<PluginState>) -> Self {
        Self { state }
    }
}

impl UserResolver for ConfiguredUserResolver {
    fn resolve(&self, host_user_id: &UserId) -> Option<ScrobbleUser> {
        self.state.config().find_user(host_user_id).cloned()
    }
}
