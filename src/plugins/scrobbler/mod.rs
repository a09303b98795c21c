//! Last.fm scrobbler plugin: routes host playback and rating events to Last.fm.

pub mod resolver;
pub mod router;
pub mod state;


use std::any::Any;
use std::sync::Arc;

use log::info;

use crate::config::PluginConfiguration;
use crate::host::{EventBus, EventSubscription};
use crate::plugins::event_plugin::BaseEventPlugin;
use crate::plugins::plugin::Plugin;

pub use resolver::{ConfiguredUserResolver, UserResolver};
pub use router::{EventRouter, Route, RouteDecision, ScrobbleAction, SkipReason};
pub use state::PluginState;

pub const PLUGIN_NAME: &str = "lastfm-scrobbler";

/// Entry point the host drives through the plugin lifecycle
pub struct LastfmScrobbler {
    base: BaseEventPlugin,
    router: Arc<EventRouter>,
}

impl LastfmScrobbler {
    pub fn new(state: Arc<PluginState>, event_bus: EventBus) -> Self {
        let resolver = Arc::new(ConfiguredUserResolver::new(Arc::clone(&state)));
        Self {
            base: BaseEventPlugin::new(PLUGIN_NAME, event_bus),
            router: Arc::new(EventRouter::new(state, resolver)),
        }
    }

    /// Subscribe the router to the host events it handles.
    /// Calling this again while subscribed does nothing.
    pub fn run(&self) -> bool {
        let router = Arc::clone(&self.router);
        let subscribed = self.base.subscribe_to_event_bus(
            vec![
                EventSubscription::PlaybackStart,
                EventSubscription::PlaybackStopped,
                EventSubscription::UserDataSaved,
            ],
            move |event| router.handle_event(event),
        );

        if subscribed {
            info!("{} is listening for playback and rating events", PLUGIN_NAME);
        }
        subscribed
    }

    pub fn is_running(&self) -> bool {
        self.base.is_subscribed()
    }

    /// Called after the host swapped the configuration snapshot.
    /// Users are resolved per event, so nothing needs rebuilding.
    pub fn on_configuration_updated(&self, old: &PluginConfiguration, new: &PluginConfiguration) {
        info!(
            "{} configuration updated: {} linked users (was {})",
            PLUGIN_NAME,
            new.users.len(),
            old.users.len()
        );
        if old.max_concurrent_requests != new.max_concurrent_requests
            || old.api_key != new.api_key
            || old.api_url != new.api_url
        {
            info!("API settings changed; they apply when the plugin is restarted");
        }
    }

    /// Unsubscribe from the host events
    pub fn dispose(&self) -> bool {
        let unsubscribed = self.base.unsubscribe_from_event_bus();
        if unsubscribed {
            info!("{} stopped listening for events", PLUGIN_NAME);
        }
        unsubscribed
    }
}

impl Plugin for LastfmScrobbler {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn version(&self) -> &str {
        self.base.version()
    }

    fn init(&mut self) -> bool {
        self.run();
        self.is_running()
    }

    fn shutdown(&mut self) -> bool {
        self.dispose();
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
