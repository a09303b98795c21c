use std::fmt;
use std::sync::Arc;

use log::{debug, error, log, warn, Level};

use crate::data::{
    HostEvent, ItemKind, MediaItem, PlaybackStartEvent, PlaybackStopEvent, ScrobbleUser,
    UserDataSaveEvent, UserDataSaveReason, UserId,
};
use crate::helpers::lastfm::{LastfmError, ScrobbleApi};

use super::resolver::UserResolver;
use super::state::PluginState;

/// Outbound call an accepted event turns into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrobbleAction {
    NowPlaying,
    /// Scrobble with the UTC unix time the play was recorded at
    Scrobble { timestamp: i64 },
    Love { love: bool },
}

impl ScrobbleAction {
    pub fn name(&self) -> &'static str {
        match self {
            ScrobbleAction::NowPlaying => "now playing",
            ScrobbleAction::Scrobble { .. } => "scrobble",
            ScrobbleAction::Love { love: true } => "love",
            ScrobbleAction::Love { love: false } => "unlove",
        }
    }

    fn execute(&self, api: &dyn ScrobbleApi, item: &MediaItem, user: &ScrobbleUser) -> Result<(), LastfmError> {
        match *self {
            ScrobbleAction::NowPlaying => api.now_playing(item, user),
            ScrobbleAction::Scrobble { timestamp } => api.scrobble(item, user, timestamp),
            ScrobbleAction::Love { love } => api.love_track(item, user, love),
        }
    }
}

/// Why an event did not lead to an outbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotAudio(ItemKind),
    NotPlayedToCompletion,
    IgnoredReason(UserDataSaveReason),
    NoUsers,
    UnknownUser(UserId),
    ScrobblingDisabled(String),
    MissingSessionKey(String),
}

impl SkipReason {
    /// Level the skip is logged at
    pub fn log_level(&self) -> Level {
        match self {
            SkipReason::NotAudio(_) | SkipReason::IgnoredReason(_) => Level::Trace,
            SkipReason::NotPlayedToCompletion
            | SkipReason::NoUsers
            | SkipReason::UnknownUser(_)
            | SkipReason::ScrobblingDisabled(_) => Level::Debug,
            SkipReason::MissingSessionKey(_) => Level::Info,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotAudio(kind) => write!(f, "item kind {} is not audio", kind),
            SkipReason::NotPlayedToCompletion => write!(f, "item was not played to completion"),
            SkipReason::IgnoredReason(reason) => write!(f, "user data saved for {:?}", reason),
            SkipReason::NoUsers => write!(f, "no user attached to the session"),
            SkipReason::UnknownUser(id) => write!(f, "host user {} is not linked to Last.fm", id),
            SkipReason::ScrobblingDisabled(username) => {
                write!(f, "scrobbling is disabled for Last.fm user {}", username)
            }
            SkipReason::MissingSessionKey(username) => {
                write!(f, "Last.fm user {} has no session key", username)
            }
        }
    }
}

/// An accepted event: who to call Last.fm for, and with what
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub user: ScrobbleUser,
    pub action: ScrobbleAction,
}

pub type RouteDecision = Result<Route, SkipReason>;

fn require_audio(item: &MediaItem) -> Result<(), SkipReason> {
    if item.kind.is_audio() {
        Ok(())
    } else {
        Err(SkipReason::NotAudio(item.kind))
    }
}

fn resolve_linked(resolver: &dyn UserResolver, host_user_id: &UserId) -> Result<ScrobbleUser, SkipReason> {
    resolver
        .resolve(host_user_id)
        .ok_or_else(|| SkipReason::UnknownUser(host_user_id.clone()))
}

fn require_session_key(user: ScrobbleUser) -> Result<ScrobbleUser, SkipReason> {
    if user.has_session_key() {
        Ok(user)
    } else {
        Err(SkipReason::MissingSessionKey(user.username))
    }
}

/// Gate shared by playback events. Only the first session user is considered.
fn resolve_playback_user(resolver: &dyn UserResolver, users: &[UserId]) -> Result<ScrobbleUser, SkipReason> {
    let host_user_id = users.first().ok_or(SkipReason::NoUsers)?;
    let user = resolve_linked(resolver, host_user_id)?;
    if !user.scrobble_enabled {
        return Err(SkipReason::ScrobblingDisabled(user.username));
    }
    require_session_key(user)
}

pub fn evaluate_playback_start(event: &PlaybackStartEvent, resolver: &dyn UserResolver) -> RouteDecision {
    require_audio(&event.item)?;
    let user = resolve_playback_user(resolver, &event.users)?;
    Ok(Route { user, action: ScrobbleAction::NowPlaying })
}

pub fn evaluate_playback_stopped(
    event: &PlaybackStopEvent,
    resolver: &dyn UserResolver,
    timestamp: i64,
) -> RouteDecision {
    require_audio(&event.item)?;
    if !event.played_to_completion {
        return Err(SkipReason::NotPlayedToCompletion);
    }
    let user = resolve_playback_user(resolver, &event.users)?;
    Ok(Route { user, action: ScrobbleAction::Scrobble { timestamp } })
}

/// Rating changes sync the favorite flag. The per-user scrobble toggle does
/// not apply here.
pub fn evaluate_user_data_saved(event: &UserDataSaveEvent, resolver: &dyn UserResolver) -> RouteDecision {
    require_audio(&event.item)?;
    if event.reason != UserDataSaveReason::UpdateUserRating {
        return Err(SkipReason::IgnoredReason(event.reason));
    }
    let user = require_session_key(resolve_linked(resolver, &event.user_id)?)?;
    Ok(Route {
        user,
        action: ScrobbleAction::Love { love: event.user_data.is_favorite },
    })
}

/// Turns host events into fire-and-forget Last.fm calls.
///
/// Handlers never block on the network and never fail: skipped events are
/// logged, accepted ones are spawned on the plugin runtime behind the
/// request gate.
pub struct EventRouter {
    state: Arc<PluginState>,
    resolver: Arc<dyn UserResolver>,
}

impl EventRouter {
    pub fn new(state: Arc<PluginState>, resolver: Arc<dyn UserResolver>) -> Self {
        Self { state, resolver }
    }

    pub fn handle_event(&self, event: HostEvent) {
        match event {
            HostEvent::PlaybackStart(event) => self.on_playback_start(&event),
            HostEvent::PlaybackStopped(event) => self.on_playback_stopped(&event),
            HostEvent::UserDataSaved(event) => self.on_user_data_saved(&event),
        }
    }

    pub fn on_playback_start(&self, event: &PlaybackStartEvent) {
        let decision = evaluate_playback_start(event, self.resolver.as_ref());
        self.route("playback_start", &event.item, decision);
    }

    pub fn on_playback_stopped(&self, event: &PlaybackStopEvent) {
        let timestamp = chrono::Utc::now().timestamp();
        let decision = evaluate_playback_stopped(event, self.resolver.as_ref(), timestamp);
        self.route("playback_stopped", &event.item, decision);
    }

    pub fn on_user_data_saved(&self, event: &UserDataSaveEvent) {
        let decision = evaluate_user_data_saved(event, self.resolver.as_ref());
        self.route("user_data_saved", &event.item, decision);
    }

    fn route(&self, event_name: &str, item: &MediaItem, decision: RouteDecision) {
        match decision {
            Ok(route) => self.dispatch(item.clone(), route),
            Err(reason) => {
                log!(reason.log_level(), "Ignoring {} for {}: {}", event_name, item.label(), reason);
            }
        }
    }

    fn dispatch(&self, item: MediaItem, route: Route) {
        let Route { user, action } = route;
        debug!("Dispatching {} of {} for {}", action.name(), item.label(), user.username);

        let api = self.state.api();
        let gate = self.state.request_gate();
        let pending = self.state.begin_call();

        self.state.runtime().spawn(async move {
            let _pending = pending;
            let permit = match gate.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    debug!("Request gate closed, dropping {} of {}", action.name(), item.label());
                    return;
                }
            };

            let username = user.username.clone();
            let label = item.label();
            let outcome = tokio::task::spawn_blocking(move || {
                // Released when the call returns, fails or panics
                let _permit = permit;
                action.execute(api.as_ref(), &item, &user)
            })
            .await;

            match outcome {
                Ok(Ok(())) => debug!("Last.fm {} of {} for {} succeeded", action.name(), label, username),
                Ok(Err(e)) => warn!("Last.fm {} of {} for {} failed: {}", action.name(), label, username, e),
                Err(e) => error!("Last.fm {} task for {} aborted: {}", action.name(), username, e),
            }
        });
    }
}
