/// Events emitted by the host session manager and user data manager
use serde::{Serialize, Deserialize};
use strum_macros::EnumString;

use super::item::MediaItem;
use super::user::UserId;

/// Why the host saved a user's item data
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum UserDataSaveReason {
    PlaybackStart,
    PlaybackProgress,
    PlaybackFinished,
    TogglePlayed,
    /// Rating or favorite flag changed
    UpdateUserRating,
    Import,
}

/// Per-user data attached to an item
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserItemData {
    #[serde(default)]
    pub is_favorite: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,

    #[serde(default)]
    pub play_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackStartEvent {
    pub item: MediaItem,

    /// Users attached to the playing session
    #[serde(default)]
    pub users: Vec<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackStopEvent {
    pub item: MediaItem,

    #[serde(default)]
    pub users: Vec<UserId>,

    #[serde(default)]
    pub played_to_completion: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserDataSaveEvent {
    pub item: MediaItem,

    pub user_id: UserId,

    pub reason: UserDataSaveReason,

    #[serde(default)]
    pub user_data: UserItemData,
}

/// Anything the host publishes on the event bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    PlaybackStart(PlaybackStartEvent),
    PlaybackStopped(PlaybackStopEvent),
    UserDataSaved(UserDataSaveEvent),
}

impl HostEvent {
    /// Event name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::PlaybackStart(_) => "playback_start",
            HostEvent::PlaybackStopped(_) => "playback_stopped",
            HostEvent::UserDataSaved(_) => "user_data_saved",
        }
    }

    pub fn item(&self) -> &MediaItem {
        match self {
            HostEvent::PlaybackStart(e) => &e.item,
            HostEvent::PlaybackStopped(e) => &e.item,
            HostEvent::UserDataSaved(e) => &e.item,
        }
    }
}
