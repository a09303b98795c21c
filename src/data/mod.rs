pub mod events;
pub mod item;
pub mod user;

pub use events::{
    HostEvent, PlaybackStartEvent, PlaybackStopEvent, UserDataSaveEvent, UserDataSaveReason,
    UserItemData,
};
pub use item::{ItemKind, MediaItem};
pub use user::{ScrobbleUser, UserId};
