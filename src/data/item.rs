/// Library items as reported by the host media server
use std::time::Duration;
use serde::{Serialize, Deserialize};
use strum_macros::{Display, EnumString};

/// Kind of library item carried by a host event.
///
/// Hosts report kinds either lowercase or in their own PascalCase names.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ItemKind {
    /// Music track
    #[serde(rename = "audio", alias = "Audio")]
    Audio,
    /// Spoken word audio
    #[serde(rename = "audiobook", alias = "AudioBook")]
    AudioBook,
    #[serde(rename = "musicvideo", alias = "MusicVideo")]
    MusicVideo,
    #[serde(rename = "video", alias = "Video")]
    Video,
    #[serde(rename = "movie", alias = "Movie")]
    Movie,
    #[serde(rename = "episode", alias = "Episode")]
    Episode,
    #[serde(rename = "photo", alias = "Photo")]
    Photo,
    /// Anything the host reports that we do not model
    #[serde(rename = "other", other)]
    #[default]
    Other,
}

impl ItemKind {
    /// Only plain music tracks are ever sent to Last.fm
    pub fn is_audio(&self) -> bool {
        matches!(self, ItemKind::Audio)
    }
}

/// A library item referenced by playback and user data events
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    /// Host library id
    pub id: String,

    #[serde(default)]
    pub kind: ItemKind,

    /// Track title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artists: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,

    /// Runtime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_time: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub musicbrainz_track_id: Option<String>,
}

impl MediaItem {
    /// Create an audio item with a title and a single artist
    pub fn audio(id: &str, name: &str, artist: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: ItemKind::Audio,
            name: Some(name.to_string()),
            artists: vec![artist.to_string()],
            ..Default::default()
        }
    }

    /// Artist reported to Last.fm: the first track artist, or the album artist
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists
            .iter()
            .map(|a| a.trim())
            .find(|a| !a.is_empty())
            .or_else(|| {
                self.album_artist
                    .as_deref()
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
            })
    }

    /// Track title, ignoring blank names
    pub fn title(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    pub fn duration(&self) -> Option<Duration> {
        self.run_time
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Short "artist - title" label for log lines
    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.primary_artist().unwrap_or("<unknown artist>"),
            self.title().unwrap_or("<untitled>")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_item_kind_parsing() {
        assert_eq!(ItemKind::from_str("Audio").unwrap(), ItemKind::Audio);
        assert_eq!(ItemKind::from_str("musicvideo").unwrap(), ItemKind::MusicVideo);
        assert!(ItemKind::from_str("podcast").is_err());

        let kind: ItemKind = serde_json::from_str("\"podcast\"").unwrap();
        assert_eq!(kind, ItemKind::Other);
        assert!(!kind.is_audio());
    }

    #[test]
    fn test_primary_artist_falls_back_to_album_artist() {
        let mut item = MediaItem::audio("1", "Song", "  ");
        item.album_artist = Some("Various".to_string());
        assert_eq!(item.primary_artist(), Some("Various"));

        item.artists = vec!["Nina Simone".to_string(), "Other".to_string()];
        assert_eq!(item.primary_artist(), Some("Nina Simone"));
    }

    #[test]
    fn test_duration_ignores_invalid_runtime() {
        let mut item = MediaItem::audio("1", "Song", "Artist");
        assert_eq!(item.duration(), None);

        item.run_time = Some(-3.0);
        assert_eq!(item.duration(), None);

        item.run_time = Some(245.6);
        assert_eq!(item.duration().map(|d| d.as_secs()), Some(245));
    }

    #[test]
    fn test_duration_out_of_range_is_dropped() {
        let mut item = MediaItem::audio("1", "Song", "Artist");

        item.run_time = Some(1e300);
        assert_eq!(item.duration(), None);

        item.run_time = Some(f64::INFINITY);
        assert_eq!(item.duration(), None);

        item.run_time = Some(f64::NAN);
        assert_eq!(item.duration(), None);
    }

    #[test]
    fn test_item_kind_accepts_host_casing() {
        let kind: ItemKind = serde_json::from_str("\"Audio\"").unwrap();
        assert_eq!(kind, ItemKind::Audio);

        let kind: ItemKind = serde_json::from_str("\"MusicVideo\"").unwrap();
        assert_eq!(kind, ItemKind::MusicVideo);

        assert_eq!(ItemKind::AudioBook.to_string(), "audiobook");
        assert_eq!(ItemKind::Other.to_string(), "other");
        assert_eq!(serde_json::to_string(&ItemKind::Audio).unwrap(), "\"audio\"");
    }

    #[test]
    fn test_deserialize_minimal_item() {
        let item: MediaItem = serde_json::from_str(r#"{"id": "abc", "kind": "audio"}"#).unwrap();
        assert_eq!(item.kind, ItemKind::Audio);
        assert_eq!(item.title(), None);
        assert_eq!(item.label(), "<unknown artist> - <untitled>");
    }
}
