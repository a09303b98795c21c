use std::fmt;
use serde::{Serialize, Deserialize};

/// Opaque identifier of a host (media server) user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId(id.to_string())
    }
}

/// A host user linked to a Last.fm account.
///
/// The password is never stored. The session key obtained during linking is a
/// lifetime key and acts as a bearer credential, so `Debug` masks it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrobbleUser {
    /// Last.fm username
    pub username: String,

    pub session_key: String,

    pub host_user_id: UserId,

    /// Per-user opt-in for now playing and scrobble submissions
    #[serde(default = "default_scrobble_enabled")]
    pub scrobble_enabled: bool,
}

fn default_scrobble_enabled() -> bool {
    true
}

impl ScrobbleUser {
    pub fn new(username: &str, session_key: &str, host_user_id: UserId) -> Self {
        Self {
            username: username.to_string(),
            session_key: session_key.to_string(),
            host_user_id,
            scrobble_enabled: true,
        }
    }

    /// True when the stored session key is usable for signed calls
    pub fn has_session_key(&self) -> bool {
        !self.session_key.trim().is_empty()
    }

    /// Session key with everything but the first four characters masked
    pub fn masked_session_key(&self) -> String {
        mask_secret(&self.session_key)
    }
}

impl fmt::Debug for ScrobbleUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrobbleUser")
            .field("username", &self.username)
            .field("session_key", &self.masked_session_key())
            .field("host_user_id", &self.host_user_id)
            .field("scrobble_enabled", &self.scrobble_enabled)
            .finish()
    }
}

/// Mask a credential for log output
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "*".repeat(secret.chars().count())
    } else {
        format!("{}****", visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_output_masks_session_key() {
        let user = ScrobbleUser::new("rj", "d580d57f32848f5dcf574d1ce18d78b2", UserId::new("u1"));
        let debug = format!("{:?}", user);

        assert!(debug.contains("d580****"));
        assert!(!debug.contains("d580d57f32848f5dcf574d1ce18d78b2"));
    }

    #[test]
    fn test_whitespace_session_key_is_not_usable() {
        let mut user = ScrobbleUser::new("rj", "   \t", UserId::new("u1"));
        assert!(!user.has_session_key());

        user.session_key = String::new();
        assert!(!user.has_session_key());

        user.session_key = "abc".to_string();
        assert!(user.has_session_key());
    }

    #[test]
    fn test_mask_short_secrets() {
        assert_eq!(mask_secret(""), "");
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret("abcdef"), "abcd****");
    }

    #[test]
    fn test_scrobble_enabled_defaults_to_true() {
        let user: ScrobbleUser = serde_json::from_str(
            r#"{"username": "rj", "session_key": "sk", "host_user_id": "42"}"#,
        )
        .unwrap();
        assert!(user.scrobble_enabled);
        assert_eq!(user.host_user_id, UserId::new("42"));
    }
}
