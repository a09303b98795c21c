use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use md5;
use serde::Deserialize;
use thiserror::Error;

use crate::config::PluginConfiguration;
use crate::data::{MediaItem, ScrobbleUser};
use crate::helpers::http_client::{FormTransport, HttpClientError, UreqFormTransport};

pub const LASTFM_API_ROOT: &str = "https://ws.audioscrobbler.com/2.0/";
const LASTFM_AUTH_URL: &str = "https://www.last.fm/api/auth/";

/// Parameters that must never show up in log output
const SECRET_PARAMS: [&str; 4] = ["sk", "api_key", "api_sig", "token"];

// Error types for Last.fm API
#[derive(Debug, Error)]
pub enum LastfmError {
    #[error("Last.fm API error ({code}): {message}")]
    Api { code: i32, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Track cannot be submitted: {0}")]
    InvalidTrack(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<HttpClientError> for LastfmError {
    fn from(e: HttpClientError) -> Self {
        LastfmError::Network(e.to_string())
    }
}

// Last.fm's own error payload, sent with 200 and non-200 statuses alike
#[derive(Debug, Deserialize)]
struct LastfmErrorResponse {
    error: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session: Session,
}

#[derive(Debug, Deserialize)]
struct Session {
    name: String,
    key: String,
}

/// The three outbound operations the event router delegates to.
///
/// Implementations are called from the blocking pool and may block on I/O.
pub trait ScrobbleApi: Send + Sync {
    /// Announce that `item` started playing for `user`
    fn now_playing(&self, item: &MediaItem, user: &ScrobbleUser) -> Result<(), LastfmError>;

    /// Submit a finished play; `timestamp` is a unix time in seconds
    fn scrobble(&self, item: &MediaItem, user: &ScrobbleUser, timestamp: i64) -> Result<(), LastfmError>;

    /// Love (`true`) or unlove (`false`) a track
    fn love_track(&self, item: &MediaItem, user: &ScrobbleUser, love: bool) -> Result<(), LastfmError>;
}

/// Application credentials identifying this plugin to Last.fm
#[derive(Debug, Clone)]
pub struct LastfmCredentials {
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Clone)]
pub struct LastfmApiClient {
    credentials: LastfmCredentials,
    api_url: String,
    transport: Arc<dyn FormTransport>,
}

impl LastfmApiClient {
    /// Create a client with API credentials and a transport
    pub fn new(api_key: &str, api_secret: &str, transport: Arc<dyn FormTransport>) -> Result<Self, LastfmError> {
        if api_key.trim().is_empty() || api_secret.trim().is_empty() {
            return Err(LastfmError::Config("API key and secret are required".to_string()));
        }

        Ok(LastfmApiClient {
            credentials: LastfmCredentials {
                api_key: api_key.to_string(),
                api_secret: api_secret.to_string(),
            },
            api_url: LASTFM_API_ROOT.to_string(),
            transport,
        })
    }

    /// Create a client backed by ureq from the plugin configuration
    pub fn from_config(config: &PluginConfiguration) -> Result<Self, LastfmError> {
        let transport = Arc::new(UreqFormTransport::new(config.request_timeout_secs));
        let client = Self::new(&config.api_key, &config.api_secret, transport)?
            .with_api_url(&config.api_url);
        info!("Last.fm client initialized for {}", client.api_url);
        Ok(client)
    }

    /// Point the client at a different API root (e.g. a compatible service)
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Get an authentication token from Last.fm (first step of the web auth flow)
    pub fn get_auth_token(&self) -> Result<String, LastfmError> {
        debug!("Requesting new Last.fm auth token");
        let body = self.make_api_request(vec![("method", "auth.getToken".to_string())], false)?;

        let token_response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| LastfmError::Parsing(format!("Failed to parse token response: {}", e)))?;
        Ok(token_response.token)
    }

    /// URL the user has to open to authorize `token` for this application
    pub fn auth_url(&self, token: &str) -> String {
        format!(
            "{}?api_key={}&token={}",
            LASTFM_AUTH_URL,
            urlencoding::encode(&self.credentials.api_key),
            urlencoding::encode(token)
        )
    }

    /// Exchange an authorized token for a session.
    ///
    /// Returns `(session_key, username)`.
    pub fn get_session(&self, token: &str) -> Result<(String, String), LastfmError> {
        let params = vec![
            ("method", "auth.getSession".to_string()),
            ("token", token.to_string()),
        ];

        let body = match self.make_api_request(params, true) {
            // 14: token not yet authorized, 15: token expired, 4: invalid token
            Err(LastfmError::Api { code, message }) if matches!(code, 4 | 14 | 15) => {
                return Err(LastfmError::Auth(message));
            }
            other => other?,
        };

        let session_response: SessionResponse = serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse session response: {}", e);
            LastfmError::Parsing(format!("Failed to parse session response: {}", e))
        })?;

        info!("Successfully authenticated with Last.fm as user: {}", session_response.session.name);
        Ok((session_response.session.key, session_response.session.name))
    }

    /// Update "now playing" status for the user owning `session_key`
    pub fn update_now_playing(&self, item: &MediaItem, session_key: &str) -> Result<(), LastfmError> {
        let mut params = track_params(item)?;
        params.push(("method", "track.updateNowPlaying".to_string()));
        params.push(("sk", require_session_key(session_key)?));

        self.make_api_request(params, true)?;
        debug!("Now playing updated for track: {}", item.label());
        Ok(())
    }

    /// Submit a track scrobble
    pub fn submit_scrobble(&self, item: &MediaItem, session_key: &str, timestamp: i64) -> Result<(), LastfmError> {
        let mut params = track_params(item)?;
        params.push(("method", "track.scrobble".to_string()));
        params.push(("timestamp", timestamp.to_string()));
        params.push(("sk", require_session_key(session_key)?));

        let body = self.make_api_request(params, true)?;
        match ignored_scrobbles(&body) {
            Some(ignored) if ignored > 0 => {
                warn!("Last.fm ignored scrobble for track: {}", item.label());
            }
            _ => debug!("Scrobble successful for track: {}", item.label()),
        }
        Ok(())
    }

    /// Love or unlove a track
    pub fn set_loved(&self, item: &MediaItem, session_key: &str, love: bool) -> Result<(), LastfmError> {
        let artist = item
            .primary_artist()
            .ok_or_else(|| LastfmError::InvalidTrack("artist is missing".to_string()))?;
        let title = item
            .title()
            .ok_or_else(|| LastfmError::InvalidTrack("title is missing".to_string()))?;

        let method = if love { "track.love" } else { "track.unlove" };
        let params = vec![
            ("method", method.to_string()),
            ("artist", artist.to_string()),
            ("track", title.to_string()),
            ("sk", require_session_key(session_key)?),
        ];

        self.make_api_request(params, true)?;
        debug!("{}: {}", method, item.label());
        Ok(())
    }

    /// Make an API request to Last.fm, returning the raw JSON body on success
    fn make_api_request(&self, params: Vec<(&str, String)>, sign: bool) -> Result<String, LastfmError> {
        let mut param_map: BTreeMap<String, String> = params
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        param_map.insert("api_key".to_string(), self.credentials.api_key.clone());

        if sign {
            let signature = sign_params(&param_map, &self.credentials.api_secret);
            param_map.insert("api_sig".to_string(), signature);
        }
        // format is not part of the signature base string
        param_map.insert("format".to_string(), "json".to_string());

        let method_for_log = param_map
            .get("method")
            .cloned()
            .unwrap_or_else(|| "unknown_method".to_string());
        let log_params: Vec<(&String, &String)> = param_map
            .iter()
            .filter(|(k, _)| !SECRET_PARAMS.contains(&k.as_str()))
            .collect();
        debug!("Last.fm API call: method={}, params={:?}", method_for_log, log_params);

        let form: Vec<(&str, &str)> = param_map.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let response = self.transport.post_form(&self.api_url, &form)?;

        // Last.fm reports most failures as a JSON error object, whatever the status
        if let Ok(error_response) = serde_json::from_str::<LastfmErrorResponse>(&response.body) {
            debug!(
                "Last.fm API returned an error: code={}, message='{}'",
                error_response.error, error_response.message
            );
            return Err(LastfmError::Api {
                code: error_response.error,
                message: error_response.message,
            });
        }

        if !response.is_success() {
            error!("Last.fm API HTTP error {} for method {}", response.status, method_for_log);
            return Err(LastfmError::Network(format!(
                "HTTP error {} with unparseable body: {}",
                response.status, response.body
            )));
        }

        Ok(response.body)
    }
}

impl ScrobbleApi for LastfmApiClient {
    fn now_playing(&self, item: &MediaItem, user: &ScrobbleUser) -> Result<(), LastfmError> {
        self.update_now_playing(item, &user.session_key)
    }

    fn scrobble(&self, item: &MediaItem, user: &ScrobbleUser, timestamp: i64) -> Result<(), LastfmError> {
        self.submit_scrobble(item, &user.session_key, timestamp)
    }

    fn love_track(&self, item: &MediaItem, user: &ScrobbleUser, love: bool) -> Result<(), LastfmError> {
        self.set_loved(item, &user.session_key, love)
    }
}

/// Compute the `api_sig` for a set of request parameters.
///
/// Parameters are concatenated as `keyvalue` in key order, `format` and
/// `callback` excluded, followed by the shared secret; the md5 hex digest of
/// that string is the signature.
pub fn sign_params(params: &BTreeMap<String, String>, api_secret: &str) -> String {
    let mut sig_string = String::new();
    for (k, v) in params {
        if k != "format" && k != "callback" {
            sig_string.push_str(k);
            sig_string.push_str(v);
        }
    }
    sig_string.push_str(api_secret);

    format!("{:x}", md5::compute(sig_string.as_bytes()))
}

/// Track description fields shared by now playing and scrobble calls
pub fn track_params(item: &MediaItem) -> Result<Vec<(&'static str, String)>, LastfmError> {
    let artist = item
        .primary_artist()
        .ok_or_else(|| LastfmError::InvalidTrack(format!("item {} has no artist", item.id)))?;
    let title = item
        .title()
        .ok_or_else(|| LastfmError::InvalidTrack(format!("item {} has no title", item.id)))?;

    let mut params = vec![
        ("artist", artist.to_string()),
        ("track", title.to_string()),
    ];

    if let Some(album) = item.album.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        params.push(("album", album.to_string()));
    }

    if let Some(album_artist) = item.album_artist.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        if album_artist != artist {
            params.push(("albumArtist", album_artist.to_string()));
        }
    }

    if let Some(track_number) = item.track_number {
        params.push(("trackNumber", track_number.to_string()));
    }

    if let Some(duration) = item.duration() {
        params.push(("duration", duration.as_secs().to_string()));
    }

    if let Some(mbid) = item.musicbrainz_track_id.as_deref().filter(|m| !m.is_empty()) {
        params.push(("mbid", mbid.to_string()));
    }

    Ok(params)
}

fn require_session_key(session_key: &str) -> Result<String, LastfmError> {
    let session_key = session_key.trim();
    if session_key.is_empty() {
        return Err(LastfmError::Auth("No session key present".to_string()));
    }
    Ok(session_key.to_string())
}

/// Number of scrobbles Last.fm reported as ignored, if the body says so.
/// Last.fm encodes the counter as a number or as a string depending on the endpoint version.
fn ignored_scrobbles(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let ignored = value.get("scrobbles")?.get("@attr")?.get("ignored")?;
    ignored
        .as_u64()
        .or_else(|| ignored.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::UserId;
    use crate::helpers::http_client::HttpResponse;
    use parking_lot::Mutex;

    /// Transport that records every request and replays canned responses
    #[derive(Debug, Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<(String, BTreeMap<String, String>)>>,
        responses: Mutex<Vec<HttpResponse>>,
    }

    impl RecordingTransport {
        fn replying(status: u16, body: &str) -> Arc<Self> {
            let transport = RecordingTransport::default();
            transport.responses.lock().push(HttpResponse {
                status,
                body: body.to_string(),
            });
            Arc::new(transport)
        }

        fn last_request(&self) -> BTreeMap<String, String> {
            self.requests.lock().last().cloned().expect("no request sent").1
        }

        fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    impl FormTransport for RecordingTransport {
        fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<HttpResponse, HttpClientError> {
            let map = params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            self.requests.lock().push((url.to_string(), map));
            Ok(self.responses.lock().pop().unwrap_or(HttpResponse {
                status: 200,
                body: "{}".to_string(),
            }))
        }
    }

    fn client(transport: Arc<RecordingTransport>) -> LastfmApiClient {
        LastfmApiClient::new("test_api_key", "test_api_secret", transport).unwrap()
    }

    fn user() -> ScrobbleUser {
        ScrobbleUser::new("rj", "session-key-123", UserId::new("u1"))
    }

    fn full_item() -> MediaItem {
        MediaItem {
            album: Some("Mezzanine".to_string()),
            album_artist: Some("Massive Attack".to_string()),
            track_number: Some(3),
            run_time: Some(330.7),
            musicbrainz_track_id: Some("mbid-1".to_string()),
            ..MediaItem::audio("7", "Teardrop", "Massive Attack")
        }
    }

    #[test]
    fn test_new_requires_credentials() {
        let transport = Arc::new(RecordingTransport::default());
        assert!(matches!(
            LastfmApiClient::new("", "secret", transport.clone()),
            Err(LastfmError::Config(_))
        ));
        assert!(matches!(
            LastfmApiClient::new("key", "  ", transport),
            Err(LastfmError::Config(_))
        ));
    }

    #[test]
    fn test_sign_params_matches_lastfm_scheme() {
        let mut params = BTreeMap::new();
        params.insert("method".to_string(), "auth.getSession".to_string());
        params.insert("api_key".to_string(), "key".to_string());
        params.insert("token".to_string(), "tok".to_string());
        params.insert("format".to_string(), "json".to_string());

        let expected = format!("{:x}", md5::compute("api_keykeymethodauth.getSessiontokentoksecret"));
        assert_eq!(sign_params(&params, "secret"), expected);
    }

    #[test]
    fn test_track_params_include_optional_fields() {
        let params: BTreeMap<_, _> = track_params(&full_item()).unwrap().into_iter().collect();

        assert_eq!(params["artist"], "Massive Attack");
        assert_eq!(params["track"], "Teardrop");
        assert_eq!(params["album"], "Mezzanine");
        assert_eq!(params["trackNumber"], "3");
        assert_eq!(params["duration"], "330");
        assert_eq!(params["mbid"], "mbid-1");
        // Album artist equal to the track artist is redundant
        assert!(!params.contains_key("albumArtist"));
    }

    #[test]
    fn test_track_params_skip_absurd_runtime() {
        let mut item = full_item();
        item.run_time = Some(1e300);

        let params: BTreeMap<_, _> = track_params(&item).unwrap().into_iter().collect();
        assert_eq!(params["track"], "Teardrop");
        assert!(!params.contains_key("duration"));
    }

    #[test]
    fn test_track_params_reject_untitled_items() {
        let mut item = MediaItem::audio("9", "", "Artist");
        assert!(matches!(track_params(&item), Err(LastfmError::InvalidTrack(_))));

        item.name = Some("Title".to_string());
        item.artists.clear();
        assert!(matches!(track_params(&item), Err(LastfmError::InvalidTrack(_))));
    }

    #[test]
    fn test_now_playing_sends_signed_request() {
        let transport = RecordingTransport::replying(200, r#"{"nowplaying": {}}"#);
        let client = client(transport.clone());

        client.now_playing(&full_item(), &user()).unwrap();

        let request = transport.last_request();
        assert_eq!(request["method"], "track.updateNowPlaying");
        assert_eq!(request["sk"], "session-key-123");
        assert_eq!(request["api_key"], "test_api_key");
        assert_eq!(request["format"], "json");

        let mut unsigned = request.clone();
        let sig = unsigned.remove("api_sig").unwrap();
        assert_eq!(sig, sign_params(&unsigned, "test_api_secret"));
    }

    #[test]
    fn test_scrobble_sends_timestamp() {
        let body = r#"{"scrobbles": {"@attr": {"accepted": 1, "ignored": 0}}}"#;
        let transport = RecordingTransport::replying(200, body);
        let client = client(transport.clone());

        client.scrobble(&full_item(), &user(), 1_700_000_000).unwrap();

        let request = transport.last_request();
        assert_eq!(request["method"], "track.scrobble");
        assert_eq!(request["timestamp"], "1700000000");
    }

    #[test]
    fn test_love_track_picks_method_from_flag() {
        let transport = Arc::new(RecordingTransport::default());
        let client = client(transport.clone());

        client.love_track(&full_item(), &user(), true).unwrap();
        assert_eq!(transport.last_request()["method"], "track.love");

        client.love_track(&full_item(), &user(), false).unwrap();
        assert_eq!(transport.last_request()["method"], "track.unlove");
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn test_empty_session_key_fails_before_request() {
        let transport = Arc::new(RecordingTransport::default());
        let client = client(transport.clone());
        let mut user = user();
        user.session_key = " ".to_string();

        let result = client.now_playing(&full_item(), &user);
        assert!(matches!(result, Err(LastfmError::Auth(_))));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn test_api_error_body_is_reported_on_any_status() {
        let transport = RecordingTransport::replying(200, r#"{"error": 9, "message": "Invalid session key"}"#);
        let result = client(transport).now_playing(&full_item(), &user());
        match result {
            Err(LastfmError::Api { code, message }) => {
                assert_eq!(code, 9);
                assert_eq!(message, "Invalid session key");
            }
            other => panic!("unexpected result {:?}", other),
        }

        let transport = RecordingTransport::replying(403, r#"{"error": 26, "message": "Suspended API key"}"#);
        let result = client(transport).now_playing(&full_item(), &user());
        assert!(matches!(result, Err(LastfmError::Api { code: 26, .. })));
    }

    #[test]
    fn test_http_error_without_api_body_is_network_error() {
        let transport = RecordingTransport::replying(502, "<html>Bad Gateway</html>");
        let result = client(transport).scrobble(&full_item(), &user(), 0);
        assert!(matches!(result, Err(LastfmError::Network(_))));
    }

    #[test]
    fn test_get_session_flow() {
        let transport = RecordingTransport::replying(
            200,
            r#"{"session": {"name": "rj", "key": "abc123", "subscriber": 0}}"#,
        );
        let client = client(transport.clone());

        let (key, name) = client.get_session("tok").unwrap();
        assert_eq!(key, "abc123");
        assert_eq!(name, "rj");
        assert_eq!(transport.last_request()["token"], "tok");
        assert!(transport.last_request().contains_key("api_sig"));
    }

    #[test]
    fn test_get_session_unauthorized_token_is_auth_error() {
        let transport = RecordingTransport::replying(
            200,
            r#"{"error": 14, "message": "This token has not been authorized"}"#,
        );
        assert!(matches!(client(transport).get_session("tok"), Err(LastfmError::Auth(_))));
    }

    #[test]
    fn test_auth_url_contains_key_and_token() {
        let client = client(Arc::new(RecordingTransport::default()));
        assert_eq!(
            client.auth_url("tok en"),
            "https://www.last.fm/api/auth/?api_key=test_api_key&token=tok%20en"
        );
    }

    #[test]
    fn test_ignored_scrobbles_accepts_numbers_and_strings() {
        assert_eq!(ignored_scrobbles(r#"{"scrobbles": {"@attr": {"ignored": 1}}}"#), Some(1));
        assert_eq!(ignored_scrobbles(r#"{"scrobbles": {"@attr": {"ignored": "0"}}}"#), Some(0));
        assert_eq!(ignored_scrobbles("{}"), None);
    }
}
