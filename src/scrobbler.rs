//! Scrobbler session and remote operations.
//!
//! Owns the long-lived service credentials and the four remote
//! operations: first-time authentication, session validation, the
//! now-playing announcement and the scrobble submission. Codec-level
//! outcomes are translated into the error taxonomy the retry policy
//! works with: a [`ScrobblerError::Transport`] means the service could
//! not be reached at all, while [`ScrobblerError::Protocol`] means it
//! was reached and rejected the call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use thiserror::Error;

use crate::protocol::{Params, Response, API_URL, AUTH_URL, ERROR_INVALID_PARAMETERS, ERROR_MALFORMED};
use crate::track::TrackInfo;
use crate::util;

/// API key identifying this application to the scrobbler service.
pub const API_KEY: [u8; 16] = [
    0x3f, 0x91, 0x5a, 0x0c, 0xe4, 0x27, 0xb8, 0x61, 0x09, 0xd3, 0x7e, 0x44, 0xa5, 0x1f, 0xc2, 0x88,
];

/// Shared secret matching [`API_KEY`]. Never sent over the wire; only
/// its hex dump takes part in request signing.
pub const API_SECRET: [u8; 16] = [
    0x71, 0x2d, 0x04, 0xbe, 0x58, 0xc6, 0x13, 0xf9, 0xaa, 0x30, 0x97, 0x6b, 0x0e, 0xd1, 0x4c, 0xe5,
];

/// Bound on every remote call so the daemon loop cannot stall.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ScrobblerError {
    /// The track lacks a field the operation requires. Caller error,
    /// never retried.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    /// The service was reached and rejected the call with this code.
    #[error("scrobbler service rejected the call with code {0}")]
    Protocol(u16),
    /// The service could not be reached (connection, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The user declined the out-of-band authorization step.
    #[error("user authorization rejected")]
    CallbackRejected,
}

pub type ScrobblerResult<T> = Result<T, ScrobblerError>;

/// The remote track operations the retry policy is built on.
///
/// A trait seam so the offline policy can be exercised against a mock
/// service in tests.
#[async_trait]
pub trait ScrobbleService {
    /// Submits a finished listen (`track.scrobble`).
    async fn submit(&mut self, track: &TrackInfo) -> ScrobblerResult<()>;

    /// Announces the currently playing track (`track.updateNowPlaying`).
    async fn now_playing(&mut self, track: &TrackInfo) -> ScrobblerResult<()>;

    /// Checks that the session key is still accepted by the service.
    async fn validate_session(&mut self) -> ScrobblerResult<()>;
}

/// Live scrobbler session.
pub struct Scrobbler {
    api_key: [u8; 16],
    secret: [u8; 16],
    /// All zeroes until authenticated or loaded from the configuration.
    session_key: [u8; 16],
    user_name: String,
    /// Code of the most recent protocol-level rejection.
    last_error: Option<u16>,
    client: reqwest::Client,
}

impl Scrobbler {
    /// Creates a session with the given application credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ScrobblerError::Transport`] when the HTTP client cannot
    /// be constructed.
    pub fn new(api_key: [u8; 16], secret: [u8; 16]) -> ScrobblerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            secret,
            session_key: [0; 16],
            user_name: String::new(),
            last_error: None,
            client,
        })
    }

    /// Session key as the 32-character hex string it is persisted as.
    #[must_use]
    pub fn session_key_hex(&self) -> String {
        util::hex_encode(&self.session_key)
    }

    /// Restores a session key from its persisted hex form.
    ///
    /// An unparsable key is left unset; the next remote call will then
    /// fail with an authentication error and trigger re-authorization.
    pub fn set_session_key_hex(&mut self, hex: &str) {
        match util::hex_decode_key(hex) {
            Some(key) => self.session_key = key,
            None => warn!("ignoring malformed session key"),
        }
    }

    /// Name of the authenticated user, when known.
    #[must_use]
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Code of the most recent protocol-level rejection.
    #[must_use]
    pub fn last_error(&self) -> Option<u16> {
        self.last_error
    }

    /// Performs the interactive authentication dance.
    ///
    /// Requests a one-time token, hands the authorization URL to the
    /// callback and blocks until it returns, then exchanges the token
    /// for a session key and user name.
    ///
    /// # Errors
    ///
    /// [`ScrobblerError::CallbackRejected`] when the callback returns
    /// `false`; otherwise the usual transport/protocol errors of the
    /// two remote steps.
    pub async fn authenticate<F>(&mut self, authorize: F) -> ScrobblerResult<()>
    where
        F: FnOnce(&str) -> bool,
    {
        let api_key = util::hex_encode(&self.api_key);

        let params = Params::new()
            .text("api_key", api_key.clone())
            .text("method", "auth.getToken");
        let response = self.call(Method::GET, params).await?;
        let token = response
            .tag("token")
            .ok_or(ScrobblerError::Protocol(ERROR_MALFORMED))?
            .to_owned();

        let url = format!("{AUTH_URL}?api_key={api_key}&token={token}");
        if !authorize(&url) {
            return Err(ScrobblerError::CallbackRejected);
        }

        let params = Params::new()
            .text("api_key", api_key)
            .text("method", "auth.getSession")
            .text("token", token);
        let response = self.call(Method::GET, params).await?;

        let key = response
            .tag("key")
            .and_then(util::hex_decode_key)
            .ok_or(ScrobblerError::Protocol(ERROR_MALFORMED))?;
        let name = response
            .tag("name")
            .ok_or(ScrobblerError::Protocol(ERROR_MALFORMED))?;

        self.session_key = key;
        self.user_name = name.to_owned();
        info!("authenticated as {}", self.user_name);

        Ok(())
    }

    /// Parameter set shared by the now-playing and scrobble calls.
    fn track_params(&self, method: &'static str, track: &TrackInfo) -> Params {
        Params::new()
            .text("album", track.album.clone())
            .text("albumArtist", track.album_artist.clone())
            .text("api_key", util::hex_encode(&self.api_key))
            .text("artist", track.artist.clone())
            .number("duration", u64::from(track.duration))
            .text("mbid", track.mbid.clone())
            .text("method", method)
            .text("sk", self.session_key_hex())
            .text("track", track.title.clone())
            .number("trackNumber", u64::from(track.track_number))
    }

    /// Engine behind the now-playing call, without required-field checks.
    ///
    /// The session validation probe depends on being able to send this
    /// with everything empty.
    async fn send_now_playing(&mut self, track: &TrackInfo) -> ScrobblerResult<()> {
        let params = self.track_params("track.updateNowPlaying", track);
        self.call(Method::POST, params).await.map(|_| ())
    }

    async fn call(&mut self, method: Method, params: Params) -> ScrobblerResult<Response> {
        let form = params.into_form(&self.secret);

        let request = if method == Method::POST {
            self.client
                .post(API_URL)
                .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(form)
        } else {
            self.client.get(format!("{API_URL}?{form}"))
        };

        let body = request.send().await?.text().await?;
        trace!("response body: {body}");

        self.check(Response::new(body))
    }

    /// Turns a service rejection into an error, recording its code.
    fn check(&mut self, response: Response) -> ScrobblerResult<Response> {
        if let Err(code) = response.status() {
            self.last_error = Some(code);
            return Err(ScrobblerError::Protocol(code));
        }

        Ok(response)
    }
}

#[async_trait]
impl ScrobbleService for Scrobbler {
    async fn submit(&mut self, track: &TrackInfo) -> ScrobblerResult<()> {
        if track.artist.is_empty() {
            return Err(ScrobblerError::MissingField("artist"));
        }
        if track.title.is_empty() {
            return Err(ScrobblerError::MissingField("track"));
        }
        if track.timestamp == 0 {
            return Err(ScrobblerError::MissingField("timestamp"));
        }

        debug!("scrobbling {} - {} ({})", track.artist, track.title, track.timestamp);
        let params = self
            .track_params("track.scrobble", track)
            .number("timestamp", track.timestamp);
        self.call(Method::POST, params).await.map(|_| ())
    }

    async fn now_playing(&mut self, track: &TrackInfo) -> ScrobblerResult<()> {
        if track.artist.is_empty() {
            return Err(ScrobblerError::MissingField("artist"));
        }
        if track.title.is_empty() {
            return Err(ScrobblerError::MissingField("track"));
        }

        debug!("now playing {} - {}", track.artist, track.title);
        self.send_now_playing(track).await
    }

    /// Validates the session key with a deliberately malformed call.
    ///
    /// Sends `track.updateNowPlaying` with every field empty. The
    /// service checks authentication before parameter completeness, so
    /// an "invalid parameters" rejection (code 6) proves the session
    /// key itself is fine and counts as success here, and only here.
    /// Any other outcome means the session is invalid or the service
    /// unreachable.
    async fn validate_session(&mut self) -> ScrobblerResult<()> {
        match self.send_now_playing(&TrackInfo::default()).await {
            Ok(()) | Err(ScrobblerError::Protocol(ERROR_INVALID_PARAMETERS)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
