//! Playback events as delivered by the media player front-end.
//!
//! One event is sent per player state change. The daemon deduplicates
//! repeated notifications by fingerprinting the event payload: every
//! field except the play/pause/stop status takes part, so a status flip
//! for the same track keeps its fingerprint while any metadata change
//! produces a new one.

use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Player status reported with each event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}

/// One playback notification from the media player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEvent {
    pub status: PlaybackStatus,
    /// Whether the source is a radio stream rather than a local file.
    pub radio: bool,
    pub artist: String,
    pub album: String,
    #[serde(default)]
    pub album_artist: String,
    pub title: String,
    #[serde(default)]
    pub track_number: u32,
    /// Nominal track length in seconds.
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub mbid: String,
    /// File path or stream URL, used for notifications and diagnostics.
    #[serde(default)]
    pub location: String,
}

impl PlayerEvent {
    /// Fingerprint of the payload, excluding `status`.
    ///
    /// Two consecutive events with equal fingerprints describe the same
    /// track; a changed fingerprint forces finalization of the previous
    /// one.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.radio.hash(&mut hasher);
        self.artist.hash(&mut hasher);
        self.album.hash(&mut hasher);
        self.album_artist.hash(&mut hasher);
        self.title.hash(&mut hasher);
        self.track_number.hash(&mut hasher);
        self.duration.hash(&mut hasher);
        self.mbid.hash(&mut hasher);
        self.location.hash(&mut hasher);
        hasher.finish()
    }
}
