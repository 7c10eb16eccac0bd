use serde::{Deserialize, Serialize};

use crate::events::PlayerEvent;

/// Metadata of one listening event.
///
/// Immutable once constructed. Fields may be empty, but the service
/// requires `artist` and `title` for both announcements and submissions,
/// and a non-zero `timestamp` for submissions. The `timestamp` is the
/// Unix time at which the listen started and is filled in by the playback
/// monitor when it finalizes the track.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub title: String,
    pub track_number: u32,
    /// Track length in seconds; zero when unknown (radio streams).
    pub duration: u32,
    /// MusicBrainz identifier, when the player provides one.
    #[serde(default)]
    pub mbid: String,
    /// Listen start time in seconds since epoch; zero means unset.
    #[serde(default)]
    pub timestamp: u64,
}

impl TrackInfo {
    /// Returns a copy with the listen start time filled in.
    #[must_use]
    pub fn started_at(&self, timestamp: u64) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}

impl From<&PlayerEvent> for TrackInfo {
    fn from(event: &PlayerEvent) -> Self {
        Self {
            artist: event.artist.clone(),
            album: event.album.clone(),
            album_artist: event.album_artist.clone(),
            title: event.title.clone(),
            track_number: event.track_number,
            duration: event.duration,
            mbid: event.mbid.clone(),
            timestamp: 0,
        }
    }
}
