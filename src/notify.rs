//! Desktop notification for the currently playing track.
//!
//! Strictly fire-and-forget: the daemon never waits on the notification
//! service and failures are logged and ignored.

use crate::track::TrackInfo;

/// Shows a "now playing" notification.
///
/// The summary is the track title; the body is the artist, with the
/// album in parentheses when known.
#[cfg(feature = "notify")]
pub fn now_playing(track: &TrackInfo) {
    let body = if track.album.is_empty() {
        track.artist.clone()
    } else {
        format!("{} ({})", track.artist, track.album)
    };

    if let Err(e) = notify_rust::Notification::new()
        .appname("fmrelay")
        .summary(&track.title)
        .body(&body)
        .show()
    {
        debug!("notification failed: {e}");
    }
}

#[cfg(not(feature = "notify"))]
pub fn now_playing(track: &TrackInfo) {
    trace!("notifications disabled at build time: {} - {}", track.artist, track.title);
}
