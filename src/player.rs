//! Playback state machine.
//!
//! Decides, per incoming player event, whether a listen must be
//! announced as now playing, submitted as a finished scrobble, or
//! ignored as a duplicate notification. The machine is pure: it consumes
//! `(event, now)` and returns the actions the daemon should carry out,
//! so all timing rules are testable with plain numbers.
//!
//! At most one track is open at a time. Opening a new track implicitly
//! finalizes the previous one: its accumulated playing time is checked
//! against the submission threshold and the listen is either submitted
//! (with the timestamp it started at) or silently discarded.

use crate::events::{PlaybackStatus, PlayerEvent};
use crate::track::TrackInfo;

/// Minimum playing time for a radio stream, in seconds.
///
/// Streams have no usable track length, so the 50% rule is applied
/// against this nominal duration instead.
pub const RADIO_FULL_SECS: u64 = 180;

/// Playing time that always qualifies a track for submission.
pub const SUBMIT_SECS: u64 = 240;

/// Pause gap beyond which a resume is treated as a fresh listen.
pub const REANNOUNCE_SECS: u64 = 120;

/// What the daemon should do in response to one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Announce the track as currently playing.
    NowPlaying { track: TrackInfo, radio: bool },
    /// Submit a finished listen; `track.timestamp` is set.
    Submit { track: TrackInfo, radio: bool },
}

/// State for the one currently open track.
///
/// All timestamps are seconds since epoch; zero means unset.
#[derive(Debug, Default)]
pub struct Monitor {
    saved: TrackInfo,
    radio: bool,
    started_at: u64,
    paused_at: u64,
    resumed_at: u64,
    /// Seconds actually spent playing since `started_at`.
    play_secs: u64,
    /// Nominal track length the 50% rule is applied against.
    full_secs: u64,
    last_fingerprint: u64,
}

impl Monitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one player event into the machine.
    pub fn handle(&mut self, event: &PlayerEvent, now: u64) -> Vec<Action> {
        let mut actions = Vec::new();
        let fingerprint = event.fingerprint();

        if fingerprint != self.last_fingerprint {
            // A different track: finalize whatever was open, then treat
            // this event as a fresh track-open.
            self.last_fingerprint = fingerprint;
            self.finalize(now, &mut actions);
            self.open(event, now, &mut actions);
            return actions;
        }

        match event.status {
            PlaybackStatus::Stopped => {
                self.finalize(now, &mut actions);
            }
            PlaybackStatus::Paused => {
                self.accumulate(now);
                self.paused_at = now;
            }
            PlaybackStatus::Playing => {
                if self.paused_at != 0 {
                    let idle_secs = now.saturating_sub(self.paused_at);
                    self.paused_at = 0;
                    self.resumed_at = now;
                    if idle_secs > REANNOUNCE_SECS && self.started_at != 0 {
                        // Long pause: treat as a fresh listen of the same
                        // track. Re-announce, but keep the scrobble timer
                        // running from the original start.
                        actions.push(Action::NowPlaying {
                            track: self.saved.clone(),
                            radio: self.radio,
                        });
                    }
                } else {
                    // Playing again with no pause in between. The player
                    // cannot tell a loop from a resume it never reported a
                    // pause for; assume the track was replayed from the
                    // start and submit the previous listen.
                    self.finalize(now, &mut actions);
                    self.open(event, now, &mut actions);
                }
            }
        }

        actions
    }

    /// Whether a track is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.started_at != 0
    }

    /// Adds the elapsed playing time since the last resume.
    ///
    /// No-op while paused: the pause handler has already accumulated up
    /// to `paused_at`, and idle time never counts as playing time.
    fn accumulate(&mut self, now: u64) {
        if self.started_at != 0 && self.paused_at == 0 {
            self.play_secs += now.saturating_sub(self.resumed_at);
            self.resumed_at = now;
        }
    }

    /// Closes the open track, submitting it when it played long enough.
    fn finalize(&mut self, now: u64, actions: &mut Vec<Action>) {
        self.accumulate(now);

        if self.started_at != 0 && self.qualifies() {
            actions.push(Action::Submit {
                track: self.saved.started_at(self.started_at),
                radio: self.radio,
            });
        }

        self.started_at = 0;
        self.paused_at = 0;
    }

    /// Submission rule: more than half the track, or more than
    /// [`SUBMIT_SECS`] outright.
    fn qualifies(&self) -> bool {
        self.play_secs * 2 > self.full_secs || self.play_secs > SUBMIT_SECS
    }

    /// Opens a new track, unless the event says the player stopped.
    fn open(&mut self, event: &PlayerEvent, now: u64, actions: &mut Vec<Action>) {
        if event.status == PlaybackStatus::Stopped {
            return;
        }

        self.started_at = now;
        self.resumed_at = now;
        self.paused_at = 0;
        self.play_secs = 0;
        self.radio = event.radio;
        self.full_secs = if event.radio {
            RADIO_FULL_SECS
        } else {
            u64::from(event.duration)
        };
        self.saved = TrackInfo::from(event);

        if event.status == PlaybackStatus::Playing {
            actions.push(Action::NowPlaying {
                track: self.saved.clone(),
                radio: self.radio,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(status: PlaybackStatus, title: &str, duration: u32, radio: bool) -> PlayerEvent {
        PlayerEvent {
            status,
            radio,
            artist: "Low".to_owned(),
            album: "Things We Lost in the Fire".to_owned(),
            album_artist: String::new(),
            title: title.to_owned(),
            track_number: 4,
            duration,
            mbid: String::new(),
            location: format!("/music/low/{title}.flac"),
        }
    }

    fn playing(title: &str, duration: u32) -> PlayerEvent {
        event(PlaybackStatus::Playing, title, duration, false)
    }

    fn submissions(actions: &[Action]) -> Vec<&TrackInfo> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::Submit { track, .. } => Some(track),
                Action::NowPlaying { .. } => None,
            })
            .collect()
    }

    #[test]
    fn opening_track_announces_now_playing() {
        let mut monitor = Monitor::new();
        let actions = monitor.handle(&playing("Whitetail", 200), 1_000);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], Action::NowPlaying { .. }));
        assert!(monitor.is_open());
    }

    #[test]
    fn repeated_pause_events_are_ignored() {
        let mut monitor = Monitor::new();
        monitor.handle(&playing("Whitetail", 200), 1_000);

        let paused = event(PlaybackStatus::Paused, "Whitetail", 200, false);
        monitor.handle(&paused, 1_050);
        assert!(monitor.handle(&paused, 1_060).is_empty());
        assert!(monitor.handle(&paused, 1_070).is_empty());
    }

    #[test]
    fn replayed_track_is_not_submitted_twice() {
        let mut monitor = Monitor::new();
        monitor.handle(&playing("Whitetail", 200), 1_000);

        // The replay submits the first listen and opens a second one.
        let actions = monitor.handle(&playing("Whitetail", 200), 1_150);
        assert_eq!(submissions(&actions).len(), 1);

        // The second listen is too short; the first is not resubmitted.
        let actions = monitor.handle(&event(PlaybackStatus::Stopped, "Whitetail", 200, false), 1_170);
        assert!(submissions(&actions).is_empty());
    }

    #[test]
    fn half_of_track_submits() {
        let mut monitor = Monitor::new();
        monitor.handle(&playing("Whitetail", 200), 1_000);
        let actions = monitor.handle(&event(PlaybackStatus::Stopped, "Whitetail", 200, false), 1_101);
        let submitted = submissions(&actions);
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].timestamp, 1_000);
        assert!(!monitor.is_open());
    }

    #[test]
    fn below_half_is_discarded() {
        let mut monitor = Monitor::new();
        monitor.handle(&playing("Whitetail", 200), 1_000);
        let actions = monitor.handle(&event(PlaybackStatus::Stopped, "Whitetail", 200, false), 1_099);
        assert!(submissions(&actions).is_empty());
        assert!(!monitor.is_open());
    }

    #[test]
    fn long_track_submits_after_240_seconds() {
        let mut monitor = Monitor::new();
        monitor.handle(&playing("Whitetail", 600), 1_000);
        let actions = monitor.handle(&event(PlaybackStatus::Stopped, "Whitetail", 600, false), 1_241);
        assert_eq!(submissions(&actions).len(), 1);
    }

    #[test]
    fn radio_stream_uses_nominal_duration() {
        let mut monitor = Monitor::new();
        monitor.handle(&event(PlaybackStatus::Playing, "Stream", 0, true), 2_000);
        let actions = monitor.handle(&event(PlaybackStatus::Stopped, "Stream", 0, true), 2_091);
        assert_eq!(submissions(&actions).len(), 1);

        monitor.handle(&event(PlaybackStatus::Playing, "Stream", 0, true), 3_000);
        let actions = monitor.handle(&event(PlaybackStatus::Stopped, "Stream", 0, true), 3_089);
        assert!(submissions(&actions).is_empty());
    }

    #[test]
    fn short_pause_accumulates_without_reannouncing() {
        let mut monitor = Monitor::new();
        monitor.handle(&playing("Whitetail", 200), 1_000);
        monitor.handle(&event(PlaybackStatus::Paused, "Whitetail", 200, false), 1_060);
        let resume = monitor.handle(&playing("Whitetail", 200), 1_120);
        assert!(resume.is_empty());

        // 60s before the pause plus 45s after: 105s of 200s qualifies.
        let actions = monitor.handle(&event(PlaybackStatus::Stopped, "Whitetail", 200, false), 1_165);
        let submitted = submissions(&actions);
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].timestamp, 1_000);
    }

    #[test]
    fn pause_time_does_not_count_as_playing() {
        let mut monitor = Monitor::new();
        monitor.handle(&playing("Whitetail", 200), 1_000);
        monitor.handle(&event(PlaybackStatus::Paused, "Whitetail", 200, false), 1_050);
        monitor.handle(&playing("Whitetail", 200), 1_160);

        // Only 50s + 40s were spent playing; the 110s pause is idle.
        let actions = monitor.handle(&event(PlaybackStatus::Stopped, "Whitetail", 200, false), 1_200);
        assert!(submissions(&actions).is_empty());
    }

    #[test]
    fn long_pause_reannounces_but_keeps_timer() {
        let mut monitor = Monitor::new();
        monitor.handle(&playing("Whitetail", 200), 1_000);
        monitor.handle(&event(PlaybackStatus::Paused, "Whitetail", 200, false), 1_060);

        let resume = monitor.handle(&playing("Whitetail", 200), 1_200);
        assert_eq!(resume.len(), 1);
        assert!(matches!(resume[0], Action::NowPlaying { .. }));

        // 60s + 41s of playtime with the original start timestamp.
        let actions = monitor.handle(&event(PlaybackStatus::Stopped, "Whitetail", 200, false), 1_241);
        let submitted = submissions(&actions);
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].timestamp, 1_000);
    }

    #[test]
    fn replay_finalizes_and_reopens() {
        let mut monitor = Monitor::new();
        monitor.handle(&playing("Whitetail", 200), 1_000);

        // Playing again, same fingerprint, no pause recorded: replay.
        let actions = monitor.handle(&playing("Whitetail", 200), 1_150);
        let submitted = submissions(&actions);
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].timestamp, 1_000);
        assert!(actions.iter().any(|a| matches!(a, Action::NowPlaying { .. })));
        assert!(monitor.is_open());
    }

    #[test]
    fn track_change_finalizes_previous() {
        let mut monitor = Monitor::new();
        monitor.handle(&playing("Whitetail", 200), 1_000);
        let actions = monitor.handle(&playing("Dinosaur Act", 240), 1_120);

        let submitted = submissions(&actions);
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].title, "Whitetail");
        assert_eq!(submitted[0].timestamp, 1_000);
        assert!(actions.iter().any(|a| matches!(a, Action::NowPlaying { .. })));
    }

    #[test]
    fn track_change_below_threshold_discards_previous() {
        let mut monitor = Monitor::new();
        monitor.handle(&playing("Whitetail", 200), 1_000);
        let actions = monitor.handle(&playing("Dinosaur Act", 240), 1_030);
        assert!(submissions(&actions).is_empty());
    }

    #[test]
    fn opening_while_paused_does_not_announce() {
        let mut monitor = Monitor::new();
        let actions = monitor.handle(&event(PlaybackStatus::Paused, "Whitetail", 200, false), 1_000);
        assert!(actions.is_empty());
        assert!(monitor.is_open());
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let mut monitor = Monitor::new();
        let actions = monitor.handle(&event(PlaybackStatus::Stopped, "Whitetail", 200, false), 1_000);
        assert!(actions.is_empty());
        assert!(!monitor.is_open());
    }
}
