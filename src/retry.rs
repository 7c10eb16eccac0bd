//! Offline detection, reconnection probing and deferred submission.
//!
//! Wraps a [`ScrobbleService`] with the failure policy: a transport
//! failure, or any protocol rejection that is not a caller error, marks
//! the relay offline. While offline, submissions are redirected to the
//! durable queue and now-playing announcements are skipped outright (a
//! stale announcement has no value once delivered late). At most once
//! per probe interval the session is re-validated; the first success
//! flushes everything queued in the meantime.

use crate::cache::Cache;
use crate::protocol::ERROR_INVALID_PARAMETERS;
use crate::scrobbler::{ScrobbleService, ScrobblerError};
use crate::track::TrackInfo;

/// Seconds between reconnection probes while offline.
pub const PROBE_INTERVAL: u64 = 60;

/// Submission relay with offline fallback.
pub struct Relay<S> {
    service: S,
    cache: Cache,
    /// Unix time the current offline spell began; zero while online.
    offline_since: u64,
    /// Unix time of the last reconnection probe.
    last_probe: u64,
}

/// Whether a failed call should be retried later.
///
/// Missing fields and parameter rejections are caller errors: retrying
/// the exact same request can only fail the exact same way.
fn is_retryable(error: &ScrobblerError) -> bool {
    !matches!(
        error,
        ScrobblerError::MissingField(_) | ScrobblerError::Protocol(ERROR_INVALID_PARAMETERS)
    )
}

impl<S: ScrobbleService> Relay<S> {
    /// Wraps a service, starting in the offline state.
    ///
    /// Starting offline makes the first event validate the session and
    /// flush whatever a previous run left in the queue.
    pub fn new(service: S, cache: Cache) -> Self {
        Self {
            service,
            cache,
            offline_since: 1,
            last_probe: 0,
        }
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline_since != 0
    }

    /// Probes the service when offline and the probe interval elapsed.
    ///
    /// On success the relay goes back online and the queue is flushed;
    /// entries that fail retryably are re-queued, not dropped.
    pub async fn reconnect_if_due(&mut self, now: u64) {
        if self.offline_since == 0 || now.saturating_sub(self.last_probe) < PROBE_INTERVAL {
            return;
        }
        self.last_probe = now;

        match self.service.validate_session().await {
            Ok(()) => {
                info!("scrobbler service reachable again");
                self.offline_since = 0;
                self.flush().await;
            }
            Err(e) => debug!("still offline: {e}"),
        }
    }

    /// Submits a listen, deferring to the queue while offline.
    pub async fn submit(&mut self, track: TrackInfo, now: u64) {
        self.reconnect_if_due(now).await;

        if self.is_offline() {
            self.enqueue(track);
            return;
        }

        match self.service.submit(&track).await {
            Ok(()) => info!("scrobbled {} - {}", track.artist, track.title),
            Err(e) if is_retryable(&e) => {
                warn!("scrobble failed, queueing for later: {e}");
                self.go_offline(now);
                self.enqueue(track);
            }
            Err(e) => warn!("dropping unsubmittable track: {e}"),
        }
    }

    /// Announces the current track; best-effort, skipped while offline.
    pub async fn now_playing(&mut self, track: &TrackInfo, now: u64) {
        self.reconnect_if_due(now).await;

        if self.is_offline() {
            debug!("offline, skipping now-playing announcement");
            return;
        }

        match self.service.now_playing(track).await {
            Ok(()) => {}
            Err(e) if is_retryable(&e) => {
                warn!("now-playing failed: {e}");
                self.go_offline(now);
            }
            Err(e) => warn!("now-playing rejected: {e}"),
        }
    }

    fn go_offline(&mut self, now: u64) {
        if self.offline_since == 0 {
            self.offline_since = now;
        }
        self.last_probe = now;
    }

    fn enqueue(&self, track: TrackInfo) {
        if let Err(e) = self.cache.enqueue(&track) {
            error!("could not queue submission, listen is lost: {e}");
        }
    }

    async fn flush(&mut self) {
        let pending = match self.cache.load() {
            Ok(pending) => pending,
            Err(e) => {
                error!("could not read submission queue: {e}");
                return;
            }
        };

        if pending.is_empty() {
            return;
        }

        info!("flushing {} queued submission(s)", pending.len());
        let mut kept = Vec::new();
        for track in pending {
            match self.service.submit(&track).await {
                Ok(()) => info!("scrobbled {} - {}", track.artist, track.title),
                Err(e) if is_retryable(&e) => {
                    warn!("queued scrobble failed again, keeping it: {e}");
                    kept.push(track);
                }
                Err(e) => warn!("dropping unsubmittable queued track: {e}"),
            }
        }

        // The file outlives the attempts; a crash mid-flush re-submits
        // at worst, it never loses a listen.
        if let Err(e) = self.cache.replace(&kept) {
            error!("could not rewrite submission queue: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::scrobbler::ScrobblerResult;

    #[derive(Debug, PartialEq, Eq)]
    enum Call {
        Submit(String),
        NowPlaying(String),
        Validate,
    }

    /// Scripted service: pops one result per call, defaulting to `Ok`.
    #[derive(Default)]
    struct MockService {
        calls: Vec<Call>,
        submit_results: VecDeque<ScrobblerResult<()>>,
        validate_results: VecDeque<ScrobblerResult<()>>,
    }

    #[async_trait]
    impl ScrobbleService for MockService {
        async fn submit(&mut self, track: &TrackInfo) -> ScrobblerResult<()> {
            self.calls.push(Call::Submit(track.title.clone()));
            self.submit_results.pop_front().unwrap_or(Ok(()))
        }

        async fn now_playing(&mut self, track: &TrackInfo) -> ScrobblerResult<()> {
            self.calls.push(Call::NowPlaying(track.title.clone()));
            Ok(())
        }

        async fn validate_session(&mut self) -> ScrobblerResult<()> {
            self.calls.push(Call::Validate);
            self.validate_results.pop_front().unwrap_or(Ok(()))
        }
    }

    fn track(title: &str) -> TrackInfo {
        TrackInfo {
            artist: "Stereolab".to_owned(),
            title: title.to_owned(),
            timestamp: 1_700_000_000,
            ..TrackInfo::default()
        }
    }

    fn relay(dir: &TempDir, service: MockService) -> Relay<MockService> {
        Relay::new(service, Cache::new(dir.path().join("cache")))
    }

    #[tokio::test]
    async fn starts_offline_and_probes_on_first_call() {
        let dir = tempfile::tempdir().unwrap();
        let mut relay = relay(&dir, MockService::default());
        assert!(relay.is_offline());

        relay.submit(track("Metronomic Underground"), 1_000).await;
        assert!(!relay.is_offline());
        assert_eq!(
            relay.service.calls,
            vec![Call::Validate, Call::Submit("Metronomic Underground".to_owned())]
        );
    }

    #[tokio::test]
    async fn offline_submission_is_queued_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockService::default();
        service.validate_results.push_back(Err(ScrobblerError::Protocol(9)));
        let mut relay = relay(&dir, service);

        relay.submit(track("French Disko"), 1_000).await;
        assert!(relay.is_offline());
        assert_eq!(relay.service.calls, vec![Call::Validate]);
        assert_eq!(relay.cache.load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn queued_entries_flush_once_on_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockService::default();
        service.validate_results.push_back(Err(ScrobblerError::Protocol(9)));
        let mut relay = relay(&dir, service);

        relay.submit(track("French Disko"), 1_000).await;
        relay.submit(track("Ping Pong"), 1_030).await;

        // Next probe succeeds: both entries flush, then the live submit.
        relay.submit(track("Cybele's Reverie"), 1_000 + PROBE_INTERVAL).await;
        assert!(!relay.is_offline());

        let submits: Vec<_> = relay
            .service
            .calls
            .iter()
            .filter(|call| matches!(call, Call::Submit(_)))
            .collect();
        assert_eq!(submits.len(), 3);
        assert!(relay.cache.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn probe_respects_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockService::default();
        service.validate_results.push_back(Err(ScrobblerError::Protocol(9)));
        let mut relay = relay(&dir, service);

        relay.submit(track("Brakhage"), 1_000).await;
        relay.submit(track("Percolator"), 1_000 + PROBE_INTERVAL - 1).await;

        // Only the first call probed; the second was inside the interval.
        assert_eq!(relay.service.calls, vec![Call::Validate]);
    }

    #[tokio::test]
    async fn failed_submission_goes_offline_and_requeues() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockService::default();
        service
            .submit_results
            .push_back(Err(ScrobblerError::Protocol(11)));
        let mut relay = relay(&dir, service);

        relay.submit(track("Blue Milk"), 1_000).await;
        assert!(relay.is_offline());
        assert_eq!(relay.cache.load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn entries_failing_on_flush_are_requeued() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockService::default();
        service.validate_results.push_back(Err(ScrobblerError::Protocol(9)));
        let mut relay = relay(&dir, service);

        relay.submit(track("French Disko"), 1_000).await;

        // Recovery probe succeeds but the flushed submit fails again.
        relay
            .service
            .submit_results
            .push_back(Err(ScrobblerError::Protocol(16)));
        relay.now_playing(&track("Ping Pong"), 1_000 + PROBE_INTERVAL).await;

        assert_eq!(relay.cache.load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn flush_failure_leaves_the_queue_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockService::default();
        service.validate_results.push_back(Err(ScrobblerError::Protocol(9)));
        let mut relay = relay(&dir, service);

        relay.submit(track("French Disko"), 1_000).await;

        // Recovery probe succeeds but the flushed submit fails again;
        // the listen must still be on disk afterwards.
        relay
            .service
            .submit_results
            .push_back(Err(ScrobblerError::Protocol(16)));
        relay.now_playing(&track("Ping Pong"), 1_000 + PROBE_INTERVAL).await;

        assert!(dir.path().join("cache").exists());
        assert_eq!(relay.cache.load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn caller_errors_are_dropped_not_queued() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockService::default();
        service
            .submit_results
            .push_back(Err(ScrobblerError::MissingField("artist")));
        let mut relay = relay(&dir, service);

        relay.submit(track("Anonymous"), 1_000).await;
        assert!(!relay.is_offline());
        assert!(relay.cache.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn now_playing_is_skipped_while_offline() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockService::default();
        service.validate_results.push_back(Err(ScrobblerError::Protocol(9)));
        let mut relay = relay(&dir, service);

        relay.now_playing(&track("Ping Pong"), 1_000).await;
        assert_eq!(relay.service.calls, vec![Call::Validate]);
        assert!(relay.cache.load().unwrap().is_empty());
    }
}
