//! The relay daemon: one serialized event loop.
//!
//! Listens on a Unix domain socket for playback events from the player
//! front-end, one short-lived connection per event, and drives the
//! playback monitor, the offline relay and the desktop notification
//! from a single `select` loop. Remote calls block the loop; that is
//! fine because events are infrequent and every call is bounded by the
//! HTTP client timeout. A shutdown signal between events closes the
//! listener and removes the socket file; an open track is dropped, not
//! submitted.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};

use crate::cache::Cache;
use crate::config::{Config, ConfigError};
use crate::events::PlayerEvent;
use crate::notify;
use crate::player::{Action, Monitor};
use crate::retry::Relay;
use crate::scrobbler::{Scrobbler, ScrobblerError, API_KEY, API_SECRET};
use crate::util;

/// Do not parse exceedingly large events to prevent out of memory
/// conditions.
const MAX_EVENT_BYTES: u64 = 8192;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("another instance is already listening on {}", .0.display())]
    AlreadyRunning(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("event malformed: {0}")]
    Event(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("scrobbler error: {0}")]
    Scrobbler(#[from] ScrobblerError),
}

pub type DaemonResult<T> = Result<T, DaemonError>;

/// Daemon state: configuration, playback monitor and offline relay.
pub struct Daemon {
    config: Config,
    monitor: Monitor,
    relay: Relay<Scrobbler>,
}

impl Daemon {
    /// Builds the daemon from the loaded configuration.
    pub fn new(config: Config) -> DaemonResult<Self> {
        let mut scrobbler = Scrobbler::new(API_KEY, API_SECRET)?;
        scrobbler.set_session_key_hex(&config.session_key);

        let cache = Cache::new(Config::cache_file()?);

        Ok(Self {
            config,
            monitor: Monitor::new(),
            relay: Relay::new(scrobbler, cache),
        })
    }

    /// Runs the event loop until a shutdown signal.
    pub async fn run(mut self) -> DaemonResult<()> {
        let socket = Config::socket_file()?;
        let listener = bind(&socket).await?;
        info!("listening on {}", socket.display());

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;

        loop {
            tokio::select! {
                // Prioritize shutdown signals.
                biased;

                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down gracefully");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("terminated");
                    break;
                }
                _ = sighup.recv() => {
                    info!("hangup, shutting down");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => match read_event(stream).await {
                        Ok(event) => self.handle_event(event).await,
                        Err(e) => warn!("ignoring bad event: {e}"),
                    },
                    Err(e) => error!("accept failed: {e}"),
                }
            }
        }

        drop(listener);
        let _ = std::fs::remove_file(&socket);
        Ok(())
    }

    async fn handle_event(&mut self, event: PlayerEvent) {
        trace!("event: {event:?}");
        let now = util::now_from_epoch();

        // Probe for reconnection on every event, not only when a
        // submission is due, so the queue drains even while the player
        // keeps playing one long stream.
        self.relay.reconnect_if_due(now).await;

        for action in self.monitor.handle(&event, now) {
            match action {
                Action::NowPlaying { track, radio } => {
                    if self.config.notification {
                        let track = track.clone();
                        tokio::task::spawn_blocking(move || notify::now_playing(&track));
                    }

                    if self.config.is_now_playing_enabled(radio) {
                        self.relay.now_playing(&track, now).await;
                    } else {
                        debug!("now playing not enabled");
                    }
                }
                Action::Submit { track, radio } => {
                    if self.config.is_submission_enabled(radio) {
                        self.relay.submit(track, now).await;
                    } else {
                        debug!("submission not enabled");
                    }
                }
            }
        }
    }
}

/// Binds the daemon socket, refusing to shadow a live instance.
///
/// A connectable socket means another daemon answers; a stale file from
/// a crashed run is removed and rebound.
async fn bind(socket: &Path) -> DaemonResult<UnixListener> {
    if UnixStream::connect(socket).await.is_ok() {
        return Err(DaemonError::AlreadyRunning(socket.to_path_buf()));
    }

    if let Some(parent) = socket.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(socket);

    Ok(UnixListener::bind(socket)?)
}

/// Reads one JSON-encoded event from a client connection.
async fn read_event(stream: UnixStream) -> DaemonResult<PlayerEvent> {
    let mut buffer = Vec::new();
    stream.take(MAX_EVENT_BYTES).read_to_end(&mut buffer).await?;
    Ok(serde_json::from_slice(&buffer)?)
}

/// Delivers one event to the running daemon. Client side of the socket.
pub async fn send_event(event: &PlayerEvent) -> DaemonResult<()> {
    let socket = Config::socket_file()?;
    let mut stream = UnixStream::connect(&socket).await?;
    stream.write_all(&serde_json::to_vec(event)?).await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PlaybackStatus;

    fn event() -> PlayerEvent {
        PlayerEvent {
            status: PlaybackStatus::Playing,
            radio: false,
            artist: "Can".to_owned(),
            album: "Ege Bamyasi".to_owned(),
            album_artist: String::new(),
            title: "Vitamin C".to_owned(),
            track_number: 3,
            duration: 213,
            mbid: String::new(),
            location: "/music/can/vitamin-c.flac".to_owned(),
        }
    }

    #[tokio::test]
    async fn event_travels_over_a_socket_pair() {
        let (client, server) = UnixStream::pair().unwrap();

        let mut client = client;
        client
            .write_all(&serde_json::to_vec(&event()).unwrap())
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        let received = read_event(server).await.unwrap();
        assert_eq!(received, event());
    }

    #[tokio::test]
    async fn oversized_event_is_rejected() {
        let (client, server) = UnixStream::pair().unwrap();

        let mut oversized = event();
        oversized.location = "x".repeat(2 * MAX_EVENT_BYTES as usize);

        let mut client = client;
        client
            .write_all(&serde_json::to_vec(&oversized).unwrap())
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        assert!(read_event(server).await.is_err());
    }

    #[tokio::test]
    async fn binding_twice_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("fmrelay.sock");

        let listener = bind(&socket).await.unwrap();
        assert!(matches!(
            bind(&socket).await,
            Err(DaemonError::AlreadyRunning(_))
        ));
        drop(listener);
    }

    #[tokio::test]
    async fn stale_socket_is_rebound() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("fmrelay.sock");

        let listener = bind(&socket).await.unwrap();
        drop(listener);

        // Nothing listens anymore; the leftover file must not block us.
        assert!(bind(&socket).await.is_ok());
    }
}
