//! Durable queue for submissions deferred while offline.
//!
//! One JSON document per line, appended on enqueue. The queue is an
//! unordered multiset; the consumer reads every entry, attempts them
//! all, and only then rewrites the file with the survivors, so a crash
//! mid-flush re-submits at worst and never loses a listen. Only the
//! daemon task ever touches it, so no locking beyond the filesystem
//! itself is needed.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use thiserror::Error;

use crate::track::TrackInfo;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache entry malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// File-backed queue of pending submissions.
#[derive(Debug)]
pub struct Cache {
    path: PathBuf,
}

impl Cache {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Appends one track to the queue.
    pub fn enqueue(&self, track: &TrackInfo) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_vec(track)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;

        debug!("queued {} - {}", track.artist, track.title);
        Ok(())
    }

    /// Reads every queued entry, leaving the file in place.
    ///
    /// A missing file is an empty queue. Malformed lines are dropped
    /// with a warning rather than wedging the whole queue.
    pub fn load(&self) -> Result<Vec<TrackInfo>, CacheError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut tracks = Vec::new();
        for line in contents.lines().filter(|line| !line.is_empty()) {
            match serde_json::from_str(line) {
                Ok(track) => tracks.push(track),
                Err(e) => warn!("dropping malformed cache entry: {e}"),
            }
        }

        Ok(tracks)
    }

    /// Rewrites the queue to contain exactly the given entries.
    ///
    /// The new contents go through a scratch file renamed over the old
    /// one, so the queue is never torn: a crash leaves either the
    /// previous entries or the new ones. An empty set removes the file.
    pub fn replace(&self, tracks: &[TrackInfo]) -> Result<(), CacheError> {
        if tracks.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut contents = Vec::new();
        for track in tracks {
            serde_json::to_writer(&mut contents, track)?;
            contents.push(b'\n');
        }

        let scratch = self.path.with_extension("new");
        fs::write(&scratch, &contents)?;
        fs::rename(&scratch, &self.path)?;
        Ok(())
    }
}
