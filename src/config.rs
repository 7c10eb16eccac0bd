//! Daemon configuration, persisted as TOML in the user config directory.

use std::{fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] io::Error),
    #[error("config format invalid: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config could not be serialized: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no usable config directory")]
    NoConfigDir,
}

fn enabled() -> bool {
    true
}

fn localfile_format() -> String {
    String::from(r"^(?<artist>.+) - (?<title>.+)$")
}

fn shoutcast_format() -> String {
    String::from(r"^(?<artist>.+) - (?<title>.+)$")
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Session key as obtained by `fmrelay init`, 32 hex characters.
    #[serde(default)]
    pub session_key: String,

    /// User the session key belongs to, informational only.
    #[serde(default)]
    pub user_name: String,

    /// Pattern recovering artist/album/title from a file stem.
    #[serde(default = "localfile_format")]
    pub format_localfile: String,

    /// Pattern recovering artist/album/title from a stream title.
    #[serde(default = "shoutcast_format")]
    pub format_shoutcast: String,

    #[serde(default = "enabled")]
    pub nowplaying_localfile: bool,

    #[serde(default = "enabled")]
    pub nowplaying_shoutcast: bool,

    #[serde(default = "enabled")]
    pub submit_localfile: bool,

    #[serde(default = "enabled")]
    pub submit_shoutcast: bool,

    /// Show a desktop notification when a track starts playing.
    #[serde(default)]
    pub notification: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_key: String::new(),
            user_name: String::new(),
            format_localfile: localfile_format(),
            format_shoutcast: shoutcast_format(),
            nowplaying_localfile: true,
            nowplaying_shoutcast: true,
            submit_localfile: true,
            submit_shoutcast: true,
            notification: false,
        }
    }
}

impl Config {
    /// Loads the configuration, falling back to defaults when the file
    /// does not exist yet.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_file()?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the configuration back to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_file()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn config_file() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("fmrelay").join("fmrelay.toml"))
    }

    /// Socket the daemon listens on for player events.
    pub fn socket_file() -> Result<PathBuf, ConfigError> {
        let dir = dirs::runtime_dir()
            .or_else(dirs::cache_dir)
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("fmrelay.sock"))
    }

    /// Offline submission queue.
    pub fn cache_file() -> Result<PathBuf, ConfigError> {
        let dir = dirs::cache_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("fmrelay").join("queue"))
    }

    #[must_use]
    pub fn is_submission_enabled(&self, radio: bool) -> bool {
        if radio {
            self.submit_shoutcast
        } else {
            self.submit_localfile
        }
    }

    #[must_use]
    pub fn is_now_playing_enabled(&self, radio: bool) -> bool {
        if radio {
            self.nowplaying_shoutcast
        } else {
            self.nowplaying_localfile
        }
    }
}
