//! Metadata recovery for players that only report a location.
//!
//! When the player hands over a bare stream title or file name instead
//! of tagged metadata, a user-configurable pattern with `artist`,
//! `album` and `title` named captures picks the fields apart.

use regex_lite::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("format pattern invalid: {0}")]
    Pattern(#[from] regex_lite::Error),
    #[error("input does not match the format pattern")]
    NoMatch,
}

/// Fields recovered from a formatted name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedMeta {
    pub artist: String,
    pub album: String,
    pub title: String,
}

/// Applies a named-capture pattern to a stream title or file stem.
pub fn extract(pattern: &str, input: &str) -> Result<ExtractedMeta, FormatError> {
    let regex = Regex::new(pattern)?;
    let captures = regex.captures(input).ok_or(FormatError::NoMatch)?;

    let field = |name: &str| {
        captures
            .name(name)
            .map(|m| m.as_str().trim().to_owned())
            .unwrap_or_default()
    };

    Ok(ExtractedMeta {
        artist: field("artist"),
        album: field("album"),
        title: field("title"),
    })
}
