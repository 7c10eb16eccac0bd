//! Headless scrobbling relay for console media players.
//!
//! The player invokes the `fmrelay` binary on every state change; the
//! invocation is parsed into a [`events::PlayerEvent`] and delivered
//! over a Unix socket to the daemon, which decides whether the listen
//! counts ([`player`]), talks to the scrobbler service ([`scrobbler`],
//! [`protocol`]) and defers submissions while offline ([`retry`],
//! [`cache`]).
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

#[macro_use]
extern crate log;

pub mod cache;
pub mod config;
pub mod daemon;
pub mod events;
pub mod format;
pub mod notify;
pub mod player;
pub mod protocol;
pub mod retry;
pub mod scrobbler;
pub mod track;
pub mod util;
