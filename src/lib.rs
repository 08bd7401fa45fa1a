//! FOTA client library.
//!
//! Periodically asks an update server which firmware version it holds,
//! compares it with the running image and, when the server is ahead,
//! hands the download to the flash engine, which writes the inactive bank
//! and reboots into it.
//!
//! Every module is host-testable.  ESP-IDF specifics are guarded by
//! `#[cfg(target_os = "espidf")]` inside the adapters.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod proto;
pub mod scheduler;
pub mod session;
pub mod version;

mod error;

pub use error::{
    ConfigError, Error, ParseError, ResolutionError, Result, SessionError, UpgradeError,
};
