//! Port traits: the hexagonal boundary between the update lifecycle and
//! the platform.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ FotaScheduler (domain)
//! ```
//!
//! Every port is fire-and-return: calls never block, and completions come
//! back later as an [`Input`](super::inputs::Input) fed to
//! [`FotaScheduler::handle`](crate::scheduler::FotaScheduler::handle).
//! The scheduler consumes the ports via generics, so the domain core never
//! touches sockets, timers or flash directly.
//!
//! ## Safety notes
//!
//! - **FlashPort** implementations MUST NOT switch the boot bank before the
//!   image is completely written and verified.
//! - **FlashPort::reboot** is only invoked after a successful completion.

use core::fmt;
use core::net::SocketAddrV4;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::FotaConfig;
use crate::proto::Request;

// ───────────────────────────────────────────────────────────────
// Shared identifiers
// ───────────────────────────────────────────────────────────────

/// Opaque handle for one outbound connection, assigned by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub u16);

/// One of the two firmware storage banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bank {
    User1,
    User2,
}

impl Bank {
    /// Image file name served for this bank.
    pub const fn image_name(self) -> &'static str {
        match self {
            Self::User1 => "user1.bin",
            Self::User2 => "user2.bin",
        }
    }

    /// The other bank.
    pub const fn other(self) -> Self {
        match self {
            Self::User1 => Self::User2,
            Self::User2 => Self::User1,
        }
    }
}

/// One-shot timers owned by the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Drives the next check cycle.
    Interval,
    /// Bounds the wait for a version-query response.
    ResponseTimeout,
}

// ───────────────────────────────────────────────────────────────
// Network port (SessionHandle)
// ───────────────────────────────────────────────────────────────

/// Outbound TCP connections.
///
/// Completion of `connect` and `send`, received data and disconnects are
/// reported later as [`Input::Net`](super::inputs::Input::Net).
pub trait NetworkPort {
    /// Begin connecting.  `Err` means no connection was allocated.
    fn connect(&mut self, addr: SocketAddrV4) -> Result<ConnId, NetError>;

    /// Queue `data` for sending on `conn`.
    fn send(&mut self, conn: ConnId, data: &[u8]) -> Result<(), NetError>;

    /// Release `conn`.  Closing an unknown or already-closed handle is a no-op.
    fn close(&mut self, conn: ConnId);
}

// ───────────────────────────────────────────────────────────────
// Resolver port
// ───────────────────────────────────────────────────────────────

/// Asynchronous host name resolution.  The answer arrives as
/// [`Input::Resolved`](super::inputs::Input::Resolved).
pub trait ResolverPort {
    fn resolve(&mut self, host: &str) -> Result<(), NetError>;
}

// ───────────────────────────────────────────────────────────────
// Timer port
// ───────────────────────────────────────────────────────────────

/// One-shot timers.  Arming an armed timer restarts it; a fire arrives as
/// [`Input::Timer`](super::inputs::Input::Timer).
pub trait TimerPort {
    fn arm(&mut self, timer: TimerId, after: Duration);
    fn disarm(&mut self, timer: TimerId);
}

// ───────────────────────────────────────────────────────────────
// Flash port (FlashEngine)
// ───────────────────────────────────────────────────────────────

/// Everything the flash engine needs to fetch and write one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Connected socket the engine takes over for the transfer.
    pub conn: ConnId,
    /// Server the connection points at.
    pub server: SocketAddrV4,
    /// Bank being written.  Always the currently inactive one.
    pub bank: Bank,
    /// Framed GET request for the bank image.
    pub request: Request,
    /// Supervisory budget for download, write and verify together.
    pub timeout: Duration,
}

/// Dual-bank flash engine.
///
/// `download_and_install` returns immediately; the outcome is reported as
/// [`Input::FlashDone`](super::inputs::Input::FlashDone) at most
/// `timeout` later.
pub trait FlashPort {
    /// The bank that is *not* running and may be overwritten.
    fn inactive_bank(&self) -> Bank;

    /// Start fetching and writing the image described by `job`.
    fn download_and_install(&mut self, job: &DownloadRequest) -> Result<(), FlashError>;

    /// Restart into the bank written by the last successful install.
    fn reboot(&mut self);
}

/// Everything the scheduler drives.
pub trait FotaPorts: NetworkPort + ResolverPort + TimerPort + FlashPort {}

impl<T: NetworkPort + ResolverPort + TimerPort + FlashPort> FotaPorts for T {}

// ───────────────────────────────────────────────────────────────
// Event sink port (reporting)
// ───────────────────────────────────────────────────────────────

/// The lifecycle emits [`FotaEvent`](super::events::FotaEvent)s through
/// this port.  Fire-and-forget.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::FotaEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`FotaConfig`].
///
/// Implementations MUST run [`FotaConfig::validate`] before persisting.
pub trait ConfigPort {
    /// Load the stored config, or [`FotaConfig::default()`] if none exists.
    fn load(&self) -> Result<FotaConfig, StoreError>;

    /// Validate and persist.
    fn save(&self, config: &FotaConfig) -> Result<(), StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`NetworkPort`] and [`ResolverPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// No free connection slot.
    Exhausted,
    /// The peer or stack refused the operation.
    Refused,
    /// The handle does not name a live connection.
    UnknownConnection,
    /// Generic I/O error.
    Io,
}

/// Errors from [`FlashPort::download_and_install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// A download is already running.
    Busy,
    /// The connection in the request is not available to the engine.
    NoConnection,
    /// The inactive partition could not be opened.
    NoPartition,
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "no free connection slot"),
            Self::Refused => write!(f, "refused"),
            Self::UnknownConnection => write!(f, "unknown connection"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "download already running"),
            Self::NoConnection => write!(f, "connection not available"),
            Self::NoPartition => write!(f, "no inactive partition"),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
