//! Outbound lifecycle events.
//!
//! The [`FotaScheduler`](crate::scheduler::FotaScheduler) emits these
//! through the [`EventSink`](super::ports::EventSink) port, exactly once per
//! transition.  Adapters decide where they go (serial log, telemetry, etc.).

use core::net::{Ipv4Addr, SocketAddrV4};

use crate::app::ports::Bank;
use crate::error::{ResolutionError, SessionError, UpgradeError};
use crate::version::Version;

/// Structured events emitted by the update lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FotaEvent {
    /// The lifecycle has started (carries the running version).
    Started { local: Version },

    /// The server host name resolved.
    Resolved(Ipv4Addr),

    /// A version check is connecting to the server.
    CheckStarted { server: SocketAddrV4 },

    /// The server offers nothing newer.
    UpToDate { local: Version, remote: Version },

    /// A newer build exists and the download session is starting.
    UpgradeStarted { local: Version, remote: Version },

    /// The new image was written and verified; a reboot follows.
    UpgradeSucceeded { bank: Bank, version: Version },

    /// The upgrade failed; the running image is untouched.
    UpgradeFailed(UpgradeError),

    /// The version check ended without a usable answer.
    CheckFailed(SessionError),

    /// The host name did not resolve this cycle.
    ResolutionFailed(ResolutionError),
}
