//! Sans-IO session state machines.
//!
//! ```text
//!  VersionCheck:
//!   Idle ──open──▶ Connecting ──Connected──▶ Requesting ──Sent──▶ AwaitingResponse
//!                      │                         │                     │
//!                      └──────[Disconnected / SendFailed / Timeout]────┤
//!                                                                      ▼
//!                                      Completed(UpToDate | UpgradeStarted) / Failed
//!
//!  FirmwareUpdate:
//!   Idle ──open──▶ Connecting ──Connected──▶ Preparing ──▶ Delegated ──EngineDone──▶ Completed / Failed
//! ```
//!
//! A session never touches a port.  Each call returns the [`Effects`] the
//! scheduler must apply, in order.  Every session owns its connection
//! through a [`ConnSlot`], so the connection is released exactly once no
//! matter which path reaches a terminal state.

pub mod firmware_update;
pub mod version_check;

use core::time::Duration;

use log::error;

use crate::app::events::FotaEvent;
use crate::app::ports::{ConnId, DownloadRequest, TimerId};
use crate::error::UpgradeError;
use crate::proto::Request;
use crate::version::Version;

pub use firmware_update::{FirmwareUpdateSession, UpdateEvent, UpdateState};
pub use version_check::{CheckEvent, CheckOutcome, CheckState, VersionCheckSession};

/// Window for the version-query response, armed once the request is sent.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Supervisory budget handed to the flash engine for one image.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on effects produced by one transition.
pub const MAX_EFFECTS: usize = 4;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Outcome of one update cycle, as recorded by the scheduler.
///
/// `UpToDate` and `UpgradeStarted` come from the check verdict
/// ([`CheckOutcome`]); `UpgradeSucceeded` and `UpgradeFailed` only from
/// [`FirmwareUpdateSession::outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Remote version is not newer than the running one.
    UpToDate,
    /// Remote version is newer; the firmware session is running.
    UpgradeStarted(Version),
    /// The new image is written and the boot bank switched.
    UpgradeSucceeded(Version),
    /// The firmware session ended without a new image.
    UpgradeFailed(UpgradeError),
}

impl From<CheckOutcome> for UpdateOutcome {
    fn from(outcome: CheckOutcome) -> Self {
        match outcome {
            CheckOutcome::UpToDate => Self::UpToDate,
            CheckOutcome::UpgradeStarted(remote) => Self::UpgradeStarted(remote),
        }
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// One side effect requested by a session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send { conn: ConnId, request: Request },
    Close(ConnId),
    ArmTimer(TimerId, Duration),
    DisarmTimer(TimerId),
    StartDownload(DownloadRequest),
    Reboot,
    Report(FotaEvent),
}

/// Bounded, ordered list of effects.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Effects(heapless::Vec<Effect, MAX_EFFECTS>);

impl Effects {
    pub fn new() -> Self {
        Self(heapless::Vec::new())
    }

    pub(crate) fn push(&mut self, effect: Effect) {
        if let Err(dropped) = self.0.push(effect) {
            // Every transition emits at most MAX_EFFECTS; reaching this is a bug.
            debug_assert!(false, "effect list full, dropped {dropped:?}");
            error!("SESSION | effect list full, dropped {:?}", dropped);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[Effect] {
        &self.0
    }
}

impl IntoIterator for Effects {
    type Item = Effect;
    type IntoIter = <heapless::Vec<Effect, MAX_EFFECTS> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Connection ownership
// ---------------------------------------------------------------------------

/// The connection a session owns, if any.
///
/// `release` takes the handle out, so a second release is a no-op.
#[derive(Debug, Default)]
pub struct ConnSlot(Option<ConnId>);

impl ConnSlot {
    pub const fn empty() -> Self {
        Self(None)
    }

    pub fn hold(&mut self, conn: ConnId) {
        debug_assert!(self.0.is_none(), "connection slot already occupied");
        self.0 = Some(conn);
    }

    pub fn get(&self) -> Option<ConnId> {
        self.0
    }

    pub fn owns(&self, conn: ConnId) -> bool {
        self.0 == Some(conn)
    }

    /// Queue a `Close` for the held connection and forget it.
    pub fn release(&mut self, fx: &mut Effects) {
        if let Some(conn) = self.0.take() {
            fx.push(Effect::Close(conn));
        }
    }
}
