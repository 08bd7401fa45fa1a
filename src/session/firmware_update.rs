//! Firmware-update session: open a connection for the image, then hand the
//! transfer to the flash engine and wait for its verdict.
//!
//! Once delegated, the engine's completion is the only thing that ends the
//! session.  Disconnects on the handed-over connection are the engine's
//! business and are ignored here.

use core::net::SocketAddrV4;

use log::{debug, info, warn};

use super::{ConnSlot, DOWNLOAD_TIMEOUT, Effect, Effects, UpdateOutcome};
use crate::app::events::FotaEvent;
use crate::app::ports::{Bank, ConnId, DownloadRequest, NetError};
use crate::error::UpgradeError;
use crate::proto::request;
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Connecting,
    Preparing,
    Delegated,
    /// Image written and boot bank switched.
    Completed,
    Failed(UpgradeError),
}

impl UpdateState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

/// Events routed to a firmware-update session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEvent {
    /// The connection is up; `inactive` is the bank the engine may write.
    Connected { inactive: Bank },
    Disconnected,
    /// `FlashPort::download_and_install` refused the job.
    EngineRejected,
    /// The engine finished.
    EngineDone { success: bool },
}

pub struct FirmwareUpdateSession {
    state: UpdateState,
    conn: ConnSlot,
    server: SocketAddrV4,
    target: Version,
    bank: Option<Bank>,
}

impl FirmwareUpdateSession {
    pub fn new(server: SocketAddrV4, target: Version) -> Self {
        Self {
            state: UpdateState::Idle,
            conn: ConnSlot::empty(),
            server,
            target,
            bank: None,
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn owns(&self, conn: ConnId) -> bool {
        self.conn.owns(conn)
    }

    /// Cycle outcome, once terminal.
    pub fn outcome(&self) -> Option<UpdateOutcome> {
        match self.state {
            UpdateState::Completed => Some(UpdateOutcome::UpgradeSucceeded(self.target)),
            UpdateState::Failed(reason) => Some(UpdateOutcome::UpgradeFailed(reason)),
            UpdateState::Idle
            | UpdateState::Connecting
            | UpdateState::Preparing
            | UpdateState::Delegated => None,
        }
    }

    /// Bank chosen for the image, once connected.
    pub fn bank(&self) -> Option<Bank> {
        self.bank
    }

    pub fn open(&mut self, connect: Result<ConnId, NetError>) -> Effects {
        let mut fx = Effects::new();
        if self.state != UpdateState::Idle {
            debug!("UPDATE | open ignored in {:?}", self.state);
            return fx;
        }
        match connect {
            Ok(conn) => {
                self.conn.hold(conn);
                self.state = UpdateState::Connecting;
                info!("UPDATE | fetching {} from {}", self.target, self.server);
            }
            Err(e) => {
                warn!("UPDATE | connect to {} failed: {}", self.server, e);
                self.fail(UpgradeError::ConnectFailed, &mut fx);
            }
        }
        fx
    }

    pub fn handle(&mut self, event: UpdateEvent) -> Effects {
        let mut fx = Effects::new();
        if self.is_terminal() {
            debug!("UPDATE | {:?} after terminal state, ignored", event);
            return fx;
        }

        match (self.state, event) {
            (UpdateState::Connecting, UpdateEvent::Connected { inactive }) => {
                self.state = UpdateState::Preparing;
                self.delegate(inactive, &mut fx);
            }
            (UpdateState::Connecting | UpdateState::Preparing, UpdateEvent::Disconnected) => {
                warn!("UPDATE | connection lost before transfer");
                self.fail(UpgradeError::Disconnected, &mut fx);
            }
            (UpdateState::Delegated, UpdateEvent::Disconnected) => {
                debug!("UPDATE | disconnect during transfer, engine decides");
            }
            (UpdateState::Delegated, UpdateEvent::EngineRejected) => {
                self.fail(UpgradeError::EngineRejected, &mut fx);
            }
            (UpdateState::Delegated, UpdateEvent::EngineDone { success: true }) => {
                self.conn.release(&mut fx);
                self.state = UpdateState::Completed;
                let bank = self.bank.unwrap_or(Bank::User1);
                info!("UPDATE | {} written to {:?}, rebooting", self.target, bank);
                fx.push(Effect::Report(FotaEvent::UpgradeSucceeded {
                    bank,
                    version: self.target,
                }));
                fx.push(Effect::Reboot);
            }
            (UpdateState::Delegated, UpdateEvent::EngineDone { success: false }) => {
                self.fail(UpgradeError::EngineFailed, &mut fx);
            }
            (state, event) => {
                debug!("UPDATE | {:?} ignored in {:?}", event, state);
            }
        }
        fx
    }

    fn delegate(&mut self, bank: Bank, fx: &mut Effects) {
        let (Some(conn), Ok(request)) = (self.conn.get(), request::firmware_download(bank, self.server))
        else {
            self.fail(UpgradeError::RequestTooLarge, fx);
            return;
        };
        self.bank = Some(bank);
        self.state = UpdateState::Delegated;
        fx.push(Effect::StartDownload(DownloadRequest {
            conn,
            server: self.server,
            bank,
            request,
            timeout: DOWNLOAD_TIMEOUT,
        }));
    }

    fn fail(&mut self, reason: UpgradeError, fx: &mut Effects) {
        warn!("UPDATE | failed: {}", reason);
        self.conn.release(fx);
        self.state = UpdateState::Failed(reason);
        fx.push(Effect::Report(FotaEvent::UpgradeFailed(reason)));
    }
}
