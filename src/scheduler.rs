//! Update scheduler: owns the FOTA lifecycle.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Input sources                            │
//! │                                                              │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐   │
//! │  │ Interval  │  │ Network   │  │ Resolver  │  │ Flash    │   │
//! │  │ timer     │  │ callbacks │  │ answer    │  │ engine   │   │
//! │  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘  └─────┬────┘   │
//! │        └──────────────┴──────┬───────┴──────────────┘        │
//! │                              ▼                               │
//! │                  FotaScheduler::handle(Input)                │
//! │                              │                               │
//! │             VersionCheck ──▶ FirmwareUpdate                  │
//! │                              │                               │
//! │                     Effects ─┴─▶ ports                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! At most one check cycle is in flight.  The interval timer is one-shot
//! and is re-armed exactly once when a cycle reaches a terminal outcome
//! (up to date, check failed, resolution failed, upgrade done or failed),
//! so it is the only retry driver.

use core::net::{Ipv4Addr, SocketAddrV4};

use log::{debug, info, warn};

use crate::app::events::FotaEvent;
use crate::app::inputs::{Input, NetEvent};
use crate::app::ports::{ConnId, EventSink, FotaPorts, TimerId};
use crate::config::FotaConfig;
use crate::error::{ConfigError, ResolutionError};
use crate::session::{
    CheckEvent, CheckOutcome, CheckState, Effect, Effects, FirmwareUpdateSession, UpdateEvent,
    UpdateOutcome,
    UpdateState, VersionCheckSession,
};
use crate::version::{self, Version};

/// A port call whose failure must be fed back into the session.
enum Feedback {
    SendFailed,
    EngineRejected,
}

/// The FOTA lifecycle.
///
/// Created idle; [`start`](Self::start) validates the config and runs the
/// first cycle immediately.  Everything after that is driven by
/// [`handle`](Self::handle).
#[derive(Default)]
pub struct FotaScheduler {
    /// `Some` once started.  Doubles as the run guard.
    config: Option<FotaConfig>,
    local: Version,
    resolved: Option<Ipv4Addr>,
    resolving: bool,
    check: Option<VersionCheckSession>,
    update: Option<FirmwareUpdateSession>,
    reboot_pending: bool,
    cycles: u32,
    /// Outcome of the latest cycle that produced one.
    outcome: Option<UpdateOutcome>,
}

impl FotaScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `config`, take ownership of it and begin the first cycle.
    ///
    /// Fails with [`ConfigError::AlreadyRunning`] on a second call; nothing
    /// is started twice.  A rejected config leaves the scheduler idle.
    pub fn start(
        &mut self,
        config: FotaConfig,
        hw: &mut impl FotaPorts,
        sink: &mut impl EventSink,
    ) -> Result<(), ConfigError> {
        if self.config.is_some() {
            warn!("FOTA | already running");
            return Err(ConfigError::AlreadyRunning);
        }
        let local =
            version::parse(&config.current_version).map_err(|_| ConfigError::InvalidLocalVersion)?;
        config.validate()?;

        info!(
            "FOTA | starting: v{} server {}:{} every {}s",
            local, config.host, config.port, config.interval_secs
        );
        self.local = local;
        self.config = Some(config);
        sink.emit(&FotaEvent::Started { local });
        self.tick(hw, sink);
        Ok(())
    }

    /// Begin one check cycle.  Skipped if a cycle is already in flight.
    pub fn tick(&mut self, hw: &mut impl FotaPorts, sink: &mut impl EventSink) {
        let Some(cfg) = self.config.as_ref() else {
            debug!("FOTA | tick before start, ignored");
            return;
        };
        if self.is_busy() {
            info!("FOTA | cycle still in flight, tick skipped");
            return;
        }

        if let Some(ip) = cfg.host_ip().or(self.resolved) {
            self.begin_check(ip, hw, sink);
            return;
        }

        info!("FOTA | resolving {}", cfg.host);
        self.resolving = true;
        if let Err(e) = hw.resolve(&cfg.host) {
            warn!("FOTA | resolver refused {}: {}", cfg.host, e);
            self.on_resolved(None, hw, sink);
        }
    }

    /// Feed one platform input into the lifecycle.
    pub fn handle(&mut self, input: Input, hw: &mut impl FotaPorts, sink: &mut impl EventSink) {
        match input {
            Input::Timer(TimerId::Interval) => self.tick(hw, sink),
            Input::Timer(TimerId::ResponseTimeout) => {
                if self.check.is_some() {
                    self.drive_check(CheckEvent::Timeout, hw, sink);
                } else {
                    debug!("FOTA | stale response timeout");
                }
            }
            Input::Net { conn, event } => self.on_net(conn, &event, hw, sink),
            Input::Resolved(addr) => self.on_resolved(addr, hw, sink),
            Input::FlashDone { success } => {
                if self.update.is_some() {
                    self.drive_update(UpdateEvent::EngineDone { success }, hw, sink);
                } else {
                    debug!("FOTA | flash completion with no update session");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.config.is_some()
    }

    /// A resolution, check or update is in flight.
    pub fn is_busy(&self) -> bool {
        self.resolving || self.check.is_some() || self.update.is_some()
    }

    pub fn config(&self) -> Option<&FotaConfig> {
        self.config.as_ref()
    }

    pub fn local_version(&self) -> Version {
        self.local
    }

    /// Cached server address from an earlier resolution.
    pub fn resolved_address(&self) -> Option<Ipv4Addr> {
        self.resolved
    }

    pub fn check_state(&self) -> Option<CheckState> {
        self.check.as_ref().map(VersionCheckSession::state)
    }

    pub fn update_state(&self) -> Option<UpdateState> {
        self.update.as_ref().map(FirmwareUpdateSession::state)
    }

    /// Latest cycle outcome.  Check and resolution failures leave it
    /// untouched.
    pub fn last_outcome(&self) -> Option<UpdateOutcome> {
        self.outcome
    }

    /// Number of cycles that reached a terminal outcome.
    pub fn cycles_completed(&self) -> u32 {
        self.cycles
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    fn on_resolved(
        &mut self,
        addr: Option<Ipv4Addr>,
        hw: &mut impl FotaPorts,
        sink: &mut impl EventSink,
    ) {
        if !self.resolving {
            debug!("FOTA | unsolicited resolver answer {:?}", addr);
            return;
        }
        self.resolving = false;

        match addr {
            Some(ip) => {
                info!("FOTA | resolved to {}", ip);
                self.resolved = Some(ip);
                sink.emit(&FotaEvent::Resolved(ip));
                self.begin_check(ip, hw, sink);
            }
            None => {
                warn!("FOTA | host did not resolve, retrying next interval");
                sink.emit(&FotaEvent::ResolutionFailed(ResolutionError::NoAddress));
                self.finish_cycle(hw);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Version check
    // -----------------------------------------------------------------------

    fn begin_check(&mut self, ip: Ipv4Addr, hw: &mut impl FotaPorts, sink: &mut impl EventSink) {
        let Some(port) = self.config.as_ref().map(|c| c.port) else {
            return;
        };
        let server = SocketAddrV4::new(ip, port);
        let mut session = VersionCheckSession::new(server, self.local);
        let fx = session.open(hw.connect(server));
        self.check = Some(session);
        self.run_check_effects(fx, hw, sink);
    }

    fn drive_check(
        &mut self,
        event: CheckEvent<'_>,
        hw: &mut impl FotaPorts,
        sink: &mut impl EventSink,
    ) {
        let fx = match (self.check.as_mut(), self.config.as_ref()) {
            (Some(session), Some(cfg)) => session.handle(cfg, event),
            _ => return,
        };
        self.run_check_effects(fx, hw, sink);
    }

    fn run_check_effects(
        &mut self,
        fx: Effects,
        hw: &mut impl FotaPorts,
        sink: &mut impl EventSink,
    ) {
        let mut pending = Some(fx);
        while let Some(fx) = pending.take() {
            if let Some(Feedback::SendFailed) = self.apply(fx, hw, sink) {
                if let (Some(session), Some(cfg)) = (self.check.as_mut(), self.config.as_ref()) {
                    pending = Some(session.handle(cfg, CheckEvent::SendFailed));
                }
            }
        }

        let verdict = match self.check_state() {
            Some(CheckState::Completed(verdict)) => Some(verdict),
            Some(CheckState::Failed(_)) => None,
            Some(
                CheckState::Idle
                | CheckState::Connecting
                | CheckState::Requesting
                | CheckState::AwaitingResponse,
            )
            | None => return,
        };
        let Some(server) = self.check.take().map(|s| s.server()) else {
            return;
        };
        if let Some(verdict) = verdict {
            self.outcome = Some(verdict.into());
        }

        match verdict {
            Some(CheckOutcome::UpgradeStarted(remote)) => {
                info!("FOTA | v{} available (running v{})", remote, self.local);
                self.begin_update(server, remote, hw, sink);
            }
            Some(CheckOutcome::UpToDate) | None => self.finish_cycle(hw),
        }
    }

    // -----------------------------------------------------------------------
    // Firmware update
    // -----------------------------------------------------------------------

    fn begin_update(
        &mut self,
        server: SocketAddrV4,
        remote: Version,
        hw: &mut impl FotaPorts,
        sink: &mut impl EventSink,
    ) {
        let mut session = FirmwareUpdateSession::new(server, remote);
        let fx = session.open(hw.connect(server));
        self.update = Some(session);
        self.run_update_effects(fx, hw, sink);
    }

    fn drive_update(&mut self, event: UpdateEvent, hw: &mut impl FotaPorts, sink: &mut impl EventSink) {
        let Some(session) = self.update.as_mut() else {
            return;
        };
        let fx = session.handle(event);
        self.run_update_effects(fx, hw, sink);
    }

    fn run_update_effects(
        &mut self,
        fx: Effects,
        hw: &mut impl FotaPorts,
        sink: &mut impl EventSink,
    ) {
        let mut pending = Some(fx);
        while let Some(fx) = pending.take() {
            if let Some(Feedback::EngineRejected) = self.apply(fx, hw, sink) {
                if let Some(session) = self.update.as_mut() {
                    pending = Some(session.handle(UpdateEvent::EngineRejected));
                }
            }
        }

        let Some(outcome) = self.update.as_ref().and_then(FirmwareUpdateSession::outcome) else {
            return;
        };
        self.outcome = Some(outcome);
        self.update = None;
        self.finish_cycle(hw);

        if self.reboot_pending {
            self.reboot_pending = false;
            info!("FOTA | rebooting into new image");
            hw.reboot();
        }
    }

    // -----------------------------------------------------------------------
    // Network routing
    // -----------------------------------------------------------------------

    fn on_net(
        &mut self,
        conn: ConnId,
        event: &NetEvent,
        hw: &mut impl FotaPorts,
        sink: &mut impl EventSink,
    ) {
        if self.check.as_ref().is_some_and(|s| s.owns(conn)) {
            let event = match event {
                NetEvent::Connected => CheckEvent::Connected,
                NetEvent::Sent => CheckEvent::Sent,
                NetEvent::Received(data) => CheckEvent::Received(data),
                NetEvent::Disconnected => CheckEvent::Disconnected,
            };
            self.drive_check(event, hw, sink);
        } else if self.update.as_ref().is_some_and(|s| s.owns(conn)) {
            let event = match event {
                NetEvent::Connected => UpdateEvent::Connected {
                    inactive: hw.inactive_bank(),
                },
                NetEvent::Disconnected => UpdateEvent::Disconnected,
                NetEvent::Sent | NetEvent::Received(_) => return,
            };
            self.drive_update(event, hw, sink);
        } else {
            debug!("FOTA | {:?} on stale connection {:?}", event, conn);
        }
    }

    // -----------------------------------------------------------------------
    // Effects
    // -----------------------------------------------------------------------

    /// Apply `fx` in order.  Returns the first port failure that the owning
    /// session must hear about.
    fn apply(
        &mut self,
        fx: Effects,
        hw: &mut impl FotaPorts,
        sink: &mut impl EventSink,
    ) -> Option<Feedback> {
        let mut feedback = None;
        for effect in fx {
            match effect {
                Effect::Send { conn, request } => {
                    if let Err(e) = hw.send(conn, request.as_bytes()) {
                        warn!("FOTA | send on {:?} failed: {}", conn, e);
                        feedback = Some(Feedback::SendFailed);
                    }
                }
                Effect::Close(conn) => hw.close(conn),
                Effect::ArmTimer(timer, after) => hw.arm(timer, after),
                Effect::DisarmTimer(timer) => hw.disarm(timer),
                Effect::StartDownload(job) => {
                    if let Err(e) = hw.download_and_install(&job) {
                        warn!("FOTA | flash engine refused job: {}", e);
                        feedback = Some(Feedback::EngineRejected);
                    }
                }
                Effect::Reboot => self.reboot_pending = true,
                Effect::Report(event) => sink.emit(&event),
            }
        }
        feedback
    }

    /// Terminal bookkeeping shared by every cycle outcome.
    fn finish_cycle(&mut self, hw: &mut impl FotaPorts) {
        let Some(interval) = self.config.as_ref().map(FotaConfig::interval) else {
            return;
        };
        self.cycles = self.cycles.wrapping_add(1);
        debug!("FOTA | cycle {} done, next in {:?}", self.cycles, interval);
        hw.arm(TimerId::Interval, interval);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
