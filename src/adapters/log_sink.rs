//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing lifecycle events to the ESP-IDF
//! logger (UART / USB-CDC in production, stderr on the host).
//! A telemetry uplink would implement the same trait.

use log::{info, warn};

use crate::app::events::FotaEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`FotaEvent`] to the console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &FotaEvent) {
        match event {
            FotaEvent::Started { local } => {
                info!("FOTA | started, running v{} (0x{:06x})", local, local.to_packed());
            }
            FotaEvent::Resolved(ip) => {
                info!("FOTA | server at {}", ip);
            }
            FotaEvent::CheckStarted { server } => {
                info!("FOTA | checking {}", server);
            }
            FotaEvent::UpToDate { local, remote } => {
                info!("FOTA | up to date | local=v{} remote=v{}", local, remote);
            }
            FotaEvent::UpgradeStarted { local, remote } => {
                info!("FOTA | upgrading v{} -> v{}", local, remote);
            }
            FotaEvent::UpgradeSucceeded { bank, version } => {
                info!("FOTA | v{} installed in {}", version, bank.image_name());
            }
            FotaEvent::UpgradeFailed(e) => {
                warn!("FOTA | upgrade failed: {}", e);
            }
            FotaEvent::CheckFailed(e) => {
                warn!("FOTA | check failed: {}", e);
            }
            FotaEvent::ResolutionFailed(e) => {
                warn!("FOTA | resolution failed: {}", e);
            }
        }
    }
}
