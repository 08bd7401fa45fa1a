//! Platform bundle: every port the scheduler drives, behind one value.
//!
//! ```text
//!   TcpNetwork ─┐
//!   StdResolver ┼─▶ Platform::poll() ──▶ Input ──▶ FotaScheduler::handle
//!   TimerWheel ─┤
//!   OtaFlash ───┘
//! ```
//!
//! The flash engine takes the download socket over from the network pool
//! when a job starts, so the scheduler never sees it again.

use core::net::SocketAddrV4;
use core::time::Duration;

use crate::app::inputs::Input;
use crate::app::ports::{
    Bank, ConnId, DownloadRequest, EventSink, FlashError, FlashPort, NetError, NetworkPort,
    ResolverPort, TimerId, TimerPort,
};
use crate::scheduler::FotaScheduler;

use super::flash::OtaFlash;
use super::net::TcpNetwork;
use super::resolver::StdResolver;
use super::timer::TimerWheel;

/// Longest sleep between polls.
pub const MAX_IDLE: Duration = Duration::from_secs(1);

/// Longest sleep between polls while a transfer, connection or lookup is active.
pub const ACTIVE_POLL: Duration = Duration::from_millis(10);

#[derive(Default)]
pub struct Platform {
    pub net: TcpNetwork,
    pub resolver: StdResolver,
    pub timers: TimerWheel,
    pub flash: OtaFlash,
}

impl Platform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next pending input from any source.  Engine and network completions
    /// come before timers so a response that raced its timeout wins.
    pub fn poll(&mut self) -> Option<Input> {
        self.flash
            .poll()
            .or_else(|| self.net.poll())
            .or_else(|| self.resolver.poll())
            .or_else(|| self.timers.poll().map(Input::Timer))
    }

    /// How long the loop may sleep before polling again.
    pub fn idle_for(&self) -> Duration {
        let due = self.timers.next_due().map_or(MAX_IDLE, |d| d.min(MAX_IDLE));
        if self.flash.is_busy() || self.net.open_connections() > 0 || self.resolver.in_flight() > 0 {
            due.min(ACTIVE_POLL)
        } else {
            due
        }
    }

    /// Feed every pending input to `sched`.  Returns how many were handled.
    pub fn drain(&mut self, sched: &mut FotaScheduler, sink: &mut impl EventSink) -> usize {
        let mut handled = 0;
        while let Some(input) = self.poll() {
            sched.handle(input, self, sink);
            handled += 1;
        }
        handled
    }
}

impl NetworkPort for Platform {
    fn connect(&mut self, addr: SocketAddrV4) -> Result<ConnId, NetError> {
        self.net.connect(addr)
    }

    fn send(&mut self, conn: ConnId, data: &[u8]) -> Result<(), NetError> {
        self.net.send(conn, data)
    }

    fn close(&mut self, conn: ConnId) {
        self.net.close(conn);
    }
}

impl ResolverPort for Platform {
    fn resolve(&mut self, host: &str) -> Result<(), NetError> {
        self.resolver.resolve(host)
    }
}

impl TimerPort for Platform {
    fn arm(&mut self, timer: TimerId, after: Duration) {
        self.timers.arm(timer, after);
    }

    fn disarm(&mut self, timer: TimerId) {
        self.timers.disarm(timer);
    }
}

impl FlashPort for Platform {
    fn inactive_bank(&self) -> Bank {
        self.flash.inactive_bank()
    }

    fn download_and_install(&mut self, job: &DownloadRequest) -> Result<(), FlashError> {
        if self.flash.is_busy() {
            return Err(FlashError::Busy);
        }
        let stream = self.net.detach(job.conn).ok_or(FlashError::NoConnection)?;
        self.flash.start(stream, job)
    }

    fn reboot(&mut self) {
        self.flash.reboot();
    }
}
