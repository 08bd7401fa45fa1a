//! Version-check session: ask the server which build it offers and compare
//! it with the running one.
//!
//! The response may arrive split across several segments.  Bytes are
//! buffered until the header block is complete and, when the server sent a
//! `Content-Length`, until the whole body is in.  A first segment that
//! carries no header/body separator at all is rejected immediately.

use core::cmp::Ordering;
use core::net::SocketAddrV4;

use log::{debug, info, warn};

use super::{ConnSlot, Effect, Effects, RESPONSE_TIMEOUT};
use crate::app::events::FotaEvent;
use crate::app::inputs::RX_CHUNK;
use crate::app::ports::{ConnId, NetError, TimerId};
use crate::config::FotaConfig;
use crate::error::{ParseError, SessionError};
use crate::proto::{request, response};
use crate::version::{self, Version};

/// Reassembly buffer for one response.
const RESPONSE_CAP: usize = 2 * RX_CHUNK;

/// Verdict of a successful check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Remote version is not newer than the running one.
    UpToDate,
    /// Remote version is newer; a firmware session takes over.
    UpgradeStarted(Version),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Idle,
    Connecting,
    Requesting,
    AwaitingResponse,
    Completed(CheckOutcome),
    Failed(SessionError),
}

impl CheckState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

/// Events routed to a version-check session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckEvent<'a> {
    Connected,
    Sent,
    /// The transport refused the request bytes.
    SendFailed,
    Received(&'a [u8]),
    Timeout,
    Disconnected,
}

pub struct VersionCheckSession {
    state: CheckState,
    conn: ConnSlot,
    server: SocketAddrV4,
    local: Version,
    remote: Option<Version>,
    rx: heapless::Vec<u8, RESPONSE_CAP>,
    timer_armed: bool,
}

impl VersionCheckSession {
    pub fn new(server: SocketAddrV4, local: Version) -> Self {
        Self {
            state: CheckState::Idle,
            conn: ConnSlot::empty(),
            server,
            local,
            remote: None,
            rx: heapless::Vec::new(),
            timer_armed: false,
        }
    }

    pub fn state(&self) -> CheckState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn owns(&self, conn: ConnId) -> bool {
        self.conn.owns(conn)
    }

    pub fn server(&self) -> SocketAddrV4 {
        self.server
    }

    /// Remote version, once a response has been decoded.
    pub fn remote_version(&self) -> Option<Version> {
        self.remote
    }

    /// Take the result of `NetworkPort::connect`.  Idle → Connecting, or
    /// straight to `Failed(ConnectFailed)`.
    pub fn open(&mut self, connect: Result<ConnId, NetError>) -> Effects {
        let mut fx = Effects::new();
        if self.state != CheckState::Idle {
            debug!("CHECK | open ignored in {:?}", self.state);
            return fx;
        }
        match connect {
            Ok(conn) => {
                self.conn.hold(conn);
                self.state = CheckState::Connecting;
                info!("CHECK | connecting to {}", self.server);
                fx.push(Effect::Report(FotaEvent::CheckStarted {
                    server: self.server,
                }));
            }
            Err(e) => {
                warn!("CHECK | connect to {} failed: {}", self.server, e);
                self.fail(SessionError::ConnectFailed, &mut fx);
            }
        }
        fx
    }

    pub fn handle(&mut self, cfg: &FotaConfig, event: CheckEvent<'_>) -> Effects {
        let mut fx = Effects::new();
        if self.is_terminal() {
            debug!("CHECK | {:?} after terminal state, ignored", event);
            return fx;
        }

        match (self.state, event) {
            (CheckState::Connecting, CheckEvent::Connected) => {
                match request::version_query(cfg, self.server) {
                    Ok(request) => {
                        if let Some(conn) = self.conn.get() {
                            self.state = CheckState::Requesting;
                            fx.push(Effect::Send { conn, request });
                        }
                    }
                    Err(_) => self.fail(SessionError::RequestTooLarge, &mut fx),
                }
            }
            (CheckState::Requesting, CheckEvent::Sent) => {
                self.state = CheckState::AwaitingResponse;
                self.timer_armed = true;
                fx.push(Effect::ArmTimer(TimerId::ResponseTimeout, RESPONSE_TIMEOUT));
            }
            (CheckState::Requesting, CheckEvent::SendFailed) => {
                self.fail(SessionError::SendFailed, &mut fx);
            }
            (CheckState::Requesting | CheckState::AwaitingResponse, CheckEvent::Received(data)) => {
                self.receive(data, &mut fx);
            }
            (CheckState::AwaitingResponse, CheckEvent::Timeout) => {
                // The one-shot has fired; nothing left to disarm.
                self.timer_armed = false;
                warn!("CHECK | no response from {} within {:?}", self.server, RESPONSE_TIMEOUT);
                self.fail(SessionError::Timeout, &mut fx);
            }
            (_, CheckEvent::Disconnected) => {
                warn!("CHECK | connection lost in {:?}", self.state);
                self.fail(SessionError::Disconnected, &mut fx);
            }
            (state, event) => {
                debug!("CHECK | {:?} ignored in {:?}", event, state);
            }
        }
        fx
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn receive(&mut self, data: &[u8], fx: &mut Effects) {
        if self.rx.extend_from_slice(data).is_err() {
            warn!("CHECK | response exceeds {} bytes", RESPONSE_CAP);
            self.fail(SessionError::Parse(ParseError::Malformed), fx);
            return;
        }

        let Some(offset) = response::body_offset(&self.rx) else {
            self.fail(SessionError::Parse(ParseError::NoBodySeparator), fx);
            return;
        };

        if let Some(expected) = response::content_length(&self.rx[..offset]) {
            let have = self.rx.len() - offset;
            if have < expected {
                debug!("CHECK | body {}/{} bytes, waiting", have, expected);
                return;
            }
        }

        match response::decode_version_response(&self.rx) {
            Ok(remote) => {
                self.remote = Some(remote);
                let outcome = match version::compare(&remote, &self.local) {
                    Ordering::Greater => CheckOutcome::UpgradeStarted(remote),
                    Ordering::Equal | Ordering::Less => CheckOutcome::UpToDate,
                };
                self.complete(outcome, remote, fx);
            }
            Err(e) => {
                warn!("CHECK | bad response: {}", e);
                self.fail(e.into(), fx);
            }
        }
    }

    fn complete(&mut self, outcome: CheckOutcome, remote: Version, fx: &mut Effects) {
        self.release(fx);
        self.state = CheckState::Completed(outcome);
        let event = match outcome {
            CheckOutcome::UpgradeStarted(_) => FotaEvent::UpgradeStarted {
                local: self.local,
                remote,
            },
            CheckOutcome::UpToDate => FotaEvent::UpToDate {
                local: self.local,
                remote,
            },
        };
        fx.push(Effect::Report(event));
    }

    fn fail(&mut self, reason: SessionError, fx: &mut Effects) {
        self.release(fx);
        self.state = CheckState::Failed(reason);
        fx.push(Effect::Report(FotaEvent::CheckFailed(reason)));
    }

    fn release(&mut self, fx: &mut Effects) {
        if self.timer_armed {
            self.timer_armed = false;
            fx.push(Effect::DisarmTimer(TimerId::ResponseTimeout));
        }
        self.conn.release(fx);
    }
}

#[cfg(test)]
mod tests {
    use core::net::Ipv4Addr;

    use super::*;

    const SERVER: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), 80);
    const CONN: ConnId = ConnId(1);

    fn config() -> FotaConfig {
        FotaConfig::new("192.168.1.10", 80, 60, "dev-1", "secret", "1.2.3").unwrap()
    }

    fn ok_response(version: &str) -> heapless::Vec<u8, 256> {
        let mut out = heapless::Vec::new();
        out.extend_from_slice(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"version\":\"")
            .unwrap();
        out.extend_from_slice(version.as_bytes()).unwrap();
        out.extend_from_slice(b"\"}").unwrap();
        out
    }

    /// Drive a session up to AwaitingResponse.
    fn awaiting(cfg: &FotaConfig) -> VersionCheckSession {
        let mut s = VersionCheckSession::new(SERVER, Version::new(1, 2, 3));
        s.open(Ok(CONN));
        let fx = s.handle(cfg, CheckEvent::Connected);
        assert!(matches!(fx.as_slice(), [Effect::Send { conn: CONN, .. }]));
        let fx = s.handle(cfg, CheckEvent::Sent);
        assert_eq!(
            fx.as_slice(),
            &[Effect::ArmTimer(TimerId::ResponseTimeout, RESPONSE_TIMEOUT)]
        );
        assert_eq!(s.state(), CheckState::AwaitingResponse);
        s
    }

    fn count_closes(fx: &Effects) -> usize {
        fx.as_slice().iter().filter(|e| matches!(e, Effect::Close(_))).count()
    }

    #[test]
    fn newer_remote_offers_upgrade() {
        let cfg = config();
        let mut s = awaiting(&cfg);
        let fx = s.handle(&cfg, CheckEvent::Received(&ok_response("1.2.4")));

        assert_eq!(
            s.state(),
            CheckState::Completed(CheckOutcome::UpgradeStarted(Version::new(1, 2, 4)))
        );
        assert_eq!(
            fx.as_slice(),
            &[
                Effect::DisarmTimer(TimerId::ResponseTimeout),
                Effect::Close(CONN),
                Effect::Report(FotaEvent::UpgradeStarted {
                    local: Version::new(1, 2, 3),
                    remote: Version::new(1, 2, 4),
                }),
            ]
        );
    }

    #[test]
    fn equal_or_older_remote_is_up_to_date() {
        let cfg = config();
        for remote in ["1.2.3", "1.2.2", "0.9.9"] {
            let mut s = awaiting(&cfg);
            s.handle(&cfg, CheckEvent::Received(&ok_response(remote)));
            assert_eq!(s.state(), CheckState::Completed(CheckOutcome::UpToDate), "{remote}");
        }
    }

    #[test]
    fn request_carries_device_headers() {
        let cfg = config();
        let mut s = VersionCheckSession::new(SERVER, Version::new(1, 2, 3));
        s.open(Ok(CONN));
        let fx = s.handle(&cfg, CheckEvent::Connected);
        let Some(Effect::Send { request, .. }) = fx.into_iter().next() else {
            panic!("expected a send");
        };
        assert!(request.starts_with("GET /firmware/fota-client/versions HTTP/1.0\r\n"));
        assert!(request.contains("X-Device-Id: dev-1\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn timeout_closes_exactly_once() {
        let cfg = config();
        let mut s = awaiting(&cfg);

        let fx = s.handle(&cfg, CheckEvent::Timeout);
        assert_eq!(s.state(), CheckState::Failed(SessionError::Timeout));
        assert_eq!(count_closes(&fx), 1);
        assert!(!fx.as_slice().contains(&Effect::DisarmTimer(TimerId::ResponseTimeout)));

        // A disconnect racing the timeout changes nothing.
        let fx = s.handle(&cfg, CheckEvent::Disconnected);
        assert!(fx.is_empty());
        assert_eq!(s.state(), CheckState::Failed(SessionError::Timeout));
    }

    #[test]
    fn late_data_after_timeout_is_ignored() {
        let cfg = config();
        let mut s = awaiting(&cfg);
        s.handle(&cfg, CheckEvent::Timeout);
        let fx = s.handle(&cfg, CheckEvent::Received(&ok_response("9.9.9")));
        assert!(fx.is_empty());
        assert_eq!(s.remote_version(), None);
    }

    #[test]
    fn disconnect_while_awaiting_disarms_and_fails() {
        let cfg = config();
        let mut s = awaiting(&cfg);
        let fx = s.handle(&cfg, CheckEvent::Disconnected);
        assert_eq!(s.state(), CheckState::Failed(SessionError::Disconnected));
        assert_eq!(
            fx.as_slice(),
            &[
                Effect::DisarmTimer(TimerId::ResponseTimeout),
                Effect::Close(CONN),
                Effect::Report(FotaEvent::CheckFailed(SessionError::Disconnected)),
            ]
        );
    }

    #[test]
    fn missing_separator_fails_the_check() {
        let cfg = config();
        let mut s = awaiting(&cfg);
        s.handle(&cfg, CheckEvent::Received(b"HTTP/1.1 200 OK\r\nContent-Length: 19\r\n"));
        assert_eq!(
            s.state(),
            CheckState::Failed(SessionError::Parse(ParseError::NoBodySeparator))
        );
    }

    #[test]
    fn split_body_is_reassembled() {
        let cfg = config();
        let mut s = awaiting(&cfg);
        let fx = s.handle(
            &cfg,
            CheckEvent::Received(b"HTTP/1.1 200 OK\r\nContent-Length: 19\r\n\r\n{\"version\""),
        );
        assert!(fx.is_empty());
        assert_eq!(s.state(), CheckState::AwaitingResponse);

        s.handle(&cfg, CheckEvent::Received(b":\"1.3.0\"}"));
        assert_eq!(
            s.state(),
            CheckState::Completed(CheckOutcome::UpgradeStarted(Version::new(1, 3, 0)))
        );
    }

    #[test]
    fn error_status_fails_the_check() {
        let cfg = config();
        let mut s = awaiting(&cfg);
        s.handle(&cfg, CheckEvent::Received(b"HTTP/1.1 403 Forbidden\r\n\r\n"));
        assert_eq!(
            s.state(),
            CheckState::Failed(SessionError::Parse(ParseError::HttpStatus(403)))
        );
    }

    #[test]
    fn connect_refused_fails_without_close() {
        let mut s = VersionCheckSession::new(SERVER, Version::new(1, 2, 3));
        let fx = s.open(Err(NetError::Exhausted));
        assert_eq!(s.state(), CheckState::Failed(SessionError::ConnectFailed));
        assert_eq!(count_closes(&fx), 0);
    }

    #[test]
    fn send_failure_closes_connection() {
        let cfg = config();
        let mut s = VersionCheckSession::new(SERVER, Version::new(1, 2, 3));
        s.open(Ok(CONN));
        s.handle(&cfg, CheckEvent::Connected);
        let fx = s.handle(&cfg, CheckEvent::SendFailed);
        assert_eq!(s.state(), CheckState::Failed(SessionError::SendFailed));
        assert_eq!(count_closes(&fx), 1);
    }

    #[test]
    fn out_of_order_events_are_ignored() {
        let cfg = config();
        let mut s = VersionCheckSession::new(SERVER, Version::new(1, 2, 3));
        s.open(Ok(CONN));
        assert!(s.handle(&cfg, CheckEvent::Sent).is_empty());
        assert!(s.handle(&cfg, CheckEvent::Timeout).is_empty());
        assert_eq!(s.state(), CheckState::Connecting);
    }
}
