//! TCP adapter over `std::net`.
//!
//! Implements [`NetworkPort`] with a small pool of non-blocking
//! [`TcpStream`]s keyed by [`ConnId`].  ESP-IDF provides the same `std::net`
//! API on top of lwIP, so one implementation serves the device and the host.
//!
//! `connect` blocks for at most [`CONNECT_TIMEOUT`]; everything after that
//! is polled.  [`TcpNetwork::poll`] turns socket readiness into
//! [`Input::Net`] events in order: `Connected`, `Sent`, `Received`,
//! `Disconnected`.

use std::collections::{BTreeMap, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use core::net::SocketAddrV4;

use log::{debug, info, warn};

use crate::app::inputs::{Input, NetEvent, RX_CHUNK, RxChunk};
use crate::app::ports::{ConnId, NetError, NetworkPort};

/// Upper bound on a blocking connect.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Concurrent connections.  One check or one download at a time, plus slack
/// for a connection that is closing.
const MAX_CONNS: usize = 4;

struct Conn {
    stream: TcpStream,
    outbox: Vec<u8>,
}

/// Pool of outbound connections.
#[derive(Default)]
pub struct TcpNetwork {
    conns: BTreeMap<u16, Conn>,
    next_id: u16,
    events: VecDeque<Input>,
}

impl TcpNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open connections.
    pub fn open_connections(&self) -> usize {
        self.conns.len()
    }

    /// Hand the socket behind `conn` to another owner.  The handle is
    /// forgotten; a later `close` is a no-op.
    pub fn detach(&mut self, conn: ConnId) -> Option<TcpStream> {
        let c = self.conns.remove(&conn.0)?;
        self.events.retain(|e| !matches!(e, Input::Net { conn: id, .. } if *id == conn));
        debug!("NET | {:?} detached", conn);
        Some(c.stream)
    }

    /// Next network input, if any.
    pub fn poll(&mut self) -> Option<Input> {
        if self.events.is_empty() {
            self.service();
        }
        self.events.pop_front()
    }

    fn service(&mut self) {
        let mut dead = Vec::new();
        for (&id, conn) in &mut self.conns {
            let conn_id = ConnId(id);
            if !conn.outbox.is_empty() {
                match conn.stream.write(&conn.outbox) {
                    Ok(0) => {
                        dead.push(id);
                        continue;
                    }
                    Ok(n) => {
                        conn.outbox.drain(..n);
                        if conn.outbox.is_empty() {
                            self.events.push_back(Input::Net {
                                conn: conn_id,
                                event: NetEvent::Sent,
                            });
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                    Err(e) => {
                        warn!("NET | write on {:?}: {}", conn_id, e);
                        dead.push(id);
                        continue;
                    }
                }
            }

            let mut buf = [0u8; RX_CHUNK];
            match conn.stream.read(&mut buf) {
                Ok(0) => dead.push(id),
                Ok(n) => {
                    let mut chunk = RxChunk::new();
                    // n <= RX_CHUNK
                    let _ = chunk.extend_from_slice(&buf[..n]);
                    self.events.push_back(Input::Net {
                        conn: conn_id,
                        event: NetEvent::Received(chunk),
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => {
                    warn!("NET | read on {:?}: {}", conn_id, e);
                    dead.push(id);
                }
            }
        }

        for id in dead {
            self.conns.remove(&id);
            info!("NET | {:?} closed by peer", ConnId(id));
            self.events.push_back(Input::Net {
                conn: ConnId(id),
                event: NetEvent::Disconnected,
            });
        }
    }

    fn allocate_id(&mut self) -> u16 {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            if !self.conns.contains_key(&self.next_id) {
                return self.next_id;
            }
        }
    }
}

impl NetworkPort for TcpNetwork {
    fn connect(&mut self, addr: SocketAddrV4) -> Result<ConnId, NetError> {
        if self.conns.len() >= MAX_CONNS {
            return Err(NetError::Exhausted);
        }
        let stream =
            TcpStream::connect_timeout(&SocketAddr::V4(addr), CONNECT_TIMEOUT).map_err(|e| {
                warn!("NET | connect {}: {}", addr, e);
                NetError::Refused
            })?;
        stream.set_nonblocking(true).map_err(|_| NetError::Io)?;
        let _ = stream.set_nodelay(true);

        let id = self.allocate_id();
        self.conns.insert(
            id,
            Conn {
                stream,
                outbox: Vec::new(),
            },
        );
        self.events.push_back(Input::Net {
            conn: ConnId(id),
            event: NetEvent::Connected,
        });
        debug!("NET | {:?} -> {}", ConnId(id), addr);
        Ok(ConnId(id))
    }

    fn send(&mut self, conn: ConnId, data: &[u8]) -> Result<(), NetError> {
        let c = self
            .conns
            .get_mut(&conn.0)
            .ok_or(NetError::UnknownConnection)?;
        c.outbox.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self, conn: ConnId) {
        if let Some(c) = self.conns.remove(&conn.0) {
            let _ = c.stream.shutdown(Shutdown::Both);
            debug!("NET | {:?} closed", conn);
        }
        self.events.retain(|e| !matches!(e, Input::Net { conn: id, .. } if *id == conn));
    }
}
