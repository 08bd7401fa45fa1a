//! Host name resolver over `std::net::ToSocketAddrs` (lwIP `getaddrinfo`
//! on ESP-IDF).
//!
//! `getaddrinfo` blocks for as long as the DNS server takes to answer, so
//! each lookup runs on a short-lived worker thread.  The answer comes back
//! over a channel and is handed to the scheduler by [`StdResolver::poll`];
//! the event loop never waits on the network.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use core::net::Ipv4Addr;

use log::{debug, warn};

use crate::app::inputs::Input;
use crate::app::ports::{NetError, ResolverPort};

/// Worker stack.  lwIP's resolver needs a few KiB on top of the std frame.
const LOOKUP_STACK: usize = 8 * 1024;

pub struct StdResolver {
    tx: Sender<Option<Ipv4Addr>>,
    rx: Receiver<Option<Ipv4Addr>>,
    in_flight: usize,
}

impl Default for StdResolver {
    fn default() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx, in_flight: 0 }
    }
}

impl StdResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookups started but not yet answered.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn poll(&mut self) -> Option<Input> {
        let answer = self.rx.try_recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(Input::Resolved(answer))
    }
}

/// First IPv4 address for `host`.  Blocks the calling thread.
pub fn lookup_ipv4(host: &str) -> Option<Ipv4Addr> {
    match (host, 0u16).to_socket_addrs() {
        Ok(addrs) => addrs.into_iter().find_map(|a| match a {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        }),
        Err(e) => {
            warn!("DNS | {}: {}", host, e);
            None
        }
    }
}

impl ResolverPort for StdResolver {
    fn resolve(&mut self, host: &str) -> Result<(), NetError> {
        let host = host.to_owned();
        let tx = self.tx.clone();
        thread::Builder::new()
            .name("dns".into())
            .stack_size(LOOKUP_STACK)
            .spawn(move || {
                let answer = lookup_ipv4(&host);
                debug!("DNS | {} -> {:?}", host, answer);
                // The resolver may be gone by the time the answer lands.
                let _ = tx.send(answer);
            })
            .map_err(|e| {
                warn!("DNS | worker spawn failed: {}", e);
                NetError::Exhausted
            })?;
        self.in_flight += 1;
        Ok(())
    }
}
