//! Inbound events from the platform.
//!
//! Every completion the ports promise (connection up, data in, timer
//! fired, name resolved, flash done) reaches the core as one [`Input`]
//! passed to [`FotaScheduler::handle`](crate::scheduler::FotaScheduler::handle).

use core::net::Ipv4Addr;

use super::ports::{ConnId, TimerId};

/// Largest chunk of received bytes carried by one [`NetEvent::Received`].
pub const RX_CHUNK: usize = 1024;

/// Received bytes, copied out of the transport's buffer.
pub type RxChunk = heapless::Vec<u8, RX_CHUNK>;

/// Connection-level notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    /// `connect` completed.
    Connected,
    /// The last `send` has been handed to the stack.
    Sent,
    /// Bytes arrived.
    Received(RxChunk),
    /// The peer closed, the stack reset, or the connect attempt failed.
    Disconnected,
}

/// Everything the event loop can hand to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A one-shot timer fired.
    Timer(TimerId),

    /// Something happened on a connection.
    Net { conn: ConnId, event: NetEvent },

    /// Answer to [`ResolverPort::resolve`](super::ports::ResolverPort::resolve).
    /// `None` means the resolver found no IPv4 address.
    Resolved(Option<Ipv4Addr>),

    /// The flash engine finished the job started by
    /// [`FlashPort::download_and_install`](super::ports::FlashPort::download_and_install).
    FlashDone { success: bool },
}
