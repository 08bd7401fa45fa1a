//! Application boundary: port traits and the events that cross them.
//!
//! The update lifecycle ([`crate::scheduler`] and [`crate::session`]) is
//! pure logic.  All interaction with sockets, timers, the resolver and the
//! flash engine happens through the **port traits** defined in [`ports`];
//! completions come back as [`inputs::Input`], reports go out as
//! [`events::FotaEvent`].

pub mod events;
pub mod inputs;
pub mod ports;
