//! Wire codec for the two HTTP exchanges.
//!
//! ```text
//!   version query ──▶  GET /firmware/{project}/versions   ──▶ {"version":"a.b.c"}
//!   firmware      ──▶  GET /{user1.bin|user2.bin}          ──▶ raw image bytes
//! ```
//!
//! Requests are built into fixed-capacity buffers and never block.
//! Responses are only inspected as far as the status line, the
//! header/body separator and the one JSON field the client needs.

pub mod request;
pub mod response;

pub use request::{Request, REQUEST_CAP};
