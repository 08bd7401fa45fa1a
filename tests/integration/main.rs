//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the client against real
//! host adapters.  All tests run on the host (x86_64) with no hardware
//! required; the update server is a loopback thread.

#![cfg(not(target_os = "espidf"))]

mod config_store_tests;
mod end_to_end_tests;
mod mock_server;
