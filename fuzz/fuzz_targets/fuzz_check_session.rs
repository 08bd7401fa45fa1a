//! Fuzz target: `VersionCheckSession` fed arbitrarily split responses.
//!
//! The first byte picks the split point; the rest is the response.  The
//! session must end in at most one terminal state and never emit more
//! effects than it has room for.
//!
//! cargo fuzz run fuzz_check_session

#![no_main]

use core::net::{Ipv4Addr, SocketAddrV4};

use fota::app::ports::ConnId;
use fota::config::FotaConfig;
use fota::session::{CheckEvent, VersionCheckSession, MAX_EFFECTS};
use fota::version::Version;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&split, body)) = data.split_first() else {
        return;
    };
    let Ok(cfg) = FotaConfig::new("10.0.0.1", 80, 60, "FW-FUZZ", "", "1.0.0") else {
        return;
    };
    let server = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 80);
    let mut s = VersionCheckSession::new(server, Version::new(1, 0, 0));

    let _ = s.open(Ok(ConnId(1)));
    let _ = s.handle(&cfg, CheckEvent::Connected);
    let _ = s.handle(&cfg, CheckEvent::Sent);

    let at = usize::from(split).min(body.len());
    for chunk in [&body[..at], &body[at..]] {
        for piece in chunk.chunks(1024) {
            let fx = s.handle(&cfg, CheckEvent::Received(piece));
            assert!(fx.len() <= MAX_EFFECTS);
        }
    }
    let _ = s.handle(&cfg, CheckEvent::Disconnected);
    assert!(s.is_terminal());
});
