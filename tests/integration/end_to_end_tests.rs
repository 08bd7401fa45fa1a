//! Full check → download → reboot cycles over loopback TCP.
//!
//! The scheduler runs against [`Platform`] exactly as on the device; only
//! the flash banks are simulated.

use std::time::{Duration, Instant};

use fota::adapters::platform::Platform;
use fota::app::events::FotaEvent;
use fota::app::ports::{Bank, EventSink, TimerId};
use fota::config::FotaConfig;
use fota::scheduler::FotaScheduler;
use fota::session::{UpdateOutcome, UpdateState};
use fota::version::Version;
use fota::{ParseError, SessionError, UpgradeError};

use crate::mock_server::{Catalogue, MockServer};

#[derive(Default)]
struct Recorder(Vec<FotaEvent>);

impl EventSink for Recorder {
    fn emit(&mut self, event: &FotaEvent) {
        self.0.push(*event);
    }
}

fn config_for(server: &MockServer, host: &str) -> FotaConfig {
    FotaConfig::new(host, server.addr.port(), 60, "FW-CAFE01", "secret", "1.2.3").unwrap()
}

/// Pump the platform until `done` holds or five seconds pass.
fn run_until(
    platform: &mut Platform,
    sched: &mut FotaScheduler,
    sink: &mut Recorder,
    done: impl Fn(&FotaScheduler, &Recorder) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(sched, sink) {
        assert!(Instant::now() < deadline, "timed out; events: {:?}", sink.0);
        if platform.drain(sched, sink) == 0 {
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

fn cycle_done(sched: &FotaScheduler, _: &Recorder) -> bool {
    sched.cycles_completed() > 0
}

#[test]
fn same_version_is_up_to_date_and_rearms_interval() {
    let server = MockServer::spawn(Catalogue::offering("1.2.3", b""), 1);
    let mut platform = Platform::new();
    let mut sink = Recorder::default();
    let mut sched = FotaScheduler::new();

    sched
        .start(config_for(&server, "127.0.0.1"), &mut platform, &mut sink)
        .unwrap();
    run_until(&mut platform, &mut sched, &mut sink, cycle_done);

    let local = Version::new(1, 2, 3);
    assert!(sink.0.contains(&FotaEvent::UpToDate {
        local,
        remote: local
    }));
    assert!(platform.timers.is_armed(TimerId::Interval));
    assert!(!platform.timers.is_armed(TimerId::ResponseTimeout));
    assert_eq!(platform.net.open_connections(), 0);
    assert!(!sched.is_busy());

    let lines = server.join();
    assert_eq!(lines, vec!["GET /firmware/fota-client/versions HTTP/1.0"]);
}

#[test]
fn query_carries_identity_headers() {
    let server = MockServer::spawn(Catalogue::offering("1.0.0", b""), 1);
    let mut platform = Platform::new();
    let mut sink = Recorder::default();
    let mut sched = FotaScheduler::new();

    sched
        .start(config_for(&server, "127.0.0.1"), &mut platform, &mut sink)
        .unwrap();
    run_until(&mut platform, &mut sched, &mut sink, cycle_done);

    let head = server.requests.lock().unwrap()[0].clone();
    assert!(head.contains("X-Device-Id: FW-CAFE01\r\n"), "{head}");
    assert!(head.contains("X-Device-Token: secret\r\n"), "{head}");
    assert!(head.contains("X-Version: 1.2.3\r\n"), "{head}");
    server.join();
}

#[test]
fn newer_version_is_downloaded_into_inactive_bank_and_booted() {
    let image = b"\xE9NEW-FIRMWARE-IMAGE".repeat(300);
    let server = MockServer::spawn(Catalogue::offering("1.3.0", &image), 2);
    let mut platform = Platform::new();
    let mut sink = Recorder::default();
    let mut sched = FotaScheduler::new();
    assert_eq!(platform.flash.active_bank(), Bank::User1);

    sched
        .start(config_for(&server, "127.0.0.1"), &mut platform, &mut sink)
        .unwrap();
    run_until(&mut platform, &mut sched, &mut sink, cycle_done);

    let remote = Version::new(1, 3, 0);
    assert!(sink.0.contains(&FotaEvent::UpgradeStarted {
        local: Version::new(1, 2, 3),
        remote
    }));
    assert!(sink.0.contains(&FotaEvent::UpgradeSucceeded {
        bank: Bank::User2,
        version: remote
    }));
    assert_eq!(sched.update_state(), None::<UpdateState>);
    assert_eq!(platform.flash.bank_image(Bank::User2), &image[..]);
    assert!(platform.flash.bank_image(Bank::User1).is_empty());
    assert_eq!(platform.flash.active_bank(), Bank::User2);
    assert!(platform.timers.is_armed(TimerId::Interval));

    let lines = server.join();
    assert_eq!(
        lines,
        vec![
            "GET /firmware/fota-client/versions HTTP/1.0",
            "GET /user2.bin HTTP/1.0",
        ]
    );
}

#[test]
fn failed_install_keeps_running_bank_for_the_next_attempt() {
    // An empty image is rejected by the engine after the download.
    let server = MockServer::spawn(Catalogue::offering("1.3.0", b""), 4);
    let mut platform = Platform::new();
    let mut sink = Recorder::default();
    let mut sched = FotaScheduler::new();

    sched
        .start(config_for(&server, "127.0.0.1"), &mut platform, &mut sink)
        .unwrap();
    run_until(&mut platform, &mut sched, &mut sink, cycle_done);

    assert!(sink.0.contains(&FotaEvent::UpgradeFailed(UpgradeError::EngineFailed)));
    assert_eq!(
        sched.last_outcome(),
        Some(UpdateOutcome::UpgradeFailed(UpgradeError::EngineFailed))
    );
    assert_eq!(platform.flash.active_bank(), Bank::User1);
    assert_eq!(platform.flash.pending_boot(), None);
    assert!(platform.timers.is_armed(TimerId::Interval));

    sched.tick(&mut platform, &mut sink);
    run_until(&mut platform, &mut sched, &mut sink, |s, _| {
        s.cycles_completed() > 1
    });
    assert_eq!(platform.flash.active_bank(), Bank::User1);
    assert_eq!(
        server.join(),
        vec![
            "GET /firmware/fota-client/versions HTTP/1.0",
            "GET /user2.bin HTTP/1.0",
            "GET /firmware/fota-client/versions HTTP/1.0",
            "GET /user2.bin HTTP/1.0",
        ]
    );
}

#[test]
fn server_error_fails_the_check_and_waits_for_next_interval() {
    let mut catalogue = Catalogue::offering("9.9.9", b"");
    catalogue.versions_status = 403;
    let server = MockServer::spawn(catalogue, 1);
    let mut platform = Platform::new();
    let mut sink = Recorder::default();
    let mut sched = FotaScheduler::new();

    sched
        .start(config_for(&server, "127.0.0.1"), &mut platform, &mut sink)
        .unwrap();
    run_until(&mut platform, &mut sched, &mut sink, cycle_done);

    assert!(sink.0.contains(&FotaEvent::CheckFailed(SessionError::Parse(
        ParseError::HttpStatus(403)
    ))));
    assert!(!sink
        .0
        .iter()
        .any(|e| matches!(e, FotaEvent::UpgradeStarted { .. })));
    assert!(platform.timers.is_armed(TimerId::Interval));
    assert_eq!(platform.flash.active_bank(), Bank::User1);
    server.join();
}

#[test]
fn garbage_body_is_a_parse_failure() {
    let mut catalogue = Catalogue::offering("", b"");
    catalogue.versions_body = "{\"version\":\"one.two\"}".to_string();
    let server = MockServer::spawn(catalogue, 1);
    let mut platform = Platform::new();
    let mut sink = Recorder::default();
    let mut sched = FotaScheduler::new();

    sched
        .start(config_for(&server, "127.0.0.1"), &mut platform, &mut sink)
        .unwrap();
    run_until(&mut platform, &mut sched, &mut sink, cycle_done);

    assert!(sink
        .0
        .iter()
        .any(|e| matches!(e, FotaEvent::CheckFailed(SessionError::Parse(_)))));
    server.join();
}

#[test]
fn dns_name_is_resolved_then_cached() {
    let server = MockServer::spawn(Catalogue::offering("1.2.3", b""), 2);
    let mut platform = Platform::new();
    let mut sink = Recorder::default();
    let mut sched = FotaScheduler::new();

    sched
        .start(config_for(&server, "localhost"), &mut platform, &mut sink)
        .unwrap();
    run_until(&mut platform, &mut sched, &mut sink, cycle_done);
    assert_eq!(sched.resolved_address(), Some(core::net::Ipv4Addr::LOCALHOST));

    // Second cycle goes straight to the cached address.
    sched.tick(&mut platform, &mut sink);
    run_until(&mut platform, &mut sched, &mut sink, |s, _| {
        s.cycles_completed() > 1
    });
    let resolved = sink
        .0
        .iter()
        .filter(|e| matches!(e, FotaEvent::Resolved(_)))
        .count();
    assert_eq!(resolved, 1);
    assert_eq!(server.join().len(), 2);
}

#[test]
fn unreachable_server_is_a_connect_failure() {
    // Bind then drop to get a port nobody listens on.
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let cfg = FotaConfig::new("127.0.0.1", port, 60, "FW-CAFE01", "", "1.2.3").unwrap();
    let mut platform = Platform::new();
    let mut sink = Recorder::default();
    let mut sched = FotaScheduler::new();

    sched.start(cfg, &mut platform, &mut sink).unwrap();
    run_until(&mut platform, &mut sched, &mut sink, cycle_done);

    assert!(sink
        .0
        .contains(&FotaEvent::CheckFailed(SessionError::ConnectFailed)));
    assert!(platform.timers.is_armed(TimerId::Interval));
}
