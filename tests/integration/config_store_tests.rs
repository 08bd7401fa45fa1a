//! Persisted config → identity → scheduler start.

use fota::adapters::device_id::{DeviceIdentity, IdSource};
use fota::adapters::log_sink::LogEventSink;
use fota::adapters::nvs::NvsAdapter;
use fota::adapters::platform::Platform;
use fota::app::ports::{ConfigPort, StoreError};
use fota::config::FotaConfig;
use fota::scheduler::FotaScheduler;
use fota::ConfigError;

#[test]
fn empty_store_falls_back_to_defaults_with_mac_identity() {
    let store = NvsAdapter::new().unwrap();
    let mut cfg = store.load().unwrap_or_default();
    let identity = DeviceIdentity::local();
    assert_eq!(identity.apply(&mut cfg), IdSource::Derived);

    assert_eq!(cfg.device_id, identity.derived_id);
    assert_eq!(cfg.device_id.as_str(), "FW-DEADBEEFCAFE");
    assert!(cfg.validate().is_ok());
}

#[test]
fn saved_config_survives_round_trip() {
    let store = NvsAdapter::new().unwrap();
    let cfg = FotaConfig::new("10.1.2.3", 8080, 300, "FW-000001", "tok", "2.0.1").unwrap();
    store.save(&cfg).unwrap();
    assert_eq!(store.load().unwrap(), cfg);
}

#[test]
fn store_refuses_unparseable_version() {
    let store = NvsAdapter::new().unwrap();
    let cfg = FotaConfig::new("10.1.2.3", 8080, 300, "FW-000001", "tok", "2.0").unwrap();
    assert!(matches!(
        store.save(&cfg),
        Err(StoreError::ValidationFailed(_))
    ));
}

#[test]
fn rejected_config_leaves_scheduler_idle_and_retryable() {
    let mut platform = Platform::new();
    let mut sink = LogEventSink::new();
    let mut sched = FotaScheduler::new();

    let bad = FotaConfig::new("10.1.2.3", 0, 300, "FW-000001", "", "1.0.0").unwrap();
    assert!(matches!(
        sched.start(bad, &mut platform, &mut sink),
        Err(ConfigError::Invalid(_))
    ));
    assert!(!sched.is_running());
    assert_eq!(platform.net.open_connections(), 0);

    let bad_version = FotaConfig::new("10.1.2.3", 80, 300, "FW-000001", "", "v1").unwrap();
    assert_eq!(
        sched.start(bad_version, &mut platform, &mut sink),
        Err(ConfigError::InvalidLocalVersion)
    );
    assert!(!sched.is_running());
}
