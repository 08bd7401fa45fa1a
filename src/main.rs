//! FOTA client main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  TcpNetwork   StdResolver   TimerWheel   OtaFlash              │
//! │  └──────────────── Platform (FotaPorts) ──────────┘            │
//! │  LogEventSink (EventSink)   NvsAdapter (ConfigPort)            │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │        FotaScheduler (pure logic, effect-driven)       │    │
//! │  │   VersionCheckSession · FirmwareUpdateSession          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{anyhow, Result};
use log::{error, info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;

use fota::adapters::device_id::DeviceIdentity;
use fota::adapters::flash;
use fota::adapters::log_sink::LogEventSink;
use fota::adapters::nvs::NvsAdapter;
use fota::adapters::platform::Platform;
use fota::adapters::wifi::{self, WifiCredentials};
use fota::app::ports::ConfigPort;
use fota::config::{FotaConfig, FIRMWARE_VERSION};
use fota::scheduler::FotaScheduler;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  FOTA client v{}                  ║", FIRMWARE_VERSION);
    info!("╚══════════════════════════════════════╝");

    // ── 1b. OTA rollback check ─────────────────────────────────
    flash::check_rollback();

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let store = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {}", e))?;
    let mut config = match store.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            FotaConfig::default()
        }
    };

    // ── 3. Device identity ────────────────────────────────────
    let identity = DeviceIdentity::local();
    let source = identity.apply(&mut config);
    info!(
        "Device ID: {} ({:?}, hostname: {})",
        config.device_id, source, identity.hostname
    );

    // The running image is the authority on its own version.
    if config.current_version != FIRMWARE_VERSION {
        info!(
            "Stored version {} replaced by running {}",
            config.current_version, FIRMWARE_VERSION
        );
        config.current_version.clear();
        config
            .current_version
            .push_str(FIRMWARE_VERSION)
            .map_err(|_| anyhow!("firmware version {} exceeds config capacity", FIRMWARE_VERSION))?;
    }
    if let Err(e) = store.save(&config) {
        warn!("Config not persisted: {}", e);
    }

    // ── 4. WiFi station ───────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_part = EspDefaultNvsPartition::take()?;
    let _wifi = match WifiCredentials::from_build_env() {
        Ok(creds) => {
            let hostname = identity.hostname.as_str();
            match wifi::connect_station(peripherals.modem, sys_loop, nvs_part, &creds, hostname) {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!("WiFi unavailable ({}), checks will fail until it is", e);
                    None
                }
            }
        }
        Err(e) => {
            warn!("WiFi: {}", e);
            None
        }
    };

    // ── 5. Scheduler ──────────────────────────────────────────
    let mut platform = Platform::new();
    let mut sink = LogEventSink::new();
    let mut sched = FotaScheduler::new();
    if let Err(e) = sched.start(config, &mut platform, &mut sink) {
        error!("FOTA disabled: {}", e);
        return Err(anyhow!("invalid FOTA config: {}", e));
    }
    info!("System ready. Entering event loop.");

    // ── 6. Event loop ─────────────────────────────────────────
    loop {
        platform.drain(&mut sched, &mut sink);
        std::thread::sleep(platform.idle_for());
    }
}
