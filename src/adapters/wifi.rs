//! WiFi station bring-up.
//!
//! The update lifecycle only needs an IP route to the server, so this
//! adapter is a one-shot: validate credentials, start the station, retry
//! with exponential backoff (2 s → 4 s → 8 s … capped at 60 s) until the
//! netif is up or the attempts run out.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi` driver.
//! - **all other targets**: the host network is used as-is.

use core::fmt;
use core::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
        }
    }
}

impl core::error::Error for WifiError {}

const MAX_BACKOFF: Duration = Duration::from_secs(60);
const CONNECT_ATTEMPTS: u32 = 5;

/// Validated station credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, WifiError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        let mut creds = Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
        };
        creds.ssid.push_str(ssid).map_err(|_| WifiError::InvalidSsid)?;
        creds
            .password
            .push_str(password)
            .map_err(|_| WifiError::InvalidPassword)?;
        Ok(creds)
    }

    /// Credentials baked in at build time via `FOTA_WIFI_SSID` and
    /// `FOTA_WIFI_PASS`.
    pub fn from_build_env() -> Result<Self, WifiError> {
        let ssid = option_env!("FOTA_WIFI_SSID").ok_or(WifiError::NoCredentials)?;
        Self::new(ssid, option_env!("FOTA_WIFI_PASS").unwrap_or(""))
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), WifiError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(WifiError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), WifiError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(WifiError::InvalidPassword);
    }
    Ok(())
}

/// Delay before retry number `attempt` (0-based).
pub fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64 << attempt.min(5)).min(MAX_BACKOFF)
}

/// Start the station and block until the netif has an address.
#[cfg(target_os = "espidf")]
pub fn connect_station(
    modem: esp_idf_svc::hal::modem::Modem,
    sys_loop: esp_idf_svc::eventloop::EspSystemEventLoop,
    nvs: esp_idf_svc::nvs::EspDefaultNvsPartition,
    creds: &WifiCredentials,
    hostname: &str,
) -> anyhow::Result<esp_idf_svc::wifi::EspWifi<'static>> {
    use anyhow::anyhow;
    use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
    use log::{info, warn};

    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs))?;
    if let Err(e) = esp_wifi.sta_netif_mut().set_hostname(hostname) {
        warn!("WiFi: hostname not set: {:?}", e);
    }
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: creds
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: creds
            .password
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method: if creds.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        },
        ..Default::default()
    }))?;
    wifi.start()?;
    info!("WiFi: connecting to '{}'", creds.ssid);

    let mut attempt = 0;
    loop {
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                let ip = wifi.wifi().sta_netif().get_ip_info()?;
                info!("WiFi: connected, ip={}", ip.ip);
                break;
            }
            Err(e) if attempt + 1 < CONNECT_ATTEMPTS => {
                let delay = backoff(attempt);
                warn!("WiFi: attempt {} failed ({}), retry in {:?}", attempt + 1, e, delay);
                let _ = wifi.disconnect();
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                return Err(anyhow!("wifi connect failed after {} attempts: {}", CONNECT_ATTEMPTS, e));
            }
        }
    }

    drop(wifi);
    Ok(esp_wifi)
}
