//! FOTA client configuration.
//!
//! Created once at startup (defaults, NVS, or provisioning) and handed to
//! [`FotaScheduler::start`](crate::scheduler::FotaScheduler::start), after
//! which it is read-only.  Every string has a fixed capacity so the config
//! lives entirely inline.
//!
//! # Security
//!
//! Identity fields end up verbatim in request headers.  [`FotaConfig::validate`]
//! rejects control characters so a provisioned value cannot inject extra
//! header lines.

use core::fmt::Write;
use core::net::Ipv4Addr;
use core::time::Duration;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub type HostString = String<64>;
pub type DeviceIdString = String<40>;
pub type TokenString = String<64>;
pub type VersionString = String<16>;
pub type ProjectString = String<32>;
pub type ClientString = String<16>;

/// Firmware version of this build, as reported to the update server.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

const MIN_INTERVAL_SECS: u32 = 10;
const MAX_INTERVAL_SECS: u32 = 7 * 24 * 3600;

/// Update-server connection and device identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FotaConfig {
    // --- Server ---
    /// Literal IPv4 address or DNS name of the update server.
    pub host: HostString,
    /// TCP port of the update server.
    pub port: u16,
    /// Seconds between version checks.
    pub interval_secs: u32,

    // --- Identity ---
    /// Device identifier sent with every version query.
    pub device_id: DeviceIdString,
    /// Authentication token sent with every version query.
    pub token: TokenString,
    /// Version string of the running firmware.
    pub current_version: VersionString,

    // --- Request shape ---
    /// Project path segment in `/firmware/{project}/versions`.
    pub project: ProjectString,
    /// Client tag header value.
    pub client: ClientString,
}

impl Default for FotaConfig {
    fn default() -> Self {
        Self {
            host: fixed("fota.local"),
            port: 80,
            interval_secs: 3600, // hourly
            device_id: String::new(),
            token: String::new(),
            current_version: fixed(FIRMWARE_VERSION),
            project: fixed("fota-client"),
            client: fixed("esp32"),
        }
    }
}

impl FotaConfig {
    /// Build a config from borrowed strings, keeping the default project
    /// and client tag.  Fails if any string exceeds its capacity.
    pub fn new(
        host: &str,
        port: u16,
        interval_secs: u32,
        device_id: &str,
        token: &str,
        current_version: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            host: copy(host, "host exceeds 64 bytes")?,
            port,
            interval_secs,
            device_id: copy(device_id, "device_id exceeds 40 bytes")?,
            token: copy(token, "token exceeds 64 bytes")?,
            current_version: copy(current_version, "current_version exceeds 16 bytes")?,
            ..Self::default()
        })
    }

    /// Override the project path segment.
    pub fn with_project(mut self, project: &str) -> Result<Self, ConfigError> {
        self.project = copy(project, "project exceeds 32 bytes")?;
        Ok(self)
    }

    /// Override the client tag.
    pub fn with_client(mut self, client: &str) -> Result<Self, ConfigError> {
        self.client = copy(client, "client exceeds 16 bytes")?;
        Ok(self)
    }

    /// Range-check every field.  Does not parse `current_version`; the
    /// scheduler reports that separately as
    /// [`ConfigError::InvalidLocalVersion`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() || !is_host_safe(&self.host) {
            return Err(ConfigError::Invalid(
                "host must be a non-empty IPv4 literal or DNS name",
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be 1-65535"));
        }
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&self.interval_secs) {
            return Err(ConfigError::Invalid("interval_secs must be 10-604800"));
        }
        if self.device_id.is_empty() || !is_header_safe(&self.device_id) {
            return Err(ConfigError::Invalid(
                "device_id must be non-empty printable ASCII",
            ));
        }
        if !is_header_safe(&self.token) {
            return Err(ConfigError::Invalid("token must be printable ASCII"));
        }
        if !is_header_safe(&self.client) {
            return Err(ConfigError::Invalid("client must be printable ASCII"));
        }
        if self.project.is_empty() || !is_path_safe(&self.project) {
            return Err(ConfigError::Invalid(
                "project must be non-empty [A-Za-z0-9_-]",
            ));
        }
        Ok(())
    }

    /// The host as an IPv4 literal, if it is one.
    pub fn host_ip(&self) -> Option<Ipv4Addr> {
        self.host.parse().ok()
    }

    /// Polling interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_secs))
    }
}

fn fixed<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    let _ = out.write_str(s);
    out
}

fn copy<const N: usize>(s: &str, err: &'static str) -> Result<String<N>, ConfigError> {
    let mut out = String::new();
    out.push_str(s).map_err(|()| ConfigError::Invalid(err))?;
    Ok(out)
}

pub(crate) fn is_header_safe(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn is_host_safe(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
}

fn is_path_safe(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
