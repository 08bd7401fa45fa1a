//! Fleet identity: who this board is to the update server.
//!
//! Every version query carries `X-Device-Id`.  A provisioned id stored in
//! NVS always wins; otherwise the id is derived from the factory eFuse MAC
//! as `FW-` followed by all twelve hex digits, so two boards never share an
//! id even across vendor OUIs.  The station hostname uses only the NIC half
//! (`fota-xxyyzz`) since it is read by people, not by the server.

use core::fmt::{self, Write};

use log::{info, warn};

use crate::config::{is_header_safe, DeviceIdString, FotaConfig};

/// DHCP hostname buffer.
pub type Hostname = heapless::String<24>;

/// Factory MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mac(pub [u8; 6]);

impl Mac {
    /// Read the station MAC burned into eFuse.
    #[cfg(target_os = "espidf")]
    pub fn read() -> Self {
        let mut mac = [0u8; 6];
        // SAFETY: the buffer is the six bytes the call writes.
        unsafe {
            esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
        }
        Self(mac)
    }

    /// Host builds see one fixed board.
    #[cfg(not(target_os = "espidf"))]
    pub fn read() -> Self {
        Self([0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE])
    }

    /// Vendor-assigned half of the address.
    pub fn nic(&self) -> [u8; 3] {
        [self.0[3], self.0[4], self.0[5]]
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

/// Where the id in use came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    Provisioned,
    Derived,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub mac: Mac,
    pub derived_id: DeviceIdString,
    pub hostname: Hostname,
}

impl DeviceIdentity {
    pub fn from_mac(mac: Mac) -> Self {
        let mut derived_id = DeviceIdString::new();
        // 15 bytes always fit the 40-byte id.
        let _ = derived_id.push_str("FW-");
        for b in mac.0 {
            let _ = write!(derived_id, "{:02X}", b);
        }

        let [x, y, z] = mac.nic();
        let mut hostname = Hostname::new();
        let _ = write!(hostname, "fota-{:02x}{:02x}{:02x}", x, y, z);

        Self {
            mac,
            derived_id,
            hostname,
        }
    }

    /// Identity of the board this runs on.
    pub fn local() -> Self {
        Self::from_mac(Mac::read())
    }

    /// Settle `cfg.device_id`.  A usable provisioned id is kept; an empty
    /// one, or one that cannot go into a header, is replaced by the derived
    /// id so a corrupted store does not take the board off the fleet.
    pub fn apply(&self, cfg: &mut FotaConfig) -> IdSource {
        if !cfg.device_id.is_empty() && is_header_safe(&cfg.device_id) {
            return IdSource::Provisioned;
        }
        if !cfg.device_id.is_empty() {
            warn!("ID | stored device id is not header-safe, using {}", self.derived_id);
        }
        cfg.device_id = self.derived_id.clone();
        info!("ID | {} derived from {}", self.derived_id, self.mac);
        IdSource::Derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(last: u8) -> DeviceIdentity {
        DeviceIdentity::from_mac(Mac([0x24, 0x6F, 0x28, 0x10, 0x20, last]))
    }

    #[test]
    fn derived_id_covers_the_whole_mac() {
        let id = board(0x3A);
        assert_eq!(id.derived_id.as_str(), "FW-246F2810203A");
        assert_eq!(id.hostname.as_str(), "fota-10203a");
        assert_eq!(id.mac.to_string(), "24:6f:28:10:20:3a");
    }

    #[test]
    fn boards_sharing_a_nic_suffix_get_distinct_ids() {
        let a = DeviceIdentity::from_mac(Mac([0x24, 0x6F, 0x28, 0xAA, 0xBB, 0xCC]));
        let b = DeviceIdentity::from_mac(Mac([0x84, 0xF7, 0x03, 0xAA, 0xBB, 0xCC]));
        assert_ne!(a.derived_id, b.derived_id);
        assert_eq!(a.hostname, b.hostname);
    }

    #[test]
    fn empty_id_is_filled_and_config_becomes_valid() {
        let me = DeviceIdentity::local();
        let mut cfg = FotaConfig::default();
        assert!(cfg.validate().is_err());

        assert_eq!(me.apply(&mut cfg), IdSource::Derived);
        assert_eq!(cfg.device_id.as_str(), "FW-DEADBEEFCAFE");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn provisioned_id_wins_over_the_mac() {
        let mut cfg = FotaConfig::new("10.0.0.1", 80, 60, "bench-7", "", "0.1.0").unwrap();
        assert_eq!(board(1).apply(&mut cfg), IdSource::Provisioned);
        assert_eq!(cfg.device_id.as_str(), "bench-7");
    }

    #[test]
    fn id_that_would_break_the_request_is_replaced() {
        let mut cfg = FotaConfig::default();
        cfg.device_id.push_str("evil\r\nX-Admin: 1").unwrap();
        assert_eq!(board(7).apply(&mut cfg), IdSource::Derived);
        assert_eq!(cfg.device_id.as_str(), "FW-246F28102007");
        assert!(cfg.validate().is_ok());
    }
}
