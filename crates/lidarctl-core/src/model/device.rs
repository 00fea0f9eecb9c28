// ── Device domain types ──

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Address the appliance answers on out of the box.
pub const DEFAULT_LIDAR_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 20, 20);

/// Placeholder shown and persisted while no interface has been chosen.
pub const UNSET_INTERFACE: &str = "unset";

/// The physical appliance this session drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub ip_address: Ipv4Addr,
    /// OS interface name the device is cabled to, if chosen yet.
    pub network_interface: Option<String>,
}

impl Device {
    pub fn new(ip_address: Ipv4Addr, network_interface: Option<String>) -> Self {
        Self {
            ip_address,
            network_interface: network_interface.filter(|name| !is_unset(name)),
        }
    }

    pub fn interface_name(&self) -> &str {
        self.network_interface.as_deref().unwrap_or(UNSET_INTERFACE)
    }

    pub fn has_interface(&self) -> bool {
        self.network_interface.is_some()
    }
}

impl Default for Device {
    fn default() -> Self {
        Self {
            ip_address: DEFAULT_LIDAR_IP,
            network_interface: None,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.ip_address, self.interface_name())
    }
}

/// Whether an interface string means "no interface".
pub fn is_unset(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNSET_INTERFACE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_sentinel_becomes_none() {
        let device = Device::new(DEFAULT_LIDAR_IP, Some("unset".into()));
        assert!(!device.has_interface());
        assert_eq!(device.interface_name(), "unset");

        let device = Device::new(DEFAULT_LIDAR_IP, Some("  ".into()));
        assert!(device.network_interface.is_none());
    }

    #[test]
    fn display_names_address_and_interface() {
        let device = Device::new(DEFAULT_LIDAR_IP, Some("enp3s0".into()));
        assert_eq!(device.to_string(), "192.168.20.20 via enp3s0");
    }
}
