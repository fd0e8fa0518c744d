//! Network device model and discovery.
//!
//! A [`Device`] is the immutable identity of a local NIC: its system name,
//! a friendly name, the loopback flag, the hardware address, and its IP
//! addresses. Discovery goes through the capture library's device list;
//! hardware addresses are read from the platform where available. The
//! gateway is not a real local device — it is synthesized from its
//! configured IP and MAC, since resolving it (ARP/NDP) is out of scope.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{Error, Result};
use crate::layers::MacAddr;

/// An IP address assigned to a device, with its network mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAddr {
    pub ip: IpAddr,
    pub netmask: Option<IpAddr>,
}

/// The stable identity of a local NIC. Immutable once built.
#[derive(Debug, Clone)]
pub struct Device {
    name: String,
    friendly_name: String,
    is_loopback: bool,
    hardware_addr: Option<MacAddr>,
    addrs: Vec<DeviceAddr>,
}

impl Device {
    pub fn new(
        name: impl Into<String>,
        friendly_name: impl Into<String>,
        is_loopback: bool,
        hardware_addr: Option<MacAddr>,
        addrs: Vec<DeviceAddr>,
    ) -> Self {
        Self {
            name: name.into(),
            friendly_name: friendly_name.into(),
            is_loopback,
            hardware_addr,
            addrs,
        }
    }

    /// Synthesize the next-hop gateway from its known IP and MAC.
    pub fn gateway(ip: IpAddr, mac: MacAddr) -> Self {
        Self {
            name: "gateway".into(),
            friendly_name: "gateway".into(),
            is_loopback: false,
            hardware_addr: Some(mac),
            addrs: vec![DeviceAddr { ip, netmask: None }],
        }
    }

    /// Opaque system name, as the capture library knows it.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn is_loopback(&self) -> bool {
        self.is_loopback
    }

    pub fn hardware_addr(&self) -> Option<MacAddr> {
        self.hardware_addr
    }

    pub fn addrs(&self) -> &[DeviceAddr] {
        &self.addrs
    }

    /// First IPv4 address, if any.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.addrs.iter().find_map(|a| match a.ip {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
    }

    /// First IPv6 address, if any.
    pub fn ipv6(&self) -> Option<Ipv6Addr> {
        self.addrs.iter().find_map(|a| match a.ip {
            IpAddr::V6(v6) => Some(v6),
            IpAddr::V4(_) => None,
        })
    }

    /// List all capture-capable devices on this machine.
    pub fn list() -> Result<Vec<Device>> {
        let devices = pcap::Device::list().map_err(|source| Error::HandleOpenFailed {
            device: "<list>".into(),
            source,
        })?;

        Ok(devices
            .into_iter()
            .map(|dev| {
                let is_loopback = dev.flags.is_loopback();
                let hardware_addr = if is_loopback {
                    None
                } else {
                    platform_hardware_addr(&dev.name)
                };
                let addrs = dev
                    .addresses
                    .iter()
                    .map(|a| DeviceAddr {
                        ip: a.addr,
                        netmask: a.netmask,
                    })
                    .collect();
                let friendly_name = dev.desc.clone().unwrap_or_else(|| dev.name.clone());
                Device::new(dev.name, friendly_name, is_loopback, hardware_addr, addrs)
            })
            .collect())
    }

    /// Find a device by system name.
    pub fn find(name: &str) -> Result<Device> {
        Self::list()?
            .into_iter()
            .find(|d| d.name() == name)
            .ok_or_else(|| Error::MissingDevice(name.to_string()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ips = self
            .addrs
            .iter()
            .map(|a| a.ip.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        match self.hardware_addr {
            Some(mac) => write!(f, "{} [{}]: {}", self.friendly_name, mac, ips),
            None => write!(f, "{}: {}", self.friendly_name, ips),
        }
    }
}

/// Read a device's hardware address from the platform.
#[cfg(target_os = "linux")]
fn platform_hardware_addr(name: &str) -> Option<MacAddr> {
    let raw = std::fs::read_to_string(format!("/sys/class/net/{name}/address")).ok()?;
    raw.trim().parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn platform_hardware_addr(_name: &str) -> Option<MacAddr> {
    None
}
