//! The relay core and its runtime.
//!
//! [`Relay`] owns everything the packet pipelines need — the carrier
//! endpoint, the upstream and gateway identities, the sequence and id
//! counters, and the NAT table — and exposes the two pure pipelines:
//! [`Relay::encapsulate`] (outbound) and [`Relay::decapsulate`] (inbound).
//! Neither touches a capture handle, which keeps them testable with plain
//! byte buffers; [`RelayRunner`] wires them to live captures.

mod inbound;
mod outbound;
mod runner;

pub use inbound::Delivery;
pub use runner::RelayRunner;

use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::layers::{EthernetHeader, LinkLayer, LoopbackHeader, MacAddr, NetworkLayer};
use crate::nat::NatTable;

/// How the relay frames carrier traffic on the upstream device.
#[derive(Debug, Clone)]
enum LinkIdentity {
    Loopback,
    Ethernet { src: MacAddr, dst: MacAddr },
}

/// Relay state shared by every capture loop.
#[derive(Debug)]
pub struct Relay {
    up_port: u16,
    server_ip: IpAddr,
    server_port: u16,
    up_dev: Device,
    gateway_ip: IpAddr,
    link_identity: LinkIdentity,
    /// Carrier TCP sequence counter; wraps, advances once per packet.
    seq: AtomicU32,
    /// Outbound IPv4 id counter; wraps, advances once per packet.
    id: AtomicU16,
    nat: NatTable,
}

impl Relay {
    /// Build the relay core. The gateway must carry an address, and unless
    /// the upstream device is loopback, both it and the gateway must carry
    /// hardware addresses.
    pub fn new(
        up_port: u16,
        server_ip: IpAddr,
        server_port: u16,
        up_dev: Device,
        gateway_dev: &Device,
    ) -> Result<Self> {
        let gateway_ip = gateway_dev
            .addrs()
            .first()
            .map(|a| a.ip)
            .ok_or_else(|| Error::MissingDevice("gateway".into()))?;

        let link_identity = if up_dev.is_loopback() {
            LinkIdentity::Loopback
        } else {
            let src = up_dev.hardware_addr().ok_or_else(|| {
                Error::Config(format!(
                    "upstream device {} has no hardware address",
                    up_dev.name()
                ))
            })?;
            let dst = gateway_dev
                .hardware_addr()
                .ok_or_else(|| Error::Config("gateway has no hardware address".into()))?;
            LinkIdentity::Ethernet { src, dst }
        };

        Ok(Self {
            up_port,
            server_ip,
            server_port,
            up_dev,
            gateway_ip,
            link_identity,
            seq: AtomicU32::new(0),
            id: AtomicU16::new(0),
            nat: NatTable::new(),
        })
    }

    /// The flow table.
    pub fn nat(&self) -> &NatTable {
        &self.nat
    }

    fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn next_id(&self) -> u16 {
        self.id.fetch_add(1, Ordering::Relaxed)
    }

    /// Upstream link layer for a freshly built carrier network header.
    fn upstream_link(&self, network: &NetworkLayer) -> LinkLayer {
        match &self.link_identity {
            LinkIdentity::Loopback => LinkLayer::Loopback(LoopbackHeader::new(network)),
            LinkIdentity::Ethernet { src, dst } => {
                LinkLayer::Ethernet(EthernetHeader::new(*src, *dst, network))
            }
        }
    }

    /// Upstream link layer for a pass-through IPv4 packet, where no
    /// network header object exists.
    fn upstream_link_ipv4(&self) -> LinkLayer {
        match &self.link_identity {
            LinkIdentity::Loopback => LinkLayer::Loopback(LoopbackHeader::ipv4()),
            LinkIdentity::Ethernet { src, dst } => {
                LinkLayer::Ethernet(EthernetHeader::ipv4(*src, *dst))
            }
        }
    }
}
