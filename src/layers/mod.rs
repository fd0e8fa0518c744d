//! Packet layer construction and serialization.
//!
//! Each layer family is a closed enum — [`LinkLayer`], [`NetworkLayer`],
//! [`TransportLayer`] — so dispatch over layer kinds is exhaustive at
//! compile time. A [`PacketStack`] is an ordered stack of at most one layer
//! per family plus an opaque payload, and serializes in one of two modes:
//! [`serialize`] recomputes lengths and checksums (the transport checksum is
//! bound to the stack's own network header), while [`serialize_raw`] emits
//! the headers byte-for-byte as the caller filled them in.

pub mod checksum;
mod parse;

pub use parse::{LinkKind, PacketView};

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use bytes::BufMut;

use crate::error::{Error, Result};

/// Ethernet header length in bytes.
pub const ETHERNET_HEADER_LEN: usize = 14;
/// DLT_NULL (loopback) pseudo-header length in bytes.
pub const LOOPBACK_HEADER_LEN: usize = 4;
/// UDP header length in bytes.
pub const UDP_HEADER_LEN: usize = 8;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;

// BSD address families used in the DLT_NULL pseudo-header.
const LOOPBACK_FAMILY_INET: u32 = 2;
const LOOPBACK_FAMILY_INET6: u32 = 30;

// TCP flag bits.
const TCP_FIN: u8 = 0x01;
const TCP_SYN: u8 = 0x02;
const TCP_RST: u8 = 0x04;
const TCP_PSH: u8 = 0x08;
const TCP_ACK: u8 = 0x10;

// IPv4 fragmentation flag bits within the flags/fragment-offset word.
const IPV4_FLAG_DF: u16 = 0x4000;
const IPV4_FLAG_MF: u16 = 0x2000;

/// A 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(Error::Config(format!("invalid hardware address: {s}")));
        }
        let mut mac = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            mac[i] = u8::from_str_radix(part, 16)
                .map_err(|_| Error::Config(format!("invalid hardware address: {s}")))?;
        }
        Ok(MacAddr(mac))
    }
}

/// Transport layer protocol tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    Other(u8),
}

impl TransportProtocol {
    /// The IP protocol number.
    pub fn protocol_number(&self) -> u8 {
        match self {
            TransportProtocol::Tcp => 6,
            TransportProtocol::Udp => 17,
            TransportProtocol::Icmp => 1,
            TransportProtocol::Icmpv6 => 58,
            TransportProtocol::Other(n) => *n,
        }
    }

    /// Create from an IP protocol number.
    pub fn from_protocol_number(n: u8) -> Self {
        match n {
            6 => TransportProtocol::Tcp,
            17 => TransportProtocol::Udp,
            1 => TransportProtocol::Icmp,
            58 => TransportProtocol::Icmpv6,
            _ => TransportProtocol::Other(n),
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportProtocol::Tcp => write!(f, "TCP"),
            TransportProtocol::Udp => write!(f, "UDP"),
            TransportProtocol::Icmp => write!(f, "ICMP"),
            TransportProtocol::Icmpv6 => write!(f, "ICMPv6"),
            TransportProtocol::Other(n) => write!(f, "proto-{n}"),
        }
    }
}

/// A TCP header under construction.
#[derive(Debug, Clone)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// Header length in 32-bit words.
    pub data_offset: u8,
    flags: u8,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
}

impl TcpHeader {
    /// A fresh header: no options, PSH+ACK, full window, checksum unset.
    pub fn new(src_port: u16, dst_port: u16, seq: u32, ack: u32) -> Self {
        Self {
            src_port,
            dst_port,
            seq,
            ack,
            data_offset: 5,
            flags: TCP_PSH | TCP_ACK,
            window: 65535,
            checksum: 0,
            urgent: 0,
        }
    }

    /// Reflag SYN/PSH/ACK; other flag bits are left untouched.
    pub fn set_flags(&mut self, syn: bool, psh: bool, ack: bool) {
        self.flags &= !(TCP_SYN | TCP_PSH | TCP_ACK);
        if syn {
            self.flags |= TCP_SYN;
        }
        if psh {
            self.flags |= TCP_PSH;
        }
        if ack {
            self.flags |= TCP_ACK;
        }
    }

    pub fn syn(&self) -> bool {
        self.flags & TCP_SYN != 0
    }

    pub fn psh(&self) -> bool {
        self.flags & TCP_PSH != 0
    }

    pub fn ack(&self) -> bool {
        self.flags & TCP_ACK != 0
    }

    pub fn fin(&self) -> bool {
        self.flags & TCP_FIN != 0
    }

    pub fn rst(&self) -> bool {
        self.flags & TCP_RST != 0
    }

    /// Header length in bytes.
    pub fn header_len(&self) -> usize {
        usize::from(self.data_offset) * 4
    }

    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) {
        buf.put_u16(self.src_port);
        buf.put_u16(self.dst_port);
        buf.put_u32(self.seq);
        buf.put_u32(self.ack);
        buf.put_u8(self.data_offset << 4);
        buf.put_u8(self.flags);
        buf.put_u16(self.window);
        buf.put_u16(self.checksum);
        buf.put_u16(self.urgent);
    }
}

/// A UDP header under construction.
#[derive(Debug, Clone)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// Header + payload length; left 0 until serializer fixup.
    pub length: u16,
    pub checksum: u16,
}

impl UdpHeader {
    pub fn new(src_port: u16, dst_port: u16) -> Self {
        Self {
            src_port,
            dst_port,
            length: 0,
            checksum: 0,
        }
    }

    pub fn header_len(&self) -> usize {
        UDP_HEADER_LEN
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.put_u16(self.src_port);
        buf.put_u16(self.dst_port);
        buf.put_u16(self.length);
        buf.put_u16(self.checksum);
    }
}

/// An IPv4 header under construction.
#[derive(Debug, Clone)]
pub struct Ipv4Header {
    /// Header length in 32-bit words.
    pub ihl: u8,
    pub tos: u8,
    /// Total datagram length; left 0 until fixed up.
    pub total_length: u16,
    pub identification: u16,
    pub dont_fragment: bool,
    pub more_fragments: bool,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    /// Build an IPv4 header for the given transport protocol.
    ///
    /// Both addresses must be IPv4; the protocol must be TCP or UDP.
    /// DF is set, length and checksum stay 0 for later fixup.
    pub fn new(
        src: IpAddr,
        dst: IpAddr,
        identification: u16,
        ttl: u8,
        proto: TransportProtocol,
    ) -> Result<Self> {
        let src = ipv4_addr(src)?;
        let dst = ipv4_addr(dst)?;
        let protocol = match proto {
            TransportProtocol::Tcp | TransportProtocol::Udp => proto.protocol_number(),
            other => return Err(Error::UnsupportedTransport(other)),
        };

        Ok(Self {
            ihl: 5,
            tos: 0,
            total_length: 0,
            identification,
            dont_fragment: true,
            more_fragments: false,
            fragment_offset: 0,
            ttl,
            protocol,
            checksum: 0,
            src,
            dst,
        })
    }

    /// Reflag fragmentation: DF or MF, never both, plus the offset.
    pub fn set_fragmentation(&mut self, df: bool, mf: bool, offset: u16) {
        // MF wins if both are requested, matching the last-write order of
        // the flag word.
        self.more_fragments = mf;
        self.dont_fragment = df && !mf;
        self.fragment_offset = offset;
    }

    /// Header length in bytes.
    pub fn header_len(&self) -> usize {
        usize::from(self.ihl) * 4
    }

    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) {
        buf.put_u8((4 << 4) | (self.ihl & 0x0f));
        buf.put_u8(self.tos);
        buf.put_u16(self.total_length);
        buf.put_u16(self.identification);
        let mut flags_frag = self.fragment_offset & 0x1fff;
        if self.dont_fragment {
            flags_frag |= IPV4_FLAG_DF;
        }
        if self.more_fragments {
            flags_frag |= IPV4_FLAG_MF;
        }
        buf.put_u16(flags_frag);
        buf.put_u8(self.ttl);
        buf.put_u8(self.protocol);
        buf.put_u16(self.checksum);
        buf.put_slice(&self.src.octets());
        buf.put_slice(&self.dst.octets());
    }
}

/// An IPv6 header under construction.
#[derive(Debug, Clone)]
pub struct Ipv6Header {
    pub traffic_class: u8,
    pub flow_label: u32,
    /// Payload length; left 0 until fixed up.
    pub payload_length: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
}

impl Ipv6Header {
    /// Build an IPv6 header for the given transport protocol.
    ///
    /// Both addresses must be IPv6; the next header must be TCP, UDP or
    /// ICMP.
    pub fn new(src: IpAddr, dst: IpAddr, hop_limit: u8, proto: TransportProtocol) -> Result<Self> {
        let src = ipv6_addr(src)?;
        let dst = ipv6_addr(dst)?;
        let next_header = match proto {
            TransportProtocol::Tcp | TransportProtocol::Udp | TransportProtocol::Icmp => {
                proto.protocol_number()
            }
            other => return Err(Error::UnsupportedTransport(other)),
        };

        Ok(Self {
            traffic_class: 0,
            flow_label: 0,
            payload_length: 0,
            next_header,
            hop_limit,
            src,
            dst,
        })
    }

    pub fn header_len(&self) -> usize {
        40
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        let word = (6u32 << 28)
            | (u32::from(self.traffic_class) << 20)
            | (self.flow_label & 0x000f_ffff);
        buf.put_u32(word);
        buf.put_u16(self.payload_length);
        buf.put_u8(self.next_header);
        buf.put_u8(self.hop_limit);
        buf.put_slice(&self.src.octets());
        buf.put_slice(&self.dst.octets());
    }
}

/// An Ethernet II header.
#[derive(Debug, Clone)]
pub struct EthernetHeader {
    pub src: MacAddr,
    pub dst: MacAddr,
    pub ethertype: u16,
}

impl EthernetHeader {
    /// Build an Ethernet header; the ethertype follows the network family.
    pub fn new(src: MacAddr, dst: MacAddr, network: &NetworkLayer) -> Self {
        Self {
            src,
            dst,
            ethertype: ethertype_of(network),
        }
    }

    /// An Ethernet header carrying IPv4, for pass-through frames where no
    /// network header object exists.
    pub fn ipv4(src: MacAddr, dst: MacAddr) -> Self {
        Self {
            src,
            dst,
            ethertype: ETHERTYPE_IPV4,
        }
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.put_slice(&self.dst.octets());
        buf.put_slice(&self.src.octets());
        buf.put_u16(self.ethertype);
    }
}

/// A DLT_NULL pseudo-header for loopback devices.
#[derive(Debug, Clone)]
pub struct LoopbackHeader {
    /// BSD address family, host byte order on the wire.
    pub family: u32,
}

impl LoopbackHeader {
    pub fn new(network: &NetworkLayer) -> Self {
        Self {
            family: loopback_family_of(network),
        }
    }

    /// A loopback pseudo-header carrying IPv4.
    pub fn ipv4() -> Self {
        Self {
            family: LOOPBACK_FAMILY_INET,
        }
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.put_slice(&self.family.to_ne_bytes());
    }
}

/// Link layer variants.
#[derive(Debug, Clone)]
pub enum LinkLayer {
    Loopback(LoopbackHeader),
    Ethernet(EthernetHeader),
}

/// Network layer variants.
#[derive(Debug, Clone)]
pub enum NetworkLayer {
    Ipv4(Ipv4Header),
    Ipv6(Ipv6Header),
}

impl NetworkLayer {
    /// Source and destination addresses, for pseudo-header binding.
    pub fn endpoints(&self) -> (IpAddr, IpAddr) {
        match self {
            NetworkLayer::Ipv4(h) => (IpAddr::V4(h.src), IpAddr::V4(h.dst)),
            NetworkLayer::Ipv6(h) => (IpAddr::V6(h.src), IpAddr::V6(h.dst)),
        }
    }
}

/// Transport layer variants.
#[derive(Debug, Clone)]
pub enum TransportLayer {
    Tcp(TcpHeader),
    Udp(UdpHeader),
}

impl TransportLayer {
    pub fn header_len(&self) -> usize {
        match self {
            TransportLayer::Tcp(h) => h.header_len(),
            TransportLayer::Udp(h) => h.header_len(),
        }
    }

    pub fn protocol(&self) -> TransportProtocol {
        match self {
            TransportLayer::Tcp(_) => TransportProtocol::Tcp,
            TransportLayer::Udp(_) => TransportProtocol::Udp,
        }
    }
}

/// An ordered stack of layers plus payload, ready to serialize.
#[derive(Debug, Clone, Default)]
pub struct PacketStack {
    pub link: Option<LinkLayer>,
    pub network: Option<NetworkLayer>,
    pub transport: Option<TransportLayer>,
    pub payload: Vec<u8>,
}

fn ethertype_of(network: &NetworkLayer) -> u16 {
    match network {
        NetworkLayer::Ipv4(_) => ETHERTYPE_IPV4,
        NetworkLayer::Ipv6(_) => ETHERTYPE_IPV6,
    }
}

fn loopback_family_of(network: &NetworkLayer) -> u32 {
    match network {
        NetworkLayer::Ipv4(_) => LOOPBACK_FAMILY_INET,
        NetworkLayer::Ipv6(_) => LOOPBACK_FAMILY_INET6,
    }
}

fn ipv4_addr(addr: IpAddr) -> Result<Ipv4Addr> {
    match addr {
        IpAddr::V4(v4) => Ok(v4),
        IpAddr::V6(_) => Err(Error::InvalidAddress {
            addr,
            family: "IPv4",
        }),
    }
}

fn ipv6_addr(addr: IpAddr) -> Result<Ipv6Addr> {
    match addr {
        IpAddr::V6(v6) => Ok(v6),
        IpAddr::V4(_) => Err(Error::InvalidAddress {
            addr,
            family: "IPv6",
        }),
    }
}

/// Serialize with fixup: lengths and checksums are recomputed for every
/// layer that carries them. The transport checksum is computed against the
/// stack's own network header; a transport layer without a network layer
/// underneath it cannot be checksummed and fails.
pub fn serialize(stack: &PacketStack) -> Result<Vec<u8>> {
    let mut stack = stack.clone();
    let payload_len = stack.payload.len();

    if let Some(transport) = &mut stack.transport {
        let network = stack.network.as_ref().ok_or_else(|| {
            Error::SerializeFailed("transport layer with no network layer to bind".into())
        })?;
        let (src, dst) = network.endpoints();
        let proto = transport.protocol().protocol_number();

        match transport {
            TransportLayer::Tcp(tcp) => {
                tcp.checksum = 0;
                let mut segment = Vec::with_capacity(tcp.header_len() + payload_len);
                tcp.write_to(&mut segment);
                segment.extend_from_slice(&stack.payload);
                tcp.checksum = checksum::transport(src, dst, proto, &segment);
            }
            TransportLayer::Udp(udp) => {
                udp.length = (UDP_HEADER_LEN + payload_len) as u16;
                udp.checksum = 0;
                let mut segment = Vec::with_capacity(UDP_HEADER_LEN + payload_len);
                udp.write_to(&mut segment);
                segment.extend_from_slice(&stack.payload);
                let sum = checksum::transport(src, dst, proto, &segment);
                // 0 means "no checksum" on the wire for UDP.
                udp.checksum = if sum == 0 { 0xffff } else { sum };
            }
        }
    }

    if let Some(network) = &mut stack.network {
        let transport_len = stack.transport.as_ref().map_or(0, TransportLayer::header_len);
        match network {
            NetworkLayer::Ipv4(ip) => {
                ip.total_length = (ip.header_len() + transport_len + payload_len) as u16;
                ip.checksum = 0;
                let mut header = Vec::with_capacity(ip.header_len());
                ip.write_to(&mut header);
                ip.checksum = checksum::ipv4_header(&header);
            }
            NetworkLayer::Ipv6(ip) => {
                ip.payload_length = (transport_len + payload_len) as u16;
            }
        }
    }

    if let Some(link) = &mut stack.link {
        if let Some(network) = &stack.network {
            match link {
                LinkLayer::Loopback(l) => l.family = loopback_family_of(network),
                LinkLayer::Ethernet(e) => e.ethertype = ethertype_of(network),
            }
        }
    }

    Ok(serialize_raw(&stack))
}

/// Serialize as-is: every header field goes on the wire exactly as the
/// caller set it. Used when checksums and lengths were computed by hand,
/// and on pass-through paths where the bytes must stay bit-identical.
pub fn serialize_raw(stack: &PacketStack) -> Vec<u8> {
    let mut buf = Vec::with_capacity(
        stack.link.as_ref().map_or(0, |l| match l {
            LinkLayer::Loopback(_) => LOOPBACK_HEADER_LEN,
            LinkLayer::Ethernet(_) => ETHERNET_HEADER_LEN,
        }) + stack.network.as_ref().map_or(0, |n| match n {
            NetworkLayer::Ipv4(h) => h.header_len(),
            NetworkLayer::Ipv6(h) => h.header_len(),
        }) + stack.transport.as_ref().map_or(0, TransportLayer::header_len)
            + stack.payload.len(),
    );

    if let Some(link) = &stack.link {
        match link {
            LinkLayer::Loopback(h) => h.write_to(&mut buf),
            LinkLayer::Ethernet(h) => h.write_to(&mut buf),
        }
    }
    if let Some(network) = &stack.network {
        match network {
            NetworkLayer::Ipv4(h) => h.write_to(&mut buf),
            NetworkLayer::Ipv6(h) => h.write_to(&mut buf),
        }
    }
    if let Some(transport) = &stack.transport {
        match transport {
            TransportLayer::Tcp(h) => h.write_to(&mut buf),
            TransportLayer::Udp(h) => h.write_to(&mut buf),
        }
    }
    buf.extend_from_slice(&stack.payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_tcp_header_defaults() {
        let tcp = TcpHeader::new(4001, 443, 7, 0);
        assert_eq!(tcp.data_offset, 5);
        assert_eq!(tcp.header_len(), 20);
        assert_eq!(tcp.window, 65535);
        assert_eq!(tcp.checksum, 0);
        assert!(tcp.psh() && tcp.ack());
        assert!(!tcp.syn() && !tcp.fin() && !tcp.rst());
    }

    #[test]
    fn test_tcp_reflag() {
        let mut tcp = TcpHeader::new(1, 2, 0, 0);
        tcp.set_flags(true, false, false);
        assert!(tcp.syn());
        assert!(!tcp.psh());
        assert!(!tcp.ack());
        tcp.set_flags(false, true, true);
        assert!(!tcp.syn());
        assert!(tcp.psh() && tcp.ack());
    }

    #[test]
    fn test_ipv4_rejects_mixed_addresses() {
        let err = Ipv4Header::new(v4("10.0.0.1"), "::1".parse().unwrap(), 0, 64,
            TransportProtocol::Tcp)
        .unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { .. }));
    }

    #[test]
    fn test_ipv4_rejects_unsupported_transport() {
        let err = Ipv4Header::new(v4("10.0.0.1"), v4("10.0.0.2"), 0, 64,
            TransportProtocol::Icmp)
        .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedTransport(TransportProtocol::Icmp)
        ));
    }

    #[test]
    fn test_ipv6_accepts_icmp_next_header() {
        let h = Ipv6Header::new(
            "fd00::1".parse().unwrap(),
            "fd00::2".parse().unwrap(),
            64,
            TransportProtocol::Icmp,
        )
        .unwrap();
        assert_eq!(h.next_header, 1);
    }

    #[test]
    fn test_fragmentation_flags_never_both() {
        let mut ip =
            Ipv4Header::new(v4("10.0.0.1"), v4("10.0.0.2"), 0, 64, TransportProtocol::Tcp)
                .unwrap();
        assert!(ip.dont_fragment);
        ip.set_fragmentation(true, true, 185);
        assert!(ip.more_fragments);
        assert!(!ip.dont_fragment);
        assert_eq!(ip.fragment_offset, 185);
        ip.set_fragmentation(false, false, 0);
        assert!(!ip.more_fragments && !ip.dont_fragment);
    }

    #[test]
    fn test_ethernet_ethertype_follows_network() {
        let net4 = NetworkLayer::Ipv4(
            Ipv4Header::new(v4("10.0.0.1"), v4("10.0.0.2"), 0, 64, TransportProtocol::Tcp)
                .unwrap(),
        );
        let eth = EthernetHeader::new(
            MacAddr([0, 1, 2, 3, 4, 5]),
            MacAddr([6, 7, 8, 9, 10, 11]),
            &net4,
        );
        assert_eq!(eth.ethertype, ETHERTYPE_IPV4);

        let net6 = NetworkLayer::Ipv6(
            Ipv6Header::new(
                "fd00::1".parse().unwrap(),
                "fd00::2".parse().unwrap(),
                64,
                TransportProtocol::Udp,
            )
            .unwrap(),
        );
        let eth6 = EthernetHeader::new(
            MacAddr([0, 1, 2, 3, 4, 5]),
            MacAddr([6, 7, 8, 9, 10, 11]),
            &net6,
        );
        assert_eq!(eth6.ethertype, ETHERTYPE_IPV6);
    }

    #[test]
    fn test_serialize_fixup_ipv4_tcp() {
        let tcp = TcpHeader::new(50000, 443, 1, 0);
        let ip = Ipv4Header::new(v4("10.0.0.2"), v4("8.8.8.8"), 9, 64, TransportProtocol::Tcp)
            .unwrap();
        let stack = PacketStack {
            link: None,
            network: Some(NetworkLayer::Ipv4(ip)),
            transport: Some(TransportLayer::Tcp(tcp)),
            payload: b"hello".to_vec(),
        };
        let bytes = serialize(&stack).unwrap();

        assert_eq!(bytes.len(), 20 + 20 + 5);
        // Total length was fixed up.
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 45);
        // Header checksum verifies.
        assert!(checksum::verify_ipv4_header(&bytes[..20]));
        // Transport checksum verifies against the pseudo-header.
        assert!(checksum::verify_transport(
            v4("10.0.0.2"),
            v4("8.8.8.8"),
            6,
            &bytes[20..],
        ));
    }

    #[test]
    fn test_serialize_fixup_udp_length() {
        let udp = UdpHeader::new(5353, 53);
        let ip = Ipv4Header::new(v4("10.0.0.2"), v4("1.1.1.1"), 3, 64, TransportProtocol::Udp)
            .unwrap();
        let stack = PacketStack {
            link: None,
            network: Some(NetworkLayer::Ipv4(ip)),
            transport: Some(TransportLayer::Udp(udp)),
            payload: vec![0xab; 11],
        };
        let bytes = serialize(&stack).unwrap();
        // UDP length field = header + payload.
        assert_eq!(u16::from_be_bytes([bytes[24], bytes[25]]), 19);
        assert!(checksum::verify_transport(
            v4("10.0.0.2"),
            v4("1.1.1.1"),
            17,
            &bytes[20..],
        ));
    }

    #[test]
    fn test_serialize_transport_without_network_fails() {
        let stack = PacketStack {
            link: None,
            network: None,
            transport: Some(TransportLayer::Tcp(TcpHeader::new(1, 2, 0, 0))),
            payload: Vec::new(),
        };
        assert!(matches!(
            serialize(&stack).unwrap_err(),
            Error::SerializeFailed(_)
        ));
    }

    #[test]
    fn test_serialize_raw_leaves_fields_alone() {
        let mut tcp = TcpHeader::new(1, 2, 0, 0);
        tcp.checksum = 0xdead;
        let mut ip = Ipv4Header::new(v4("10.0.0.1"), v4("10.0.0.2"), 0, 64,
            TransportProtocol::Tcp)
        .unwrap();
        ip.total_length = 0x1234;
        ip.checksum = 0xbeef;
        let stack = PacketStack {
            link: None,
            network: Some(NetworkLayer::Ipv4(ip)),
            transport: Some(TransportLayer::Tcp(tcp)),
            payload: Vec::new(),
        };
        let bytes = serialize_raw(&stack);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 0x1234);
        assert_eq!(u16::from_be_bytes([bytes[10], bytes[11]]), 0xbeef);
        assert_eq!(u16::from_be_bytes([bytes[36], bytes[37]]), 0xdead);
    }

    #[test]
    fn test_loopback_family_follows_network() {
        let net = NetworkLayer::Ipv4(
            Ipv4Header::new(v4("127.0.0.1"), v4("127.0.0.1"), 0, 64, TransportProtocol::Tcp)
                .unwrap(),
        );
        let lo = LoopbackHeader::new(&net);
        assert_eq!(lo.family, LOOPBACK_FAMILY_INET);
    }

    #[test]
    fn test_mac_addr_round_trip() {
        let mac: MacAddr = "aa:bb:cc:dd:ee:0f".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:0f");
        assert!("aa:bb:cc".parse::<MacAddr>().is_err());
        assert!("zz:bb:cc:dd:ee:ff".parse::<MacAddr>().is_err());
    }
}
