//! Captured-frame parsing.
//!
//! A [`PacketView`] is a borrowed view over one captured frame: the flow
//! endpoints, the transport tag, and the byte ranges the relay needs — the
//! whole IP datagram (for re-encapsulation) and the transport payload (for
//! carrier extraction). Parsing never copies.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{Error, Result};
use crate::layers::{TransportProtocol, ETHERNET_HEADER_LEN, LOOPBACK_HEADER_LEN, UDP_HEADER_LEN};

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;

/// How frames on a device are framed at the link layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Ethernet,
    /// DLT_NULL: a 4-byte host-order address family word.
    Loopback,
}

/// A parsed view over a captured frame (or a bare IP datagram).
#[derive(Debug, Clone)]
pub struct PacketView<'a> {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    /// IPv4 TTL. Zero for IPv6: the hop limit is deliberately not carried
    /// over, matching the relay's outbound TTL derivation.
    pub ttl: u8,
    pub protocol: TransportProtocol,
    /// Transport ports, present only for TCP and UDP.
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    /// The IP datagram: network header through end of payload, with any
    /// link-layer trailer padding stripped via the IP length field.
    pub packet: &'a [u8],
    /// The transport payload within `packet`.
    pub payload: &'a [u8],
}

impl<'a> PacketView<'a> {
    /// Parse a captured frame, stripping the link layer first.
    pub fn parse(frame: &'a [u8], link: LinkKind) -> Result<Self> {
        let offset = match link {
            LinkKind::Ethernet => {
                if frame.len() < ETHERNET_HEADER_LEN {
                    return Err(Error::MalformedPacket("truncated ethernet header".into()));
                }
                let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
                match ethertype {
                    ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => {}
                    other => {
                        return Err(Error::UnsupportedNetwork(format!(
                            "ethertype {other:#06x}"
                        )))
                    }
                }
                ETHERNET_HEADER_LEN
            }
            LinkKind::Loopback => {
                if frame.len() < LOOPBACK_HEADER_LEN {
                    return Err(Error::MalformedPacket("truncated loopback header".into()));
                }
                LOOPBACK_HEADER_LEN
            }
        };

        Self::parse_ip(&frame[offset..])
    }

    /// Parse a bare IP datagram.
    pub fn parse_ip(datagram: &'a [u8]) -> Result<Self> {
        if datagram.is_empty() {
            return Err(Error::MalformedPacket("empty datagram".into()));
        }

        match datagram[0] >> 4 {
            4 => Self::parse_ipv4(datagram),
            6 => Self::parse_ipv6(datagram),
            other => Err(Error::UnsupportedNetwork(format!("IP version {other}"))),
        }
    }

    fn parse_ipv4(data: &'a [u8]) -> Result<Self> {
        if data.len() < 20 {
            return Err(Error::MalformedPacket("ipv4 header too short".into()));
        }

        let header_len = usize::from(data[0] & 0x0f) * 4;
        if header_len < 20 || data.len() < header_len {
            return Err(Error::MalformedPacket("ipv4 header truncated".into()));
        }

        // The captured frame may carry link-layer trailer padding; the IP
        // total length bounds the real datagram.
        let total_len = usize::from(u16::from_be_bytes([data[2], data[3]]));
        if total_len < header_len {
            return Err(Error::MalformedPacket("ipv4 length shorter than header".into()));
        }
        let packet = &data[..total_len.min(data.len())];

        let ttl = data[8];
        let protocol = TransportProtocol::from_protocol_number(data[9]);
        let src_ip = IpAddr::V4(Ipv4Addr::new(data[12], data[13], data[14], data[15]));
        let dst_ip = IpAddr::V4(Ipv4Addr::new(data[16], data[17], data[18], data[19]));

        let (src_port, dst_port, payload_offset) =
            parse_transport(packet, header_len, protocol);

        Ok(Self {
            src_ip,
            dst_ip,
            ttl,
            protocol,
            src_port,
            dst_port,
            packet,
            payload: &packet[payload_offset.min(packet.len())..],
        })
    }

    fn parse_ipv6(data: &'a [u8]) -> Result<Self> {
        if data.len() < 40 {
            return Err(Error::MalformedPacket("ipv6 header too short".into()));
        }

        let payload_len = usize::from(u16::from_be_bytes([data[4], data[5]]));
        let packet = &data[..(40 + payload_len).min(data.len())];

        let mut src = [0u8; 16];
        let mut dst = [0u8; 16];
        src.copy_from_slice(&data[8..24]);
        dst.copy_from_slice(&data[24..40]);

        let (protocol, header_len) = skip_ipv6_extension_headers(packet, data[6], 40);
        let (src_port, dst_port, payload_offset) =
            parse_transport(packet, header_len, protocol);

        Ok(Self {
            src_ip: IpAddr::V6(Ipv6Addr::from(src)),
            dst_ip: IpAddr::V6(Ipv6Addr::from(dst)),
            ttl: 0,
            protocol,
            src_port,
            dst_port,
            packet,
            payload: &packet[payload_offset.min(packet.len())..],
        })
    }

}

/// Extract TCP/UDP ports and locate the payload. Unknown transports keep
/// their ports unknown and the payload starts right after the IP header.
fn parse_transport(
    packet: &[u8],
    header_len: usize,
    protocol: TransportProtocol,
) -> (Option<u16>, Option<u16>, usize) {
    if packet.len() < header_len + 4 {
        return (None, None, header_len);
    }

    match protocol {
        TransportProtocol::Tcp | TransportProtocol::Udp => {
            let src = u16::from_be_bytes([packet[header_len], packet[header_len + 1]]);
            let dst = u16::from_be_bytes([packet[header_len + 2], packet[header_len + 3]]);

            let transport_len = match protocol {
                TransportProtocol::Tcp => {
                    if packet.len() > header_len + 12 {
                        usize::from(packet[header_len + 12] >> 4) * 4
                    } else {
                        20
                    }
                }
                _ => UDP_HEADER_LEN,
            };

            (Some(src), Some(dst), header_len + transport_len)
        }
        _ => (None, None, header_len),
    }
}

/// Walk past IPv6 extension headers to the transport protocol.
fn skip_ipv6_extension_headers(
    data: &[u8],
    next_header: u8,
    mut offset: usize,
) -> (TransportProtocol, usize) {
    const HOP_BY_HOP: u8 = 0;
    const ROUTING: u8 = 43;
    const FRAGMENT: u8 = 44;
    const DESTINATION: u8 = 60;

    let mut current = next_header;
    loop {
        match current {
            HOP_BY_HOP | ROUTING | DESTINATION => {
                if data.len() < offset + 2 {
                    break;
                }
                current = data[offset];
                offset += (usize::from(data[offset + 1]) + 1) * 8;
            }
            FRAGMENT => {
                if data.len() < offset + 8 {
                    break;
                }
                current = data[offset];
                offset += 8;
            }
            _ => break,
        }
        if offset >= data.len() {
            break;
        }
    }

    (TransportProtocol::from_protocol_number(current), offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an Ethernet + IPv4 + TCP frame by hand.
    fn sample_frame(trailer_padding: usize) -> Vec<u8> {
        let payload = b"GET /";
        let total_len = 20 + 20 + payload.len();

        let mut frame = Vec::new();
        // Ethernet: dst, src, ethertype.
        frame.extend_from_slice(&[0xff; 6]);
        frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        // IPv4.
        frame.push(0x45);
        frame.push(0);
        frame.extend_from_slice(&(total_len as u16).to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x2a, 0x40, 0x00]); // id, DF
        frame.push(64); // ttl
        frame.push(6); // tcp
        frame.extend_from_slice(&[0, 0]); // checksum (unverified here)
        frame.extend_from_slice(&[10, 0, 0, 2]);
        frame.extend_from_slice(&[8, 8, 8, 8]);
        // TCP.
        frame.extend_from_slice(&50000u16.to_be_bytes());
        frame.extend_from_slice(&443u16.to_be_bytes());
        frame.extend_from_slice(&[0; 8]); // seq, ack
        frame.extend_from_slice(&[0x50, 0x18, 0xff, 0xff]);
        frame.extend_from_slice(&[0; 4]); // checksum, urgent
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&vec![0u8; trailer_padding]);
        frame
    }

    #[test]
    fn test_parse_ethernet_ipv4_tcp() {
        let frame = sample_frame(0);
        let view = PacketView::parse(&frame, LinkKind::Ethernet).unwrap();

        assert_eq!(view.src_ip, "10.0.0.2".parse::<IpAddr>().unwrap());
        assert_eq!(view.dst_ip, "8.8.8.8".parse::<IpAddr>().unwrap());
        assert_eq!(view.ttl, 64);
        assert_eq!(view.protocol, TransportProtocol::Tcp);
        assert_eq!(view.src_port, Some(50000));
        assert_eq!(view.dst_port, Some(443));
        assert_eq!(view.packet.len(), 45);
        assert_eq!(view.payload, b"GET /");
    }

    #[test]
    fn test_trailer_padding_is_stripped() {
        // Short frames get padded to the Ethernet minimum; the view must
        // bound the datagram by the IP total length.
        let frame = sample_frame(9);
        let view = PacketView::parse(&frame, LinkKind::Ethernet).unwrap();
        assert_eq!(view.packet.len(), 45);
        assert_eq!(view.payload, b"GET /");
    }

    #[test]
    fn test_non_ip_ethertype_rejected() {
        let mut frame = sample_frame(0);
        frame[12..14].copy_from_slice(&0x0806u16.to_be_bytes()); // ARP
        let err = PacketView::parse(&frame, LinkKind::Ethernet).unwrap_err();
        assert!(matches!(err, Error::UnsupportedNetwork(_)));
    }

    #[test]
    fn test_truncated_frames_rejected() {
        let frame = sample_frame(0);
        assert!(matches!(
            PacketView::parse(&frame[..10], LinkKind::Ethernet).unwrap_err(),
            Error::MalformedPacket(_)
        ));
        assert!(matches!(
            PacketView::parse_ip(&frame[14..30]).unwrap_err(),
            Error::MalformedPacket(_)
        ));
        assert!(PacketView::parse_ip(&[]).is_err());
    }

    #[test]
    fn test_unknown_transport_keeps_ports_unknown() {
        let mut frame = sample_frame(0);
        frame[14 + 9] = 47; // GRE
        let view = PacketView::parse(&frame, LinkKind::Ethernet).unwrap();
        assert_eq!(view.protocol, TransportProtocol::Other(47));
        assert_eq!(view.src_port, None);
        assert_eq!(view.dst_port, None);
    }

    #[test]
    fn test_loopback_frame() {
        let inner = &sample_frame(0)[14..];
        let mut frame = 2u32.to_ne_bytes().to_vec();
        frame.extend_from_slice(inner);
        let view = PacketView::parse(&frame, LinkKind::Loopback).unwrap();
        assert_eq!(view.src_port, Some(50000));
    }

    #[test]
    fn test_bad_version_nibble() {
        let mut datagram = sample_frame(0)[14..].to_vec();
        datagram[0] = 0x95;
        assert!(matches!(
            PacketView::parse_ip(&datagram).unwrap_err(),
            Error::UnsupportedNetwork(_)
        ));
    }

    #[test]
    fn test_parse_ipv6_udp() {
        let payload = b"dns?";
        let mut datagram = Vec::new();
        datagram.extend_from_slice(&[0x60, 0, 0, 0]); // version, tc, flow
        datagram.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        datagram.push(17); // next header: UDP
        datagram.push(64); // hop limit
        datagram.extend_from_slice(&"fd00::1".parse::<Ipv6Addr>().unwrap().octets());
        datagram.extend_from_slice(&"fd00::2".parse::<Ipv6Addr>().unwrap().octets());
        datagram.extend_from_slice(&5353u16.to_be_bytes());
        datagram.extend_from_slice(&53u16.to_be_bytes());
        datagram.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        datagram.extend_from_slice(&[0, 0]);
        datagram.extend_from_slice(payload);

        let view = PacketView::parse_ip(&datagram).unwrap();
        assert_eq!(view.protocol, TransportProtocol::Udp);
        assert_eq!(view.src_port, Some(5353));
        assert_eq!(view.dst_port, Some(53));
        // Hop limit intentionally not propagated as TTL.
        assert_eq!(view.ttl, 0);
        assert_eq!(view.payload, payload);
    }
}
