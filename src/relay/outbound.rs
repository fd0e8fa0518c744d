//! Outbound pipeline: captured packet → carrier frame.
//!
//! The carrier IPv4 header is assembled by hand and the whole captured IP
//! datagram rides as raw payload, so serializer fixup cannot be used here:
//! the TCP checksum, the outer total length, and the outer header checksum
//! are computed explicitly before a raw serialize.

use std::net::IpAddr;

use tracing::debug;

use crate::error::{Error, Result};
use crate::layers::{
    self, checksum, Ipv4Header, LinkKind, NetworkLayer, PacketStack, PacketView, TcpHeader,
    TransportLayer, TransportProtocol,
};
use crate::nat::FlowKey;
use crate::types::HandleId;

use super::Relay;

impl Relay {
    /// Wrap one captured frame into a carrier frame ready for injection on
    /// the upstream device, and record the flow against `origin` so the
    /// reply can find its way back.
    ///
    /// The sequence and id counters advance only when a frame is actually
    /// produced; every failure path precedes them.
    pub fn encapsulate(
        &self,
        frame: &[u8],
        link: LinkKind,
        origin: HandleId,
    ) -> Result<Vec<u8>> {
        // Decode the captured packet.
        let view = PacketView::parse(frame, link)?;

        // The tunnel payload is the original packet from its network
        // header onward.
        let payload = view.packet.to_vec();

        // Carrier IP family follows the gateway's primary address family,
        // and everything must line up with it before any counter moves.
        if !self.gateway_ip.is_ipv4() {
            if self.up_dev.ipv6().is_none() {
                return Err(Error::IpFamilyMismatch(format!(
                    "{} has no IPv6 address",
                    self.up_dev.name()
                )));
            }
            return Err(Error::UnsupportedOutboundIpv6);
        }
        if view.src_ip.is_ipv6() {
            return Err(Error::IpFamilyMismatch(
                "cannot carry an IPv6 packet in an IPv4 carrier".into(),
            ));
        }
        let src = self.up_dev.ipv4().ok_or_else(|| {
            Error::IpFamilyMismatch(format!("{} has no IPv4 address", self.up_dev.name()))
        })?;
        let dst = match self.server_ip {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => {
                return Err(Error::InvalidAddress {
                    addr: self.server_ip,
                    family: "IPv4",
                })
            }
        };

        // Carrier transport. The sequence number advances by one per
        // packet, not by payload length: the carrier only abuses TCP's
        // shape and has no peer state machine to satisfy.
        let mut tcp = TcpHeader::new(self.up_port, self.server_port, self.next_seq(), 0);

        let mut ip = Ipv4Header::new(
            IpAddr::V4(src),
            IpAddr::V4(dst),
            self.next_id(),
            view.ttl.wrapping_sub(1),
            TransportProtocol::Tcp,
        )?;

        // Transport checksum over the pseudo-header, the carrier TCP
        // header, and the whole tunnel payload.
        let mut segment = Vec::with_capacity(tcp.header_len() + payload.len());
        tcp.write_to(&mut segment);
        segment.extend_from_slice(&payload);
        tcp.checksum = checksum::tcp_over_ipv4(src, dst, &segment);

        // Outer lengths and header checksum.
        ip.total_length = (ip.header_len() + tcp.header_len() + payload.len()) as u16;
        let mut header = Vec::with_capacity(ip.header_len());
        ip.write_to(&mut header);
        ip.checksum = checksum::ipv4_header(&header);

        let network = NetworkLayer::Ipv4(ip);
        let link_layer = self.upstream_link(&network);

        // Record the flow so replies come back on the originating handle.
        let flow = FlowKey::new(
            view.src_ip,
            view.src_port.unwrap_or(0),
            view.dst_ip,
            view.dst_port.unwrap_or(0),
            view.protocol,
        );
        self.nat().remember(flow, origin);

        debug!(
            flow = %flow,
            bytes = view.packet.len(),
            "redirect outbound packet"
        );

        // All checksums are already in place: raw serialize.
        let stack = PacketStack {
            link: Some(link_layer),
            network: Some(network),
            transport: Some(TransportLayer::Tcp(tcp)),
            payload,
        };
        Ok(layers::serialize_raw(&stack))
    }
}
