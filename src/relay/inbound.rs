//! Inbound pipeline: carrier frame → inner packet delivery.
//!
//! The upstream BPF filter guarantees every frame reaching this path is a
//! TCP segment from the server's address and port; its payload is one
//! complete IP packet. The inner bytes are forwarded bit-identical — only
//! the link layer is rebuilt.

use tracing::debug;

use crate::error::{Error, Result};
use crate::layers::{self, LinkKind, PacketStack, PacketView};
use crate::nat::FlowKey;
use crate::types::HandleId;

use super::Relay;

/// The outcome of unwrapping one carrier frame: the frame to inject, and
/// the listen handle bound to the flow. `target` is `None` when no flow
/// binding exists; the caller drops the frame.
#[derive(Debug)]
pub struct Delivery {
    pub frame: Vec<u8>,
    pub target: Option<HandleId>,
}

impl Relay {
    /// Unwrap one carrier frame captured on the upstream device. `link` is
    /// how the upstream capture frames what it reads.
    pub fn decapsulate(&self, frame: &[u8], link: LinkKind) -> Result<Delivery> {
        // Strip the carrier: upstream link layer, outer IP, outer TCP.
        let carrier = PacketView::parse(frame, link)?;
        let inner_bytes = carrier.payload;
        if inner_bytes.is_empty() {
            return Err(Error::MalformedPacket("carrier with empty payload".into()));
        }

        // The payload is a complete IP packet; its version nibble decides.
        // Only IPv4 can appear here in practice — the outbound path never
        // tunnels anything else — so everything other than 4 is refused.
        let version = inner_bytes[0] >> 4;
        if version != 4 {
            return Err(Error::UnsupportedInnerIp(version));
        }
        let inner = PacketView::parse_ip(inner_bytes)?;

        // The reply flow, read back in the outbound direction.
        let flow = FlowKey::new(
            inner.src_ip,
            inner.src_port.unwrap_or(0),
            inner.dst_ip,
            inner.dst_port.unwrap_or(0),
            inner.protocol,
        );
        let target = self.nat().lookup(&flow.reverse());

        debug!(
            flow = %flow,
            bytes = inner.packet.len(),
            bound = target.is_some(),
            "redirect inbound packet"
        );

        // Rebuild the link layer and forward the inner packet verbatim.
        let stack = PacketStack {
            link: Some(self.upstream_link_ipv4()),
            network: None,
            transport: None,
            payload: inner_bytes.to_vec(),
        };
        Ok(Delivery {
            frame: layers::serialize_raw(&stack),
            target,
        })
    }
}
