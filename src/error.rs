//! Error types for Charon.

use std::net::IpAddr;

use thiserror::Error;

use crate::layers::TransportProtocol;

/// Result type alias for Charon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Charon.
///
/// Startup errors (`MissingDevice`, `HandleOpenFailed`, `BpfFilterFailed`,
/// `Config`) abort `open()`. Everything else is a per-packet failure: the
/// packet is dropped with a diagnostic and the capture loop continues.
#[derive(Error, Debug)]
pub enum Error {
    // Startup errors
    #[error("missing {0} device")]
    MissingDevice(String),

    #[error("open capture on {device}: {source}")]
    HandleOpenFailed {
        device: String,
        #[source]
        source: pcap::Error,
    },

    #[error("install filter on {device}: {source}")]
    BpfFilterFailed {
        device: String,
        #[source]
        source: pcap::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    // Layer construction errors
    #[error("address {addr} is not representable as {family}")]
    InvalidAddress { addr: IpAddr, family: &'static str },

    #[error("transport protocol {0:?} not supported by this header")]
    UnsupportedTransport(TransportProtocol),

    #[error("unsupported network layer: {0}")]
    UnsupportedNetwork(String),

    // Pipeline errors
    #[error("outbound ipv6 encapsulation not implemented")]
    UnsupportedOutboundIpv6,

    #[error("encapsulated packet is not ipv4 (version {0})")]
    UnsupportedInnerIp(u8),

    #[error("ip family mismatch: {0}")]
    IpFamilyMismatch(String),

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("serialize: {0}")]
    SerializeFailed(String),

    #[error("inject on {device}: {source}")]
    WriteFailed {
        device: String,
        #[source]
        source: pcap::Error,
    },

    // IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error should abort startup rather than drop a packet.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MissingDevice(_)
                | Error::HandleOpenFailed { .. }
                | Error::BpfFilterFailed { .. }
                | Error::Config(_)
        )
    }
}
