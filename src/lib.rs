//! # Charon
//!
//! Link-layer packet relay: the client side of a raw-traffic tunnel.
//!
//! Charon sniffs user traffic on a set of listen interfaces, wraps each
//! captured packet — from its network header onward — into the payload of a
//! carrier TCP segment addressed to a fixed server, and injects the carrier
//! frame on the upstream interface. Carrier segments coming back from the
//! server are unwrapped and the inner packet is re-injected, verbatim, on
//! the interface that originated the matching flow.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  capture   ┌─────────────────────────────┐
//! │ listen dev 0 │──────────▶│                             │
//! ├──────────────┤            │  outbound: parse, wrap,     │  inject
//! │ listen dev 1 │──────────▶│  checksum, register flow    │─────────▶ upstream ──▶ server
//! ├──────────────┤            │                             │
//! │     ...      │──────────▶│     ┌────────────────┐      │
//! └──────────────┘            │     │   NAT table    │      │
//!        ▲                    │     │ 5-tuple → dev  │      │
//!        │ inject             │     └────────────────┘      │
//!        │                    │                             │  capture
//!        └────────────────────│  inbound: unwrap, restore   │◀───────── upstream ◀── server
//!                             │  link layer, deliver        │
//!                             └─────────────────────────────┘
//! ```
//!
//! The relay does not speak TCP to the server in any meaningful sense: the
//! carrier flow is a sequence of hand-built segments whose payloads are
//! whole IP packets, one packet per segment, with no framing. The paired
//! server implementation is expected to match.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)] // Frame lengths are bounded by the snap length

pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod layers;
pub mod nat;
pub mod relay;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Snap length for capture handles: a full Ethernet frame plus slack,
/// which is as much as the relay ever needs to re-wrap.
pub const SNAPLEN: i32 = 1600;
