//! Flow-to-handle binding table.
//!
//! Every flow observed on a listen device is recorded here so that replies
//! extracted from the carrier can be delivered back on the device that
//! originated the flow. The table is written by every listen loop and read
//! by the upstream loop concurrently; the concurrent map serializes access.

use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::layers::TransportProtocol;
use crate::types::HandleId;

/// A flow five-tuple. Ports are zero when the transport has no port
/// concept the relay understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub protocol: TransportProtocol,
}

impl FlowKey {
    pub fn new(
        src_ip: IpAddr,
        src_port: u16,
        dst_ip: IpAddr,
        dst_port: u16,
        protocol: TransportProtocol,
    ) -> Self {
        Self {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
            protocol,
        }
    }

    /// The reply direction: endpoints swapped, same protocol.
    pub fn reverse(&self) -> Self {
        Self {
            src_ip: self.dst_ip,
            src_port: self.dst_port,
            dst_ip: self.src_ip,
            dst_port: self.src_port,
            protocol: self.protocol,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}:{}",
            self.protocol, self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

#[derive(Debug, Clone)]
struct NatEntry {
    handle: HandleId,
    last_seen: Instant,
}

/// Concurrent five-tuple → listen-handle map.
#[derive(Debug, Default)]
pub struct NatTable {
    entries: DashMap<FlowKey, NatEntry>,
}

impl NatTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert or overwrite the binding for a flow. Overwrites are
    /// idempotent: the last listen handle to observe the flow wins.
    pub fn remember(&self, key: FlowKey, handle: HandleId) {
        let previous = self.entries.insert(
            key,
            NatEntry {
                handle,
                last_seen: Instant::now(),
            },
        );
        if previous.is_none() {
            tracing::debug!(flow = %key, %handle, "recorded flow");
        }
    }

    /// Look up the handle bound to a flow, refreshing its idle timer.
    pub fn lookup(&self, key: &FlowKey) -> Option<HandleId> {
        self.entries.get_mut(key).map(|mut entry| {
            entry.last_seen = Instant::now();
            entry.handle
        })
    }

    /// Drop bindings idle for longer than `max_idle`. Returns how many
    /// were evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.last_seen.elapsed() <= max_idle);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "swept idle flows");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
