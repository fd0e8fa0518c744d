//! Proxy runtime: opens the capture handles, installs the BPF filters,
//! runs one capture loop per handle, and owns shutdown.
//!
//! Each device gets two captures: a receive capture owned by its loop
//! thread, and a send capture behind a mutex so any loop can inject on it.
//! A blocked reader therefore never starves writers. Receive captures use
//! a short poll timeout so `close()` can interrupt a loop; per-packet
//! failures are logged and never stop a loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use pcap::{Active, Capture, Linktype};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::layers::LinkKind;
use crate::types::HandleId;
use crate::SNAPLEN;

use super::Relay;

/// Receive poll granularity; bounds shutdown latency.
const POLL_TIMEOUT_MS: i32 = 250;

/// A shared send capture for one device.
struct Injector {
    device: String,
    cap: Mutex<Capture<Active>>,
}

impl Injector {
    fn open(dev: &Device) -> Result<Self> {
        Ok(Self {
            device: dev.name().to_string(),
            cap: Mutex::new(open_capture(dev)?),
        })
    }

    /// Inject one frame. The mutex makes concurrent writes atomic at
    /// frame boundaries.
    fn inject(&self, frame: &[u8]) -> Result<()> {
        self.cap
            .lock()
            .sendpacket(frame)
            .map_err(|source| Error::WriteFailed {
                device: self.device.clone(),
                source,
            })
    }
}

/// The proxy runtime.
pub struct RelayRunner {
    config: Config,
    relay: Arc<Relay>,
    listen_devs: Vec<Device>,
    up_dev: Device,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl RelayRunner {
    /// Resolve the configured devices and build the relay core.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let listen_devs = config
            .listen_devs
            .iter()
            .map(|name| Device::find(name))
            .collect::<Result<Vec<_>>>()?;
        let up_dev = Device::find(&config.up_dev)?;
        let gateway = Device::gateway(config.gateway.ip, config.gateway.mac.parse()?);

        let relay = Relay::new(
            config.up_port,
            config.server_ip,
            config.server_port,
            up_dev.clone(),
            &gateway,
        )?;

        Ok(Self {
            config,
            relay: Arc::new(relay),
            listen_devs,
            up_dev,
            running: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        })
    }

    /// The relay core (counters, flow table).
    pub fn relay(&self) -> Arc<Relay> {
        Arc::clone(&self.relay)
    }

    /// Open all handles, install filters, and spawn the capture loops.
    /// Returns once everything is running.
    pub fn open(&mut self) -> Result<()> {
        for dev in &self.listen_devs {
            info!(device = %dev, "listening");
        }
        info!(
            upstream = %self.up_dev,
            gateway = %self.config.gateway.ip,
            server = %self.config.server_ip,
            server_port = self.config.server_port,
            "routing upstream"
        );

        self.running.store(true, Ordering::SeqCst);

        // Send captures first: the upstream injector is shared by every
        // listen loop, the listen injectors by the upstream loop.
        let up_tx = Arc::new(Injector::open(&self.up_dev)?);
        let listen_txs: Arc<Vec<Injector>> = Arc::new(
            self.listen_devs
                .iter()
                .map(Injector::open)
                .collect::<Result<Vec<_>>>()?,
        );

        // One loop per listen device.
        for (index, dev) in self.listen_devs.iter().enumerate() {
            let mut rx = open_capture(dev)?;
            let filter = listen_filter(&self.config);
            rx.filter(&filter, true)
                .map_err(|source| Error::BpfFilterFailed {
                    device: dev.name().to_string(),
                    source,
                })?;
            debug!(device = dev.name(), filter = %filter, "filter installed");

            let relay = Arc::clone(&self.relay);
            let up_tx = Arc::clone(&up_tx);
            let running = Arc::clone(&self.running);
            let link = capture_link_kind(&rx);
            let origin = HandleId(index);
            let handle = thread::Builder::new()
                .name(format!("listen-{}", dev.name()))
                .spawn(move || listen_loop(&relay, rx, link, origin, &up_tx, &running))?;
            self.threads.push(handle);
        }

        // The upstream loop.
        let mut rx = open_capture(&self.up_dev)?;
        let filter = upstream_filter(&self.config);
        rx.filter(&filter, true)
            .map_err(|source| Error::BpfFilterFailed {
                device: self.up_dev.name().to_string(),
                source,
            })?;
        debug!(device = self.up_dev.name(), filter = %filter, "filter installed");

        let relay = Arc::clone(&self.relay);
        let running = Arc::clone(&self.running);
        let link = capture_link_kind(&rx);
        let handle = thread::Builder::new()
            .name(format!("upstream-{}", self.up_dev.name()))
            .spawn(move || upstream_loop(&relay, rx, link, &listen_txs, &running))?;
        self.threads.push(handle);

        // Flow table housekeeping.
        let relay = Arc::clone(&self.relay);
        let running = Arc::clone(&self.running);
        let idle_timeout = self.config.nat.idle_timeout;
        let sweep_interval = self.config.nat.sweep_interval;
        let handle = thread::Builder::new()
            .name("nat-sweep".into())
            .spawn(move || sweep_loop(&relay, idle_timeout, sweep_interval, &running))?;
        self.threads.push(handle);

        info!("relay up");
        Ok(())
    }

    /// Stop all loops and close their handles.
    pub fn close(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        info!("relay closed");
    }
}

impl Drop for RelayRunner {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_capture(dev: &Device) -> Result<Capture<Active>> {
    Capture::from_device(dev.name())
        .and_then(|cap| {
            cap.promisc(true)
                .snaplen(SNAPLEN)
                .timeout(POLL_TIMEOUT_MS)
                .open()
        })
        .map_err(|source| Error::HandleOpenFailed {
            device: dev.name().to_string(),
            source,
        })
}

/// How frames on this capture are framed, from its data-link type.
fn capture_link_kind(cap: &Capture<Active>) -> LinkKind {
    let datalink = cap.get_datalink();
    if datalink == Linktype::NULL || datalink == Linktype::LOOP {
        LinkKind::Loopback
    } else {
        LinkKind::Ethernet
    }
}

fn listen_filter(config: &Config) -> String {
    format!(
        "tcp && dst port {} && not (src host {} && src port {})",
        config.listen_port, config.server_ip, config.server_port
    )
}

fn upstream_filter(config: &Config) -> String {
    format!(
        "tcp && dst port {} && (src host {} && src port {})",
        config.up_port, config.server_ip, config.server_port
    )
}

/// Capture user traffic on one listen device and push it upstream.
fn listen_loop(
    relay: &Relay,
    mut rx: Capture<Active>,
    link: LinkKind,
    origin: HandleId,
    up_tx: &Injector,
    running: &AtomicBool,
) {
    while running.load(Ordering::Relaxed) {
        match rx.next_packet() {
            Ok(packet) => match relay.encapsulate(packet.data, link, origin) {
                Ok(frame) => {
                    if let Err(e) = up_tx.inject(&frame) {
                        warn!(error = %e, "carrier injection failed");
                    }
                }
                Err(e) => warn!(error = %e, "dropped outbound packet"),
            },
            Err(pcap::Error::TimeoutExpired) => {}
            Err(e) => {
                if running.load(Ordering::Relaxed) {
                    warn!(error = %e, "listen capture ended");
                }
                break;
            }
        }
    }
}

/// Capture carrier traffic on the upstream device and deliver the inner
/// packets to their originating listen devices.
fn upstream_loop(
    relay: &Relay,
    mut rx: Capture<Active>,
    link: LinkKind,
    listen_txs: &[Injector],
    running: &AtomicBool,
) {
    while running.load(Ordering::Relaxed) {
        match rx.next_packet() {
            Ok(packet) => match relay.decapsulate(packet.data, link) {
                Ok(delivery) => match delivery.target {
                    Some(HandleId(index)) => {
                        if let Err(e) = listen_txs[index].inject(&delivery.frame) {
                            warn!(error = %e, "inbound injection failed");
                        }
                    }
                    None => debug!("inbound packet without a flow binding, dropped"),
                },
                Err(e) => warn!(error = %e, "dropped inbound packet"),
            },
            Err(pcap::Error::TimeoutExpired) => {}
            Err(e) => {
                if running.load(Ordering::Relaxed) {
                    warn!(error = %e, "upstream capture ended");
                }
                break;
            }
        }
    }
}

/// Periodically drop idle flow bindings.
fn sweep_loop(
    relay: &Relay,
    idle_timeout: Duration,
    sweep_interval: Duration,
    running: &AtomicBool,
) {
    let step = Duration::from_millis(POLL_TIMEOUT_MS as u64);
    let mut since_sweep = Duration::ZERO;
    while running.load(Ordering::Relaxed) {
        thread::sleep(step);
        since_sweep += step;
        if since_sweep >= sweep_interval {
            relay.nat().evict_idle(idle_timeout);
            since_sweep = Duration::ZERO;
        }
    }
}
