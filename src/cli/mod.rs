//! Command-line interface for Charon.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Charon - link-layer packet relay
#[derive(Parser, Debug)]
#[command(
    name = "charon",
    author,
    version,
    about = "Tunnels raw local traffic to a remote server over a carrier TCP flow",
    long_about = r#"
Charon captures user traffic on one or more listen interfaces, wraps each
packet inside a carrier TCP segment, and injects it on the upstream
interface toward a fixed server. Replies are unwrapped and re-injected on
the interface that originated the flow.

QUICK START:
  charon devices
  charon run -c charon.toml
"#
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay
    Run(RunArgs),

    /// List capture-capable devices
    Devices,
}

/// Arguments for `run`. Anything given here overrides the config file.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Port to sniff on the listen devices
    #[arg(long)]
    pub listen_port: Option<u16>,

    /// Source port of the carrier flow
    #[arg(long)]
    pub up_port: Option<u16>,

    /// Remote server address
    #[arg(long)]
    pub server_ip: Option<IpAddr>,

    /// Remote server port
    #[arg(long)]
    pub server_port: Option<u16>,

    /// Devices to sniff user traffic on (repeatable)
    #[arg(long = "listen-dev")]
    pub listen_devs: Vec<String>,

    /// Upstream egress device
    #[arg(long)]
    pub up_dev: Option<String>,

    /// Gateway IP address
    #[arg(long)]
    pub gateway_ip: Option<IpAddr>,

    /// Gateway hardware address (aa:bb:cc:dd:ee:ff)
    #[arg(long)]
    pub gateway_mac: Option<String>,
}
