//! Charon CLI - link-layer packet relay.

use clap::Parser;
use tokio::signal;
use tracing::info;

use charon::cli::{Cli, Commands, RunArgs};
use charon::config::{init_logging, Config, LoggingConfig};
use charon::device::Device;
use charon::error::Result;
use charon::relay::RelayRunner;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LoggingConfig {
        level: cli.log_level.clone(),
        color: !cli.no_color,
        ..Default::default()
    };
    init_logging(&log_config)?;

    match cli.command {
        Commands::Run(args) => run(args, cli.config).await,
        Commands::Devices => list_devices(),
    }
}

/// Run the relay until interrupted.
async fn run(args: RunArgs, config_path: Option<std::path::PathBuf>) -> Result<()> {
    let mut config = match config_path {
        Some(path) => Config::load(path)?,
        None => default_config(&args)?,
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    let mut runner = RelayRunner::new(config)?;
    runner.open()?;

    info!("press ctrl-c to stop");
    signal::ctrl_c().await?;
    runner.close();
    Ok(())
}

/// Print every capture-capable device.
fn list_devices() -> Result<()> {
    for dev in Device::list()? {
        println!("{} ({})", dev, dev.name());
    }
    Ok(())
}

/// Build a configuration from CLI arguments alone.
fn default_config(args: &RunArgs) -> Result<Config> {
    use charon::config::GatewayConfig;
    use charon::error::Error;

    let server_ip = args
        .server_ip
        .ok_or_else(|| Error::Config("server ip required (--server-ip or a config file)".into()))?;
    let up_dev = args
        .up_dev
        .clone()
        .ok_or_else(|| Error::Config("upstream device required (--up-dev)".into()))?;
    let gateway_ip = args
        .gateway_ip
        .ok_or_else(|| Error::Config("gateway ip required (--gateway-ip)".into()))?;
    let gateway_mac = args
        .gateway_mac
        .clone()
        .ok_or_else(|| Error::Config("gateway mac required (--gateway-mac)".into()))?;

    Ok(Config::new(
        server_ip,
        up_dev,
        GatewayConfig {
            ip: gateway_ip,
            mac: gateway_mac,
        },
    ))
}

/// CLI arguments override whatever the config file said.
fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(port) = args.listen_port {
        config.listen_port = port;
    }
    if let Some(port) = args.up_port {
        config.up_port = port;
    }
    if let Some(ip) = args.server_ip {
        config.server_ip = ip;
    }
    if let Some(port) = args.server_port {
        config.server_port = port;
    }
    if !args.listen_devs.is_empty() {
        config.listen_devs = args.listen_devs.clone();
    }
    if let Some(ref dev) = args.up_dev {
        config.up_dev = dev.clone();
    }
    if let Some(ip) = args.gateway_ip {
        config.gateway.ip = ip;
    }
    if let Some(ref mac) = args.gateway_mac {
        config.gateway.mac = mac.clone();
    }
}
