//! Blackhole host CLI.
//!
//! Runs the session registry, LAN listener and relay uplink until
//! interrupted. Configuration is resolved from flags and environment
//! per spec §6.

use anyhow::Context;
use blackhole_host::{ControllerConfig, HostConfig, HostController};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "blackhole-host", about = "Remote-terminal host controller")]
struct Args {
    /// LAN listener port. Falls back to BLACKHOLE_PORT, then 9527.
    #[arg(long)]
    port: Option<u16>,

    /// Disable the LAN WebSocket listener; relay-only operation.
    #[arg(long)]
    no_lan: bool,

    /// Shell to spawn for new sessions, overriding the platform default.
    #[arg(long)]
    shell: Option<String>,

    /// Enable dev-mode behavior (spec §6). In release builds this also
    /// requires --confirm-dev-mode.
    #[arg(long)]
    dev_mode: bool,

    /// Required alongside --dev-mode in release builds.
    #[arg(long)]
    confirm_dev_mode: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = HostConfig::resolve(
        args.port,
        args.no_lan,
        args.shell,
        args.dev_mode,
        args.confirm_dev_mode,
    )
    .context("failed to resolve host configuration")?;

    info!(port = config.port, lan_enabled = config.lan_enabled, dev_mode = config.dev_mode, "starting blackhole host");

    let controller = HostController::start(ControllerConfig {
        lan_port: config.lan_enabled.then_some(config.port),
        relay_url: config.relay_url,
        relay_token: config.relay_token,
        shell: config.shell,
    })
    .await
    .context("failed to start host controller")?;

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutting down");
    controller.stop().await;
    Ok(())
}
