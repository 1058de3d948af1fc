use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use certflight_core::driver::{self, DriverOptions};
use certflight_core::transport::UdpTransport;
use certflight_core::{FlightNodeBuilder, NodeConfig, Result, Role};

/// Flight-windowed telemetry exchange node
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    role: RoleCommand,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum RoleCommand {
    /// Sensor side: opens the exchange and measures each flight
    Initiator(NodeArgs),
    /// Sink side: answers the most recent sender
    Responder(NodeArgs),
}

#[derive(Args)]
struct NodeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Peer address (initiator: the sink)
    #[arg(short, long)]
    peer: Option<SocketAddr>,

    /// Exchanges per flight
    #[arg(long)]
    flight_size: Option<u32>,

    /// Stop after this many completed flights
    #[arg(long)]
    max_flights: Option<u64>,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_node(role: Role, args: NodeArgs) -> Result<()> {
    let mut config = NodeConfig::load(args.config.as_deref())?;
    if let Some(peer) = args.peer {
        config.peer = Some(peer);
    }
    if let Some(size) = args.flight_size {
        config.flight_size = size;
    }
    config.validate()?;

    let transport = UdpTransport::bind(config.local_addr(role))
        .await?
        .with_loss_rate(config.loss_rate);
    let mut node = FlightNodeBuilder::from_config(role, &config).build(transport)?;

    let options = DriverOptions {
        retransmit_timeout: config.retransmit_timeout(),
        max_flights: args.max_flights,
    };
    driver::run(&mut node, options).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.json);

    let (role, args) = match cli.role {
        RoleCommand::Initiator(args) => (Role::Initiator, args),
        RoleCommand::Responder(args) => (Role::Responder, args),
    };

    match run_node(role, args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%role, error = %e, "node failed");
            ExitCode::FAILURE
        }
    }
}
