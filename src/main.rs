use bifrost::Relay;
use bifrost::config::{RelayConfig, normalize_suffix};
use bifrost::relay::nat64::{DualStackMode, NoSynthesis};
use bifrost::server::RelayServer;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Suffix-rewriting DNS relay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to listen on for client queries
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Upstream DNS server
    #[arg(short, long)]
    upstream: Option<SocketAddr>,

    /// Suffix clients append to relayed names
    #[arg(short, long)]
    suffix: Option<String>,

    /// TOML file with local and fake rules
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Preferred family for paired AAAA queries (auto, ipv4, ipv6)
    #[arg(long)]
    ipv6_mode: Option<DualStackMode>,

    /// Pair AAAA queries with a sibling A query
    #[arg(long)]
    dual_stack: bool,
}

fn load_config(cli: Cli) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    let mut config = RelayConfig::from_env()?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(upstream) = cli.upstream {
        config.upstream_addr = upstream;
    }
    if let Some(suffix) = cli.suffix {
        config.suffix = normalize_suffix(&suffix)?;
    }
    if let Some(rules) = cli.rules {
        config.rules_file = Some(rules);
    }
    if let Some(mode) = cli.ipv6_mode {
        config.ipv6_mode = mode;
    }
    config.dual_stack_pairing |= cli.dual_stack;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match load_config(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e);
        }
    };

    let matchers = config.load_matchers()?;
    info!(
        "Loaded rules: {} local addresses, {} local domains, {} fake addresses, {} fake domains",
        matchers.local_ip.len(),
        matchers.local_domain.len(),
        matchers.fake_ip.len(),
        matchers.fake_domain.len()
    );

    let mut relay = Relay::new(config.suffix.clone(), matchers);
    if config.dual_stack_pairing {
        info!("Dual-stack pairing enabled, mode {}", config.ipv6_mode);
        relay = relay.with_dual_stack(config.ipv6_mode, Box::new(NoSynthesis));
    }

    let server = RelayServer::bind(&config).await?;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    let stats = server.run(relay, shutdown_rx).await?;
    info!("Final statistics: {}", stats);
    Ok(())
}
