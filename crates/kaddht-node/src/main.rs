// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `kaddht-node`: runs a full Kademlia node (`serve`) or fires a single
//! admin RPC at a running one (`put`/`get`/`rt`/`forget`/`exit`).
//!
//! `serve` binds a real `UdpTransport`, wires the `kaddht::Node` façade, and
//! blocks on `tokio::signal::ctrl_c()`. Everything else is a short-lived
//! admin client: bind an ephemeral local `UdpTransport`, send one
//! `ADMIN_*` RPC, print the result, exit.

mod config;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use config::NodeConfig;
use kaddht::rpc::RpcService;
use kaddht::{Id, LookupConfig, Node, UdpTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Default admin-RPC deadline for the one-shot CLI subcommands.
const ADMIN_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "kaddht-node")]
#[command(author, version, about = "Kademlia DHT node and admin client", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full node: bind, serve RPCs, GC, and republish until killed.
    Serve {
        /// Address to bind the UDP socket to
        #[arg(long, default_value = "0.0.0.0:7400")]
        bind: String,
        /// Comma-separated bootstrap peer addresses
        #[arg(long, value_delimiter = ',')]
        seeds: Vec<String>,
        /// Address to advertise to peers, if different from `--bind`
        #[arg(long)]
        adv: Option<String>,
        /// Default value TTL, in seconds
        #[arg(long, default_value = "3600")]
        ttl: u64,
        /// Republish interval override, in seconds (default `max(ttl/2, 30s)`)
        #[arg(long)]
        refresh: Option<u64>,
    },
    /// PUT a value on a running node.
    Put {
        #[arg(long)]
        to: String,
        #[arg(long)]
        value: String,
    },
    /// GET a value by its hex key.
    Get {
        hex: String,
        #[arg(long)]
        to: String,
    },
    /// Dump a running node's routing table.
    Rt {
        #[arg(long)]
        to: String,
    },
    /// Forget a key on a running node.
    Forget {
        hex: String,
        #[arg(long)]
        to: String,
    },
    /// Ask a running node to exit.
    Exit {
        #[arg(long)]
        to: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    match args.command {
        Command::Serve { bind, seeds, adv, ttl, refresh } => {
            serve(NodeConfig::new(bind, adv, seeds, ttl, refresh)).await
        }
        Command::Put { to, value } => put(&to, value.into_bytes()).await,
        Command::Get { hex, to } => get(&to, &hex).await,
        Command::Rt { to } => rt(&to).await,
        Command::Forget { hex, to } => forget(&to, &hex).await,
        Command::Exit { to } => admin_exit(&to).await,
    }
}

fn init_logging(log_level: &str) {
    let level = match log_level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).with_target(true).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn serve(config: NodeConfig) -> Result<()> {
    let transport = Arc::new(
        UdpTransport::bind(&config.bind, config.advertised.clone())
            .await
            .with_context(|| format!("binding {}", config.bind))?,
    );
    let self_id = Id::random();
    let node = Node::new(transport, self_id, config.ttl, LookupConfig::default(), config.refresh);

    info!("kaddht-node serving as {} at {}", self_id, node.local_addr());
    if !config.seeds.is_empty() {
        info!("bootstrapping from {} seed(s)", config.seeds.len());
        node.bootstrap(&config.seeds).await;
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received, stopping");
    Ok(())
}

/// Bind an ephemeral local transport and an admin-only `RpcService` (no
/// handlers — this process never answers inbound requests).
async fn admin_client() -> Result<Arc<RpcService<UdpTransport>>> {
    let transport = Arc::new(
        UdpTransport::bind("0.0.0.0:0", None)
            .await
            .context("binding ephemeral admin socket")?,
    );
    let service = RpcService::new(transport, Id::random(), Default::default());
    service.spawn_reader();
    Ok(service)
}

fn parse_key(hex: &str) -> Result<Id> {
    Id::from_hex(hex).ok_or_else(|| anyhow!("'{hex}' is not a 40-character hex key"))
}

async fn put(to: &str, value: Vec<u8>) -> Result<()> {
    let service = admin_client().await?;
    let key = service.admin_put(to, &value, ADMIN_DEADLINE).await.context("ADMIN_PUT")?;
    println!("{key}");
    Ok(())
}

async fn get(to: &str, hex: &str) -> Result<()> {
    let key = parse_key(hex)?;
    let service = admin_client().await?;
    match service.admin_get(to, key, ADMIN_DEADLINE).await.context("ADMIN_GET")? {
        Some(value) => {
            println!("{}", String::from_utf8_lossy(&value));
            Ok(())
        }
        None => Err(anyhow!("not found")),
    }
}

async fn rt(to: &str) -> Result<()> {
    let service = admin_client().await?;
    let contacts = service.admin_rt(to, ADMIN_DEADLINE).await.context("ADMIN_RT")?;
    for c in contacts {
        println!("{}\t{}", c.id, c.addr);
    }
    Ok(())
}

async fn forget(to: &str, hex: &str) -> Result<()> {
    let key = parse_key(hex)?;
    let service = admin_client().await?;
    let existed = service.admin_forget(to, key, ADMIN_DEADLINE).await.context("ADMIN_FORGET")?;
    println!("{existed}");
    Ok(())
}

async fn admin_exit(to: &str) -> Result<()> {
    let service = admin_client().await?;
    service.admin_exit(to, ADMIN_DEADLINE).await.context("ADMIN_EXIT")?;
    Ok(())
}
