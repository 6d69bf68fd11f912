//! meshmond — the cluster health monitoring daemon.
//!
//! Runs one monitoring agent on the local node. Peers are enumerated by
//! the membership layer; this binary wires a static member list, which
//! is enough for fixed clusters and local setups. Gossip-backed
//! providers plug in behind the same `MembershipProvider` trait.
//!
//! # Usage
//!
//! ```text
//! meshmond --name node-1 \
//!     --rpc-addr 127.0.0.1:7575 --rpc-addr 10.0.0.1:7575 \
//!     --peer node-2=10.0.0.2:7946 --tag role=master
//! ```

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use meshmon_agent::{Agent, AgentConfig, Member, MemberState, StaticMembership};
use meshmon_cache::InMemoryCache;

#[derive(Parser)]
#[command(name = "meshmond", about = "Cluster health monitoring daemon")]
struct Cli {
    /// Agent name, unique within the cluster. Must match the local
    /// membership identity.
    #[arg(long)]
    name: String,

    /// RPC bind address (repeatable; typically loopback plus a
    /// cluster-visible IP).
    #[arg(long = "rpc-addr", default_value = "127.0.0.1:7575")]
    rpc_addrs: Vec<String>,

    /// RPC address of the local membership provider.
    #[arg(long, default_value = "127.0.0.1:7373")]
    membership_addr: String,

    /// Initial peer to join (host:port, repeatable).
    #[arg(long = "join")]
    initial_peers: Vec<String>,

    /// Tag to register with the membership layer, as key=value
    /// (repeatable).
    #[arg(long = "tag", value_parser = parse_tag)]
    tags: Vec<(String, String)>,

    /// Known cluster member, as name=host:port (repeatable).
    #[arg(long = "peer", value_parser = parse_peer)]
    peers: Vec<(String, IpAddr, u16)>,
}

fn parse_tag(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid tag `{s}`: expected key=value"))?;
    Ok((key.to_string(), value.to_string()))
}

fn parse_peer(s: &str) -> Result<(String, IpAddr, u16), String> {
    let (name, addr) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid peer `{s}`: expected name=host:port"))?;
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid peer address `{addr}`: expected host:port"))?;
    let host: IpAddr = host
        .parse()
        .map_err(|e| format!("invalid peer host `{host}`: {e}"))?;
    let port: u16 = port
        .parse()
        .map_err(|e| format!("invalid peer port `{port}`: {e}"))?;
    Ok((name.to_string(), host, port))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,meshmond=debug,meshmon=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let tags: HashMap<String, String> = cli.tags.iter().cloned().collect();

    // Static membership: this node plus every --peer entry.
    let local_ip: IpAddr = cli
        .rpc_addrs
        .first()
        .and_then(|a| a.rsplit_once(':'))
        .and_then(|(host, _)| host.parse().ok())
        .unwrap_or_else(|| "127.0.0.1".parse().expect("loopback address"));

    let mut members = vec![Member {
        name: cli.name.clone(),
        addr: local_ip,
        port: 0,
        state: MemberState::Alive,
        tags: tags.clone(),
    }];
    for (name, addr, port) in &cli.peers {
        members.push(Member {
            name: name.clone(),
            addr: *addr,
            port: *port,
            state: MemberState::Alive,
            tags: HashMap::new(),
        });
    }

    let membership = Arc::new(StaticMembership::new(&cli.name, members));
    info!(
        members = cli.peers.len() + 1,
        membership_addr = %cli.membership_addr,
        "membership provider initialized (static)"
    );

    let config = AgentConfig {
        name: cli.name.clone(),
        rpc_addrs: cli.rpc_addrs.clone(),
        membership_addr: cli.membership_addr.clone(),
        initial_peers: cli.initial_peers.clone(),
        tags,
        cache: Arc::new(InMemoryCache::new()),
    };

    let mut agent = Agent::new(config, membership).await?;
    agent.start()?;
    info!(name = %cli.name, addrs = ?agent.rpc_addrs(), "agent serving");

    if !cli.initial_peers.is_empty() {
        let joined = agent.join(&cli.initial_peers).await?;
        info!(joined, "initial join complete");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    agent.close().await?;
    info!("meshmond stopped");
    Ok(())
}
