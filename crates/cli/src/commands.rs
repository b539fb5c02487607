//! CLI subcommands.
//!
//! `ping` stands up an in-process cluster from the membership table (one
//! server per node address, each answering `Node.Ping`) and sends a single
//! RPC through [`RpcTransport`]. The failure flags force each local failure
//! path so operators can see exactly what a caller would get back.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Subcommand};
use corelib::{NetworkAddress, Node, NodeId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use transport::{
    AddressResolver, Context, Dispatch, Gossip, LocalConnector, MembershipConfig, Registry,
    RpcContext, RpcTransport, Stopper, Transport,
};

pub const PING_METHOD: &str = "Node.Ping";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the membership table.
    Nodes {
        /// JSON membership file.
        #[arg(long)]
        membership: PathBuf,
    },
    /// Print the current address of a node.
    Resolve {
        #[arg(long)]
        membership: PathBuf,
        node: u64,
    },
    /// Send Node.Ping to a node through the transport.
    Ping(PingArgs),
}

#[derive(Debug, Clone, Args)]
pub struct PingArgs {
    #[arg(long)]
    pub membership: PathBuf,

    pub node: u64,

    /// Payload echoed back by the target.
    #[arg(long, default_value = "ping")]
    pub payload: String,

    /// Deliver the reply on a completion channel instead of blocking.
    #[arg(long = "async")]
    pub async_mode: bool,

    /// Request shutdown before sending.
    #[arg(long)]
    pub stopped: bool,

    /// Mark the target's connection unhealthy.
    #[arg(long)]
    pub unhealthy: bool,

    /// Refuse connections to the target's address.
    #[arg(long)]
    pub closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingRequest {
    pub payload: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub node_id: NodeId,
    pub payload: String,
}

/// Output of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Nodes(Vec<Node>),
    Address { node_id: NodeId, address: NetworkAddress },
    Pong { mode: &'static str, response: PingResponse },
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Nodes(nodes) => {
                for node in nodes {
                    writeln!(f, "{}\t{}", node.id, node.address)?;
                }
                write!(f, "{} node(s)", nodes.len())
            }
            CommandResult::Address { node_id, address } => write!(f, "node {} -> {}", node_id, address),
            CommandResult::Pong { mode, response } => write!(
                f,
                "pong from node {} ({}): {}",
                response.node_id, mode, response.payload
            ),
        }
    }
}

impl Command {
    pub async fn execute(self) -> anyhow::Result<CommandResult> {
        match self {
            Command::Nodes { membership } => {
                let config = load(&membership)?;
                Ok(CommandResult::Nodes(Gossip::from_config(&config).nodes()))
            }
            Command::Resolve { membership, node } => {
                let config = load(&membership)?;
                resolve(&config, NodeId(node)).await
            }
            Command::Ping(args) => {
                let config = load(&args.membership)?;
                ping(&config, &args).await
            }
        }
    }
}

fn load(path: &Path) -> anyhow::Result<MembershipConfig> {
    MembershipConfig::load(path)
        .with_context(|| format!("loading membership from {}", path.display()))
}

pub async fn resolve(config: &MembershipConfig, node_id: NodeId) -> anyhow::Result<CommandResult> {
    let address = Gossip::from_config(config).resolve(node_id).await?;
    Ok(CommandResult::Address { node_id, address })
}

/// Serve `Node.Ping` at every member's address and ping `args.node`.
pub async fn ping(config: &MembershipConfig, args: &PingArgs) -> anyhow::Result<CommandResult> {
    let target = NodeId(args.node);
    let gossip = Arc::new(Gossip::from_config(config));

    let connector = LocalConnector::new();
    for node in &config.nodes {
        if args.closed && node.id == target {
            continue;
        }
        connector.serve(node.address.clone(), ping_server(node.id));
    }

    let stopper = Stopper::new();
    let context = Arc::new(Context::new(connector, stopper.clone()));
    if args.unhealthy {
        if let Some(addr) = gossip.node_address(target) {
            context.client(&addr).set_healthy(false);
        }
    }
    if args.stopped {
        stopper.stop();
    }

    let transport = RpcTransport::new(gossip, context);
    let request = PingRequest {
        payload: args.payload.clone(),
    };
    info!(node_id = %target, async_mode = args.async_mode, "sending ping");

    if args.async_mode {
        let (done, mut completions) = mpsc::unbounded_channel();
        transport
            .send(
                target,
                PING_METHOD,
                request,
                Dispatch::Async {
                    reply: PingResponse::default(),
                    done,
                },
            )
            .await?;
        let call = completions
            .recv()
            .await
            .context("completion channel closed without a result")?;
        Ok(CommandResult::Pong {
            mode: "async",
            response: call.into_result()?,
        })
    } else {
        let mut response = PingResponse::default();
        transport
            .send(target, PING_METHOD, request, Dispatch::Sync { reply: &mut response })
            .await?;
        Ok(CommandResult::Pong {
            mode: "sync",
            response,
        })
    }
}

fn ping_server(node_id: NodeId) -> Registry {
    let registry = Registry::new();
    registry.register(PING_METHOD, move |request: PingRequest| {
        Ok::<_, String>(PingResponse {
            node_id,
            payload: request.payload,
        })
    });
    registry
}
