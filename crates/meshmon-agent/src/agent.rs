//! The monitoring agent runtime.
//!
//! Owns the periodic status-update loop, the local and cluster status
//! collectors, the latest-local-status slot, and the RPC server
//! lifecycle. One collection cycle fans `LocalStatus` queries out to
//! every cluster member concurrently and aggregates the responses,
//! tolerating per-member failures, into a single cluster verdict.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use meshmon_cache::Cache;
use meshmon_health::{Checker, Probes, Registry};
use meshmon_proto::{
    member_status, node_status, system_status, timestamp_from, MemberStatus, NodeStatus,
    SystemStatus,
};

use crate::client::{default_dial, DialFn};
use crate::clock::{Clock, SystemClock};
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::membership::{Member, MembershipProvider};
use crate::server::RpcServer;

/// Time between status update collections.
pub const STATUS_UPDATE_PERIOD: Duration = Duration::from_secs(30);

/// Time to wait for one collection cycle before cancelling it.
pub const STATUS_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// A cluster-health monitoring agent.
///
/// Constructed with [`Agent::new`] (binds listeners, registers tags),
/// driven by [`Agent::start`] (spawns the RPC servers and the
/// status-update loop), and torn down with [`Agent::close`].
pub struct Agent {
    state: Arc<AgentState>,
    shutdown: CancellationToken,
    rpc: RpcServer,
    loop_handle: Option<JoinHandle<()>>,
    running: bool,
}

/// State shared between the agent, its RPC service, and collection
/// tasks.
pub(crate) struct AgentState {
    pub(crate) name: String,
    pub(crate) registry: RwLock<Registry>,
    pub(crate) membership: Arc<dyn MembershipProvider>,
    pub(crate) cache: Arc<dyn Cache>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) dial: DialFn,
    /// Latest locally-collected node status. Written only by local
    /// collection; serving an inbound RPC never refreshes it.
    pub(crate) local_status: Mutex<Arc<NodeStatus>>,
    pub(crate) update_period: Duration,
    pub(crate) query_timeout: Duration,
}

impl Agent {
    /// Create an agent: validate the configuration, bind the RPC
    /// listeners, and register tags with the membership provider.
    pub async fn new(
        config: AgentConfig,
        membership: Arc<dyn MembershipProvider>,
    ) -> Result<Self, AgentError> {
        config.validate()?;

        let mut listeners = Vec::with_capacity(config.rpc_addrs.len());
        let mut bound = Vec::with_capacity(config.rpc_addrs.len());
        for addr in &config.rpc_addrs {
            let parsed: SocketAddr = addr
                .parse()
                .map_err(|e| AgentError::Config(format!("malformed rpc address {addr}: {e}")))?;
            let listener = TcpListener::bind(parsed)
                .await
                .map_err(|e| AgentError::Config(format!("failed to bind {addr}: {e}")))?;
            bound.push(listener.local_addr()?);
            listeners.push(listener);
        }

        membership
            .update_tags(config.tags.clone(), Vec::new())
            .await?;

        let state = Arc::new(AgentState {
            name: config.name.clone(),
            registry: RwLock::new(Registry::new()),
            membership,
            cache: config.cache,
            clock: Arc::new(SystemClock),
            dial: default_dial(),
            local_status: Mutex::new(Arc::new(empty_node_status(&config.name))),
            update_period: STATUS_UPDATE_PERIOD,
            query_timeout: STATUS_QUERY_TIMEOUT,
        });

        Ok(Self {
            state,
            shutdown: CancellationToken::new(),
            rpc: RpcServer::new(listeners, bound),
            loop_handle: None,
            running: false,
        })
    }

    /// Replace the clock (for testing). Must be called before `start`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.state_mut().clock = clock;
        self
    }

    /// Replace the peer dial factory (for testing). Must be called
    /// before `start`.
    pub fn with_dial(mut self, dial: DialFn) -> Self {
        self.state_mut().dial = dial;
        self
    }

    /// Override the loop intervals (for testing). Must be called before
    /// `start`.
    pub fn with_intervals(mut self, update_period: Duration, query_timeout: Duration) -> Self {
        let state = self.state_mut();
        state.update_period = update_period;
        state.query_timeout = query_timeout;
        self
    }

    fn state_mut(&mut self) -> &mut AgentState {
        Arc::get_mut(&mut self.state).expect("agent state mutated after start")
    }

    /// Start the agent's background tasks: the RPC servers and the
    /// status-update loop. Calling `start` twice is a programming
    /// error.
    pub fn start(&mut self) -> Result<(), AgentError> {
        if self.running {
            return Err(AgentError::AlreadyStarted);
        }
        self.rpc.start(Arc::clone(&self.state));
        let state = Arc::clone(&self.state);
        let shutdown = self.shutdown.clone();
        self.loop_handle = Some(tokio::spawn(status_update_loop(state, shutdown)));
        self.running = true;
        info!(name = %self.state.name, "agent started");
        Ok(())
    }

    /// Stop all background activity and release resources: the RPC
    /// servers stop accepting, in-flight collection observes
    /// cancellation, and the membership client is closed.
    pub async fn close(&mut self) -> Result<(), AgentError> {
        if !self.running {
            return Err(AgentError::NotRunning);
        }
        self.running = false;

        self.rpc.stop();
        self.shutdown.cancel();
        if let Some(handle) = self.loop_handle.take() {
            let _ = handle.await;
        }
        self.rpc.join().await;
        self.state.membership.close().await?;
        info!(name = %self.state.name, "agent stopped");
        Ok(())
    }

    /// Ask the membership layer to join the cluster formed by `peers`.
    pub async fn join(&self, peers: &[String]) -> Result<usize, AgentError> {
        let joined = self
            .state
            .membership
            .join(peers.to_vec(), false)
            .await?;
        info!(joined, "joined cluster peers");
        Ok(joined)
    }

    /// Install a checker at the end of the registry.
    pub async fn add_checker(&self, checker: Arc<dyn Checker>) {
        self.state.registry.write().await.add(checker);
    }

    /// The latest locally-collected node status.
    pub async fn local_status(&self) -> NodeStatus {
        (*self.state.recent_local_status().await).clone()
    }

    /// The last cluster snapshot from the status cache.
    pub fn recent_status(&self) -> Result<SystemStatus, AgentError> {
        Ok(self.state.cache.recent_status()?)
    }

    /// Addresses the RPC server is actually bound to. Useful when the
    /// configuration requested ephemeral ports.
    pub fn rpc_addrs(&self) -> &[SocketAddr] {
        self.rpc.bound_addrs()
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }
}

/// One member's contribution to a collection cycle.
struct MemberResult {
    member: Member,
    status: Result<NodeStatus, AgentError>,
}

impl AgentState {
    pub(crate) async fn recent_local_status(&self) -> Arc<NodeStatus> {
        self.local_status.lock().await.clone()
    }

    /// Execute the registered checkers against the local node.
    ///
    /// Checkers run serialized in registry order, so probe ordering in
    /// the output is structural. A checker still pending when `ctx` is
    /// cancelled is recorded as a failed probe rather than omitted;
    /// silent omission would yield a spuriously healthy rollup.
    async fn run_checks(&self, ctx: &CancellationToken) -> NodeStatus {
        let checkers = self.registry.read().await.snapshot();
        let mut probes = Probes::new();
        for checker in checkers {
            debug!(checker = checker.name(), "running checker");
            let outcome = tokio::select! {
                _ = ctx.cancelled() => None,
                reporter = run_checker(Arc::clone(&checker)) => Some(reporter),
            };
            match outcome {
                Some(reporter) => probes.extend(reporter),
                None => {
                    debug!(checker = checker.name(), "checker cancelled before completion");
                    probes.add_failure(checker.name(), "checker cancelled");
                }
            }
        }
        NodeStatus {
            name: self.name.clone(),
            status: probes.status() as i32,
            member_status: None,
            probes: probes.into_probes(),
        }
    }

    /// Collect the local node's status and publish it as the latest
    /// local snapshot.
    pub(crate) async fn collect_local(
        &self,
        ctx: &CancellationToken,
        member: &Member,
    ) -> NodeStatus {
        let mut status = self.run_checks(ctx).await;
        status.member_status = Some(member.to_member_status());

        *self.local_status.lock().await = Arc::new(status.clone());
        status
    }

    /// Collect the cluster status by querying every known member.
    ///
    /// Membership enumeration failure aborts the cycle; per-member
    /// failures substitute an unknown node status so the aggregate
    /// still accounts for every member.
    pub(crate) async fn collect_cluster(
        self: &Arc<Self>,
        ctx: &CancellationToken,
    ) -> Result<SystemStatus, AgentError> {
        let members = self.membership.members().await?;
        debug!(members = members.len(), "collecting cluster status");

        let mut collected: HashMap<String, NodeStatus> = HashMap::with_capacity(members.len());
        if !members.is_empty() {
            let (tx, mut rx) = mpsc::channel::<MemberResult>(members.len());
            let mut tasks = JoinSet::new();

            for member in members.iter().cloned() {
                let tx = tx.clone();
                let ctx = ctx.clone();
                if member.name == self.name {
                    let state = Arc::clone(self);
                    tasks.spawn(async move {
                        let status = state.collect_local(&ctx, &member).await;
                        let _ = tx
                            .send(MemberResult {
                                member,
                                status: Ok(status),
                            })
                            .await;
                    });
                } else {
                    let dial = self.dial.clone();
                    tasks.spawn(async move {
                        let status = tokio::select! {
                            _ = ctx.cancelled() => Err(AgentError::Cancelled),
                            res = query_member(&dial, &member) => res,
                        };
                        let _ = tx.send(MemberResult { member, status }).await;
                    });
                }
            }
            drop(tx);

            // Barrier: every member task finishes before the drain.
            while tasks.join_next().await.is_some() {}

            while let Some(result) = rx.recv().await {
                let node = match result.status {
                    Ok(node) => node,
                    Err(e) => {
                        info!(
                            member = %result.member.name,
                            addr = %result.member.addr,
                            error = %e,
                            "failed to query member status"
                        );
                        unknown_node_status(&result.member)
                    }
                };
                collected.insert(result.member.name.clone(), node);
            }
        }

        // Output order mirrors membership iteration order.
        let nodes: Vec<NodeStatus> = members
            .iter()
            .map(|m| {
                collected
                    .remove(&m.name)
                    .unwrap_or_else(|| unknown_node_status(m))
            })
            .collect();

        Ok(SystemStatus {
            status: system_rollup(&nodes) as i32,
            timestamp: Some(timestamp_from(self.clock.now())),
            nodes,
        })
    }
}

async fn run_checker(checker: Arc<dyn Checker>) -> Probes {
    let mut reporter = Probes::new();
    checker.check(&mut reporter).await;
    reporter
}

/// Dial a remote member and fetch its latest local status.
async fn query_member(dial: &DialFn, member: &Member) -> Result<NodeStatus, AgentError> {
    let mut client = dial(member).await?;
    client.local_status().await
}

/// The long-running loop that periodically refreshes the cluster
/// status. At most one collection cycle is in flight at a time; an
/// overrunning cycle is cancelled and the next tick fires on schedule.
async fn status_update_loop(state: Arc<AgentState>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = state.clock.sleep(state.update_period) => {}
            _ = shutdown.cancelled() => return,
        }

        let ctx = shutdown.child_token();
        let collection = tokio::spawn(run_collection(Arc::clone(&state), ctx.clone()));

        tokio::select! {
            // run_collection cancels ctx once the cycle is over.
            _ = ctx.cancelled() => {}
            _ = shutdown.cancelled() => {
                ctx.cancel();
                let _ = collection.await;
                return;
            }
        }
    }
}

/// Run one collection cycle under the query deadline and store the
/// result. Errors are logged, never propagated: the last cached
/// snapshot stays authoritative.
async fn run_collection(state: Arc<AgentState>, ctx: CancellationToken) {
    let collect = state.collect_cluster(&ctx);
    tokio::pin!(collect);

    let result = tokio::select! {
        res = &mut collect => res,
        _ = state.clock.sleep(state.query_timeout) => {
            info!("status query deadline exceeded, cancelling collection");
            // Cancel rather than drop: pending checkers and peer
            // queries report cancellation and the cycle still yields a
            // well-formed snapshot.
            ctx.cancel();
            collect.await
        }
    };

    match result {
        Ok(status) => {
            if let Err(e) = state.cache.update_status(status) {
                warn!(error = %e, "failed to store cluster status in cache");
            }
        }
        Err(e) => info!(error = %e, "error collecting cluster status"),
    }
    ctx.cancel();
}

/// Aggregate node statuses into the cluster verdict.
///
/// Degraded dominates: any degraded node or any member not alive marks
/// the cluster degraded, and partial visibility (some nodes unknown
/// while others are healthy) does too. The cluster is unknown only
/// when there is nothing to go on: no members, or every node unknown.
pub(crate) fn system_rollup(nodes: &[NodeStatus]) -> system_status::Type {
    if nodes.is_empty() {
        return system_status::Type::Unknown;
    }

    let mut unknown = 0;
    for node in nodes {
        let alive = node
            .member_status
            .as_ref()
            .map(|m| m.status == member_status::Type::Alive as i32)
            .unwrap_or(false);
        if node.status == node_status::Type::Degraded as i32 || !alive {
            return system_status::Type::Degraded;
        }
        if node.status == node_status::Type::Unknown as i32 {
            unknown += 1;
        }
    }

    if unknown == nodes.len() {
        system_status::Type::Unknown
    } else if unknown > 0 {
        system_status::Type::Degraded
    } else {
        system_status::Type::Healthy
    }
}

/// An unknown node status standing in for a member that could not be
/// queried.
pub(crate) fn unknown_node_status(member: &Member) -> NodeStatus {
    NodeStatus {
        name: member.name.clone(),
        status: node_status::Type::Unknown as i32,
        member_status: Some(member.to_member_status()),
        probes: Vec::new(),
    }
}

/// The local status published before the first collection.
pub(crate) fn empty_node_status(name: &str) -> NodeStatus {
    NodeStatus {
        name: name.to_string(),
        status: node_status::Type::Unknown as i32,
        member_status: Some(MemberStatus {
            name: name.to_string(),
            status: member_status::Type::None as i32,
            tags: HashMap::new(),
            addr: String::new(),
        }),
        probes: Vec::new(),
    }
}
