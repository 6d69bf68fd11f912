//! Peer RPC client.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tonic::transport::{Channel, Endpoint};

use meshmon_proto::{agent_client, LocalStatusRequest, NodeStatus, StatusRequest, SystemStatus};

use crate::error::AgentError;
use crate::membership::Member;

/// Port every agent binds for peer RPC traffic.
///
/// Members advertise their gossip address; the agent RPC endpoint is
/// derived from it with this fixed port.
pub const DEFAULT_RPC_PORT: u16 = 7575;

/// Factory resolving a member to a connected [`AgentClient`].
///
/// Injectable so tests can route members to ephemeral listeners or
/// simulate unreachable peers.
pub type DialFn = Arc<
    dyn Fn(&Member) -> Pin<Box<dyn Future<Output = Result<AgentClient, AgentError>> + Send>>
        + Send
        + Sync,
>;

/// The default factory: dial the member's address on [`DEFAULT_RPC_PORT`].
pub fn default_dial() -> DialFn {
    Arc::new(|member: &Member| {
        let addr = format!("{}:{}", member.addr, DEFAULT_RPC_PORT);
        Box::pin(AgentClient::dial(addr))
    })
}

/// Client for the agent peer RPC surface.
pub struct AgentClient {
    inner: agent_client::AgentClient<Channel>,
}

impl AgentClient {
    /// Connect to the agent serving at `addr` (host:port).
    pub async fn dial(addr: impl Into<String>) -> Result<Self, AgentError> {
        let endpoint = Endpoint::from_shared(format!("http://{}", addr.into()))?;
        let channel = endpoint.connect().await?;
        Ok(Self {
            inner: agent_client::AgentClient::new(channel),
        })
    }

    /// The serving agent's latest locally-collected node status.
    pub async fn local_status(&mut self) -> Result<NodeStatus, AgentError> {
        let response = self.inner.local_status(LocalStatusRequest {}).await?;
        response
            .into_inner()
            .status
            .ok_or(AgentError::EmptyResponse)
    }

    /// The serving agent's last cluster snapshot.
    pub async fn status(&mut self) -> Result<SystemStatus, AgentError> {
        let response = self.inner.status(StatusRequest {}).await?;
        response
            .into_inner()
            .status
            .ok_or(AgentError::EmptyResponse)
    }
}
