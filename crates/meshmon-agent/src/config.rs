//! Agent configuration.

use std::collections::HashMap;
use std::sync::Arc;

use meshmon_cache::Cache;

use crate::error::AgentError;

/// Configuration for a monitoring agent. Immutable after construction.
#[derive(Clone)]
pub struct AgentConfig {
    /// Name of the agent, unique within the cluster.
    ///
    /// Must match the name of the local membership identity so the
    /// agent can match itself to a member record.
    pub name: String,

    /// Addresses the agent binds for RPC traffic.
    ///
    /// Usually at least two: loopback for local queries and a
    /// cluster-visible IP for peer communication.
    pub rpc_addrs: Vec<String>,

    /// RPC address of the local membership provider.
    pub membership_addr: String,

    /// Peers forming the initial cluster configuration. Not final:
    /// new nodes and updates arrive through the membership layer.
    pub initial_peers: Vec<String>,

    /// Tags registered with the membership provider on construction.
    /// A trivial means of attaching extra semantic information.
    pub tags: HashMap<String, String>,

    /// Short-lived storage for the latest cluster snapshot.
    pub cache: Arc<dyn Cache>,
}

impl AgentConfig {
    pub(crate) fn validate(&self) -> Result<(), AgentError> {
        if self.name.is_empty() {
            return Err(AgentError::Config("agent name must not be empty".into()));
        }
        if self.rpc_addrs.is_empty() {
            return Err(AgentError::Config(
                "at least one rpc bind address is required".into(),
            ));
        }
        Ok(())
    }
}
