//! Membership provider contract.
//!
//! Gossip membership is an external collaborator: the agent only needs
//! to enumerate members, register its tags, and request joins. Real
//! deployments back this trait with a gossip client; [`StaticMembership`]
//! covers single-node operation and tests.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use meshmon_proto::{member_status, MemberStatus};

/// Errors from the membership layer.
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("membership provider unavailable: {0}")]
    Unavailable(String),

    #[error("membership provider closed")]
    Closed,
}

/// Liveness state of a member as reported by the membership layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    Alive,
    Leaving,
    Left,
    Failed,
}

impl MemberState {
    pub fn to_wire(self) -> member_status::Type {
        match self {
            MemberState::Alive => member_status::Type::Alive,
            MemberState::Leaving => member_status::Type::Leaving,
            MemberState::Left => member_status::Type::Left,
            MemberState::Failed => member_status::Type::Failed,
        }
    }
}

/// A cluster member as enumerated by the membership provider.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub addr: IpAddr,
    pub port: u16,
    pub state: MemberState,
    pub tags: HashMap<String, String>,
}

impl Member {
    /// Derive the wire-level membership record for this member.
    pub fn to_member_status(&self) -> MemberStatus {
        MemberStatus {
            name: self.name.clone(),
            status: self.state.to_wire() as i32,
            tags: self.tags.clone(),
            addr: format!("{}:{}", self.addr, self.port),
        }
    }
}

/// Contract of the external gossip membership service.
#[async_trait]
pub trait MembershipProvider: Send + Sync {
    /// Enumerate current cluster members.
    async fn members(&self) -> Result<Vec<Member>, MembershipError>;

    /// Add and remove tags on the local member.
    async fn update_tags(
        &self,
        add: HashMap<String, String>,
        remove: Vec<String>,
    ) -> Result<(), MembershipError>;

    /// Ask the membership layer to join the cluster formed by `peers`.
    /// Returns the number of peers joined.
    async fn join(&self, peers: Vec<String>, no_replay: bool) -> Result<usize, MembershipError>;

    /// Release the provider's resources.
    async fn close(&self) -> Result<(), MembershipError>;
}

/// A provider over a fixed member list.
///
/// Does not gossip: `join` is a no-op and membership never changes
/// unless [`set_members`] replaces the list. Suitable for single-node
/// deployments and tests.
///
/// [`set_members`]: StaticMembership::set_members
pub struct StaticMembership {
    local: String,
    members: Mutex<Vec<Member>>,
    closed: AtomicBool,
}

impl StaticMembership {
    pub fn new(local: impl Into<String>, members: Vec<Member>) -> Self {
        Self {
            local: local.into(),
            members: Mutex::new(members),
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the member list.
    pub async fn set_members(&self, members: Vec<Member>) {
        *self.members.lock().await = members;
    }
}

#[async_trait]
impl MembershipProvider for StaticMembership {
    async fn members(&self) -> Result<Vec<Member>, MembershipError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MembershipError::Closed);
        }
        Ok(self.members.lock().await.clone())
    }

    async fn update_tags(
        &self,
        add: HashMap<String, String>,
        remove: Vec<String>,
    ) -> Result<(), MembershipError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MembershipError::Closed);
        }
        let mut members = self.members.lock().await;
        if let Some(local) = members.iter_mut().find(|m| m.name == self.local) {
            local.tags.extend(add);
            for key in &remove {
                local.tags.remove(key);
            }
        }
        Ok(())
    }

    async fn join(&self, peers: Vec<String>, _no_replay: bool) -> Result<usize, MembershipError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MembershipError::Closed);
        }
        debug!(peers = peers.len(), "static membership ignores join");
        Ok(0)
    }

    async fn close(&self) -> Result<(), MembershipError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
