//! Error types for the agent runtime.

use thiserror::Error;

use crate::membership::MembershipError;
use meshmon_cache::CacheError;

/// Errors surfaced by the agent.
///
/// Only configuration and lifecycle-misuse errors cross the public API
/// boundary during normal operation; collection-time failures are
/// reflected structurally in the status payloads instead.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("membership layer: {0}")]
    Membership(#[from] MembershipError),

    #[error("rpc transport: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("rpc call failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("failed to dial member: {0}")]
    Dial(String),

    #[error("peer returned an empty response")]
    EmptyResponse,

    #[error("operation cancelled")]
    Cancelled,

    #[error("cache: {0}")]
    Cache(#[from] CacheError),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("agent already started")]
    AlreadyStarted,

    #[error("agent is not running")]
    NotRunning,
}
