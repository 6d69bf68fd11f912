//! meshmon-agent — the cluster-health monitoring agent runtime.
//!
//! An agent runs on every node of a cluster. It periodically executes
//! its registered health checkers against the local node, fans
//! `LocalStatus` queries out to every peer enumerated by the membership
//! provider, aggregates the results into a cluster-level verdict, and
//! stores the snapshot in the status cache. Peers (and operators) read
//! back through the gRPC surface in [`meshmon_proto`].
//!
//! # Architecture
//!
//! ```text
//! Agent
//!   ├── status-update loop (periodic tick, injectable clock)
//!   │     └── cluster collector
//!   │           ├── local collector → checker registry → probes
//!   │           └── peer RPC client per remote member
//!   ├── RPC server: LocalStatus (latest local snapshot), Status (cache)
//!   └── collaborators: membership provider, status cache
//! ```

pub mod agent;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod membership;
mod server;

pub use agent::{Agent, STATUS_QUERY_TIMEOUT, STATUS_UPDATE_PERIOD};
pub use client::{default_dial, AgentClient, DialFn, DEFAULT_RPC_PORT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AgentConfig;
pub use error::AgentError;
pub use membership::{Member, MemberState, MembershipError, MembershipProvider, StaticMembership};
