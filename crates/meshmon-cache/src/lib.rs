//! meshmon-cache — short-lived storage for the most recent cluster
//! snapshot.
//!
//! The agent only ever needs the latest `SystemStatus`; history is out
//! of scope. Implementations must be thread-safe: the collection loop
//! writes while RPC handlers read.

use std::sync::Mutex;

use meshmon_proto::{system_status, SystemStatus};
use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

/// Errors from a status cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(String),
}

/// Storage contract for the most recent cluster snapshot.
pub trait Cache: Send + Sync {
    /// Store `status` atomically; readers never observe a torn write.
    fn update_status(&self, status: SystemStatus) -> CacheResult<()>;

    /// The last stored snapshot, or the empty-unknown placeholder if
    /// nothing has been stored yet.
    fn recent_status(&self) -> CacheResult<SystemStatus>;
}

/// The placeholder returned before any snapshot has been stored.
pub fn empty_system_status() -> SystemStatus {
    SystemStatus {
        status: system_status::Type::Unknown as i32,
        timestamp: None,
        nodes: Vec::new(),
    }
}

/// In-memory cache holding the single most recent snapshot.
#[derive(Default)]
pub struct InMemoryCache {
    recent: Mutex<Option<SystemStatus>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for InMemoryCache {
    fn update_status(&self, status: SystemStatus) -> CacheResult<()> {
        let mut recent = self
            .recent
            .lock()
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        *recent = Some(status);
        Ok(())
    }

    fn recent_status(&self) -> CacheResult<SystemStatus> {
        let recent = self
            .recent
            .lock()
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        Ok(recent.clone().unwrap_or_else(empty_system_status))
    }
}
