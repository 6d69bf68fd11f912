//! meshmon-proto — wire schema shared by all meshmon agents.
//!
//! The prost-generated messages double as the in-process data model:
//! collectors build `NodeStatus`/`SystemStatus` values directly and the
//! RPC layer ships them unchanged.

use std::time::SystemTime;

tonic::include_proto!("meshmon.agent");

/// Current wall-clock time as a protobuf timestamp.
pub fn timestamp_now() -> prost_types::Timestamp {
    timestamp_from(SystemTime::now())
}

/// Convert a `SystemTime` into a protobuf timestamp.
///
/// Times before the UNIX epoch clamp to the epoch.
pub fn timestamp_from(time: SystemTime) -> prost_types::Timestamp {
    let since_epoch = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    prost_types::Timestamp {
        seconds: since_epoch.as_secs() as i64,
        nanos: since_epoch.subsec_nanos() as i32,
    }
}
