//! Peer RPC server.
//!
//! Serves the `Agent` gRPC service on every configured listener. Both
//! methods are read-only: `LocalStatus` returns the latest cached local
//! snapshot (never triggering a fresh sweep, which would amplify
//! cluster-wide collection into N² probing) and `Status` returns the
//! last snapshot from the status cache.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{debug, error};

use meshmon_proto::{
    agent_server, LocalStatusRequest, LocalStatusResponse, StatusRequest, StatusResponse,
};

use crate::agent::AgentState;

/// Owns the RPC listeners and their serve tasks.
pub(crate) struct RpcServer {
    listeners: Vec<TcpListener>,
    bound: Vec<SocketAddr>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl RpcServer {
    pub(crate) fn new(listeners: Vec<TcpListener>, bound: Vec<SocketAddr>) -> Self {
        Self {
            listeners,
            bound,
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Spawn one serve task per bound listener.
    pub(crate) fn start(&mut self, state: Arc<AgentState>) {
        for listener in self.listeners.drain(..) {
            let service = AgentService {
                state: Arc::clone(&state),
            };
            let cancel = self.cancel.clone();
            let addr = listener.local_addr().ok();
            debug!(?addr, "agent rpc server listening");

            let incoming = TcpListenerStream::new(listener);
            self.handles.push(tokio::spawn(async move {
                let result = tonic::transport::Server::builder()
                    .add_service(agent_server::AgentServer::new(service))
                    .serve_with_incoming_shutdown(incoming, cancel.cancelled_owned())
                    .await;
                if let Err(e) = result {
                    error!(?addr, error = %e, "agent rpc server error");
                }
            }));
        }
    }

    /// Stop accepting connections; in-flight calls drain.
    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for every serve task to finish.
    pub(crate) async fn join(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }

    pub(crate) fn bound_addrs(&self) -> &[SocketAddr] {
        &self.bound
    }
}

/// gRPC implementation of the agent peer surface.
struct AgentService {
    state: Arc<AgentState>,
}

#[tonic::async_trait]
impl agent_server::Agent for AgentService {
    async fn status(
        &self,
        _request: Request<StatusRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let status = self
            .state
            .cache
            .recent_status()
            .map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(StatusResponse {
            status: Some(status),
        }))
    }

    async fn local_status(
        &self,
        _request: Request<LocalStatusRequest>,
    ) -> Result<Response<LocalStatusResponse>, Status> {
        let status = self.state.recent_local_status().await;
        Ok(Response::new(LocalStatusResponse {
            status: Some((*status).clone()),
        }))
    }
}
