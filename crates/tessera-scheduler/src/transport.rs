use crate::executor::LocalExecutor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_types::{ExecutionResult, Job, PeerId, RequestId, Result, TesseraError};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// A reachable peer and its transport-supplied capability ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_id: PeerId,
    pub compute_score: f64,
}

/// A dispatched job together with its correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub request_id: RequestId,
    pub job: Job,
}

/// An executing peer's answer, correlated back by request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeResponse {
    pub request_id: RequestId,
    pub result: ExecutionResult,
}

/// Peer discovery and message delivery. Inbound responses are delivered to
/// `JobScheduler::handle_response` by whatever pump the deployment wires up.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn get_peers(&self) -> Result<Vec<PeerInfo>>;
    async fn send_job(&self, peer_id: &PeerId, envelope: JobEnvelope) -> Result<()>;
}

/// In-process transport over a pool of local executors. Serves as the
/// single-node deployment mode and the test double; a networked mesh binds
/// the same trait.
pub struct LoopbackTransport {
    executors: Arc<RwLock<HashMap<PeerId, Arc<LocalExecutor>>>>,
    responses: mpsc::UnboundedSender<ComputeResponse>,
}

impl LoopbackTransport {
    /// Returns the transport and the stream of responses produced by its
    /// executors. The caller forwards that stream into the scheduler.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ComputeResponse>) {
        let (responses, inbox) = mpsc::unbounded_channel();
        (
            Self {
                executors: Arc::new(RwLock::new(HashMap::new())),
                responses,
            },
            inbox,
        )
    }

    pub async fn register(&self, executor: Arc<LocalExecutor>) {
        let mut executors = self.executors.write().await;
        debug!(peer = %executor.peer_id(), "Loopback executor registered");
        executors.insert(executor.peer_id().clone(), executor);
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn get_peers(&self) -> Result<Vec<PeerInfo>> {
        let executors = self.executors.read().await;
        Ok(executors
            .values()
            .map(|executor| PeerInfo {
                peer_id: executor.peer_id().clone(),
                compute_score: executor.compute_score(),
            })
            .collect())
    }

    async fn send_job(&self, peer_id: &PeerId, envelope: JobEnvelope) -> Result<()> {
        let executor = {
            let executors = self.executors.read().await;
            executors
                .get(peer_id)
                .cloned()
                .ok_or_else(|| TesseraError::NotFound(format!("peer {}", peer_id)))?
        };

        let responses = self.responses.clone();
        tokio::spawn(async move {
            let response = executor.execute(envelope).await;
            // A closed channel just means the node is shutting down.
            let _ = responses.send(response);
        });
        Ok(())
    }
}
