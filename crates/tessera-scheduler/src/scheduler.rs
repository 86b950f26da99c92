use crate::transport::{ComputeResponse, JobEnvelope, PeerInfo, PeerTransport};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_types::{ExecutionResult, Job, PeerId, RequestId, Result, TesseraError};
use tokio::sync::{oneshot, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Deadline for a dispatched request unless the job overrides it.
    pub dispatch_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_ms: 30_000,
        }
    }
}

/// An in-flight dispatch awaiting its response. Removed exactly once, by
/// whichever of {response, timeout, cancel} gets there first.
struct PendingRequest {
    responder: oneshot::Sender<ExecutionResult>,
    peer_id: PeerId,
    dispatched_at: Instant,
}

/// Accepts compute requests, ranks reachable peers, dispatches to the best
/// candidate and correlates asynchronous responses back to the waiting
/// caller.
pub struct JobScheduler {
    transport: Arc<dyn PeerTransport>,
    local_peer: PeerId,
    config: SchedulerConfig,
    pending: Arc<RwLock<HashMap<RequestId, PendingRequest>>>,
    nonce: AtomicU64,
}

impl JobScheduler {
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        local_peer: PeerId,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            transport,
            local_peer,
            config,
            pending: Arc::new(RwLock::new(HashMap::new())),
            nonce: AtomicU64::new(0),
        }
    }

    /// Dispatches a job and suspends until the correlated response arrives
    /// or the deadline elapses. No retry is attempted on timeout; retry
    /// policy belongs to the caller, which avoids double-charging a provider
    /// for one logical job.
    pub async fn request_compute(&self, job: Job) -> Result<ExecutionResult> {
        let peers = self.transport.get_peers().await?;
        let target = self.select_peer(&job, peers)?;

        let request_id =
            RequestId::derive(&job.job_id, self.nonce.fetch_add(1, AtomicOrdering::Relaxed));
        let timeout_ms = job
            .options
            .timeout_ms
            .unwrap_or(self.config.dispatch_timeout_ms);

        let (responder, completion) = oneshot::channel();
        {
            let mut pending = self.pending.write().await;
            pending.insert(
                request_id.clone(),
                PendingRequest {
                    responder,
                    peer_id: target.peer_id.clone(),
                    dispatched_at: Instant::now(),
                },
            );
        }

        info!(
            request = %request_id,
            job = %job.job_id,
            peer = %target.peer_id,
            compute_score = target.compute_score,
            "Job dispatched"
        );

        let envelope = JobEnvelope {
            request_id: request_id.clone(),
            job,
        };
        if let Err(e) = self.transport.send_job(&target.peer_id, envelope).await {
            let mut pending = self.pending.write().await;
            pending.remove(&request_id);
            return Err(TesseraError::Internal(format!("dispatch failed: {}", e)));
        }

        match timeout(Duration::from_millis(timeout_ms), completion).await {
            Ok(Ok(result)) => Ok(result),
            // The sender was dropped: the request was cancelled from outside.
            Ok(Err(_)) => Err(TesseraError::Internal(
                "compute request cancelled".to_string(),
            )),
            Err(_) => {
                let mut pending = self.pending.write().await;
                pending.remove(&request_id);
                warn!(request = %request_id, timeout_ms, "Compute request timed out");
                Err(TesseraError::ComputeTimeout { timeout_ms })
            }
        }
    }

    /// Resolves the pending request this response correlates to. Late and
    /// duplicate responses are dropped: once a request has resolved or timed
    /// out, nothing may resolve it again.
    pub async fn handle_response(&self, response: ComputeResponse) {
        let entry = {
            let mut pending = self.pending.write().await;
            pending.remove(&response.request_id)
        };

        match entry {
            Some(request) => {
                debug!(
                    request = %response.request_id,
                    peer = %request.peer_id,
                    latency_ms = request.dispatched_at.elapsed().as_millis() as u64,
                    "Response correlated"
                );
                // The caller may have just timed out; its receiver is gone
                // and the result is dropped, which is the correct outcome.
                let _ = request.responder.send(response.result);
            }
            None => {
                debug!(
                    request = %response.request_id,
                    "Dropping response for unknown or expired request"
                );
            }
        }
    }

    /// Cancels a pending request. The suspended caller observes the
    /// cancellation and any late response is dropped as unknown.
    pub async fn cancel(&self, request_id: &RequestId) -> bool {
        let mut pending = self.pending.write().await;
        pending.remove(request_id).is_some()
    }

    pub async fn pending_count(&self) -> usize {
        let pending = self.pending.read().await;
        pending.len()
    }

    /// Picks the dispatch target: the reachable peer with the highest
    /// compute score, excluding self. A target override in the job options
    /// bypasses ranking entirely.
    fn select_peer(&self, job: &Job, peers: Vec<PeerInfo>) -> Result<PeerInfo> {
        let mut candidates: Vec<PeerInfo> = peers
            .into_iter()
            .filter(|p| p.peer_id != self.local_peer)
            .collect();

        if candidates.is_empty() {
            return Err(TesseraError::NoPeerAvailable);
        }

        if let Some(target) = &job.options.target_peer_id {
            return candidates
                .into_iter()
                .find(|p| &p.peer_id == target)
                .ok_or_else(|| TesseraError::NotFound(format!("peer {}", target)));
        }

        candidates.sort_by(|a, b| {
            b.compute_score
                .partial_cmp(&a.compute_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.peer_id.cmp(&b.peer_id))
        });
        Ok(candidates.remove(0))
    }
}
