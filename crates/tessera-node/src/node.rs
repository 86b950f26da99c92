use crate::config::NodeConfig;
use anyhow::Result;
use std::sync::Arc;
use tessera_market::{
    MemoryStorage, PriceQuote, PricingEngine, Provider, ProviderRegistry, SlashOutcome,
    StakeLedger,
};
use tessera_receipts::{HashCommitmentBackend, ProofBackend, ReceiptGenerator};
use tessera_rewards::{ClaimAggregate, MarketStats, RewardAggregator};
use tessera_scheduler::{
    JobScheduler, LocalExecutor, LocalSandbox, LoopbackTransport, PeerTransport,
};
use tessera_types::{
    Amount, CycleId, ExecutionResult, Job, MiningClaim, PeerId, ReceiptId,
    Result as TesseraResult,
};
use tracing::{info, warn};

/// One marketplace node: registry, ledger, pricing, scheduler and reward
/// aggregation wired over shared storage. Services are plain instances with
/// injected dependencies, so several nodes can coexist in one process.
pub struct TesseraNode {
    local_peer: PeerId,
    pub registry: Arc<ProviderRegistry>,
    pub ledger: Arc<StakeLedger>,
    pub pricing: Arc<PricingEngine>,
    pub scheduler: Arc<JobScheduler>,
    pub rewards: Arc<RewardAggregator>,
    response_pump: tokio::task::JoinHandle<()>,
}

impl TesseraNode {
    pub async fn new(config: NodeConfig) -> Result<Arc<Self>> {
        let local_peer = PeerId::new(config.node.peer_id.clone());
        info!(name = %config.node.name, peer = %local_peer, "Initializing node");

        let storage = Arc::new(MemoryStorage::new());
        let registry = Arc::new(ProviderRegistry::new(storage.clone()));
        let ledger = Arc::new(StakeLedger::new(
            registry.clone(),
            config.ledger.clone().into(),
        ));
        let pricing = Arc::new(PricingEngine::new(
            registry.clone(),
            config.pricing.clone().into(),
        ));

        let proof_backend: Arc<dyn ProofBackend> = Arc::new(HashCommitmentBackend::new());
        let receipts = Arc::new(ReceiptGenerator::new());

        let (transport, mut inbox) = LoopbackTransport::new();
        for worker in &config.workers {
            transport
                .register(Arc::new(LocalExecutor::new(
                    PeerId::new(worker.peer_id.clone()),
                    worker.compute_score,
                    Arc::new(LocalSandbox::new()),
                    receipts.clone(),
                    worker.proof_backend.then(|| proof_backend.clone()),
                )))
                .await;
        }
        let transport: Arc<dyn PeerTransport> = Arc::new(transport);

        let scheduler = Arc::new(JobScheduler::new(
            transport,
            local_peer.clone(),
            config.scheduler.clone().into(),
        ));
        let rewards = Arc::new(RewardAggregator::new(
            storage,
            registry.clone(),
            proof_backend,
            config.rewards.clone().into(),
        ));

        // Forward executor responses into the scheduler's correlation map.
        let response_pump = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                while let Some(response) = inbox.recv().await {
                    scheduler.handle_response(response).await;
                }
            })
        };

        info!(workers = config.workers.len(), "🚀 Node ready");
        Ok(Arc::new(Self {
            local_peer,
            registry,
            ledger,
            pricing,
            scheduler,
            rewards,
            response_pump,
        }))
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local_peer
    }

    /// Caller identity, defaulting to the node's own. Authentication is the
    /// outer session layer's job; the core trusts what it is handed.
    pub fn resolve_peer(&self, peer_id: Option<String>) -> PeerId {
        peer_id.map(PeerId::new).unwrap_or_else(|| self.local_peer.clone())
    }

    pub async fn stake(&self, peer_id: &PeerId, amount: Amount) -> TesseraResult<Provider> {
        self.ledger.stake(peer_id, amount).await?;
        self.registry.get(peer_id).await
    }

    pub async fn withdraw(&self, peer_id: &PeerId, amount: Amount) -> TesseraResult<Amount> {
        self.ledger.withdraw(peer_id, amount).await
    }

    pub async fn slash(
        &self,
        peer_id: &PeerId,
        reason: &str,
        amount: Option<Amount>,
    ) -> TesseraResult<SlashOutcome> {
        self.ledger.slash(peer_id, reason, amount).await
    }

    pub async fn providers(&self) -> TesseraResult<Vec<Provider>> {
        self.registry.list().await
    }

    pub async fn quote(&self, cycles: u64, peer_id: Option<&PeerId>) -> TesseraResult<PriceQuote> {
        self.pricing.quote(cycles, peer_id).await
    }

    /// Dispatches a job, then feeds the outcome back into provider stats and
    /// the reward pipeline. Receipt recording is eventually consistent with
    /// execution; the result returned to the caller is the executor's.
    pub async fn dispatch(&self, job: Job) -> TesseraResult<ExecutionResult> {
        let result = self.scheduler.request_compute(job).await?;

        self.registry
            .apply_stats_update(&result.peer_id, 1, result.success as u64)
            .await?;

        if let Some(receipt) = &result.receipt {
            let outcome = self.rewards.record_receipt(receipt.clone()).await?;
            if let Some(reason) = outcome.rejection {
                warn!(
                    receipt = %outcome.receipt_id,
                    peer = %result.peer_id,
                    reason = %reason,
                    "Dispatched job produced an unverifiable receipt"
                );
            }
        }

        Ok(result)
    }

    pub async fn aggregate(&self, peer_id: &PeerId) -> TesseraResult<ClaimAggregate> {
        self.rewards.aggregate_for_claim(peer_id).await
    }

    pub async fn claim(
        &self,
        peer_id: &PeerId,
        cycle_ids: Vec<CycleId>,
        receipt_ids: Option<Vec<ReceiptId>>,
    ) -> TesseraResult<MiningClaim> {
        self.rewards.claim(peer_id, cycle_ids, receipt_ids).await
    }

    pub async fn stats(&self, peer_id: Option<&PeerId>) -> TesseraResult<MarketStats> {
        self.rewards.stats(peer_id).await
    }

    pub fn shutdown(&self) {
        self.response_pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_types::{JobId, JobOptions};

    async fn node() -> Arc<TesseraNode> {
        TesseraNode::new(NodeConfig::standalone()).await.unwrap()
    }

    fn job(require_receipt: bool) -> Job {
        Job {
            job_id: JobId::from("job-node"),
            program_ref: "builtin:echo".to_string(),
            input: json!({"v": 7}),
            options: JobOptions {
                require_receipt,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_dispatch_updates_provider_stats() {
        let node = node().await;
        let result = node.dispatch(job(false)).await.unwrap();
        assert!(result.success);

        // Highest-scored worker in the standalone pool takes the job.
        assert_eq!(result.peer_id.as_str(), "peer:worker-1");
        let provider = node.registry.get(&result.peer_id).await.unwrap();
        assert_eq!(provider.total_jobs, 1);
        assert_eq!(provider.successful_jobs, 1);
    }

    #[tokio::test]
    async fn test_dispatch_with_receipt_feeds_rewards() {
        let node = node().await;
        let result = node.dispatch(job(true)).await.unwrap();
        let receipt = result.receipt.expect("receipt requested");
        assert!(receipt.is_proof_backed());

        let aggregate = node.aggregate(&result.peer_id).await.unwrap();
        assert_eq!(aggregate.receipt_count, 1);
        assert_eq!(aggregate.verified_count, 1);
    }

    #[tokio::test]
    async fn test_resolve_peer_defaults_to_local_identity() {
        let node = node().await;
        assert_eq!(node.resolve_peer(None).as_str(), "peer:local");
        assert_eq!(
            node.resolve_peer(Some("peer:caller".to_string())).as_str(),
            "peer:caller"
        );
    }
}
