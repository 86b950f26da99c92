use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_market::{MarketStorage, ProviderRegistry};
use tessera_receipts::ProofBackend;
use tessera_types::{
    Amount, CycleId, MiningClaim, PeerId, Receipt, ReceiptId, Result, TesseraError,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RewardConfig {
    /// Reward per billable cycle.
    pub cycle_rate: f64,
    /// Bonus cycles credited per verified proof, priced at the cycle rate.
    pub zk_bonus_per_proof: f64,
    /// Cycles represented by one claimed cycle id.
    pub cycles_per_claimed_id: u64,
    /// Milliseconds of execution time per accounted cycle.
    pub execution_ms_per_cycle: u64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            cycle_rate: 0.0001,
            zk_bonus_per_proof: 10.0,
            cycles_per_claimed_id: 100,
            execution_ms_per_cycle: 10,
        }
    }
}

/// Outcome of recording one receipt.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub receipt_id: ReceiptId,
    /// True iff the receipt carried a proof and that proof verified.
    pub verified: bool,
    pub rejection: Option<String>,
}

/// Read-side aggregation over a provider's stored receipts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimAggregate {
    pub receipt_count: u64,
    pub verified_count: u64,
    pub total_cycles: u64,
    pub receipt_ids: Vec<ReceiptId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStats {
    pub total_cycles: u64,
    pub total_zk_proofs: u64,
    pub total_reward: Amount,
    pub claim_count: u64,
}

/// Converts accumulated verified receipts into claimable rewards and records
/// settlements. Claims are append-only and eventually consistent with
/// execution: they settle whatever receipts storage holds at claim time.
pub struct RewardAggregator {
    storage: Arc<dyn MarketStorage>,
    registry: Arc<ProviderRegistry>,
    proof_backend: Arc<dyn ProofBackend>,
    config: RewardConfig,
    /// Receipts whose proof verified, per provider. Only these earn the
    /// proof bonus.
    verified: Arc<RwLock<HashMap<PeerId, HashSet<ReceiptId>>>>,
    settlement_nonce: AtomicU64,
}

impl RewardAggregator {
    pub fn new(
        storage: Arc<dyn MarketStorage>,
        registry: Arc<ProviderRegistry>,
        proof_backend: Arc<dyn ProofBackend>,
        config: RewardConfig,
    ) -> Self {
        Self {
            storage,
            registry,
            proof_backend,
            config,
            verified: Arc::new(RwLock::new(HashMap::new())),
            settlement_nonce: AtomicU64::new(0),
        }
    }

    /// Stores a receipt; if it carries a proof, verifies it and credits the
    /// provider only on success. A failed verification never aborts the
    /// batch the receipt arrived in.
    pub async fn record_receipt(&self, receipt: Receipt) -> Result<RecordOutcome> {
        let receipt_id = receipt.receipt_id.clone();
        let peer_id = receipt.peer_id.clone();
        let proof_backed = receipt.is_proof_backed();

        self.storage.put_receipt(receipt.clone()).await?;

        if !proof_backed {
            return Ok(RecordOutcome {
                receipt_id,
                verified: false,
                rejection: None,
            });
        }

        let verification = match self.proof_backend.verify_receipt(&receipt) {
            Ok(verification) => verification,
            // Structurally unusable proof fields: recorded, never credited.
            Err(TesseraError::ProofStructure(reason)) => {
                warn!(receipt = %receipt_id, reason = %reason, "Unusable proof on receipt");
                return Ok(RecordOutcome {
                    receipt_id,
                    verified: false,
                    rejection: Some(reason),
                });
            }
            Err(e) => return Err(e),
        };

        if !verification.valid {
            warn!(
                receipt = %receipt_id,
                peer = %peer_id,
                reason = verification.reason.as_deref().unwrap_or("unspecified"),
                "Receipt proof rejected"
            );
            return Ok(RecordOutcome {
                receipt_id,
                verified: false,
                rejection: verification.reason,
            });
        }

        {
            let mut verified = self.verified.write().await;
            verified
                .entry(peer_id.clone())
                .or_default()
                .insert(receipt_id.clone());
        }
        self.registry.record_verified_proof(&peer_id).await?;

        info!(receipt = %receipt_id, peer = %peer_id, "✅ Verified receipt credited");
        Ok(RecordOutcome {
            receipt_id,
            verified: true,
            rejection: None,
        })
    }

    /// Pure read: what the provider could claim right now.
    pub async fn aggregate_for_claim(&self, provider: &PeerId) -> Result<ClaimAggregate> {
        let receipts = self.storage.receipts_for(provider).await?;
        let verified = self.verified.read().await;
        let verified_for_peer = verified.get(provider);

        let verified_count = receipts
            .iter()
            .filter(|r| {
                verified_for_peer
                    .map(|set| set.contains(&r.receipt_id))
                    .unwrap_or(false)
            })
            .count() as u64;

        Ok(ClaimAggregate {
            receipt_count: receipts.len() as u64,
            verified_count,
            total_cycles: receipts
                .iter()
                .map(|r| r.execution_time_ms / self.config.execution_ms_per_cycle)
                .sum(),
            receipt_ids: receipts.into_iter().map(|r| r.receipt_id).collect(),
        })
    }

    /// Settles a batch of cycle ids into an append-only claim.
    ///
    /// `base = cycles × cycle_rate`, `zk = verified_proofs × bonus ×
    /// cycle_rate`. Auxiliary contribution terms are extension points with
    /// zero weight. Every cited cycle id may settle exactly once; the
    /// storage layer rejects any that settled before.
    pub async fn claim(
        &self,
        provider: &PeerId,
        cycle_ids: Vec<CycleId>,
        receipt_ids: Option<Vec<ReceiptId>>,
    ) -> Result<MiningClaim> {
        if cycle_ids.is_empty() {
            return Err(TesseraError::Validation(
                "claim must cite at least one cycle id".to_string(),
            ));
        }

        let verified = self.verified.read().await;
        let verified_for_peer = verified.get(provider);
        let (zk_proof_count, cited_receipts) = match receipt_ids {
            Some(ids) => {
                let count = ids
                    .iter()
                    .filter(|id| {
                        verified_for_peer
                            .map(|set| set.contains(*id))
                            .unwrap_or(false)
                    })
                    .count() as u64;
                (count, ids)
            }
            None => match verified_for_peer {
                Some(set) => (set.len() as u64, set.iter().cloned().collect()),
                None => (0, Vec::new()),
            },
        };
        drop(verified);

        let cycles = cycle_ids.len() as u64 * self.config.cycles_per_claimed_id;
        let base_reward = cycles as f64 * self.config.cycle_rate;
        let zk_reward = zk_proof_count as f64 * self.config.zk_bonus_per_proof * self.config.cycle_rate;

        let claim = MiningClaim {
            cycle_id: CycleId::derive_settlement(
                provider,
                self.settlement_nonce.fetch_add(1, Ordering::Relaxed),
            ),
            provider_id: provider.clone(),
            claimed_cycle_ids: cycle_ids,
            cycles_claimed: cycles,
            zk_proof_count,
            reward: Amount::from_tokens(base_reward + zk_reward),
            receipt_ids: cited_receipts,
            claimed_at: Utc::now().timestamp_millis(),
        };

        self.storage.record_claim(claim.clone()).await?;

        info!(
            provider = %provider,
            settlement = %claim.cycle_id,
            cycles = claim.cycles_claimed,
            zk_proofs = claim.zk_proof_count,
            reward = %claim.reward,
            "💰 Reward claimed"
        );
        Ok(claim)
    }

    /// Marketplace totals, optionally restricted to one provider.
    pub async fn stats(&self, provider: Option<&PeerId>) -> Result<MarketStats> {
        let claims = self.storage.all_claims().await?;
        let mut stats = MarketStats {
            total_cycles: 0,
            total_zk_proofs: 0,
            total_reward: Amount::ZERO,
            claim_count: 0,
        };

        for claim in claims {
            if let Some(peer) = provider {
                if &claim.provider_id != peer {
                    continue;
                }
            }
            stats.total_cycles += claim.cycles_claimed;
            stats.total_zk_proofs += claim.zk_proof_count;
            stats.total_reward = stats
                .total_reward
                .checked_add(claim.reward)
                .ok_or_else(|| TesseraError::Internal("reward total overflow".to_string()))?;
            stats.claim_count += 1;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_market::MemoryStorage;
    use tessera_receipts::{HashCommitmentBackend, ReceiptGenerator};
    use tessera_types::{Digest, JobId};

    fn aggregator() -> (RewardAggregator, Arc<ProviderRegistry>) {
        let storage = Arc::new(MemoryStorage::new());
        let registry = Arc::new(ProviderRegistry::new(storage.clone()));
        (
            RewardAggregator::new(
                storage,
                registry.clone(),
                Arc::new(HashCommitmentBackend::new()),
                RewardConfig::default(),
            ),
            registry,
        )
    }

    fn receipt(peer: &str, execution_time_ms: u64, with_proof: bool) -> Receipt {
        let backend = HashCommitmentBackend::new();
        let input = json!({"seed": execution_time_ms});
        let output = json!({"result": execution_time_ms * 2});
        let proof = with_proof
            .then(|| backend.prove(b"builtin:echo", &input, &output, None).unwrap());

        ReceiptGenerator::new()
            .generate(
                &JobId::from("job-1"),
                &input,
                &output,
                &[],
                execution_time_ms,
                &PeerId::from(peer),
                None,
                proof.as_ref(),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_plain_receipt_recorded_not_verified() {
        let (aggregator, _) = aggregator();
        let outcome = aggregator
            .record_receipt(receipt("peer:1", 100, false))
            .await
            .unwrap();

        assert!(!outcome.verified);
        assert!(outcome.rejection.is_none());

        let aggregate = aggregator
            .aggregate_for_claim(&PeerId::from("peer:1"))
            .await
            .unwrap();
        assert_eq!(aggregate.receipt_count, 1);
        assert_eq!(aggregate.verified_count, 0);
        assert_eq!(aggregate.total_cycles, 10);
    }

    #[tokio::test]
    async fn test_proof_backed_receipt_credits_provider() {
        let (aggregator, registry) = aggregator();
        let outcome = aggregator
            .record_receipt(receipt("peer:1", 50, true))
            .await
            .unwrap();

        assert!(outcome.verified);
        assert_eq!(
            registry
                .get(&PeerId::from("peer:1"))
                .await
                .unwrap()
                .zk_verified_count,
            1
        );
    }

    #[tokio::test]
    async fn test_tampered_proof_recorded_but_not_credited() {
        let (aggregator, registry) = aggregator();
        let mut receipt = receipt("peer:1", 50, true);
        // The receipt now claims an output its proof does not cover.
        receipt.output_hash = Digest::from_bytes([9u8; 32]);

        let outcome = aggregator.record_receipt(receipt).await.unwrap();
        assert!(!outcome.verified);
        assert_eq!(outcome.rejection.as_deref(), Some("output hash mismatch"));

        // Stored for audit, but no credit was granted.
        let aggregate = aggregator
            .aggregate_for_claim(&PeerId::from("peer:1"))
            .await
            .unwrap();
        assert_eq!(aggregate.receipt_count, 1);
        assert_eq!(aggregate.verified_count, 0);
        // No credit means the provider record was never even created.
        assert!(registry
            .find(&PeerId::from("peer:1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_claim_reward_formula() {
        let (aggregator, _) = aggregator();
        let provider = PeerId::from("peer:1");

        // 2 cycle ids x 100 cycles x 0.0001 rate, no proofs.
        let claim = aggregator
            .claim(
                &provider,
                vec![CycleId::from("c1"), CycleId::from("c2")],
                None,
            )
            .await
            .unwrap();

        assert_eq!(claim.cycles_claimed, 200);
        assert_eq!(claim.zk_proof_count, 0);
        assert_eq!(claim.reward, Amount::from_tokens(0.02));
    }

    #[tokio::test]
    async fn test_claim_includes_zk_bonus() {
        let (aggregator, _) = aggregator();
        let provider = PeerId::from("peer:1");

        let outcome = aggregator
            .record_receipt(receipt("peer:1", 50, true))
            .await
            .unwrap();
        assert!(outcome.verified);

        let claim = aggregator
            .claim(&provider, vec![CycleId::from("c1")], None)
            .await
            .unwrap();

        assert_eq!(claim.zk_proof_count, 1);
        // base 100 x 0.0001 = 0.01, bonus 1 x 10 x 0.0001 = 0.001
        assert_eq!(claim.reward, Amount::from_tokens(0.011));
    }

    #[tokio::test]
    async fn test_cited_receipts_count_only_verified() {
        let (aggregator, _) = aggregator();
        let provider = PeerId::from("peer:1");

        let verified = aggregator
            .record_receipt(receipt("peer:1", 50, true))
            .await
            .unwrap();
        let plain = aggregator
            .record_receipt(receipt("peer:1", 60, false))
            .await
            .unwrap();

        let claim = aggregator
            .claim(
                &provider,
                vec![CycleId::from("c1")],
                Some(vec![
                    verified.receipt_id,
                    plain.receipt_id,
                    ReceiptId::from("receipt:unknown"),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(claim.zk_proof_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_claim_rejected() {
        let (aggregator, _) = aggregator();
        let provider = PeerId::from("peer:1");

        aggregator
            .claim(&provider, vec![CycleId::from("c1")], None)
            .await
            .unwrap();

        let err = aggregator
            .claim(&provider, vec![CycleId::from("c1")], None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_CLAIM");
    }

    #[tokio::test]
    async fn test_empty_claim_rejected() {
        let (aggregator, _) = aggregator();
        let err = aggregator
            .claim(&PeerId::from("peer:1"), vec![], None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_stats_accumulate_across_claims() {
        let (aggregator, _) = aggregator();

        aggregator
            .claim(&PeerId::from("peer:1"), vec![CycleId::from("c1")], None)
            .await
            .unwrap();
        aggregator
            .claim(
                &PeerId::from("peer:2"),
                vec![CycleId::from("c2"), CycleId::from("c3")],
                None,
            )
            .await
            .unwrap();

        let stats = aggregator.stats(None).await.unwrap();
        assert_eq!(stats.claim_count, 2);
        assert_eq!(stats.total_cycles, 300);
        assert_eq!(stats.total_reward, Amount::from_tokens(0.03));

        let scoped = aggregator.stats(Some(&PeerId::from("peer:2"))).await.unwrap();
        assert_eq!(scoped.claim_count, 1);
        assert_eq!(scoped.total_cycles, 200);
    }
}
