use crate::provider::Provider;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tessera_types::{CycleId, MiningClaim, PeerId, Receipt, ReceiptId, Result, TesseraError};
use tokio::sync::RwLock;

/// Durable key-value access for providers, receipts and claims. Backends
/// must support per-key atomic read-modify-write; the in-memory backend
/// below gets this from its locks.
#[async_trait]
pub trait MarketStorage: Send + Sync {
    async fn get_provider(&self, peer_id: &PeerId) -> Result<Option<Provider>>;
    async fn put_provider(&self, provider: Provider) -> Result<()>;
    async fn all_providers(&self) -> Result<Vec<Provider>>;

    async fn put_receipt(&self, receipt: Receipt) -> Result<()>;
    async fn get_receipt(&self, receipt_id: &ReceiptId) -> Result<Option<Receipt>>;
    async fn receipts_for(&self, peer_id: &PeerId) -> Result<Vec<Receipt>>;

    /// Records a claim, atomically marking every cited cycle id as settled.
    /// Fails with `DuplicateClaim` if any cycle id was settled before; this
    /// is the marketplace's double-claim enforcement point.
    async fn record_claim(&self, claim: MiningClaim) -> Result<()>;
    async fn claim_exists(&self, cycle_id: &CycleId) -> Result<bool>;
    async fn all_claims(&self) -> Result<Vec<MiningClaim>>;
}

#[derive(Default)]
struct ClaimLog {
    entries: Vec<MiningClaim>,
    settled_cycles: HashSet<CycleId>,
}

/// In-memory backend for tests and single-node deployments.
#[derive(Default)]
pub struct MemoryStorage {
    providers: RwLock<HashMap<PeerId, Provider>>,
    receipts: RwLock<HashMap<ReceiptId, Receipt>>,
    claims: RwLock<ClaimLog>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarketStorage for MemoryStorage {
    async fn get_provider(&self, peer_id: &PeerId) -> Result<Option<Provider>> {
        let providers = self.providers.read().await;
        Ok(providers.get(peer_id).cloned())
    }

    async fn put_provider(&self, provider: Provider) -> Result<()> {
        let mut providers = self.providers.write().await;
        providers.insert(provider.peer_id.clone(), provider);
        Ok(())
    }

    async fn all_providers(&self) -> Result<Vec<Provider>> {
        let providers = self.providers.read().await;
        Ok(providers.values().cloned().collect())
    }

    async fn put_receipt(&self, receipt: Receipt) -> Result<()> {
        let mut receipts = self.receipts.write().await;
        receipts.insert(receipt.receipt_id.clone(), receipt);
        Ok(())
    }

    async fn get_receipt(&self, receipt_id: &ReceiptId) -> Result<Option<Receipt>> {
        let receipts = self.receipts.read().await;
        Ok(receipts.get(receipt_id).cloned())
    }

    async fn receipts_for(&self, peer_id: &PeerId) -> Result<Vec<Receipt>> {
        let receipts = self.receipts.read().await;
        let mut matching: Vec<Receipt> = receipts
            .values()
            .filter(|r| &r.peer_id == peer_id)
            .cloned()
            .collect();
        // Deterministic order for aggregation and audit.
        matching.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.receipt_id.cmp(&b.receipt_id))
        });
        Ok(matching)
    }

    async fn record_claim(&self, claim: MiningClaim) -> Result<()> {
        let mut log = self.claims.write().await;
        let mut batch = HashSet::new();
        for cycle_id in &claim.claimed_cycle_ids {
            if log.settled_cycles.contains(cycle_id) || !batch.insert(cycle_id.clone()) {
                return Err(TesseraError::DuplicateClaim(cycle_id.to_string()));
            }
        }
        log.settled_cycles.extend(batch);
        log.entries.push(claim);
        Ok(())
    }

    async fn claim_exists(&self, cycle_id: &CycleId) -> Result<bool> {
        let log = self.claims.read().await;
        Ok(log.settled_cycles.contains(cycle_id))
    }

    async fn all_claims(&self) -> Result<Vec<MiningClaim>> {
        let log = self.claims.read().await;
        Ok(log.entries.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::Amount;

    fn claim(cycles: &[&str]) -> MiningClaim {
        MiningClaim {
            cycle_id: CycleId::from("cycle:settlement"),
            provider_id: PeerId::from("peer:1"),
            claimed_cycle_ids: cycles.iter().map(|c| CycleId::from(*c)).collect(),
            cycles_claimed: 100,
            zk_proof_count: 0,
            reward: Amount::from_tokens(0.01),
            receipt_ids: vec![],
            claimed_at: 0,
        }
    }

    #[tokio::test]
    async fn test_record_claim_settles_cycles() {
        let storage = MemoryStorage::new();
        storage.record_claim(claim(&["c1", "c2"])).await.unwrap();

        assert!(storage.claim_exists(&CycleId::from("c1")).await.unwrap());
        assert!(!storage.claim_exists(&CycleId::from("c3")).await.unwrap());
        assert_eq!(storage.all_claims().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_cycle_rejected_atomically() {
        let storage = MemoryStorage::new();
        storage.record_claim(claim(&["c1"])).await.unwrap();

        let err = storage.record_claim(claim(&["c2", "c1"])).await.unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_CLAIM");

        // The rejected claim must not have settled its fresh cycle either.
        assert!(!storage.claim_exists(&CycleId::from("c2")).await.unwrap());
        assert_eq!(storage.all_claims().await.unwrap().len(), 1);
    }
}
