use crate::storage::MarketStorage;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tessera_types::{Amount, PeerId, Result, TesseraError};
use tokio::sync::Mutex;
use tracing::info;

/// Identity record for a compute supplier. Never hard-deleted; the history
/// is the provider's reputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub peer_id: PeerId,
    pub stake: Amount,
    /// Bounded to [0, 100].
    pub trust_score: f64,
    /// Bounded to [0, 1].
    pub success_rate: f64,
    pub total_jobs: u64,
    pub successful_jobs: u64,
    pub slash_count: u64,
    pub zk_verified_count: u64,
    /// Milliseconds since epoch.
    pub created_at: i64,
    pub updated_at: i64,
}

impl Provider {
    pub fn new(peer_id: PeerId) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            peer_id,
            stake: Amount::ZERO,
            trust_score: 100.0,
            success_rate: 1.0, // new providers get the benefit of the doubt
            total_jobs: 0,
            successful_jobs: 0,
            slash_count: 0,
            zk_verified_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Tracks stake, trust and job statistics per provider identity.
pub struct ProviderRegistry {
    storage: Arc<dyn MarketStorage>,
    /// Serializes provider read-modify-write cycles so concurrent stake and
    /// slash operations on one peer cannot tear.
    mutation_lock: Mutex<()>,
}

impl ProviderRegistry {
    pub fn new(storage: Arc<dyn MarketStorage>) -> Self {
        Self {
            storage,
            mutation_lock: Mutex::new(()),
        }
    }

    pub async fn get_or_create(&self, peer_id: &PeerId) -> Result<Provider> {
        let _guard = self.mutation_lock.lock().await;
        self.get_or_create_locked(peer_id).await
    }

    pub async fn get(&self, peer_id: &PeerId) -> Result<Provider> {
        self.find(peer_id)
            .await?
            .ok_or_else(|| TesseraError::NotFound(format!("provider {}", peer_id)))
    }

    pub async fn find(&self, peer_id: &PeerId) -> Result<Option<Provider>> {
        self.storage.get_provider(peer_id).await
    }

    /// All providers, trust score descending, then stake descending, then
    /// peer id ascending so ties order deterministically.
    pub async fn list(&self) -> Result<Vec<Provider>> {
        let mut providers = self.storage.all_providers().await?;
        providers.sort_by(|a, b| {
            b.trust_score
                .partial_cmp(&a.trust_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.stake.cmp(&a.stake))
                .then_with(|| a.peer_id.cmp(&b.peer_id))
        });
        Ok(providers)
    }

    pub async fn apply_stats_update(
        &self,
        peer_id: &PeerId,
        jobs_delta: u64,
        success_delta: u64,
    ) -> Result<Provider> {
        self.update_or_create(peer_id, |provider| {
            provider.total_jobs += jobs_delta;
            provider.successful_jobs =
                (provider.successful_jobs + success_delta).min(provider.total_jobs);
            if provider.total_jobs > 0 {
                provider.success_rate =
                    provider.successful_jobs as f64 / provider.total_jobs as f64;
            }
            Ok(())
        })
        .await
    }

    pub async fn record_verified_proof(&self, peer_id: &PeerId) -> Result<Provider> {
        self.update_or_create(peer_id, |provider| {
            provider.zk_verified_count += 1;
            Ok(())
        })
        .await
    }

    /// Atomic read-modify-write on an existing provider. If the mutation
    /// fails the stored record is left untouched.
    pub async fn update<F>(&self, peer_id: &PeerId, mutate: F) -> Result<Provider>
    where
        F: FnOnce(&mut Provider) -> Result<()>,
    {
        let _guard = self.mutation_lock.lock().await;
        let mut provider = self
            .storage
            .get_provider(peer_id)
            .await?
            .ok_or_else(|| TesseraError::NotFound(format!("provider {}", peer_id)))?;
        self.commit(&mut provider, mutate).await
    }

    /// Like `update`, but registers the provider first if unknown.
    pub async fn update_or_create<F>(&self, peer_id: &PeerId, mutate: F) -> Result<Provider>
    where
        F: FnOnce(&mut Provider) -> Result<()>,
    {
        let _guard = self.mutation_lock.lock().await;
        let mut provider = self.get_or_create_locked(peer_id).await?;
        self.commit(&mut provider, mutate).await
    }

    async fn get_or_create_locked(&self, peer_id: &PeerId) -> Result<Provider> {
        if let Some(provider) = self.storage.get_provider(peer_id).await? {
            return Ok(provider);
        }
        let provider = Provider::new(peer_id.clone());
        self.storage.put_provider(provider.clone()).await?;
        info!(peer = %peer_id, "Provider registered");
        Ok(provider)
    }

    async fn commit<F>(&self, provider: &mut Provider, mutate: F) -> Result<Provider>
    where
        F: FnOnce(&mut Provider) -> Result<()>,
    {
        mutate(provider)?;
        provider.trust_score = provider.trust_score.clamp(0.0, 100.0);
        provider.updated_at = Utc::now().timestamp_millis();
        self.storage.put_provider(provider.clone()).await?;
        Ok(provider.clone())
    }
}
