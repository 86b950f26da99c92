use crate::provider::ProviderRegistry;
use std::sync::Arc;
use tessera_types::{Amount, PeerId, Result, TesseraError};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Fraction of current stake taken when no explicit slash amount is
    /// given.
    pub slash_fraction: f64,
    /// Trust score points removed per slash, floored at 0.
    pub trust_penalty: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            slash_fraction: 0.10,
            trust_penalty: 10.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlashOutcome {
    /// Stake actually removed, capped at the provider's balance.
    pub slashed: Amount,
    pub new_stake: Amount,
    pub new_trust_score: f64,
}

/// Economic state transitions over the provider registry. Each operation is
/// atomic per peer: it either fully applies or leaves the record untouched.
pub struct StakeLedger {
    registry: Arc<ProviderRegistry>,
    config: LedgerConfig,
}

impl StakeLedger {
    pub fn new(registry: Arc<ProviderRegistry>, config: LedgerConfig) -> Self {
        Self { registry, config }
    }

    /// Deposits collateral, registering the provider on first stake.
    pub async fn stake(&self, peer_id: &PeerId, amount: Amount) -> Result<Amount> {
        if amount.is_zero() {
            return Err(TesseraError::Validation(
                "stake amount must be positive".to_string(),
            ));
        }

        let provider = self
            .registry
            .update_or_create(peer_id, |provider| {
                provider.stake = provider
                    .stake
                    .checked_add(amount)
                    .ok_or_else(|| TesseraError::Internal("stake overflow".to_string()))?;
                Ok(())
            })
            .await?;

        info!(
            peer = %peer_id,
            amount = %amount,
            stake = %provider.stake,
            "💰 Stake deposited"
        );
        Ok(provider.stake)
    }

    /// Withdraws collateral. The stake can never go negative.
    pub async fn withdraw(&self, peer_id: &PeerId, amount: Amount) -> Result<Amount> {
        if amount.is_zero() {
            return Err(TesseraError::Validation(
                "withdraw amount must be positive".to_string(),
            ));
        }

        let provider = self
            .registry
            .update(peer_id, |provider| {
                provider.stake =
                    provider
                        .stake
                        .checked_sub(amount)
                        .ok_or(TesseraError::InsufficientStake {
                            available: provider.stake,
                            requested: amount,
                        })?;
                Ok(())
            })
            .await?;

        info!(
            peer = %peer_id,
            amount = %amount,
            stake = %provider.stake,
            "💸 Stake withdrawn"
        );
        Ok(provider.stake)
    }

    /// Punitive stake and trust reduction. Unilateral and irreversible:
    /// callers must deduplicate slash requests before invoking, the ledger
    /// itself never retries or rolls back a committed slash. A zero-stake
    /// provider still loses trust and gains a slash count.
    pub async fn slash(
        &self,
        peer_id: &PeerId,
        reason: &str,
        amount: Option<Amount>,
    ) -> Result<SlashOutcome> {
        let mut slashed = Amount::ZERO;
        let provider = self
            .registry
            .update(peer_id, |provider| {
                let requested =
                    amount.unwrap_or_else(|| provider.stake.scaled(self.config.slash_fraction));
                slashed = requested.min(provider.stake);
                provider.stake = provider.stake.saturating_sub(requested);
                provider.trust_score = (provider.trust_score - self.config.trust_penalty).max(0.0);
                provider.slash_count += 1;
                Ok(())
            })
            .await?;

        warn!(
            peer = %peer_id,
            reason = reason,
            slashed = %slashed,
            stake = %provider.stake,
            trust_score = provider.trust_score,
            "⚠️ Provider slashed"
        );

        Ok(SlashOutcome {
            slashed,
            new_stake: provider.stake,
            new_trust_score: provider.trust_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderRegistry;
    use crate::storage::MemoryStorage;

    fn ledger() -> (StakeLedger, Arc<ProviderRegistry>) {
        let registry = Arc::new(ProviderRegistry::new(Arc::new(MemoryStorage::new())));
        (
            StakeLedger::new(registry.clone(), LedgerConfig::default()),
            registry,
        )
    }

    #[tokio::test]
    async fn test_stake_then_withdraw() {
        let (ledger, registry) = ledger();
        let peer = PeerId::from("peer:42");

        let stake = ledger.stake(&peer, Amount::from_tokens(100.0)).await.unwrap();
        assert_eq!(stake, Amount::from_tokens(100.0));

        let stake = ledger.withdraw(&peer, Amount::from_tokens(30.0)).await.unwrap();
        assert_eq!(stake, Amount::from_tokens(70.0));

        let err = ledger
            .withdraw(&peer, Amount::from_tokens(100.0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_STAKE");

        // The failed withdrawal must not have touched the balance.
        assert_eq!(
            registry.get(&peer).await.unwrap().stake,
            Amount::from_tokens(70.0)
        );
    }

    #[tokio::test]
    async fn test_zero_amounts_rejected() {
        let (ledger, _) = ledger();
        let peer = PeerId::from("peer:zero");

        assert_eq!(
            ledger.stake(&peer, Amount::ZERO).await.unwrap_err().code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            ledger.withdraw(&peer, Amount::ZERO).await.unwrap_err().code(),
            "VALIDATION_ERROR"
        );
    }

    #[tokio::test]
    async fn test_default_slash_takes_ten_percent() {
        let (ledger, registry) = ledger();
        let peer = PeerId::from("peer:42");
        ledger.stake(&peer, Amount::from_tokens(70.0)).await.unwrap();

        let outcome = ledger.slash(&peer, "invalid receipt", None).await.unwrap();

        assert_eq!(outcome.slashed, Amount::from_tokens(7.0));
        assert_eq!(outcome.new_stake, Amount::from_tokens(63.0));
        assert_eq!(outcome.new_trust_score, 90.0);
        assert_eq!(registry.get(&peer).await.unwrap().slash_count, 1);
    }

    #[tokio::test]
    async fn test_slash_with_zero_stake_still_penalizes_trust() {
        let (ledger, registry) = ledger();
        let peer = PeerId::from("peer:broke");
        registry.get_or_create(&peer).await.unwrap();

        let outcome = ledger.slash(&peer, "repeat offender", None).await.unwrap();

        assert_eq!(outcome.slashed, Amount::ZERO);
        assert_eq!(outcome.new_stake, Amount::ZERO);
        assert_eq!(outcome.new_trust_score, 90.0);
        assert_eq!(registry.get(&peer).await.unwrap().slash_count, 1);
    }

    #[tokio::test]
    async fn test_explicit_slash_cannot_exceed_stake() {
        let (ledger, _) = ledger();
        let peer = PeerId::from("peer:small");
        ledger.stake(&peer, Amount::from_tokens(5.0)).await.unwrap();

        let outcome = ledger
            .slash(&peer, "fraud", Some(Amount::from_tokens(50.0)))
            .await
            .unwrap();

        assert_eq!(outcome.slashed, Amount::from_tokens(5.0));
        assert_eq!(outcome.new_stake, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_slash_unknown_peer_is_not_found() {
        let (ledger, _) = ledger();
        let err = ledger
            .slash(&PeerId::from("peer:ghost"), "whatever", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_stake_never_negative_across_sequences() {
        let (ledger, registry) = ledger();
        let peer = PeerId::from("peer:seq");

        ledger.stake(&peer, Amount::from_tokens(10.0)).await.unwrap();
        for _ in 0..20 {
            ledger.slash(&peer, "repeated", None).await.unwrap();
            let _ = ledger.withdraw(&peer, Amount::from_tokens(3.0)).await;
            let provider = registry.get(&peer).await.unwrap();
            assert!(provider.stake >= Amount::ZERO);
            assert!((0.0..=100.0).contains(&provider.trust_score));
        }
        // Trust bottoms out at the floor, never below.
        assert_eq!(registry.get(&peer).await.unwrap().trust_score, 0.0);
    }
}
