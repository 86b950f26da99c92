use crate::provider::ProviderRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_types::{PeerId, Result};

#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub base_price: f64,
    /// Price per billable cycle.
    pub cycle_rate: f64,
    /// Discount granted to a provider with a perfect trust score.
    pub max_discount: f64,
    /// The quoted price never falls below this floor.
    pub min_price: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_price: 0.001,
            cycle_rate: 0.0001,
            max_discount: 0.0005,
            min_price: 0.0001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub base_price: f64,
    pub cycle_rate: f64,
    pub reputation_discount: f64,
    pub price: f64,
}

/// Requester-side price quotes. Better-reputed providers cost less, but the
/// price is floored so it can never reach zero.
pub struct PricingEngine {
    registry: Arc<ProviderRegistry>,
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(registry: Arc<ProviderRegistry>, config: PricingConfig) -> Self {
        Self { registry, config }
    }

    pub async fn quote(&self, cycles: u64, peer_id: Option<&PeerId>) -> Result<PriceQuote> {
        let reputation_discount = match peer_id {
            Some(peer) => match self.registry.find(peer).await? {
                Some(provider) => (provider.trust_score / 100.0) * self.config.max_discount,
                None => 0.0,
            },
            None => 0.0,
        };

        let raw = self.config.base_price + cycles as f64 * self.config.cycle_rate
            - reputation_discount;

        Ok(PriceQuote {
            base_price: self.config.base_price,
            cycle_rate: self.config.cycle_rate,
            reputation_discount,
            price: raw.max(self.config.min_price),
        })
    }
}
