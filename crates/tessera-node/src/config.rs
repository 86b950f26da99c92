use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tessera_market::{LedgerConfig, PricingConfig};
use tessera_rewards::RewardConfig;
use tessera_scheduler::SchedulerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub api: ApiSettings,
    pub ledger: LedgerSettings,
    pub pricing: PricingSettings,
    pub scheduler: SchedulerSettings,
    pub rewards: RewardSettings,
    /// Local worker pool served over the loopback transport. A networked
    /// deployment replaces this with mesh-discovered peers.
    pub workers: Vec<WorkerSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub name: String,
    /// Identity this node acts under when no caller identity is supplied.
    pub peer_id: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: "tessera".to_string(),
            peer_id: "peer:local".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub slash_fraction: f64,
    pub trust_penalty: f64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        let config = LedgerConfig::default();
        Self {
            slash_fraction: config.slash_fraction,
            trust_penalty: config.trust_penalty,
        }
    }
}

impl From<LedgerSettings> for LedgerConfig {
    fn from(settings: LedgerSettings) -> Self {
        Self {
            slash_fraction: settings.slash_fraction,
            trust_penalty: settings.trust_penalty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingSettings {
    pub base_price: f64,
    pub cycle_rate: f64,
    pub max_discount: f64,
    pub min_price: f64,
}

impl Default for PricingSettings {
    fn default() -> Self {
        let config = PricingConfig::default();
        Self {
            base_price: config.base_price,
            cycle_rate: config.cycle_rate,
            max_discount: config.max_discount,
            min_price: config.min_price,
        }
    }
}

impl From<PricingSettings> for PricingConfig {
    fn from(settings: PricingSettings) -> Self {
        Self {
            base_price: settings.base_price,
            cycle_rate: settings.cycle_rate,
            max_discount: settings.max_discount,
            min_price: settings.min_price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub dispatch_timeout_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            dispatch_timeout_ms: SchedulerConfig::default().dispatch_timeout_ms,
        }
    }
}

impl From<SchedulerSettings> for SchedulerConfig {
    fn from(settings: SchedulerSettings) -> Self {
        Self {
            dispatch_timeout_ms: settings.dispatch_timeout_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardSettings {
    pub cycle_rate: f64,
    pub zk_bonus_per_proof: f64,
    pub cycles_per_claimed_id: u64,
    pub execution_ms_per_cycle: u64,
}

impl Default for RewardSettings {
    fn default() -> Self {
        let config = RewardConfig::default();
        Self {
            cycle_rate: config.cycle_rate,
            zk_bonus_per_proof: config.zk_bonus_per_proof,
            cycles_per_claimed_id: config.cycles_per_claimed_id,
            execution_ms_per_cycle: config.execution_ms_per_cycle,
        }
    }
}

impl From<RewardSettings> for RewardConfig {
    fn from(settings: RewardSettings) -> Self {
        Self {
            cycle_rate: settings.cycle_rate,
            zk_bonus_per_proof: settings.zk_bonus_per_proof,
            cycles_per_claimed_id: settings.cycles_per_claimed_id,
            execution_ms_per_cycle: settings.execution_ms_per_cycle,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub peer_id: String,
    pub compute_score: f64,
    /// Attach proofs to receipts produced by this worker.
    #[serde(default = "default_true")]
    pub proof_backend: bool,
}

fn default_true() -> bool {
    true
}

impl NodeConfig {
    /// Defaults plus a small worker pool, so a fresh node can execute jobs
    /// out of the box.
    pub fn standalone() -> Self {
        Self {
            workers: vec![
                WorkerSettings {
                    peer_id: "peer:worker-1".to_string(),
                    compute_score: 50.0,
                    proof_backend: true,
                },
                WorkerSettings {
                    peer_id: "peer:worker-2".to_string(),
                    compute_score: 30.0,
                    proof_backend: true,
                },
            ],
            ..Default::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self).context("encoding config")?;
        std::fs::write(path, raw).with_context(|| format!("writing config {}", path.display()))
    }
}
