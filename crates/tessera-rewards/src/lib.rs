pub mod aggregator;

pub use aggregator::{ClaimAggregate, MarketStats, RecordOutcome, RewardAggregator, RewardConfig};
