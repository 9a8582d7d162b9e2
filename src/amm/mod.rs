// Constant-product AMM: pool engine plus rolling 24h metrics

pub mod metrics;
pub mod pool;

pub use metrics::{rolling_24h, PoolMetrics};
pub use pool::{
    AmmEngine, LiquidityPool, PoolSummary, Quote, TradeReceipt, CREATION_FEE, FIXED_SUPPLY,
    INITIAL_LIQUIDITY, STARTING_PRICE,
};
