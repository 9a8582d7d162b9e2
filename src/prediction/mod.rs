// Pari-mutuel prediction market: questions, pooled wagers, oracle-driven
// resolution sweep

pub mod market;
pub mod oracle;

pub use market::{PredictionEngine, ResolutionStats, WagerReceipt};
pub use oracle::{HttpOracle, OracleVerdict, ResolutionOracle};
