//! Moonbag: a simulated-economy settlement engine.
//!
//! One per-account currency ledger, three settlement mechanisms mutating it:
//! a constant-product AMM for tradable tokens, a mines-style wager game with
//! durable server-authoritative sessions, and a pari-mutuel prediction
//! market resolved by an external oracle. Authentication, HTTP routing and
//! notification transport are collaborators outside this crate.

pub mod amm;
pub mod app_state;
pub mod config;
pub mod error;
pub mod games;
pub mod ledger;
pub mod models;
pub mod notifier;
pub mod prediction;
pub mod session_store;

pub use amm::{AmmEngine, PoolSummary, TradeReceipt};
pub use app_state::AppState;
pub use config::Config;
pub use error::EngineError;
pub use games::{
    calculate_multiplier, CashoutReceipt, CoinSide, CoinflipEngine, MinesEngine, RevealOutcome,
    StartedWager,
};
pub use ledger::{Account, Ledger};
pub use models::{
    AccountId, PredictionQuestion, PredictionWager, PricePoint, QuestionStatus, TradeRecord,
    TradeSide, WagerSession, WagerStatus,
};
pub use notifier::{LogNotifier, Notifier};
pub use prediction::{HttpOracle, OracleVerdict, PredictionEngine, ResolutionOracle};
pub use session_store::SessionStore;
