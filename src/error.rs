// Error taxonomy for all settlement paths
//
// Four families, matching how callers must react:
// - validation errors: rejected before any lock is taken, no side effects
// - insufficient funds: ledger check failed inside the transaction, full abort
// - resource-state errors: the operation targets a resource in the wrong state
// - collaborator errors: oracle/notification failures, logged, never abort a
//   committed settlement

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::AccountId;

#[derive(Debug, Error)]
pub enum EngineError {
    // ===== VALIDATION (no lock taken, no side effects) =====
    #[error("invalid request: {0}")]
    Validation(String),

    // ===== LEDGER =====
    #[error("insufficient funds: you need {needed} but only have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("account {0} does not exist")]
    UnknownAccount(AccountId),

    // ===== AMM POOL =====
    #[error("token {0} does not exist")]
    UnknownToken(String),

    #[error("token {0} is delisted and cannot be traded")]
    Delisted(String),

    #[error("liquidity pool is not properly initialized or is empty")]
    LiquidityUninitialized,

    #[error("cannot sell {requested}, maximum sellable is {max_sellable} (99.5% of pool reserve)")]
    ExcessiveSellSize {
        requested: Decimal,
        max_sellable: Decimal,
    },

    #[error("sell would drain the pool below the minimum liquidity floor")]
    LiquidityFloorBreach,

    #[error("insufficient tokens: you hold {held} but tried to sell {requested}")]
    InsufficientTokens { held: Decimal, requested: Decimal },

    // ===== WAGER SESSIONS =====
    #[error("invalid session")]
    SessionNotFound,

    #[error("tile already revealed")]
    AlreadyRevealed,

    // ===== PREDICTION MARKET =====
    #[error("question {0} not found")]
    UnknownQuestion(u64),

    #[error("question is not active for betting")]
    QuestionNotActive,

    #[error("question has reached its resolution date")]
    BettingClosed,

    // ===== COLLABORATORS (logged, never abort a commit) =====
    #[error("oracle call failed: {0}")]
    Oracle(String),

    #[error("notification delivery failed: {0}")]
    Notification(String),

    // ===== INFRASTRUCTURE =====
    #[error("session store failure: {0}")]
    Store(#[from] sled::Error),

    #[error("session encoding failure: {0}")]
    Codec(#[from] serde_json::Error),
}

impl EngineError {
    /// Collaborator failures are best-effort by design and must never roll
    /// back the settlement that triggered them.
    pub fn is_collaborator(&self) -> bool {
        matches!(self, EngineError::Oracle(_) | EngineError::Notification(_))
    }
}
