// Persisted record shapes shared across the settlement engines

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AccountId = u64;

/// Fractional digits carried by every committed balance, reserve and amount.
pub const BALANCE_SCALE: u32 = 8;

/// Round a currency/token amount to the ledger's fixed-point scale.
///
/// Half-away-from-zero, so credits and debits of the same magnitude cancel.
pub fn quantize(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(BALANCE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

// ============================================================================
// TRADE LOG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

/// Immutable, append-only record of one executed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub account_id: AccountId,
    pub side: TradeSide,
    /// Tokens bought or sold
    pub quantity: Decimal,
    /// Currency per token at execution
    pub unit_price: Decimal,
    /// Currency spent (BUY) or received (SELL)
    pub total_amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// One point of a pool's price history, appended on every committed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// WAGER SESSIONS (mines)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    Active,
    Won,
    Lost,
}

/// Server-authoritative state of one mines game.
///
/// Persisted in the durable session store for its whole lifetime: the bet is
/// debited before the session exists, so a session that outlived its process
/// must still be settleable by the expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerSession {
    /// Opaque, unguessable session token (8 random bytes, hex)
    pub token: String,
    pub account_id: AccountId,
    pub bet: Decimal,
    pub mine_count: u8,
    /// Mine cell indices on the 25-tile board. Never sent to the client
    /// while the session is active.
    pub mine_positions: Vec<u8>,
    /// Cells revealed so far, in reveal order
    pub revealed: Vec<u8>,
    /// Multiplier after the last safe reveal, floored at 1.0
    pub multiplier: f64,
    pub status: WagerStatus,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

// ============================================================================
// PREDICTION MARKET
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuestionStatus {
    Active,
    Resolved,
    Cancelled,
}

impl QuestionStatus {
    /// Resolution and cancellation are one-way gates.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QuestionStatus::Resolved | QuestionStatus::Cancelled)
    }
}

/// A single pooled wager on one side of a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionWager {
    pub account_id: AccountId,
    /// true = YES, false = NO
    pub side: bool,
    pub amount: Decimal,
    /// Set exactly once when the wager is settled; the idempotence guard
    /// against double payouts.
    pub settled_at: Option<DateTime<Utc>>,
    pub winnings: Decimal,
    pub placed_at: DateTime<Utc>,
}

/// A binary prediction question with pari-mutuel pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionQuestion {
    pub id: u64,
    pub text: String,
    pub status: QuestionStatus,
    pub resolution_deadline: DateTime<Utc>,
    pub yes_amount: Decimal,
    pub no_amount: Decimal,
    /// Oracle verdict, set at most once
    pub resolution: Option<bool>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub wagers: Vec<PredictionWager>,
}

impl PredictionQuestion {
    pub fn total_pool(&self) -> Decimal {
        self.yes_amount + self.no_amount
    }

    pub fn side_total(&self, side: bool) -> Decimal {
        if side {
            self.yes_amount
        } else {
            self.no_amount
        }
    }
}
