// Coinflip
//
// Single-roll double-or-nothing. Unlike mines there is no session: the
// debit, the roll and the payout happen inside one account lock, so there
// is nothing to persist and nothing for a sweep to clean up.

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EngineError;
use crate::games::mines::MAX_BET;
use crate::ledger::Ledger;
use crate::models::{quantize, AccountId};

const WIN_MULTIPLIER: Decimal = rust_decimal_macros::dec!(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinSide {
    Heads,
    Tails,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlipReceipt {
    pub won: bool,
    pub result: CoinSide,
    pub payout: Decimal,
    pub amount_wagered: Decimal,
    pub new_balance: Decimal,
}

pub struct CoinflipEngine {
    ledger: Arc<Ledger>,
}

impl CoinflipEngine {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Flip: debit the bet, roll one random byte, credit 2x on a win.
    pub async fn flip(
        &self,
        account_id: AccountId,
        side: CoinSide,
        amount: Decimal,
    ) -> Result<FlipReceipt, EngineError> {
        let amount = quantize(amount);
        if amount <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "bet must be positive".to_string(),
            ));
        }
        if amount > MAX_BET {
            return Err(EngineError::Validation("bet amount too large".to_string()));
        }

        let mut account = self.ledger.lock_account(account_id).await?;
        account.adjust(-amount)?;

        let mut roll = [0u8; 1];
        OsRng.fill_bytes(&mut roll);
        let result = if roll[0] < 128 {
            CoinSide::Heads
        } else {
            CoinSide::Tails
        };
        let won = result == side;

        let payout = if won {
            quantize(amount * WIN_MULTIPLIER)
        } else {
            Decimal::ZERO
        };
        let new_balance = if won {
            account.adjust(payout)?
        } else {
            account.balance()
        };

        info!(account = account_id, won, wagered = %amount, payout = %payout, "coinflip settled");
        Ok(FlipReceipt {
            won,
            result,
            payout,
            amount_wagered: amount,
            new_balance,
        })
    }
}
