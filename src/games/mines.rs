// Mines wager sessions
//
// 25-tile board, server-picked mine positions, multiplier grows with every
// safe reveal. The bet is debited at start and the session is the only
// record of the debt, so sessions live in the durable store and every
// terminal transition (mine hit, win, cashout, expiry) must be claimed
// through an atomic conditional delete: at most one path settles a session.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{error, info};

use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::models::{quantize, AccountId, WagerSession, WagerStatus};
use crate::session_store::SessionStore;

// ============================================================================
// GAME CONSTANTS
// ============================================================================

pub const TOTAL_TILES: u8 = 25;
pub const MIN_MINES: u8 = 3;
pub const MAX_MINES: u8 = 24;

/// Largest accepted bet.
pub const MAX_BET: Decimal = dec!(1_000_000);

/// Fraction of the fair payout withheld by the house.
const HOUSE_EDGE: f64 = 0.05;

/// No single session ever pays above this, whatever the curve says.
const ABSOLUTE_MAX_PAYOUT: f64 = 5_000_000.0;

/// Base multiplier cap before the per-pick growth term.
const BASE_MULTIPLIER_CAP: f64 = 1.4;

/// Cap base that very large bets are interpolated down to.
const MIN_MULTIPLIER_CAP: f64 = 1.1;

/// Exponent of the per-pick cap growth term.
const CAP_GROWTH_RATE: f64 = 0.45;

/// Bets above this start shrinking the cap base toward the minimum.
const HIGH_BET_THRESHOLD: f64 = 100_000.0;

// ============================================================================
// PAYOUT CURVE
// ============================================================================

/// Payout ceiling for a given bet after `picks` safe reveals.
///
/// The cap base interpolates from `BASE_MULTIPLIER_CAP` down to
/// `MIN_MULTIPLIER_CAP` as the bet runs from the high-bet threshold up to
/// the maximum bet, then grows with `picks^CAP_GROWTH_RATE`.
fn max_payout(bet: f64, picks: usize) -> f64 {
    let max_bet = MAX_BET.to_f64().unwrap_or(f64::MAX);
    let over = ((bet - HIGH_BET_THRESHOLD) / (max_bet - HIGH_BET_THRESHOLD)).clamp(0.0, 1.0);
    let base = BASE_MULTIPLIER_CAP - (BASE_MULTIPLIER_CAP - MIN_MULTIPLIER_CAP) * over;
    let effective_cap = base + (picks as f64).powf(CAP_GROWTH_RATE);

    (bet * effective_cap).min(ABSOLUTE_MAX_PAYOUT)
}

/// Multiplier after `picks` safe reveals with `mines` mines on the board.
///
/// Survival probability is the product of (safe remaining / tiles remaining)
/// over each pick; the fair multiplier is its inverse less the house edge;
/// the result is capped by the payout curve and floored at 1.0.
pub fn calculate_multiplier(picks: usize, mines: u8, bet: Decimal) -> f64 {
    let mut probability = 1.0_f64;
    for i in 0..picks {
        let safe = i32::from(TOTAL_TILES) - i32::from(mines) - i as i32;
        let remaining = i32::from(TOTAL_TILES) - i as i32;
        probability *= f64::from(safe) / f64::from(remaining);
    }
    if probability <= 0.0 {
        return 1.0;
    }

    let bet = bet.to_f64().unwrap_or(0.0);
    if bet <= 0.0 {
        return 1.0;
    }

    let fair_multiplier = (1.0 / probability) * (1.0 - HOUSE_EDGE);
    let raw_payout = fair_multiplier * bet;
    let capped_payout = raw_payout.min(max_payout(bet, picks));

    (capped_payout / bet).max(1.0)
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StartedWager {
    pub token: String,
    pub new_balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RevealOutcome {
    /// Hit a mine: the bet (debited at start) is forfeited and the session
    /// is gone. Mine positions are disclosed now that the game is over.
    Mine { mine_positions: Vec<u8> },
    /// Safe reveal; the session stays active at the new multiplier.
    Safe { multiplier: f64 },
    /// Every safe tile revealed: paid out and destroyed.
    Won {
        payout: Decimal,
        multiplier: f64,
        new_balance: Decimal,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct CashoutReceipt {
    pub payout: Decimal,
    pub amount_wagered: Decimal,
    /// True when nothing was revealed: the bet is returned in full.
    pub aborted: bool,
    pub new_balance: Decimal,
    pub mine_positions: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepStats {
    pub refunded: usize,
    pub cashed_out: usize,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct MinesEngine {
    ledger: Arc<Ledger>,
    store: Arc<SessionStore>,
    /// Sessions idle longer than this are settled by the sweep.
    idle_ttl: Duration,
}

impl MinesEngine {
    pub fn new(ledger: Arc<Ledger>, store: Arc<SessionStore>, idle_ttl: Duration) -> Self {
        Self {
            ledger,
            store,
            idle_ttl,
        }
    }

    /// Start a session: debit the bet, place the mines, persist.
    pub async fn start(
        &self,
        account_id: AccountId,
        bet: Decimal,
        mine_count: u8,
    ) -> Result<StartedWager, EngineError> {
        if !(MIN_MINES..=MAX_MINES).contains(&mine_count) {
            return Err(EngineError::Validation(format!(
                "mine count must be between {} and {}",
                MIN_MINES, MAX_MINES
            )));
        }
        let bet = quantize(bet);
        if bet <= Decimal::ZERO {
            return Err(EngineError::Validation("bet must be positive".to_string()));
        }
        if bet > MAX_BET {
            return Err(EngineError::Validation("bet amount too large".to_string()));
        }

        let new_balance = {
            let mut account = self.ledger.lock_account(account_id).await?;
            account.adjust(-bet)?
        };

        let mut token_bytes = [0u8; 8];
        OsRng.fill_bytes(&mut token_bytes);
        let token = hex::encode(token_bytes);

        let mut mine_positions: Vec<u8> =
            rand::seq::index::sample(&mut OsRng, TOTAL_TILES as usize, mine_count as usize)
                .iter()
                .map(|i| i as u8)
                .collect();
        mine_positions.sort_unstable();

        let now = Utc::now();
        let session = WagerSession {
            token: token.clone(),
            account_id,
            bet,
            mine_count,
            mine_positions,
            revealed: Vec::new(),
            multiplier: 1.0,
            status: WagerStatus::Active,
            started_at: now,
            last_activity: now,
        };

        if let Err(e) = self.store.insert(&session) {
            // the debit must not be orphaned if the session cannot persist
            error!(account = account_id, error = %e, "failed to persist session, refunding bet");
            let _ = self.ledger.adjust(account_id, bet).await;
            return Err(e);
        }

        info!(account = account_id, %token, bet = %bet, mines = mine_count, "mines session started");
        Ok(StartedWager { token, new_balance })
    }

    /// Reveal one tile.
    ///
    /// Runs a compare-and-swap loop against the stored session so that two
    /// concurrent reveals (or a reveal racing the sweep) serialize; a
    /// terminal transition is claimed via conditional delete.
    pub async fn reveal(&self, token: &str, tile: u8) -> Result<RevealOutcome, EngineError> {
        if tile >= TOTAL_TILES {
            return Err(EngineError::Validation(format!(
                "tile index must be below {}",
                TOTAL_TILES
            )));
        }

        loop {
            let (witness, mut session) = self
                .store
                .load(token)?
                .ok_or(EngineError::SessionNotFound)?;

            if session.revealed.contains(&tile) {
                return Err(EngineError::AlreadyRevealed);
            }
            session.last_activity = Utc::now();

            if session.mine_positions.contains(&tile) {
                // terminal: forfeit. The bet was taken at start; there is
                // nothing to settle, only the session to destroy.
                if !self.store.remove_if(token, &witness)? {
                    continue;
                }
                info!(%token, account = session.account_id, tile, "mine hit, bet forfeited");
                return Ok(RevealOutcome::Mine {
                    mine_positions: session.mine_positions,
                });
            }

            session.revealed.push(tile);
            session.multiplier =
                calculate_multiplier(session.revealed.len(), session.mine_count, session.bet);

            let all_safe_revealed =
                session.revealed.len() == usize::from(TOTAL_TILES - session.mine_count);
            if all_safe_revealed {
                if !self.store.remove_if(token, &witness)? {
                    continue;
                }
                let payout = payout_for(&session);
                let new_balance = self.ledger.adjust(session.account_id, payout).await?;
                info!(%token, account = session.account_id, payout = %payout, "board cleared, session won");
                return Ok(RevealOutcome::Won {
                    payout,
                    multiplier: session.multiplier,
                    new_balance,
                });
            }

            if self.store.swap(token, &witness, &session)? {
                return Ok(RevealOutcome::Safe {
                    multiplier: session.multiplier,
                });
            }
            // lost the race; re-read and retry
        }
    }

    /// Cash out: with zero reveals the bet is returned in full (abort),
    /// otherwise pays bet * multiplier. The session is claimed atomically,
    /// so a racing sweep or reveal can never settle it again.
    pub async fn cashout(&self, token: &str) -> Result<CashoutReceipt, EngineError> {
        let session = self.store.take(token)?.ok_or(EngineError::SessionNotFound)?;

        let aborted = session.revealed.is_empty();
        let payout = if aborted {
            session.bet
        } else {
            payout_for(&session)
        };
        let new_balance = self.ledger.adjust(session.account_id, payout).await?;

        info!(
            %token,
            account = session.account_id,
            payout = %payout,
            aborted,
            "mines session cashed out"
        );
        Ok(CashoutReceipt {
            payout,
            amount_wagered: session.bet,
            aborted,
            new_balance,
            mine_positions: session.mine_positions,
        })
    }

    /// Settle every session idle past the TTL.
    ///
    /// Un-played sessions are refunded; played sessions are auto-cashed-out
    /// at their current multiplier. Each claim goes through the conditional
    /// delete, so a session concurrently settled by an interactive call is
    /// simply skipped.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepStats, EngineError> {
        let mut stats = SweepStats::default();

        for (witness, session) in self.store.scan()? {
            if now - session.last_activity <= self.idle_ttl {
                continue;
            }
            if !self.store.remove_if(&session.token, &witness)? {
                continue;
            }

            let payout = if session.revealed.is_empty() {
                stats.refunded += 1;
                session.bet
            } else {
                stats.cashed_out += 1;
                payout_for(&session)
            };

            if let Err(e) = self.ledger.adjust(session.account_id, payout).await {
                error!(
                    token = %session.token,
                    account = session.account_id,
                    error = %e,
                    "failed to settle expired session"
                );
            }
        }

        if stats.refunded + stats.cashed_out > 0 {
            info!(
                refunded = stats.refunded,
                cashed_out = stats.cashed_out,
                "expired mines sessions settled"
            );
        }
        Ok(stats)
    }
}

fn payout_for(session: &WagerSession) -> Decimal {
    let multiplier = Decimal::from_f64(session.multiplier).unwrap_or(Decimal::ONE);
    quantize(session.bet * multiplier)
}
