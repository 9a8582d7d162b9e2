// Pari-mutuel prediction market settlement
//
// Wagers pool on the YES/NO side of a question; after the resolution
// deadline a sweep asks the oracle for a verdict and distributes the whole
// pool to the winning side, pro rata by stake. The oracle runs outside any
// lock; only the commit that applies its verdict is locked. A question's
// RESOLVED status and each wager's settled_at are one-way gates, so no
// wager can ever be paid twice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::models::{
    quantize, AccountId, PredictionQuestion, PredictionWager, QuestionStatus,
};
use crate::prediction::oracle::ResolutionOracle;

// ============================================================================
// QUESTION CONSTANTS
// ============================================================================

const MIN_QUESTION_CHARS: usize = 10;
const MAX_QUESTION_CHARS: usize = 200;

/// Earliest allowed resolution deadline, measured from submission.
const MIN_RESOLUTION_WINDOW_HOURS: i64 = 1;

/// Latest allowed resolution deadline, measured from submission.
const MAX_RESOLUTION_WINDOW_DAYS: i64 = 30;

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct WagerReceipt {
    pub question_id: u64,
    pub side: bool,
    pub amount: Decimal,
    /// What this wager would pay if its side won at the current pools
    pub potential_winnings: Decimal,
    pub new_balance: Decimal,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ResolutionStats {
    pub resolved: usize,
    pub cancelled: usize,
    pub deferred: usize,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct PredictionEngine {
    ledger: Arc<Ledger>,
    oracle: Arc<dyn ResolutionOracle>,
    questions: RwLock<HashMap<u64, Arc<Mutex<PredictionQuestion>>>>,
    next_id: AtomicU64,
    /// Verdicts below this confidence are discarded and retried later
    min_confidence: u8,
    /// Questions stuck unresolved longer than this past their deadline are
    /// cancelled and refunded
    max_unresolved_age: Duration,
}

impl PredictionEngine {
    pub fn new(
        ledger: Arc<Ledger>,
        oracle: Arc<dyn ResolutionOracle>,
        min_confidence: u8,
        max_unresolved_age: Duration,
    ) -> Self {
        Self {
            ledger,
            oracle,
            questions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            min_confidence,
            max_unresolved_age,
        }
    }

    fn question_row(&self, id: u64) -> Result<Arc<Mutex<PredictionQuestion>>, EngineError> {
        let questions = self.questions.read().expect("question map poisoned");
        questions
            .get(&id)
            .cloned()
            .ok_or(EngineError::UnknownQuestion(id))
    }

    /// Submit a question. The requested deadline is clamped into the
    /// allowed window; external content validation happens upstream.
    pub fn submit_question(
        &self,
        text: &str,
        deadline: DateTime<Utc>,
    ) -> Result<u64, EngineError> {
        let text = text.trim();
        if text.len() < MIN_QUESTION_CHARS || text.len() > MAX_QUESTION_CHARS {
            return Err(EngineError::Validation(format!(
                "question must be between {} and {} characters",
                MIN_QUESTION_CHARS, MAX_QUESTION_CHARS
            )));
        }

        let now = Utc::now();
        let deadline = deadline
            .max(now + Duration::hours(MIN_RESOLUTION_WINDOW_HOURS))
            .min(now + Duration::days(MAX_RESOLUTION_WINDOW_DAYS));

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let question = PredictionQuestion {
            id,
            text: text.to_string(),
            status: QuestionStatus::Active,
            resolution_deadline: deadline,
            yes_amount: Decimal::ZERO,
            no_amount: Decimal::ZERO,
            resolution: None,
            resolved_at: None,
            created_at: now,
            wagers: Vec::new(),
        };

        let mut questions = self.questions.write().expect("question map poisoned");
        questions.insert(id, Arc::new(Mutex::new(question)));
        info!(question = id, %deadline, "prediction question submitted");
        Ok(id)
    }

    pub async fn question(&self, id: u64) -> Result<PredictionQuestion, EngineError> {
        let row = self.question_row(id)?;
        let question = row.lock().await;
        Ok(question.clone())
    }

    /// Place a pooled wager: debit the stake and bump the side total, all
    /// under the question lock so pool totals and wagers never diverge.
    pub async fn place_wager(
        &self,
        account_id: AccountId,
        question_id: u64,
        side: bool,
        amount: Decimal,
    ) -> Result<WagerReceipt, EngineError> {
        let amount = quantize(amount);
        if amount <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "wager amount must be positive".to_string(),
            ));
        }

        let row = self.question_row(question_id)?;
        let mut question = row.lock().await;

        if question.status != QuestionStatus::Active {
            return Err(EngineError::QuestionNotActive);
        }
        let now = Utc::now();
        if now >= question.resolution_deadline {
            return Err(EngineError::BettingClosed);
        }

        let new_balance = {
            let mut account = self.ledger.lock_account(account_id).await?;
            account.adjust(-amount)?
        };

        question.wagers.push(PredictionWager {
            account_id,
            side,
            amount,
            settled_at: None,
            winnings: Decimal::ZERO,
            placed_at: now,
        });
        if side {
            question.yes_amount += amount;
        } else {
            question.no_amount += amount;
        }

        let potential_winnings =
            quantize(question.total_pool() / question.side_total(side) * amount);
        info!(
            question = question_id,
            account = account_id,
            side,
            amount = %amount,
            "prediction wager placed"
        );

        Ok(WagerReceipt {
            question_id,
            side,
            amount,
            potential_winnings,
            new_balance,
        })
    }

    /// Resolution sweep: for every ACTIVE question past its deadline, ask
    /// the oracle (outside any lock) and commit the verdict. Low-confidence
    /// or failed verdicts defer the question to the next sweep; questions
    /// stuck past the maximum unresolved age are cancelled and refunded.
    pub async fn resolve_due(
        &self,
        now: DateTime<Utc>,
        platform_context: &str,
    ) -> ResolutionStats {
        let mut stats = ResolutionStats::default();

        let rows: Vec<Arc<Mutex<PredictionQuestion>>> = {
            let questions = self.questions.read().expect("question map poisoned");
            questions.values().cloned().collect()
        };

        for row in rows {
            // short lock: snapshot due-ness and text, then release
            let (id, text, overdue) = {
                let question = row.lock().await;
                if question.status != QuestionStatus::Active
                    || question.resolution_deadline > now
                {
                    continue;
                }
                (
                    question.id,
                    question.text.clone(),
                    now - question.resolution_deadline > self.max_unresolved_age,
                )
            };

            if overdue {
                if self.cancel_and_refund(&row, now).await {
                    stats.cancelled += 1;
                }
                continue;
            }

            // slow call, no locks held
            let verdict = match self.oracle.resolve(&text, platform_context).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(question = id, error = %e, "oracle call failed, deferring");
                    stats.deferred += 1;
                    continue;
                }
            };
            if verdict.confidence < self.min_confidence {
                info!(
                    question = id,
                    confidence = verdict.confidence,
                    "verdict below confidence threshold, deferring"
                );
                stats.deferred += 1;
                continue;
            }

            if self.settle(&row, verdict.resolution, now).await {
                info!(
                    question = id,
                    resolution = verdict.resolution,
                    confidence = verdict.confidence,
                    reasoning = %verdict.reasoning,
                    "question resolved"
                );
                stats.resolved += 1;
            }
        }

        stats
    }

    /// Commit a verdict. Returns false if another path already closed the
    /// question while the oracle was running.
    async fn settle(
        &self,
        row: &Arc<Mutex<PredictionQuestion>>,
        resolution: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let mut question = row.lock().await;
        if question.status != QuestionStatus::Active {
            return false;
        }

        question.status = QuestionStatus::Resolved;
        question.resolution = Some(resolution);
        question.resolved_at = Some(now);

        let total_pool = question.total_pool();
        let winning_side_total = question.side_total(resolution);

        let mut credits: Vec<(AccountId, Decimal)> = Vec::new();
        for wager in question.wagers.iter_mut() {
            if wager.settled_at.is_some() {
                continue;
            }
            let won = wager.side == resolution;
            // when nobody backed the winning side, the pool goes to the house
            wager.winnings = if won && winning_side_total > Decimal::ZERO {
                quantize(total_pool / winning_side_total * wager.amount)
            } else {
                Decimal::ZERO
            };
            wager.settled_at = Some(now);
            if wager.winnings > Decimal::ZERO {
                credits.push((wager.account_id, wager.winnings));
            }
        }

        for (account_id, winnings) in credits {
            if let Err(e) = self.ledger.adjust(account_id, winnings).await {
                error!(
                    question = question.id,
                    account = account_id,
                    error = %e,
                    "failed to credit prediction winnings"
                );
            }
        }
        true
    }

    /// Cancel a stuck question and refund every unsettled stake exactly
    /// once. Returns false if the question was closed concurrently.
    async fn cancel_and_refund(
        &self,
        row: &Arc<Mutex<PredictionQuestion>>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut question = row.lock().await;
        if question.status != QuestionStatus::Active {
            return false;
        }
        question.status = QuestionStatus::Cancelled;
        question.resolved_at = Some(now);

        let mut refunds: Vec<(AccountId, Decimal)> = Vec::new();
        for wager in question.wagers.iter_mut() {
            if wager.settled_at.is_some() {
                continue;
            }
            wager.settled_at = Some(now);
            refunds.push((wager.account_id, wager.amount));
        }

        for (account_id, amount) in refunds {
            if let Err(e) = self.ledger.adjust(account_id, amount).await {
                error!(
                    question = question.id,
                    account = account_id,
                    error = %e,
                    "failed to refund cancelled wager"
                );
            }
        }

        warn!(
            question = question.id,
            "question cancelled after exceeding maximum unresolved age"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::oracle::OracleVerdict;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicBool;

    /// Oracle stub with a scriptable verdict.
    struct ScriptedOracle {
        resolution: bool,
        confidence: u8,
        fail: AtomicBool,
    }

    impl ScriptedOracle {
        fn verdict(resolution: bool, confidence: u8) -> Arc<Self> {
            Arc::new(Self {
                resolution,
                confidence,
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl ResolutionOracle for ScriptedOracle {
        async fn resolve(&self, _: &str, _: &str) -> Result<OracleVerdict, EngineError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(EngineError::Oracle("scripted failure".to_string()));
            }
            Ok(OracleVerdict {
                resolution: self.resolution,
                confidence: self.confidence,
                reasoning: "scripted".to_string(),
            })
        }
    }

    fn engine(oracle: Arc<dyn ResolutionOracle>) -> (Arc<Ledger>, PredictionEngine) {
        let ledger = Arc::new(Ledger::new());
        for id in 1..=3 {
            ledger.open_account(id, dec!(1000));
        }
        let predictions = PredictionEngine::new(
            Arc::clone(&ledger),
            oracle,
            50,
            Duration::days(7),
        );
        (ledger, predictions)
    }

    async fn force_deadline(engine: &PredictionEngine, id: u64, deadline: DateTime<Utc>) {
        let row = engine.question_row(id).unwrap();
        let mut question = row.lock().await;
        question.resolution_deadline = deadline;
    }

    #[tokio::test]
    async fn wager_placement_debits_and_tracks_pools() {
        let (ledger, engine) = engine(ScriptedOracle::verdict(true, 90));
        let id = engine
            .submit_question("Will *MOON reach 1.0 this week?", Utc::now() + Duration::days(1))
            .unwrap();

        let receipt = engine.place_wager(1, id, true, dec!(100)).await.unwrap();
        assert_eq!(receipt.new_balance, dec!(900));
        // only yes money so far: pool pays back exactly the stake
        assert_eq!(receipt.potential_winnings, dec!(100));

        engine.place_wager(2, id, false, dec!(300)).await.unwrap();
        let question = engine.question(id).await.unwrap();
        assert_eq!(question.yes_amount, dec!(100));
        assert_eq!(question.no_amount, dec!(300));
        assert_eq!(ledger.balance(2).await.unwrap(), dec!(700));
    }

    #[tokio::test]
    async fn invalid_wagers_are_rejected_before_any_debit() {
        let (ledger, engine) = engine(ScriptedOracle::verdict(true, 90));
        let id = engine
            .submit_question("Will *MOON reach 1.0 this week?", Utc::now() + Duration::days(1))
            .unwrap();

        assert!(matches!(
            engine.place_wager(1, id, true, dec!(0)).await.unwrap_err(),
            EngineError::Validation(_)
        ));
        assert!(matches!(
            engine.place_wager(1, 999, true, dec!(10)).await.unwrap_err(),
            EngineError::UnknownQuestion(999)
        ));

        force_deadline(&engine, id, Utc::now() - Duration::seconds(1)).await;
        assert!(matches!(
            engine.place_wager(1, id, true, dec!(10)).await.unwrap_err(),
            EngineError::BettingClosed
        ));
        assert_eq!(ledger.balance(1).await.unwrap(), dec!(1000));
    }

    #[tokio::test]
    async fn winners_split_the_whole_pool_pro_rata() {
        let (ledger, engine) = engine(ScriptedOracle::verdict(false, 80));
        let id = engine
            .submit_question("Will *MOON reach 1.0 this week?", Utc::now() + Duration::days(1))
            .unwrap();

        engine.place_wager(1, id, true, dec!(100)).await.unwrap();
        engine.place_wager(2, id, false, dec!(300)).await.unwrap();
        engine.place_wager(3, id, false, dec!(100)).await.unwrap();

        force_deadline(&engine, id, Utc::now() - Duration::seconds(1)).await;
        let stats = engine.resolve_due(Utc::now(), "context").await;
        assert_eq!(stats.resolved, 1);

        // pool 500, winning side 400: payouts 375 + 125 = whole pool
        assert_eq!(ledger.balance(1).await.unwrap(), dec!(900));
        assert_eq!(ledger.balance(2).await.unwrap(), dec!(1075));
        assert_eq!(ledger.balance(3).await.unwrap(), dec!(1025));

        let question = engine.question(id).await.unwrap();
        assert_eq!(question.status, QuestionStatus::Resolved);
        assert_eq!(question.resolution, Some(false));
        assert!(question.wagers.iter().all(|w| w.settled_at.is_some()));
        let paid: Decimal = question.wagers.iter().map(|w| w.winnings).sum();
        assert_eq!(paid, question.total_pool());
    }

    #[tokio::test]
    async fn resolution_is_idempotent_across_sweeps() {
        let (ledger, engine) = engine(ScriptedOracle::verdict(true, 80));
        let id = engine
            .submit_question("Will *MOON reach 1.0 this week?", Utc::now() + Duration::days(1))
            .unwrap();
        engine.place_wager(1, id, true, dec!(100)).await.unwrap();

        force_deadline(&engine, id, Utc::now() - Duration::seconds(1)).await;
        engine.resolve_due(Utc::now(), "context").await;
        let balance_after_first = ledger.balance(1).await.unwrap();

        // RESOLVED is a one-way gate: nothing pays twice
        let stats = engine.resolve_due(Utc::now(), "context").await;
        assert_eq!(stats.resolved, 0);
        assert_eq!(ledger.balance(1).await.unwrap(), balance_after_first);
    }

    #[tokio::test]
    async fn low_confidence_and_failures_defer_resolution() {
        let oracle = ScriptedOracle::verdict(true, 30);
        let (ledger, engine) = engine(oracle.clone());
        let id = engine
            .submit_question("Will *MOON reach 1.0 this week?", Utc::now() + Duration::days(1))
            .unwrap();
        engine.place_wager(1, id, true, dec!(100)).await.unwrap();
        force_deadline(&engine, id, Utc::now() - Duration::seconds(1)).await;

        // low confidence: stays ACTIVE, nothing credited
        let stats = engine.resolve_due(Utc::now(), "context").await;
        assert_eq!(stats.deferred, 1);
        assert_eq!(
            engine.question(id).await.unwrap().status,
            QuestionStatus::Active
        );

        // hard failure: same story
        oracle.fail.store(true, Ordering::SeqCst);
        let stats = engine.resolve_due(Utc::now(), "context").await;
        assert_eq!(stats.deferred, 1);
        assert_eq!(ledger.balance(1).await.unwrap(), dec!(900));
    }

    #[tokio::test]
    async fn empty_winning_side_pays_nobody() {
        let (ledger, engine) = engine(ScriptedOracle::verdict(true, 80));
        let id = engine
            .submit_question("Will *MOON reach 1.0 this week?", Utc::now() + Duration::days(1))
            .unwrap();
        engine.place_wager(1, id, false, dec!(100)).await.unwrap();
        engine.place_wager(2, id, false, dec!(50)).await.unwrap();

        force_deadline(&engine, id, Utc::now() - Duration::seconds(1)).await;
        let stats = engine.resolve_due(Utc::now(), "context").await;
        assert_eq!(stats.resolved, 1);

        // resolution is YES but nobody backed it: stakes stay with the house
        assert_eq!(ledger.balance(1).await.unwrap(), dec!(900));
        assert_eq!(ledger.balance(2).await.unwrap(), dec!(950));
        let question = engine.question(id).await.unwrap();
        assert!(question.wagers.iter().all(|w| w.winnings == Decimal::ZERO));
    }

    #[tokio::test]
    async fn stuck_questions_cancel_and_refund_once() {
        let (ledger, engine) = engine(ScriptedOracle::verdict(true, 10));
        let id = engine
            .submit_question("Will *MOON reach 1.0 this week?", Utc::now() + Duration::days(1))
            .unwrap();
        engine.place_wager(1, id, true, dec!(100)).await.unwrap();
        engine.place_wager(2, id, false, dec!(40)).await.unwrap();

        force_deadline(&engine, id, Utc::now() - Duration::days(8)).await;
        let stats = engine.resolve_due(Utc::now(), "context").await;
        assert_eq!(stats.cancelled, 1);

        assert_eq!(ledger.balance(1).await.unwrap(), dec!(1000));
        assert_eq!(ledger.balance(2).await.unwrap(), dec!(1000));
        let question = engine.question(id).await.unwrap();
        assert_eq!(question.status, QuestionStatus::Cancelled);

        // a second sweep finds nothing to do
        let stats = engine.resolve_due(Utc::now(), "context").await;
        assert_eq!(stats.cancelled, 0);
        assert_eq!(ledger.balance(1).await.unwrap(), dec!(1000));
    }

    #[tokio::test]
    async fn question_text_is_validated() {
        let (_, engine) = engine(ScriptedOracle::verdict(true, 80));
        assert!(matches!(
            engine.submit_question("too short", Utc::now()).unwrap_err(),
            EngineError::Validation(_)
        ));
        let long = "x".repeat(201);
        assert!(matches!(
            engine.submit_question(&long, Utc::now()).unwrap_err(),
            EngineError::Validation(_)
        ));
    }
}
