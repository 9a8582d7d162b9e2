// Application state wiring
//
// Builds the ledger, the three settlement engines and their collaborators
// from one Config, and exposes the entry points the service binary (and the
// out-of-scope HTTP layer) drive.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use crate::amm::AmmEngine;
use crate::config::Config;
use crate::error::EngineError;
use crate::games::{CoinflipEngine, MinesEngine, SweepStats};
use crate::ledger::Ledger;
use crate::models::AccountId;
use crate::notifier::{LogNotifier, Notifier};
use crate::prediction::{HttpOracle, PredictionEngine, ResolutionOracle, ResolutionStats};
use crate::session_store::SessionStore;

pub struct AppState {
    pub config: Config,
    pub ledger: Arc<Ledger>,
    pub amm: Arc<AmmEngine>,
    pub mines: Arc<MinesEngine>,
    pub coinflip: Arc<CoinflipEngine>,
    pub predictions: Arc<PredictionEngine>,
}

impl AppState {
    /// Wire everything with the default collaborators: HTTP oracle,
    /// log-only notifier, sled session store under the data dir.
    pub fn new(config: Config) -> Result<Self, EngineError> {
        let oracle = Arc::new(HttpOracle::new(
            config.oracle_url.clone(),
            config.oracle_api_key.clone(),
            StdDuration::from_secs(config.oracle_timeout_secs),
        ));
        Self::with_collaborators(config, oracle, Arc::new(LogNotifier))
    }

    /// Wire with explicit collaborators (tests, alternative transports).
    pub fn with_collaborators(
        config: Config,
        oracle: Arc<dyn ResolutionOracle>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, EngineError> {
        let ledger = Arc::new(Ledger::new());
        let store = Arc::new(SessionStore::open(config.data_dir.join("sessions"))?);

        let amm = Arc::new(AmmEngine::new(Arc::clone(&ledger), notifier));
        let mines = Arc::new(MinesEngine::new(
            Arc::clone(&ledger),
            store,
            Duration::seconds(config.session_idle_secs),
        ));
        let coinflip = Arc::new(CoinflipEngine::new(Arc::clone(&ledger)));
        let predictions = Arc::new(PredictionEngine::new(
            Arc::clone(&ledger),
            oracle,
            config.min_oracle_confidence,
            Duration::hours(config.max_unresolved_age_hours),
        ));

        Ok(Self {
            config,
            ledger,
            amm,
            mines,
            coinflip,
            predictions,
        })
    }

    /// Open an account with the configured starting balance. Idempotent.
    pub fn open_account(&self, id: AccountId) {
        self.ledger.open_account(id, self.config.starting_balance);
    }

    pub async fn balance(&self, id: AccountId) -> Result<Decimal, EngineError> {
        self.ledger.balance(id).await
    }

    /// One pass of the wager-session expiry sweep.
    pub async fn sweep_expired_sessions(&self) -> Result<SweepStats, EngineError> {
        self.mines.sweep_expired(Utc::now()).await
    }

    /// One pass of the prediction resolution sweep. Market context for the
    /// oracle is rebuilt from live pool state on every pass.
    pub async fn sweep_due_questions(&self) -> ResolutionStats {
        let context = self.amm.market_context().await;
        self.predictions.resolve_due(Utc::now(), &context).await
    }
}
