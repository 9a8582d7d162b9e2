// Constant-product AMM pool engine
//
// Each token trades against its own liquidity pool holding token and
// currency reserves. Pricing follows x * y = k: a trade moves one reserve
// and the other follows from the invariant, so price impact grows with
// trade size. Pools are created at token issuance and never deleted;
// delisting only flips a flag.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::amm::metrics::{rolling_24h, PoolMetrics};
use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::models::{quantize, AccountId, PricePoint, TradeRecord, TradeSide};
use crate::notifier::Notifier;

// ============================================================================
// ISSUANCE & TRADING CONSTANTS
// ============================================================================

/// Every token launches with the full fixed supply in its pool.
pub const FIXED_SUPPLY: Decimal = dec!(1_000_000_000);

/// Launch price per token.
pub const STARTING_PRICE: Decimal = dec!(0.000001);

/// Currency seeded into the pool at launch (supply * starting price).
pub const INITIAL_LIQUIDITY: Decimal = dec!(1000);

/// Flat fee charged on top of the seeded liquidity at issuance.
pub const CREATION_FEE: Decimal = dec!(100);

/// A single sell may not take more than this fraction of the token reserve.
const MAX_SELL_FRACTION: Decimal = dec!(0.995);

/// The currency reserve may never be drained below this floor.
const MIN_POOL_CURRENCY: Decimal = dec!(1);

/// Price impact (percent) below which a sell counts as a rug pull.
const RUG_PULL_IMPACT_PCT: Decimal = dec!(-20);

/// Rug-pull notifications only fire for sells cashing out more than this.
const RUG_PULL_PROCEEDS_FLOOR: Decimal = dec!(1000);

/// Holders are only notified if their position is worth more than this.
const RUG_PULL_POSITION_FLOOR: Decimal = dec!(10);

// ============================================================================
// POOL STATE
// ============================================================================

/// Per-token liquidity pool plus its append-only logs and holder balances.
#[derive(Debug)]
pub struct LiquidityPool {
    pub symbol: String,
    pub name: String,
    pub reserve_token: Decimal,
    pub reserve_currency: Decimal,
    pub current_price: Decimal,
    pub market_cap: Decimal,
    pub circulating_supply: Decimal,
    pub change_24h: Decimal,
    pub volume_24h: Decimal,
    pub is_listed: bool,
    pub created_at: DateTime<Utc>,
    pub trades: Vec<TradeRecord>,
    pub price_history: Vec<PricePoint>,
    /// Token balance per holding account
    holdings: HashMap<AccountId, Decimal>,
}

impl LiquidityPool {
    fn new(symbol: String, name: String, now: DateTime<Utc>) -> Self {
        Self {
            symbol,
            name,
            reserve_token: FIXED_SUPPLY,
            reserve_currency: INITIAL_LIQUIDITY,
            current_price: STARTING_PRICE,
            market_cap: quantize(FIXED_SUPPLY * STARTING_PRICE),
            circulating_supply: FIXED_SUPPLY,
            change_24h: Decimal::ZERO,
            volume_24h: Decimal::ZERO,
            is_listed: true,
            created_at: now,
            trades: Vec::new(),
            price_history: vec![PricePoint {
                price: STARTING_PRICE,
                timestamp: now,
            }],
            holdings: HashMap::new(),
        }
    }

    pub fn holding(&self, account_id: AccountId) -> Decimal {
        self.holdings.get(&account_id).copied().unwrap_or(Decimal::ZERO)
    }

    fn reserves_initialized(&self) -> bool {
        self.reserve_token > Decimal::ZERO && self.reserve_currency > Decimal::ZERO
    }

    /// Quote a BUY spending `amount` currency. Pure; no state is touched.
    pub fn quote_buy(&self, amount: Decimal) -> Result<Quote, EngineError> {
        if !self.reserves_initialized() {
            return Err(EngineError::LiquidityUninitialized);
        }

        let k = self.reserve_token * self.reserve_currency;
        let new_reserve_currency = self.reserve_currency + amount;
        let new_reserve_token = k / new_reserve_currency;
        let tokens_out = quantize(self.reserve_token - new_reserve_token);

        if tokens_out <= Decimal::ZERO {
            return Err(EngineError::LiquidityUninitialized);
        }

        let new_price = quantize(new_reserve_currency / new_reserve_token);
        Ok(Quote {
            quantity: tokens_out,
            total_amount: amount,
            new_reserve_token: self.reserve_token - tokens_out,
            new_reserve_currency,
            new_price,
            price_impact_pct: impact_pct(self.current_price, new_price),
        })
    }

    /// Quote a SELL of `amount` tokens. Pure; no state is touched.
    pub fn quote_sell(&self, amount: Decimal) -> Result<Quote, EngineError> {
        if !self.reserves_initialized() {
            return Err(EngineError::LiquidityUninitialized);
        }

        let max_sellable = quantize(self.reserve_token * MAX_SELL_FRACTION);
        if amount > max_sellable {
            return Err(EngineError::ExcessiveSellSize {
                requested: amount,
                max_sellable,
            });
        }

        let k = self.reserve_token * self.reserve_currency;
        let new_reserve_token = self.reserve_token + amount;
        let new_reserve_currency = k / new_reserve_token;
        let currency_out = quantize(self.reserve_currency - new_reserve_currency);

        if new_reserve_currency < MIN_POOL_CURRENCY {
            return Err(EngineError::LiquidityFloorBreach);
        }
        if currency_out <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "sell proceeds round to zero".to_string(),
            ));
        }

        let new_price = quantize(new_reserve_currency / new_reserve_token);
        Ok(Quote {
            quantity: amount,
            total_amount: currency_out,
            new_reserve_token,
            new_reserve_currency: self.reserve_currency - currency_out,
            new_price,
            price_impact_pct: impact_pct(self.current_price, new_price),
        })
    }

    /// Commit a quoted trade: move reserves, adjust holdings, append the
    /// trade record and price point, refresh derived fields and 24h metrics.
    /// Caller holds the pool lock and has already settled the currency leg.
    fn apply_trade(
        &mut self,
        account_id: AccountId,
        side: TradeSide,
        quote: &Quote,
        now: DateTime<Utc>,
    ) -> PoolMetrics {
        self.reserve_token = quote.new_reserve_token;
        self.reserve_currency = quote.new_reserve_currency;

        let held = self.holding(account_id);
        match side {
            TradeSide::Buy => {
                self.holdings.insert(account_id, held + quote.quantity);
            }
            TradeSide::Sell => {
                let remaining = held - quote.quantity;
                if remaining > Decimal::ZERO {
                    self.holdings.insert(account_id, remaining);
                } else {
                    self.holdings.remove(&account_id);
                }
            }
        }

        self.trades.push(TradeRecord {
            id: Uuid::new_v4(),
            account_id,
            side,
            quantity: quote.quantity,
            unit_price: quantize(quote.total_amount / quote.quantity),
            total_amount: quote.total_amount,
            timestamp: now,
        });
        self.price_history.push(PricePoint {
            price: quote.new_price,
            timestamp: now,
        });

        let metrics = rolling_24h(&self.price_history, &self.trades, quote.new_price, now);
        self.current_price = quote.new_price;
        self.market_cap = quantize(self.circulating_supply * quote.new_price);
        self.change_24h = metrics.change_24h;
        self.volume_24h = metrics.volume_24h;
        metrics
    }
}

fn impact_pct(old_price: Decimal, new_price: Decimal) -> Decimal {
    if old_price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (new_price - old_price) / old_price * Decimal::ONE_HUNDRED
}

/// Outcome of pricing a trade against a reserve snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Quote {
    /// Tokens out (BUY) or tokens in (SELL)
    pub quantity: Decimal,
    /// Currency in (BUY) or currency out (SELL)
    pub total_amount: Decimal,
    pub new_reserve_token: Decimal,
    pub new_reserve_currency: Decimal,
    pub new_price: Decimal,
    pub price_impact_pct: Decimal,
}

/// Result of a committed trade, for the caller's response.
#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub total_amount: Decimal,
    pub new_price: Decimal,
    pub price_impact_pct: Decimal,
    pub new_balance: Decimal,
    pub change_24h: Decimal,
    pub volume_24h: Decimal,
}

/// Public snapshot of one pool for display and oracle context.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    pub symbol: String,
    pub name: String,
    pub current_price: Decimal,
    pub market_cap: Decimal,
    pub change_24h: Decimal,
    pub volume_24h: Decimal,
    pub reserve_token: Decimal,
    pub reserve_currency: Decimal,
    pub is_listed: bool,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Registry of pools plus the trade settlement paths.
///
/// Lock order is always pool row, then account row; unrelated pools and
/// accounts settle fully in parallel.
pub struct AmmEngine {
    ledger: Arc<Ledger>,
    notifier: Arc<dyn Notifier>,
    pools: RwLock<HashMap<String, Arc<Mutex<LiquidityPool>>>>,
}

impl AmmEngine {
    pub fn new(ledger: Arc<Ledger>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            ledger,
            notifier,
            pools: RwLock::new(HashMap::new()),
        }
    }

    fn pool(&self, symbol: &str) -> Result<Arc<Mutex<LiquidityPool>>, EngineError> {
        let pools = self.pools.read().expect("pool map poisoned");
        pools
            .get(&symbol.to_uppercase())
            .cloned()
            .ok_or_else(|| EngineError::UnknownToken(symbol.to_string()))
    }

    /// Issue a new token: debit the issuer the creation cost and open its
    /// pool with the full fixed supply against the seeded liquidity.
    pub async fn create_pool(
        &self,
        issuer: AccountId,
        name: &str,
        symbol: &str,
    ) -> Result<PoolSummary, EngineError> {
        let name = name.trim();
        let symbol = symbol.trim().to_uppercase();
        if name.len() < 2 || name.len() > 255 {
            return Err(EngineError::Validation(
                "name must be between 2 and 255 characters".to_string(),
            ));
        }
        if symbol.len() < 2
            || symbol.len() > 10
            || !symbol.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(EngineError::Validation(
                "symbol must be 2-10 alphanumeric characters".to_string(),
            ));
        }
        {
            let pools = self.pools.read().expect("pool map poisoned");
            if pools.contains_key(&symbol) {
                return Err(EngineError::Validation(format!(
                    "a token with symbol {} already exists",
                    symbol
                )));
            }
        }

        let total_cost = CREATION_FEE + INITIAL_LIQUIDITY;
        self.ledger.adjust(issuer, -total_cost).await?;

        let pool = LiquidityPool::new(symbol.clone(), name.to_string(), Utc::now());
        let summary = summarize(&pool);

        let mut pools = self.pools.write().expect("pool map poisoned");
        if pools.contains_key(&symbol) {
            // lost a creation race after the debit; refund and bail
            drop(pools);
            let _ = self.ledger.adjust(issuer, total_cost).await;
            return Err(EngineError::Validation(format!(
                "a token with symbol {} already exists",
                symbol
            )));
        }
        pools.insert(symbol.clone(), Arc::new(Mutex::new(pool)));
        info!(%symbol, issuer, "pool created");
        Ok(summary)
    }

    /// Flip the listing flag. The pool and its logs are kept forever.
    pub async fn delist(&self, symbol: &str) -> Result<(), EngineError> {
        let pool = self.pool(symbol)?;
        let mut pool = pool.lock().await;
        pool.is_listed = false;
        info!(symbol = %pool.symbol, "token delisted");
        Ok(())
    }

    /// Price a BUY against the live reserves without executing it.
    pub async fn quote_buy(&self, symbol: &str, amount: Decimal) -> Result<Quote, EngineError> {
        validate_amount(amount)?;
        let pool = self.pool(symbol)?;
        let pool = pool.lock().await;
        pool.quote_buy(quantize(amount))
    }

    /// Price a SELL against the live reserves without executing it.
    pub async fn quote_sell(&self, symbol: &str, amount: Decimal) -> Result<Quote, EngineError> {
        validate_amount(amount)?;
        let pool = self.pool(symbol)?;
        let pool = pool.lock().await;
        pool.quote_sell(quantize(amount))
    }

    /// Execute a BUY spending `amount` currency, as one atomic settlement.
    pub async fn execute_buy(
        &self,
        account_id: AccountId,
        symbol: &str,
        amount: Decimal,
    ) -> Result<TradeReceipt, EngineError> {
        validate_amount(amount)?;
        let amount = quantize(amount);

        let pool = self.pool(symbol)?;
        let mut pool = pool.lock().await;
        if !pool.is_listed {
            return Err(EngineError::Delisted(pool.symbol.clone()));
        }
        let quote = pool.quote_buy(amount)?;

        let new_balance = {
            let mut account = self.ledger.lock_account(account_id).await?;
            account.adjust(-amount)?
        };

        let now = Utc::now();
        let metrics = pool.apply_trade(account_id, TradeSide::Buy, &quote, now);
        info!(
            symbol = %pool.symbol,
            account = account_id,
            tokens = %quote.quantity,
            spent = %amount,
            price = %quote.new_price,
            "buy executed"
        );

        Ok(TradeReceipt {
            symbol: pool.symbol.clone(),
            side: TradeSide::Buy,
            quantity: quote.quantity,
            total_amount: amount,
            new_price: quote.new_price,
            price_impact_pct: quote.price_impact_pct,
            new_balance,
            change_24h: metrics.change_24h,
            volume_24h: metrics.volume_24h,
        })
    }

    /// Execute a SELL of `amount` tokens, as one atomic settlement.
    ///
    /// If the sell crashes the price hard enough to count as a rug pull,
    /// other holders are notified after the commit, outside the locks;
    /// notification failure never unwinds the trade.
    pub async fn execute_sell(
        &self,
        account_id: AccountId,
        symbol: &str,
        amount: Decimal,
    ) -> Result<TradeReceipt, EngineError> {
        validate_amount(amount)?;
        let amount = quantize(amount);

        let pool = self.pool(symbol)?;
        let mut pool = pool.lock().await;
        if !pool.is_listed {
            return Err(EngineError::Delisted(pool.symbol.clone()));
        }

        let held = pool.holding(account_id);
        if held < amount {
            return Err(EngineError::InsufficientTokens {
                held,
                requested: amount,
            });
        }
        let quote = pool.quote_sell(amount)?;

        let new_balance = {
            let mut account = self.ledger.lock_account(account_id).await?;
            account.adjust(quote.total_amount)?
        };

        let now = Utc::now();
        let metrics = pool.apply_trade(account_id, TradeSide::Sell, &quote, now);
        info!(
            symbol = %pool.symbol,
            account = account_id,
            tokens = %amount,
            received = %quote.total_amount,
            impact = %quote.price_impact_pct,
            "sell executed"
        );

        let rug_pull = quote.price_impact_pct < RUG_PULL_IMPACT_PCT
            && quote.total_amount > RUG_PULL_PROCEEDS_FLOOR;
        if rug_pull {
            // snapshot affected holders under the lock, notify outside it
            let affected: Vec<AccountId> = pool
                .holdings
                .iter()
                .filter(|(holder, quantity)| {
                    **holder != account_id
                        && **quantity * quote.new_price > RUG_PULL_POSITION_FLOOR
                })
                .map(|(holder, _)| *holder)
                .collect();
            let name = pool.name.clone();
            let sym = pool.symbol.clone();
            let drop_pct = quote.price_impact_pct.abs().round_dp(1);
            drop(pool);

            let notifier = Arc::clone(&self.notifier);
            tokio::spawn(async move {
                for holder in affected {
                    let message =
                        format!("A token you owned, {} (*{}), crashed {}%!", name, sym, drop_pct);
                    if let Err(e) = notifier
                        .notify(holder, "RUG_PULL", "Token rugpulled!", &message)
                        .await
                    {
                        warn!(account = holder, error = %e, "rug pull notification failed");
                    }
                }
            });
        }

        Ok(TradeReceipt {
            symbol: symbol.to_uppercase(),
            side: TradeSide::Sell,
            quantity: amount,
            total_amount: quote.total_amount,
            new_price: quote.new_price,
            price_impact_pct: quote.price_impact_pct,
            new_balance,
            change_24h: metrics.change_24h,
            volume_24h: metrics.volume_24h,
        })
    }

    /// Tokens of `symbol` held by `account_id`.
    pub async fn holding(&self, account_id: AccountId, symbol: &str) -> Result<Decimal, EngineError> {
        let pool = self.pool(symbol)?;
        let pool = pool.lock().await;
        Ok(pool.holding(account_id))
    }

    pub async fn pool_summary(&self, symbol: &str) -> Result<PoolSummary, EngineError> {
        let pool = self.pool(symbol)?;
        let pool = pool.lock().await;
        Ok(summarize(&pool))
    }

    /// Snapshot of every pool, listed first, largest market cap first.
    pub async fn all_pools(&self) -> Vec<PoolSummary> {
        let handles: Vec<_> = {
            let pools = self.pools.read().expect("pool map poisoned");
            pools.values().cloned().collect()
        };

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            let pool = handle.lock().await;
            summaries.push(summarize(&pool));
        }
        summaries.sort_by(|a, b| {
            b.is_listed
                .cmp(&a.is_listed)
                .then(b.market_cap.cmp(&a.market_cap))
        });
        summaries
    }

    /// Human-readable market overview handed to the resolution oracle as
    /// platform context.
    pub async fn market_context(&self) -> String {
        let pools = self.all_pools().await;
        let listed: Vec<&PoolSummary> = pools.iter().filter(|p| p.is_listed).collect();
        let total_market_cap: Decimal = listed.iter().map(|p| p.market_cap).sum();
        let total_volume: Decimal = listed.iter().map(|p| p.volume_24h).sum();

        let mut context = format!(
            "Market overview: {} listed tokens, total market cap {}, 24h volume {}\n",
            listed.len(),
            total_market_cap,
            total_volume
        );
        for (rank, pool) in listed.iter().take(10).enumerate() {
            context.push_str(&format!(
                "{}. *{} ({}): price {} | market cap {} | 24h change {}%\n",
                rank + 1,
                pool.symbol,
                pool.name,
                pool.current_price,
                pool.market_cap,
                pool.change_24h
            ));
        }
        context
    }
}

fn summarize(pool: &LiquidityPool) -> PoolSummary {
    PoolSummary {
        symbol: pool.symbol.clone(),
        name: pool.name.clone(),
        current_price: pool.current_price,
        market_cap: pool.market_cap,
        change_24h: pool.change_24h,
        volume_24h: pool.volume_24h,
        reserve_token: pool.reserve_token,
        reserve_currency: pool.reserve_currency,
        is_listed: pool.is_listed,
    }
}

fn validate_amount(amount: Decimal) -> Result<(), EngineError> {
    if amount <= Decimal::ZERO {
        return Err(EngineError::Validation(
            "amount must be positive".to_string(),
        ));
    }
    Ok(())
}
