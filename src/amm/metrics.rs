// Rolling 24h metrics for a liquidity pool
//
// Computed from the pool's append-only price-history and trade logs at every
// committed trade, inside the same transaction that moves the reserves.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{PricePoint, TradeRecord};

/// Percent digits kept on the stored 24h change and volume.
const METRIC_SCALE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Percent change vs the price ~24h ago
    pub change_24h: Decimal,
    /// Sum of trade totals over the window
    pub volume_24h: Decimal,
}

impl PoolMetrics {
    pub fn zero() -> Self {
        Self {
            change_24h: Decimal::ZERO,
            volume_24h: Decimal::ZERO,
        }
    }
}

/// Compute 24h change and volume as of `now`.
///
/// The reference price is the oldest price point inside the window, so a
/// pool younger than 24h measures change against its earliest recorded
/// price. Both logs are append-only and timestamp-ordered.
pub fn rolling_24h(
    price_history: &[PricePoint],
    trades: &[TradeRecord],
    current_price: Decimal,
    now: DateTime<Utc>,
) -> PoolMetrics {
    let window_start = now - Duration::hours(24);

    let mut change_24h = Decimal::ZERO;
    if let Some(reference) = price_history.iter().find(|p| p.timestamp >= window_start) {
        if reference.price > Decimal::ZERO {
            change_24h = (current_price - reference.price) / reference.price * Decimal::ONE_HUNDRED;
        }
    }

    let volume_24h: Decimal = trades
        .iter()
        .filter(|t| t.timestamp >= window_start)
        .map(|t| t.total_amount)
        .sum();

    PoolMetrics {
        change_24h: round_metric(change_24h),
        volume_24h: round_metric(volume_24h),
    }
}

fn round_metric(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(METRIC_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeSide;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn point(price: Decimal, hours_ago: i64, now: DateTime<Utc>) -> PricePoint {
        PricePoint {
            price,
            timestamp: now - Duration::hours(hours_ago),
        }
    }

    fn trade(total: Decimal, hours_ago: i64, now: DateTime<Utc>) -> TradeRecord {
        TradeRecord {
            id: Uuid::new_v4(),
            account_id: 1,
            side: TradeSide::Buy,
            quantity: dec!(1),
            unit_price: total,
            total_amount: total,
            timestamp: now - Duration::hours(hours_ago),
        }
    }

    #[test]
    fn empty_logs_produce_zero_metrics() {
        let metrics = rolling_24h(&[], &[], dec!(0.001), Utc::now());
        assert_eq!(metrics, PoolMetrics::zero());
    }

    #[test]
    fn change_is_measured_against_oldest_point_in_window() {
        let now = Utc::now();
        let history = vec![
            point(dec!(4.0), 30, now), // outside the window, ignored
            point(dec!(1.0), 20, now), // reference
            point(dec!(1.5), 2, now),
        ];

        let metrics = rolling_24h(&history, &[], dec!(2.0), now);
        assert_eq!(metrics.change_24h, dec!(100.0000));
    }

    #[test]
    fn volume_sums_only_the_window() {
        let now = Utc::now();
        let trades = vec![
            trade(dec!(500), 30, now), // stale
            trade(dec!(100), 10, now),
            trade(dec!(2.5), 1, now),
        ];

        let metrics = rolling_24h(&[], &trades, dec!(1), now);
        assert_eq!(metrics.volume_24h, dec!(102.5000));
    }

    #[test]
    fn zero_reference_price_yields_zero_change() {
        let now = Utc::now();
        let history = vec![point(dec!(0), 1, now)];
        let metrics = rolling_24h(&history, &[], dec!(5), now);
        assert_eq!(metrics.change_24h, Decimal::ZERO);
    }
}
