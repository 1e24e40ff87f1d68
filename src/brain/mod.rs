//! Phase 2: The Brain
//!
//! Responsible for:
//! - Turning price observations into trade intents
//! - Keeping per-strategy rate/fee caches
//!
//! Strategies are synchronous and only ever driven from the execution
//! loop, so their caches need no locking.

mod arbitrage;
mod trend;

pub use arbitrage::{ArbitrageStrategy, Hop};
pub use trend::{TrendParams, TrendStrategy};

use uuid::Uuid;

use crate::cartographer::{DataPoint, Direction};
use crate::coins::CoinRegistry;
use crate::error::TradeError;

/// A trade intent, consumed by the execution loop within the cycle that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOrder {
    pub strategy: String,
    pub venue: Uuid,
    pub direction: Direction,
    pub asset_in: String,
    pub asset_out: String,
    /// Human amount paid in
    pub amount_in: f64,
    /// `amount_in` scaled by the input coin's decimals
    pub raw_amount_in: u64,
    /// Estimated human amount received
    pub amount_out: f64,
    /// Effective rate in the order's direction
    pub estimated_price: f64,
    /// Accepted relative shortfall on `amount_out`
    pub slippage: f64,
}

impl TradeOrder {
    /// Raw minimum output after the slippage bound
    pub fn min_out(&self, registry: &CoinRegistry) -> Result<u64, TradeError> {
        registry.to_raw(&self.asset_out, self.amount_out * (1.0 - self.slippage))
    }
}

/// A stateful evaluator of observations
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Source identities this strategy reacts to. Checked at registration.
    fn subscriptions(&self) -> Vec<Uuid>;

    /// Consume one observation; never fails, returns no orders instead
    fn evaluate(&mut self, point: &DataPoint) -> Vec<TradeOrder>;

    /// Consume every subscribed observation of one cycle at once.
    ///
    /// Defaults to `evaluate` on each point in turn. Strategies pricing
    /// across several sources override it to decide once on the fully
    /// updated view.
    fn evaluate_cycle(&mut self, points: &[DataPoint]) -> Vec<TradeOrder> {
        points.iter().flat_map(|point| self.evaluate(point)).collect()
    }
}

/// Build one order through a venue at a known effective rate
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_order(
    strategy: &str,
    registry: &CoinRegistry,
    venue: &crate::cartographer::Venue,
    direction: Direction,
    amount_in: f64,
    rate: f64,
    fee: f64,
    slippage: f64,
) -> Option<TradeOrder> {
    let asset_in = venue.asset_in(direction);
    let raw_amount_in = registry.to_raw(asset_in, amount_in).ok()?;
    if raw_amount_in == 0 {
        return None;
    }

    Some(TradeOrder {
        strategy: strategy.to_string(),
        venue: venue.identity(),
        direction,
        asset_in: asset_in.to_string(),
        asset_out: venue.asset_out(direction).to_string(),
        amount_in,
        raw_amount_in,
        amount_out: amount_in * rate * (1.0 - fee),
        estimated_price: rate,
        slippage,
    })
}
