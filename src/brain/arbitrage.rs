//! Cyclic arbitrage
//!
//! A strategy over a closed chain of hops. Every observation refreshes the
//! cached rate/fee for its venue, then the fee-adjusted product over the
//! whole chain is recomputed in both directions:
//!
//! forward = Π (1 - fee_i) * rate_i
//! reverse = Π (1 - fee_i) / rate_i
//!
//! Above `lower_limit`, one order per hop is emitted (forward walk first,
//! otherwise the reversed chain with inverted directions). Partial chains
//! never trade.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{build_order, Strategy, TradeOrder};
use crate::cartographer::{DataPoint, Direction, Venue};
use crate::coins::CoinRegistry;
use crate::error::TradeError;

/// One leg of an arbitrage chain
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub venue: Venue,
    pub direction: Direction,
}

impl Hop {
    pub fn new(venue: Venue, direction: Direction) -> Self {
        Self { venue, direction }
    }

    pub fn asset_in(&self) -> &str {
        self.venue.asset_in(self.direction)
    }

    pub fn asset_out(&self) -> &str {
        self.venue.asset_out(self.direction)
    }
}

/// Arbitrage over a closed hop chain
pub struct ArbitrageStrategy {
    name: String,
    hops: Vec<Hop>,
    amounts: HashMap<String, f64>,
    lower_limit: f64,
    slippage: f64,
    registry: Arc<CoinRegistry>,
    latest_rate: HashMap<Uuid, f64>,
    latest_fee: HashMap<Uuid, f64>,
}

impl ArbitrageStrategy {
    /// Validate the chain and build the strategy.
    ///
    /// `amounts` maps canonical coin ids to unscaled default trade sizes and
    /// must cover every asset that can be paid into the chain in either walk.
    pub fn new(
        name: &str,
        hops: Vec<Hop>,
        amounts: HashMap<String, f64>,
        lower_limit: f64,
        slippage: f64,
        registry: Arc<CoinRegistry>,
    ) -> Result<Self, TradeError> {
        validate_chain(&hops)?;

        if !lower_limit.is_finite() || lower_limit <= 0.0 {
            return Err(TradeError::InvalidParameters(format!(
                "lower limit must be positive, got {}",
                lower_limit
            )));
        }
        if !(0.0..1.0).contains(&slippage) {
            return Err(TradeError::InvalidParameters(format!(
                "slippage must be in [0, 1), got {}",
                slippage
            )));
        }

        for hop in &hops {
            for asset in [hop.asset_in(), hop.asset_out()] {
                registry.decimals(asset)?;
                match amounts.get(asset) {
                    Some(&amount) if amount.is_finite() && amount > 0.0 => {}
                    Some(&amount) => {
                        return Err(TradeError::InvalidAmount {
                            asset: asset.to_string(),
                            amount,
                        })
                    }
                    None => {
                        return Err(TradeError::InvalidChain(format!(
                            "no default amount for {}",
                            registry.symbol(asset)
                        )))
                    }
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            hops,
            amounts,
            lower_limit,
            slippage,
            registry,
            latest_rate: HashMap::new(),
            latest_fee: HashMap::new(),
        })
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    pub fn lower_limit(&self) -> f64 {
        self.lower_limit
    }

    /// Chain path, e.g. `SUI → USDC → SUI`
    pub fn path(&self) -> String {
        let mut parts: Vec<String> = self
            .hops
            .iter()
            .map(|h| self.registry.symbol(h.asset_in()))
            .collect();
        if let Some(last) = self.hops.last() {
            parts.push(self.registry.symbol(last.asset_out()));
        }
        parts.join(" → ")
    }

    /// Effective rate and fee of a hop in its declared direction
    fn hop_quote(&self, hop: &Hop) -> Option<(f64, f64)> {
        let id = hop.venue.identity();
        let rate = *self.latest_rate.get(&id)?;
        let fee = *self.latest_fee.get(&id)?;

        if !rate.is_finite() || rate <= 0.0 || !(0.0..1.0).contains(&fee) {
            return None;
        }

        let effective = match hop.direction {
            Direction::AToB => rate,
            Direction::BToA => 1.0 / rate,
        };
        effective.is_finite().then_some((effective, fee))
    }

    /// Forward and reverse chain products, `None` until every hop is cached
    pub fn expected_return(&self) -> Option<(f64, f64)> {
        let mut forward = 1.0;
        let mut reverse = 1.0;

        for hop in &self.hops {
            let (rate, fee) = self.hop_quote(hop)?;
            forward *= (1.0 - fee) * rate;
            reverse *= (1.0 - fee) / rate;
        }

        (forward.is_finite() && reverse.is_finite()).then_some((forward, reverse))
    }

    fn forward_orders(&self) -> Vec<TradeOrder> {
        self.hops
            .iter()
            .map(|hop| {
                let (rate, fee) = self.hop_quote(hop)?;
                let amount = *self.amounts.get(hop.asset_in())?;
                build_order(
                    &self.name,
                    &self.registry,
                    &hop.venue,
                    hop.direction,
                    amount,
                    rate,
                    fee,
                    self.slippage,
                )
            })
            .collect::<Option<Vec<_>>>()
            .unwrap_or_default()
    }

    fn reverse_orders(&self) -> Vec<TradeOrder> {
        self.hops
            .iter()
            .rev()
            .map(|hop| {
                let (rate, fee) = self.hop_quote(hop)?;
                let direction = hop.direction.invert();
                let amount = *self.amounts.get(hop.venue.asset_in(direction))?;
                build_order(
                    &self.name,
                    &self.registry,
                    &hop.venue,
                    direction,
                    amount,
                    1.0 / rate,
                    fee,
                    self.slippage,
                )
            })
            .collect::<Option<Vec<_>>>()
            .unwrap_or_default()
    }

    /// Cache a price from one of the chain's venues. False for anything else.
    fn observe(&mut self, point: &DataPoint) -> bool {
        let DataPoint::Price(price) = point else {
            return false;
        };
        if !self.hops.iter().any(|h| h.venue.identity() == price.source) {
            return false;
        }
        self.latest_rate.insert(price.source, price.price);
        self.latest_fee.insert(price.source, price.fee);
        true
    }

    fn decide(&self) -> Vec<TradeOrder> {
        let Some((forward, reverse)) = self.expected_return() else {
            return Vec::new();
        };
        debug!(
            "{}: forward {:.6} reverse {:.6} (limit {:.6})",
            self.name, forward, reverse, self.lower_limit
        );

        if forward > self.lower_limit {
            let orders = self.forward_orders();
            if !orders.is_empty() {
                info!(
                    "💰 {}: forward {} returns {:.4}x",
                    self.name,
                    self.path(),
                    forward
                );
            }
            orders
        } else if reverse > self.lower_limit {
            let orders = self.reverse_orders();
            if !orders.is_empty() {
                info!(
                    "💰 {}: reverse of {} returns {:.4}x",
                    self.name,
                    self.path(),
                    reverse
                );
            }
            orders
        } else {
            Vec::new()
        }
    }
}

/// The chain must be non-empty, link output to input at every hop
/// (wrapping around), and never use the same venue twice.
fn validate_chain(hops: &[Hop]) -> Result<(), TradeError> {
    if hops.is_empty() {
        return Err(TradeError::InvalidChain("empty chain".to_string()));
    }

    for (i, hop) in hops.iter().enumerate() {
        let next = &hops[(i + 1) % hops.len()];
        if hop.asset_out() != next.asset_in() {
            return Err(TradeError::InvalidChain(format!(
                "hop {} ({}) pays out {} but hop {} ({}) takes {}",
                i,
                hop.venue.name,
                hop.asset_out(),
                (i + 1) % hops.len(),
                next.venue.name,
                next.asset_in()
            )));
        }
    }

    let unique: HashSet<_> = hops.iter().map(|h| h.venue.identity()).collect();
    if unique.len() != hops.len() {
        return Err(TradeError::InvalidChain(
            "chain uses the same venue more than once".to_string(),
        ));
    }

    Ok(())
}

impl Strategy for ArbitrageStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscriptions(&self) -> Vec<Uuid> {
        self.hops.iter().map(|h| h.venue.identity()).collect()
    }

    fn evaluate(&mut self, point: &DataPoint) -> Vec<TradeOrder> {
        if self.observe(point) {
            self.decide()
        } else {
            Vec::new()
        }
    }

    fn evaluate_cycle(&mut self, points: &[DataPoint]) -> Vec<TradeOrder> {
        let mut touched = false;
        for point in points {
            touched |= self.observe(point);
        }
        if touched {
            self.decide()
        } else {
            Vec::new()
        }
    }
}
