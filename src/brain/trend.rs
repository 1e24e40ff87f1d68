//! Moving-average trend follower on a single venue
//!
//! Keeps a rolling window of observed prices. A short mean crossing above
//! the long mean opens a position in the venue's base asset; crossing back
//! below closes it. Position size comes from fill observations, never from
//! the orders themselves, so a rejected or failed submission leaves the
//! strategy flat.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{build_order, Strategy, TradeOrder};
use crate::cartographer::{DataPoint, Direction, FillPoint, PricePoint, Venue};
use crate::coins::CoinRegistry;
use crate::error::TradeError;

/// Tunables for a trend strategy
#[derive(Debug, Clone, PartialEq)]
pub struct TrendParams {
    pub short_window: usize,
    pub long_window: usize,
    /// Quote asset (`asset_b`) paid per entry
    pub quote_amount: f64,
    /// Base asset (`asset_a`) sold per exit, capped at the held position
    pub base_amount: f64,
    pub slippage: f64,
}

pub struct TrendStrategy {
    name: String,
    venue: Venue,
    params: TrendParams,
    registry: Arc<CoinRegistry>,
    prices: VecDeque<f64>,
    /// Whether the short mean was above the long mean at the last full window
    above: Option<bool>,
    /// Base asset held, in human units
    position: f64,
}

impl TrendStrategy {
    pub fn new(
        name: &str,
        venue: Venue,
        params: TrendParams,
        registry: Arc<CoinRegistry>,
    ) -> Result<Self, TradeError> {
        if params.short_window == 0 || params.short_window >= params.long_window {
            return Err(TradeError::InvalidParameters(format!(
                "{}: short window {} must be non-zero and below long window {}",
                name, params.short_window, params.long_window
            )));
        }
        for (asset, amount) in [
            (&venue.asset_b, params.quote_amount),
            (&venue.asset_a, params.base_amount),
        ] {
            registry.decimals(asset)?;
            if !amount.is_finite() || amount <= 0.0 {
                return Err(TradeError::InvalidAmount {
                    asset: asset.clone(),
                    amount,
                });
            }
        }
        if !(0.0..1.0).contains(&params.slippage) {
            return Err(TradeError::InvalidParameters(format!(
                "{}: slippage must be in [0, 1), got {}",
                name, params.slippage
            )));
        }

        let capacity = params.long_window;
        Ok(Self {
            name: name.to_string(),
            venue,
            params,
            registry,
            prices: VecDeque::with_capacity(capacity),
            above: None,
            position: 0.0,
        })
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    fn mean(&self, window: usize) -> f64 {
        let sum: f64 = self.prices.iter().rev().take(window).sum();
        sum / window as f64
    }

    fn on_fill(&mut self, fill: &FillPoint) {
        let base = &self.venue.asset_a;
        if &fill.asset_out == base {
            self.position += fill.amount_out;
        } else if &fill.asset_in == base {
            self.position = (self.position - fill.amount_in).max(0.0);
        }
        debug!("{}: position now {:.6}", self.name, self.position);
    }

    fn on_price(&mut self, point: &PricePoint) -> Vec<TradeOrder> {
        if !point.price.is_finite() || point.price <= 0.0 {
            return Vec::new();
        }

        if self.prices.len() == self.params.long_window {
            self.prices.pop_front();
        }
        self.prices.push_back(point.price);
        if self.prices.len() < self.params.long_window {
            return Vec::new();
        }

        let short = self.mean(self.params.short_window);
        let long = self.mean(self.params.long_window);
        let above = short > long;
        let previous = self.above.replace(above);

        match (previous, above) {
            (Some(false), true) if self.position <= 0.0 => {
                info!(
                    "📈 {}: short MA {:.6} crossed above long MA {:.6}",
                    self.name, short, long
                );
                self.order(Direction::BToA, self.params.quote_amount, 1.0 / point.price, point.fee)
            }
            (Some(true), false) if self.position > 0.0 => {
                info!(
                    "📉 {}: short MA {:.6} crossed below long MA {:.6}",
                    self.name, short, long
                );
                let amount = self.params.base_amount.min(self.position);
                self.order(Direction::AToB, amount, point.price, point.fee)
            }
            _ => Vec::new(),
        }
    }

    fn order(&self, direction: Direction, amount: f64, rate: f64, fee: f64) -> Vec<TradeOrder> {
        build_order(
            &self.name,
            &self.registry,
            &self.venue,
            direction,
            amount,
            rate,
            fee,
            self.params.slippage,
        )
        .into_iter()
        .collect()
    }
}

impl Strategy for TrendStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscriptions(&self) -> Vec<Uuid> {
        vec![self.venue.identity()]
    }

    fn evaluate(&mut self, point: &DataPoint) -> Vec<TradeOrder> {
        if point.source() != self.venue.identity() {
            return Vec::new();
        }
        match point {
            DataPoint::Price(price) => self.on_price(price),
            DataPoint::Fill(fill) => {
                self.on_fill(fill);
                Vec::new()
            }
        }
    }
}
