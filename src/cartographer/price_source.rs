//! Price Sources and observations
//!
//! A `PriceSource` wraps one venue and its adapter and turns each poll into
//! a timestamped `PricePoint`. Its identity is the venue identity, which is
//! what strategies subscribe to.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

use super::venue::{Venue, VenueAdapter};
use crate::error::TradeError;

/// A price/fee observation for one venue
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub source: Uuid,
    pub asset_from: String,
    pub asset_to: String,
    /// Quote per base (units of `asset_to` per `asset_from`)
    pub price: f64,
    /// Relative fee in [0, 1)
    pub fee: f64,
    pub observed_at: DateTime<Utc>,
}

/// An executed swap fed back from a successful submission
#[derive(Debug, Clone, PartialEq)]
pub struct FillPoint {
    pub source: Uuid,
    pub asset_in: String,
    pub asset_out: String,
    pub amount_in: f64,
    pub amount_out: f64,
    pub observed_at: DateTime<Utc>,
}

/// Everything a strategy can be asked to evaluate
#[derive(Debug, Clone, PartialEq)]
pub enum DataPoint {
    Price(PricePoint),
    Fill(FillPoint),
}

impl DataPoint {
    pub fn source(&self) -> Uuid {
        match self {
            DataPoint::Price(p) => p.source,
            DataPoint::Fill(f) => f.source,
        }
    }
}

/// Polls one venue for its current price
pub struct PriceSource {
    venue: Venue,
    adapter: Arc<dyn VenueAdapter>,
    last: Option<PricePoint>,
}

impl PriceSource {
    pub fn new(venue: Venue, adapter: Arc<dyn VenueAdapter>) -> Self {
        Self {
            venue,
            adapter,
            last: None,
        }
    }

    pub fn identity(&self) -> Uuid {
        self.venue.identity()
    }

    pub fn uri(&self) -> String {
        self.venue.uri()
    }

    pub fn venue(&self) -> &Venue {
        &self.venue
    }

    pub fn adapter(&self) -> Arc<dyn VenueAdapter> {
        Arc::clone(&self.adapter)
    }

    /// Most recent successful observation
    pub fn last(&self) -> Option<&PricePoint> {
        self.last.as_ref()
    }

    /// Fetch a fresh observation. Errors and nonsensical quotes both surface
    /// as `DataUnavailable`.
    pub async fn poll(&mut self) -> Result<PricePoint, TradeError> {
        let quote = self.adapter.quote(&self.venue).await.map_err(|e| {
            debug!("Quote failed for {}: {}", self.venue.name, e);
            TradeError::DataUnavailable {
                origin: self.uri(),
                reason: e.to_string(),
            }
        })?;

        if !quote.price.is_finite() || quote.price <= 0.0 {
            return Err(TradeError::DataUnavailable {
                origin: self.uri(),
                reason: format!("invalid price {}", quote.price),
            });
        }
        if !(0.0..1.0).contains(&quote.fee) {
            return Err(TradeError::DataUnavailable {
                origin: self.uri(),
                reason: format!("invalid fee {}", quote.fee),
            });
        }

        let point = PricePoint {
            source: self.identity(),
            asset_from: self.venue.asset_a.clone(),
            asset_to: self.venue.asset_b.clone(),
            price: quote.price,
            fee: quote.fee,
            observed_at: Utc::now(),
        };
        trace!(
            "{} price {:.6} fee {:.4}",
            self.venue.name,
            point.price,
            point.fee
        );
        self.last = Some(point.clone());
        Ok(point)
    }
}
