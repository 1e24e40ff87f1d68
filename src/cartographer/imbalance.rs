//! Imbalance gate
//!
//! Circuit breaker for venues that report how far each asset's balance sits
//! from its target share. Snapshots are cached per venue for a fixed
//! validity window (30s by default) so a busy cycle does not hammer the
//! venue with queries.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::venue::{ImbalanceSnapshot, Venue, VenueAdapter};
use crate::error::TradeError;

/// Default snapshot validity
pub const DEFAULT_CACHE_SECS: u64 = 30;

/// Default ratio above which trading the asset into the venue is blocked
pub const DEFAULT_THRESHOLD: f64 = 1.2;

/// Cache state of one venue's snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Never queried
    Unknown,
    /// Younger than the validity window
    Fresh,
    /// Needs a refresh before use
    Stale,
}

#[derive(Debug, Clone)]
struct CachedSnapshot {
    /// `None` when the venue reported it is not gated
    snapshot: Option<ImbalanceSnapshot>,
    fetched_at: Instant,
}

impl CachedSnapshot {
    fn is_stale(&self, validity: Duration) -> bool {
        self.fetched_at.elapsed() >= validity
    }
}

/// Per-venue imbalance cache and threshold check
pub struct ImbalanceGate {
    threshold: f64,
    validity: Duration,
    cache: HashMap<Uuid, CachedSnapshot>,
}

impl ImbalanceGate {
    pub fn new(threshold: f64, validity: Duration) -> Self {
        Self {
            threshold,
            validity,
            cache: HashMap::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn state(&self, venue: Uuid) -> GateState {
        match self.cache.get(&venue) {
            None => GateState::Unknown,
            Some(cached) if cached.is_stale(self.validity) => GateState::Stale,
            Some(_) => GateState::Fresh,
        }
    }

    /// Check whether `asset` may be paid into `venue`.
    ///
    /// Refreshes the snapshot unless it is `Fresh`. A failed query blocks the
    /// batch, since the venue's state cannot be confirmed.
    pub async fn check(
        &mut self,
        venue: &Venue,
        adapter: &dyn VenueAdapter,
        asset: &str,
    ) -> Result<(), TradeError> {
        let id = venue.identity();

        if self.state(id) != GateState::Fresh {
            match adapter.imbalance(venue).await {
                Ok(snapshot) => {
                    debug!("Refreshed imbalance snapshot for {}", venue.name);
                    self.cache.insert(
                        id,
                        CachedSnapshot {
                            snapshot,
                            fetched_at: Instant::now(),
                        },
                    );
                }
                Err(e) => {
                    warn!("Imbalance query failed for {}: {}", venue.name, e);
                    return Err(TradeError::GatingBlocked {
                        venue: id,
                        asset: asset.to_string(),
                        ratio: f64::NAN,
                        threshold: self.threshold,
                    });
                }
            }
        } else {
            trace!("Using cached imbalance snapshot for {}", venue.name);
        }

        let ratio = self
            .cache
            .get(&id)
            .and_then(|c| c.snapshot.as_ref())
            .and_then(|s| s.ratio(asset));

        match ratio {
            // A NaN or infinite ratio cannot be confirmed under the threshold
            Some(ratio) if !ratio.is_finite() || ratio > self.threshold => {
                info!(
                    "Gate closed on {}: imbalance {:.4} > {:.4}",
                    venue.name, ratio, self.threshold
                );
                Err(TradeError::GatingBlocked {
                    venue: id,
                    asset: asset.to_string(),
                    ratio,
                    threshold: self.threshold,
                })
            }
            _ => Ok(()),
        }
    }

    #[cfg(test)]
    fn backdate(&mut self, venue: Uuid, age: Duration) {
        if let Some(cached) = self.cache.get_mut(&venue) {
            if let Some(earlier) = Instant::now().checked_sub(age) {
                cached.fetched_at = earlier;
            }
        }
    }
}

impl Default for ImbalanceGate {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, Duration::from_secs(DEFAULT_CACHE_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::paper::{PaperLedger, PaperVenue};
    use crate::coins::CoinRegistry;
    use std::sync::Arc;

    fn gated_venue(ratio_a: f64) -> (Venue, PaperVenue) {
        let venue = Venue::new("ramm", "paper", "0xramm", "0xa", "0xb");
        let paper = PaperVenue::new(
            venue.clone(),
            1.0,
            0.001,
            Arc::new(CoinRegistry::with_defaults()),
            Arc::new(PaperLedger::new()),
        )
        .with_imbalance(HashMap::from([
            ("0xa".to_string(), ratio_a),
            ("0xb".to_string(), 0.9),
        ]));
        (venue, paper)
    }

    #[tokio::test]
    async fn test_blocks_skewed_asset() {
        let (venue, paper) = gated_venue(1.35);
        let mut gate = ImbalanceGate::default();

        let err = gate.check(&venue, &paper, "0xa").await.unwrap_err();
        assert!(matches!(err, TradeError::GatingBlocked { ratio, .. } if ratio == 1.35));
        assert!(gate.check(&venue, &paper, "0xb").await.is_ok());
    }

    #[tokio::test]
    async fn test_non_finite_ratio_blocks() {
        for ratio in [f64::NAN, f64::INFINITY] {
            let (venue, paper) = gated_venue(ratio);
            let mut gate = ImbalanceGate::default();

            let err = gate.check(&venue, &paper, "0xa").await.unwrap_err();
            assert!(matches!(err, TradeError::GatingBlocked { .. }));
            assert!(gate.check(&venue, &paper, "0xb").await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_state_machine_and_caching() {
        let (venue, paper) = gated_venue(1.0);
        let mut gate = ImbalanceGate::default();
        let id = venue.identity();

        assert_eq!(gate.state(id), GateState::Unknown);
        gate.check(&venue, &paper, "0xa").await.unwrap();
        assert_eq!(gate.state(id), GateState::Fresh);
        assert_eq!(paper.imbalance_queries(), 1);

        // Fresh snapshot is reused
        gate.check(&venue, &paper, "0xb").await.unwrap();
        assert_eq!(paper.imbalance_queries(), 1);

        gate.backdate(id, Duration::from_secs(31));
        assert_eq!(gate.state(id), GateState::Stale);

        gate.check(&venue, &paper, "0xa").await.unwrap();
        assert_eq!(gate.state(id), GateState::Fresh);
        assert_eq!(paper.imbalance_queries(), 2);
    }

    #[tokio::test]
    async fn test_ungated_venue_always_passes() {
        let venue = Venue::new("cetus", "paper", "0xcetus", "0xa", "0xb");
        let paper = PaperVenue::new(
            venue.clone(),
            1.0,
            0.001,
            Arc::new(CoinRegistry::with_defaults()),
            Arc::new(PaperLedger::new()),
        );
        let mut gate = ImbalanceGate::new(1.0, Duration::from_secs(30));
        assert!(gate.check(&venue, &paper, "0xa").await.is_ok());
        assert_eq!(gate.state(venue.identity()), GateState::Fresh);
    }

    #[tokio::test]
    async fn test_query_failure_blocks() {
        let (venue, paper) = gated_venue(1.0);
        paper.set_online(false).await;
        let mut gate = ImbalanceGate::default();

        assert!(gate.check(&venue, &paper, "0xa").await.is_err());
        assert_eq!(gate.state(venue.identity()), GateState::Unknown);
    }
}
