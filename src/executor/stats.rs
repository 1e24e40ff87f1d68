//! Post-trade volume statistics
//!
//! Purely observational: nothing here feeds back into trading decisions.

use std::collections::HashMap;
use uuid::Uuid;

use crate::cartographer::VenueEvent;
use crate::coins::CoinRegistry;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueVolume {
    pub swaps: u64,
    /// Raw amounts in, per asset
    pub volume_in: HashMap<String, u64>,
    /// Raw amounts out, per asset
    pub volume_out: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default)]
pub struct VolumeStats {
    venues: HashMap<Uuid, VenueVolume>,
    gas_spent: u64,
}

impl VolumeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, events: &[VenueEvent]) {
        for event in events {
            match event {
                VenueEvent::Swap {
                    venue,
                    asset_in,
                    asset_out,
                    amount_in,
                    amount_out,
                } => {
                    let entry = self.venues.entry(*venue).or_default();
                    entry.swaps += 1;
                    let v = entry.volume_in.entry(asset_in.clone()).or_default();
                    *v = v.saturating_add(*amount_in);
                    let v = entry.volume_out.entry(asset_out.clone()).or_default();
                    *v = v.saturating_add(*amount_out);
                }
                VenueEvent::GasCharged { amount } => {
                    self.gas_spent = self.gas_spent.saturating_add(*amount);
                }
            }
        }
    }

    pub fn venue(&self, venue: Uuid) -> Option<&VenueVolume> {
        self.venues.get(&venue)
    }

    pub fn total_swaps(&self) -> u64 {
        self.venues.values().map(|v| v.swaps).sum()
    }

    pub fn gas_spent(&self) -> u64 {
        self.gas_spent
    }

    /// Raw volume paid in per asset, summed across venues
    pub fn volume_in_by_asset(&self) -> HashMap<String, u64> {
        let mut totals: HashMap<String, u64> = HashMap::new();
        for venue in self.venues.values() {
            for (asset, amount) in &venue.volume_in {
                let t = totals.entry(asset.clone()).or_default();
                *t = t.saturating_add(*amount);
            }
        }
        totals
    }

    /// Human-readable lines, sorted by symbol
    pub fn summary_lines(&self, registry: &CoinRegistry) -> Vec<String> {
        let mut lines: Vec<String> = self
            .volume_in_by_asset()
            .into_iter()
            .map(|(asset, raw)| {
                let human = registry.from_raw(&asset, raw).unwrap_or(raw as f64);
                format!("{:<8} {:>20.6}", registry.symbol(&asset), human)
            })
            .collect();
        lines.sort();
        lines
    }
}
