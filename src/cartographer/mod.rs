//! Phase 1: The Cartographer (Market Data)
//!
//! Responsible for:
//! - Describing venues and the adapter capability every protocol implements
//! - Polling venues into timestamped price observations
//! - Gating trades into skewed venues

mod imbalance;
pub mod paper;
mod price_source;
mod venue;

pub use imbalance::{GateState, ImbalanceGate, DEFAULT_CACHE_SECS, DEFAULT_THRESHOLD};
pub use paper::{PaperLedger, PaperVenue};
pub use price_source::{DataPoint, FillPoint, PricePoint, PriceSource};
pub use venue::{
    venue_identity, Direction, ImbalanceSnapshot, OwnedUnit, Quote, SwapRequest, Venue,
    VenueAdapter, VenueEvent,
};
