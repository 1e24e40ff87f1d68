//! Venues and the Venue Adapter capability
//!
//! A `Venue` is one tradable pair on one protocol. Everything protocol
//! specific (quoting, swap encoding, ledger queries, submission) lives
//! behind the `VenueAdapter` trait; the execution loop only ever talks to
//! that trait, never to a concrete venue type.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{SubmitError, VenueError};
use crate::executor::{CoinArg, Command, Transaction};

// ============================================
// DIRECTION
// ============================================

/// Which way a swap crosses the pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Pay asset A, receive asset B
    #[serde(rename = "a2b")]
    AToB,
    /// Pay asset B, receive asset A
    #[serde(rename = "b2a")]
    BToA,
}

impl Direction {
    pub fn invert(self) -> Self {
        match self {
            Direction::AToB => Direction::BToA,
            Direction::BToA => Direction::AToB,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::AToB => write!(f, "A→B"),
            Direction::BToA => write!(f, "B→A"),
        }
    }
}

// ============================================
// VENUE
// ============================================

/// One tradable pair on one venue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Venue {
    pub name: String,
    pub protocol: String,
    pub address: String,
    pub asset_a: String,
    pub asset_b: String,
    identity: Uuid,
}

impl Venue {
    pub fn new(name: &str, protocol: &str, address: &str, asset_a: &str, asset_b: &str) -> Self {
        Self {
            name: name.to_string(),
            protocol: protocol.to_string(),
            address: address.to_string(),
            asset_a: asset_a.to_string(),
            asset_b: asset_b.to_string(),
            identity: venue_identity(address, asset_a, asset_b),
        }
    }

    pub fn identity(&self) -> Uuid {
        self.identity
    }

    /// Routing URI, e.g. `cetus://<uuid>`
    pub fn uri(&self) -> String {
        format!("{}://{}", self.protocol, self.identity)
    }

    pub fn asset_in(&self, direction: Direction) -> &str {
        match direction {
            Direction::AToB => &self.asset_a,
            Direction::BToA => &self.asset_b,
        }
    }

    pub fn asset_out(&self, direction: Direction) -> &str {
        self.asset_in(direction.invert())
    }
}

/// Deterministic identity from the venue address and the sorted pair.
///
/// The same address quoted for two different pairs (a 3-asset pool) yields
/// two identities; the same pair declared in either order yields one.
pub fn venue_identity(address: &str, asset_a: &str, asset_b: &str) -> Uuid {
    let (lo, hi) = if asset_a <= asset_b {
        (asset_a, asset_b)
    } else {
        (asset_b, asset_a)
    };
    let name = format!("{}|{}|{}", address, lo, hi);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

// ============================================
// ADAPTER DATA TYPES
// ============================================

/// Current price (quote per base, B per A) and relative fee
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub fee: f64,
}

/// One independently spendable fragment of an owner's holdings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedUnit {
    pub asset: String,
    pub unit_id: String,
    pub balance: u64,
}

/// Per-asset imbalance ratios reported by a gated venue (1.0 = on target)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImbalanceSnapshot {
    pub ratios: HashMap<String, f64>,
}

impl ImbalanceSnapshot {
    pub fn ratio(&self, asset: &str) -> Option<f64> {
        self.ratios.get(asset).copied()
    }
}

/// Parameters for one swap fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapRequest {
    pub direction: Direction,
    pub amount: u64,
    pub min_out: u64,
}

/// Effects emitted by a successful submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VenueEvent {
    Swap {
        venue: Uuid,
        asset_in: String,
        asset_out: String,
        amount_in: u64,
        amount_out: u64,
    },
    GasCharged {
        amount: u64,
    },
}

// ============================================
// ADAPTER TRAIT
// ============================================

/// Per-protocol capability set consumed by the execution core
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Protocol name for logs
    fn protocol(&self) -> &str;

    /// Current price and fee for the venue's pair
    async fn quote(&self, venue: &Venue) -> Result<Quote, VenueError>;

    /// Spendable units of `asset` held by `owner`
    async fn owned_units(&self, owner: &str, asset: &str) -> Result<Vec<OwnedUnit>, VenueError>;

    /// Encode a swap paying from `input`
    fn build_swap(
        &self,
        venue: &Venue,
        request: &SwapRequest,
        input: CoinArg,
    ) -> Result<Vec<Command>, VenueError>;

    /// Imbalance ratios for gated venues. Ungated venues return `None`.
    async fn imbalance(&self, _venue: &Venue) -> Result<Option<ImbalanceSnapshot>, VenueError> {
        Ok(None)
    }

    /// Submit a built transaction and await its effects
    async fn submit(&self, tx: &Transaction) -> Result<Vec<VenueEvent>, SubmitError>;
}
