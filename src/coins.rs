//! Coin Registry
//!
//! Static mapping of symbolic coin names to canonical, venue-qualified type
//! identifiers and their decimal precision. Built once at startup and shared
//! by handle (`Arc<CoinRegistry>`) with every component that scales amounts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::TradeError;

/// Canonical id of the chain's native gas coin.
pub const NATIVE_COIN_ID: &str = "0x2::sui::SUI";

/// A coin we know how to scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub symbol: String,
    pub canonical_id: String,
    pub decimals: u8,
}

impl Coin {
    pub fn new(symbol: &str, canonical_id: &str, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            canonical_id: canonical_id.to_string(),
            decimals,
        }
    }
}

// ============================================
// DEFAULT COINS
// ============================================

/// Native and major stable coins
pub fn base_coins() -> Vec<Coin> {
    vec![
        Coin::new("SUI", NATIVE_COIN_ID, 9),
        Coin::new(
            "USDC",
            "0xdba34672e30cb065b1f93e3ab55318768fd6fef66c15942c9f7cb846e2f900e7::usdc::USDC",
            6,
        ),
        Coin::new(
            "USDT",
            "0xc060006111016b8a020ad5b33834984a437aaa7d3c74c18e09a95d48aceab08c::coin::COIN",
            6,
        ),
    ]
}

/// Bridged majors and venue governance coins
pub fn ecosystem_coins() -> Vec<Coin> {
    vec![
        Coin::new(
            "WETH",
            "0xaf8cd5edc19c4512f4259f0bee101a40d41ebed738ade5874359610ef8eeced5::coin::COIN",
            8,
        ),
        Coin::new(
            "CETUS",
            "0x06864a6f921804860930db6ddbe2e16acdf8504495ea7481637a1c8b9a8fe54b::cetus::CETUS",
            9,
        ),
        Coin::new(
            "DEEP",
            "0xdeeb7a4662eec9f2f3def03fb937a663dddaa2e215b8078a284d026b7946c270::deep::DEEP",
            6,
        ),
    ]
}

// ============================================
// REGISTRY
// ============================================

/// Process-wide, read-only coin table keyed by canonical id
#[derive(Debug, Clone, Default)]
pub struct CoinRegistry {
    by_id: HashMap<String, Coin>,
    by_symbol: HashMap<String, String>,
}

impl CoinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the default coin set
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for coin in base_coins().into_iter().chain(ecosystem_coins()) {
            registry.insert(coin);
        }
        registry
    }

    /// Add or replace a coin. Later inserts win for both keys.
    pub fn insert(&mut self, coin: Coin) {
        self.by_symbol
            .insert(coin.symbol.to_uppercase(), coin.canonical_id.clone());
        self.by_id.insert(coin.canonical_id.clone(), coin);
    }

    pub fn get(&self, canonical_id: &str) -> Option<&Coin> {
        self.by_id.get(canonical_id)
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&Coin> {
        self.by_symbol
            .get(&symbol.to_uppercase())
            .and_then(|id| self.by_id.get(id))
    }

    /// Resolve either a symbol or a canonical id
    pub fn resolve(&self, key: &str) -> Result<&Coin, TradeError> {
        self.get(key)
            .or_else(|| self.by_symbol(key))
            .ok_or_else(|| TradeError::UnknownAsset(key.to_string()))
    }

    pub fn decimals(&self, canonical_id: &str) -> Result<u8, TradeError> {
        self.get(canonical_id)
            .map(|c| c.decimals)
            .ok_or_else(|| TradeError::UnknownAsset(canonical_id.to_string()))
    }

    /// Display name for logs; falls back to a shortened id
    pub fn symbol(&self, canonical_id: &str) -> String {
        match self.get(canonical_id) {
            Some(coin) => coin.symbol.clone(),
            None => canonical_id.chars().take(10).collect::<String>() + "...",
        }
    }

    pub fn is_native(&self, canonical_id: &str) -> bool {
        canonical_id == NATIVE_COIN_ID
    }

    /// Scale a human amount up to its raw on-ledger integer
    pub fn to_raw(&self, canonical_id: &str, amount: f64) -> Result<u64, TradeError> {
        let decimals = self.decimals(canonical_id)?;
        let raw = (amount * 10f64.powi(decimals as i32)).round();

        if !raw.is_finite() || raw < 0.0 || raw > u64::MAX as f64 {
            return Err(TradeError::InvalidAmount {
                asset: canonical_id.to_string(),
                amount,
            });
        }

        Ok(raw as u64)
    }

    /// Scale a raw integer down to a human amount
    pub fn from_raw(&self, canonical_id: &str, raw: u64) -> Result<f64, TradeError> {
        let decimals = self.decimals(canonical_id)?;
        Ok(raw as f64 / 10f64.powi(decimals as i32))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.by_id.values()
    }
}
