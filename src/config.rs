//! Configuration for the trading agent
//!
//! Scalar settings come from the environment (`.env` supported); venues,
//! strategies and paper holdings come from a TOML file, or from the
//! built-in paper market when nothing else is configured. Everything is
//! loaded once at startup and never mutated afterwards.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::cartographer::Direction;
use crate::coins::{Coin, CoinRegistry};
use crate::error::{ConfigError, TradeError};

// ============================================
// EXECUTION MODE
// ============================================

/// Execution mode determines whether built transactions are submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Evaluate, gate and build, but never submit
    #[default]
    DryRun,

    /// Submit through the venue adapters
    Live,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::DryRun => write!(f, "DRY_RUN"),
            ExecutionMode::Live => write!(f, "LIVE"),
        }
    }
}

// ============================================
// MARKET TABLES
// ============================================

/// A coin beyond the built-in registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinConfig {
    pub symbol: String,
    pub canonical_id: String,
    pub decimals: u8,
}

/// One tradable pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueConfig {
    pub name: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub address: String,
    /// Symbol or canonical id
    pub asset_a: String,
    pub asset_b: String,
    pub fee: f64,
    /// Starting paper price (asset_b per asset_a)
    pub price: f64,
    #[serde(default)]
    pub volatility: f64,
    /// Signing identity for this venue; the owner when unset
    #[serde(default)]
    pub signer: Option<String>,
    /// Imbalance ratios by asset symbol; gated venues only
    #[serde(default)]
    pub imbalance: Option<HashMap<String, f64>>,
}

fn default_protocol() -> String {
    "paper".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopConfig {
    pub venue: String,
    pub direction: Direction,
}

/// A closed arbitrage chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub hops: Vec<HopConfig>,
    /// Overrides `arbitrage_lower_limit`
    #[serde(default)]
    pub lower_limit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    pub name: String,
    pub venue: String,
    pub short_window: usize,
    pub long_window: usize,
    pub quote_amount: f64,
    pub base_amount: f64,
}

/// Paper units seeded into the ledger at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingConfig {
    pub asset: String,
    /// One entry per unit, in human amounts
    pub units: Vec<f64>,
    /// Defaults to the owner address
    #[serde(default)]
    pub owner: Option<String>,
}

// ============================================
// MAIN CONFIG
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ===== EXECUTION =====
    pub execution_mode: ExecutionMode,
    /// Signing identity for every venue without its own signer
    pub owner_address: String,
    pub run_duration_secs: u64,
    pub gas_budget: u64,
    /// Paper gas funded to every signer, in native coin units
    pub paper_gas: f64,

    // ===== LOOP TIMING =====
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: u32,

    // ===== STRATEGY =====
    pub arbitrage_lower_limit: f64,
    pub max_slippage: f64,
    /// Unscaled trade size per asset symbol
    pub default_amounts: HashMap<String, f64>,

    // ===== GATING =====
    pub imbalance_threshold: f64,
    pub imbalance_cache_secs: u64,

    // ===== JOURNAL =====
    pub trade_log: bool,
    pub trade_log_path: String,

    // ===== MARKET =====
    pub coins: Vec<CoinConfig>,
    pub venues: Vec<VenueConfig>,
    pub arbitrage: Vec<ChainConfig>,
    pub trend: Vec<TrendConfig>,
    pub holdings: Vec<HoldingConfig>,
}

impl Config {
    /// Load scalar settings from the environment on top of the paper market
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let default_amounts = match env::var("DEFAULT_AMOUNTS") {
            Ok(raw) => parse_amounts(&raw)?,
            Err(_) => defaults.default_amounts.clone(),
        };

        let config = Self {
            execution_mode: match env::var("EXECUTION_MODE")
                .unwrap_or_else(|_| "dry_run".to_string())
                .to_lowercase()
                .as_str()
            {
                "live" => ExecutionMode::Live,
                _ => ExecutionMode::DryRun,
            },
            owner_address: env::var("OWNER_ADDRESS").unwrap_or_default(),
            run_duration_secs: env_or("RUN_DURATION_SECS", defaults.run_duration_secs),
            gas_budget: env_or("GAS_BUDGET", defaults.gas_budget),
            paper_gas: env_or("PAPER_GAS", defaults.paper_gas),

            base_delay_ms: env_or("BASE_DELAY_MS", defaults.base_delay_ms),
            max_delay_ms: env_or("MAX_DELAY_MS", defaults.max_delay_ms),
            backoff_factor: env_or("BACKOFF_FACTOR", defaults.backoff_factor),

            arbitrage_lower_limit: env_or("ARBITRAGE_LOWER_LIMIT", defaults.arbitrage_lower_limit),
            max_slippage: env_or("MAX_SLIPPAGE", defaults.max_slippage),
            default_amounts,

            imbalance_threshold: env_or("IMBALANCE_THRESHOLD", defaults.imbalance_threshold),
            imbalance_cache_secs: env_or("IMBALANCE_CACHE_SECS", defaults.imbalance_cache_secs),

            trade_log: env_or("TRADE_LOG", defaults.trade_log),
            trade_log_path: env::var("TRADE_LOG_PATH").unwrap_or_else(|_| defaults.trade_log_path.clone()),

            ..defaults
        };

        Ok(config.with_paper_market())
    }

    /// Load the full surface from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Fill in the built-in paper market when no venues are configured
    pub fn with_paper_market(mut self) -> Self {
        if !self.venues.is_empty() {
            return self;
        }

        self.venues = vec![
            VenueConfig {
                name: "cetus-sui-usdc".to_string(),
                protocol: "paper".to_string(),
                address: "0xb8d7d9e66a60c239e7a60110efcf8de6c705580ed924d0dde141f4a0e2c90105".to_string(),
                asset_a: "SUI".to_string(),
                asset_b: "USDC".to_string(),
                fee: 0.0025,
                price: 3.50,
                volatility: 0.002,
                signer: None,
                imbalance: None,
            },
            VenueConfig {
                name: "cetus-usdc-usdt".to_string(),
                protocol: "paper".to_string(),
                address: "0x6bd72983b0b5a77774af8c77567bb593b418ae3cd750a5926814fcd236409aaa".to_string(),
                asset_a: "USDC".to_string(),
                asset_b: "USDT".to_string(),
                fee: 0.0001,
                price: 1.0002,
                volatility: 0.0005,
                signer: None,
                imbalance: None,
            },
            VenueConfig {
                name: "ramm-usdt-sui".to_string(),
                protocol: "paper".to_string(),
                address: "0x4ee5425220bc12f2ff633d37b1dc1eb56cc8fd96b1c72c49bd4ce6e895bd6cd7".to_string(),
                asset_a: "USDT".to_string(),
                asset_b: "SUI".to_string(),
                fee: 0.002,
                price: 0.2862,
                volatility: 0.002,
                signer: None,
                imbalance: Some(HashMap::from([
                    ("USDT".to_string(), 1.05),
                    ("SUI".to_string(), 0.96),
                ])),
            },
        ];

        if self.arbitrage.is_empty() {
            self.arbitrage = vec![ChainConfig {
                name: "sui-triangle".to_string(),
                hops: ["cetus-sui-usdc", "cetus-usdc-usdt", "ramm-usdt-sui"]
                    .iter()
                    .map(|venue| HopConfig {
                        venue: venue.to_string(),
                        direction: Direction::AToB,
                    })
                    .collect(),
                lower_limit: None,
            }];
        }

        if self.trend.is_empty() {
            self.trend = vec![TrendConfig {
                name: "sui-trend".to_string(),
                venue: "cetus-sui-usdc".to_string(),
                short_window: 5,
                long_window: 20,
                quote_amount: 50.0,
                base_amount: 10.0,
            }];
        }

        if self.holdings.is_empty() {
            self.holdings = vec![
                HoldingConfig {
                    asset: "USDC".to_string(),
                    units: vec![40.0, 25.0, 60.0, 15.0, 120.0],
                    owner: None,
                },
                HoldingConfig {
                    asset: "USDT".to_string(),
                    units: vec![100.0, 20.0, 35.0],
                    owner: None,
                },
            ];
        }

        self
    }

    /// Validate configuration before anything starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.owner_address.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "owner_address",
            });
        }

        // Loop timing
        if self.base_delay_ms == 0 {
            return Err(invalid("base_delay_ms", "must be greater than zero"));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(invalid(
                "max_delay_ms",
                format!("{} is below base delay {}", self.max_delay_ms, self.base_delay_ms),
            ));
        }
        if self.backoff_factor < 1 {
            return Err(invalid("backoff_factor", "must be at least 1"));
        }
        if self.gas_budget == 0 {
            return Err(invalid("gas_budget", "must be greater than zero"));
        }

        // Strategy thresholds
        if !self.arbitrage_lower_limit.is_finite() || self.arbitrage_lower_limit <= 0.0 {
            return Err(invalid(
                "arbitrage_lower_limit",
                format!("{} must be positive", self.arbitrage_lower_limit),
            ));
        }
        if !(0.0..1.0).contains(&self.max_slippage) {
            return Err(invalid(
                "max_slippage",
                format!("{} outside [0, 1)", self.max_slippage),
            ));
        }
        if !self.imbalance_threshold.is_finite() || self.imbalance_threshold <= 0.0 {
            return Err(invalid("imbalance_threshold", "must be positive"));
        }
        if let Some((symbol, amount)) = self
            .default_amounts
            .iter()
            .find(|(_, a)| !a.is_finite() || **a <= 0.0)
        {
            return Err(invalid(
                "default_amounts",
                format!("{} for {} must be positive", amount, symbol),
            ));
        }

        // Market tables
        let mut names = HashSet::new();
        for venue in &self.venues {
            if !names.insert(venue.name.as_str()) {
                return Err(invalid("venues", format!("duplicate venue '{}'", venue.name)));
            }
            if !(0.0..1.0).contains(&venue.fee) {
                return Err(invalid("venues", format!("'{}' fee {} outside [0, 1)", venue.name, venue.fee)));
            }
            if !venue.price.is_finite() || venue.price <= 0.0 {
                return Err(invalid("venues", format!("'{}' price must be positive", venue.name)));
            }
        }

        for chain in &self.arbitrage {
            if chain.hops.is_empty() {
                return Err(invalid("arbitrage", format!("chain '{}' has no hops", chain.name)));
            }
            if let Some(hop) = chain.hops.iter().find(|h| !names.contains(h.venue.as_str())) {
                return Err(invalid(
                    "arbitrage",
                    format!("chain '{}' references unknown venue '{}'", chain.name, hop.venue),
                ));
            }
            if let Some(limit) = chain.lower_limit {
                if !limit.is_finite() || limit <= 0.0 {
                    return Err(invalid("arbitrage", format!("chain '{}' lower limit must be positive", chain.name)));
                }
            }
        }

        for trend in &self.trend {
            if !names.contains(trend.venue.as_str()) {
                return Err(invalid(
                    "trend",
                    format!("'{}' references unknown venue '{}'", trend.name, trend.venue),
                ));
            }
            if trend.short_window == 0 || trend.short_window >= trend.long_window {
                return Err(invalid(
                    "trend",
                    format!("'{}' needs 0 < short_window < long_window", trend.name),
                ));
            }
        }

        for holding in &self.holdings {
            if holding.units.iter().any(|u| !u.is_finite() || *u <= 0.0) {
                return Err(invalid(
                    "holdings",
                    format!("{} units must be positive", holding.asset),
                ));
            }
        }

        Ok(())
    }

    /// Built-in coins plus any configured extras
    pub fn registry(&self) -> CoinRegistry {
        let mut registry = CoinRegistry::with_defaults();
        for coin in &self.coins {
            registry.insert(Coin::new(&coin.symbol, &coin.canonical_id, coin.decimals));
        }
        registry
    }

    /// Default amounts keyed by canonical coin id
    pub fn resolve_amounts(&self, registry: &CoinRegistry) -> Result<HashMap<String, f64>, TradeError> {
        self.default_amounts
            .iter()
            .map(|(key, amount)| Ok((registry.resolve(key)?.canonical_id.clone(), *amount)))
            .collect()
    }

    pub fn venue(&self, name: &str) -> Option<&VenueConfig> {
        self.venues.iter().find(|v| v.name == name)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║                 ARBITER - CONFIGURATION                    ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Execution Mode:    {:^40} ║", self.execution_mode);
        println!("║ Owner:             {:^40} ║", abbreviate(&self.owner_address));
        println!("║ Run Duration:      {:>38} s ║", self.run_duration_secs);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ LOOP                                                       ║");
        println!("║ • Base Delay:      {:>37} ms ║", self.base_delay_ms);
        println!("║ • Max Delay:       {:>37} ms ║", self.max_delay_ms);
        println!("║ • Backoff Factor:  {:>38}x ║", self.backoff_factor);
        println!("║ • Gas Budget:      {:^40} ║", self.gas_budget);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ STRATEGY                                                   ║");
        println!("║ • Lower Limit:     {:^40.4} ║", self.arbitrage_lower_limit);
        println!("║ • Max Slippage:    {:>38.2}% ║", self.max_slippage * 100.0);
        println!("║ • Chains:          {:^40} ║", self.arbitrage.len());
        println!("║ • Trend Followers: {:^40} ║", self.trend.len());
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SAFETY                                                     ║");
        println!("║ • Imbalance Gate:  {:>37.2}x ║", self.imbalance_threshold);
        println!("║ • Snapshot Cache:  {:>38} s ║", self.imbalance_cache_secs);
        println!("║ • Trade Log:       {:^40} ║",
            if self.trade_log { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::DryRun,
            owner_address: String::new(),
            run_duration_secs: 60,
            gas_budget: 50_000_000,
            paper_gas: 100.0,

            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_factor: 10,

            arbitrage_lower_limit: 1.0005,
            max_slippage: 0.01,
            default_amounts: HashMap::from([
                ("SUI".to_string(), 10.0),
                ("USDC".to_string(), 35.0),
                ("USDT".to_string(), 35.0),
            ]),

            imbalance_threshold: crate::cartographer::DEFAULT_THRESHOLD,
            imbalance_cache_secs: crate::cartographer::DEFAULT_CACHE_SECS,

            trade_log: false,
            trade_log_path: "./logs/trades.jsonl".to_string(),

            coins: Vec::new(),
            venues: Vec::new(),
            arbitrage: Vec::new(),
            trend: Vec::new(),
            holdings: Vec::new(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn abbreviate(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 14 {
        return address.to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

/// Parse `SYMBOL=amount,SYMBOL=amount`
pub fn parse_amounts(raw: &str) -> Result<HashMap<String, f64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (symbol, amount) = entry
                .split_once('=')
                .ok_or_else(|| invalid("default_amounts", format!("'{}' is not SYMBOL=amount", entry)))?;
            let amount: f64 = amount
                .trim()
                .parse()
                .map_err(|_| invalid("default_amounts", format!("'{}' is not a number", amount.trim())))?;
            Ok((symbol.trim().to_string(), amount))
        })
        .collect()
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            owner_address: "0xowner".to_string(),
            ..Config::default()
        }
        .with_paper_market()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.execution_mode, ExecutionMode::DryRun);
        assert_eq!(config.backoff_factor, 10);
        assert_eq!(config.imbalance_threshold, 1.2);
        assert_eq!(config.imbalance_cache_secs, 30);
        assert!(config.venues.is_empty());
    }

    #[test]
    fn test_owner_is_required() {
        let config = Config::default().with_paper_market();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { field: "owner_address" })
        ));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_scalars() {
        let cases = [
            Config { base_delay_ms: 0, ..valid() },
            Config { base_delay_ms: 5_000, max_delay_ms: 1_000, ..valid() },
            Config { backoff_factor: 0, ..valid() },
            Config { arbitrage_lower_limit: 0.0, ..valid() },
            Config { max_slippage: 1.0, ..valid() },
            Config { imbalance_threshold: f64::NAN, ..valid() },
        ];
        for config in cases {
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_rejects_unknown_venue_reference() {
        let mut config = valid();
        config.arbitrage[0].hops[1].venue = "nowhere".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("nowhere"));

        let mut config = valid();
        config.trend[0].venue = "nowhere".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_paper_market_is_a_closed_triangle() {
        let config = valid();
        let registry = config.registry();
        let chain = &config.arbitrage[0];

        let assets: Vec<(String, String)> = chain
            .hops
            .iter()
            .map(|hop| {
                let venue = config.venue(&hop.venue).unwrap();
                let a = registry.resolve(&venue.asset_a).unwrap().canonical_id.clone();
                let b = registry.resolve(&venue.asset_b).unwrap().canonical_id.clone();
                match hop.direction {
                    Direction::AToB => (a, b),
                    Direction::BToA => (b, a),
                }
            })
            .collect();
        for (i, (_, out)) in assets.iter().enumerate() {
            assert_eq!(out, &assets[(i + 1) % assets.len()].0);
        }
    }

    #[test]
    fn test_parses_toml() {
        let config = Config::from_toml(
            r#"
            execution_mode = "live"
            owner_address = "0xabc"
            base_delay_ms = 250

            [default_amounts]
            X = 5.0

            [[coins]]
            symbol = "X"
            canonical_id = "0x1::x::X"
            decimals = 6

            [[venues]]
            name = "xy"
            address = "0xpool"
            asset_a = "X"
            asset_b = "USDC"
            fee = 0.003
            price = 2.0
            signer = "0xdesk"

            [[arbitrage]]
            name = "loop"
            hops = [{ venue = "xy", direction = "a2b" }, { venue = "xy", direction = "b2a" }]
            "#,
        )
        .unwrap();

        assert_eq!(config.execution_mode, ExecutionMode::Live);
        assert_eq!(config.base_delay_ms, 250);
        assert_eq!(config.max_delay_ms, 60_000);
        assert_eq!(config.venues[0].protocol, "paper");
        assert_eq!(config.venues[0].signer.as_deref(), Some("0xdesk"));
        assert_eq!(config.arbitrage[0].hops[1].direction, Direction::BToA);

        let registry = config.registry();
        let amounts = config.resolve_amounts(&registry).unwrap();
        assert_eq!(amounts.get("0x1::x::X"), Some(&5.0));

        // Configured venues suppress the paper market
        assert_eq!(config.with_paper_market().venues.len(), 1);
    }

    #[test]
    fn test_example_file_is_valid() {
        let config = Config::from_toml(include_str!("../config/arbiter.example.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.venues.len(), 3);
        assert!(config.venue("ramm-usdt-sui").and_then(|v| v.signer.as_ref()).is_some());
        assert_eq!(config.holdings.len(), 3);
    }

    #[test]
    fn test_parse_amounts() {
        let amounts = parse_amounts("SUI=10, USDC = 35.5,").unwrap();
        assert_eq!(amounts["SUI"], 10.0);
        assert_eq!(amounts["USDC"], 35.5);
        assert!(parse_amounts("SUI").is_err());
        assert!(parse_amounts("SUI=lots").is_err());
    }
}
