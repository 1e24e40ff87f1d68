//! Arbiter - multi-venue arbitrage and trend trading agent
//!
//! Phases:
//! - `cartographer`: venues, adapters, price sources and the imbalance gate
//! - `brain`: strategies turning observations into trade orders
//! - `executor`: payment selection, batching, submission and backoff

pub mod brain;
pub mod cartographer;
pub mod coins;
pub mod config;
pub mod error;
pub mod executor;
