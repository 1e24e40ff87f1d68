//! Error taxonomy
//!
//! Typed errors for everything the execution core can surface. Plumbing
//! code (config loading, the host binary) wraps these in `eyre::Result`.

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the decision-and-execution core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    /// A price source produced no observation this cycle.
    #[error("no observation from {origin}: {reason}")]
    DataUnavailable { origin: String, reason: String },

    /// The payment selector could not assemble the requested amount.
    #[error("insufficient balance of {asset}: requested {requested}, available {available}")]
    InsufficientBalance {
        asset: String,
        requested: u64,
        available: u64,
    },

    /// A protective threshold prevented submission.
    #[error("venue {venue} gated: {asset} imbalance {ratio:.4} exceeds {threshold:.4}")]
    GatingBlocked {
        venue: Uuid,
        asset: String,
        ratio: f64,
        threshold: f64,
    },

    /// The venue rejected the transaction for structural or funding reasons.
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// Any other submission failure.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    #[error("unknown asset: {0}")]
    UnknownAsset(String),

    #[error("invalid amount {amount} for {asset}")]
    InvalidAmount { asset: String, amount: f64 },

    #[error("invalid arbitrage chain: {0}")]
    InvalidChain(String),

    #[error("invalid strategy parameters: {0}")]
    InvalidParameters(String),

    #[error("strategy '{strategy}' subscribes to unregistered source {identity}")]
    UnknownSubscription { strategy: String, identity: Uuid },

    #[error(transparent)]
    Venue(#[from] VenueError),
}

impl TradeError {
    /// Transient failures feed the delay controller; nothing else does.
    pub fn is_transient(&self) -> bool {
        matches!(self, TradeError::SubmissionFailed(_))
    }
}

/// Errors returned by a venue adapter's query and build operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VenueError {
    #[error("venue unavailable: {0}")]
    Unavailable(String),

    #[error("venue query failed: {0}")]
    Query(String),

    #[error("cannot build swap: {0}")]
    Build(String),
}

/// Outcome classification for a failed submission.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmitError {
    /// Caller/input error (e.g. gas budget too low). Not retried.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Transient failure. Triggers backoff.
    #[error("failed: {0}")]
    Failed(String),
}

impl From<SubmitError> for TradeError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Rejected(msg) => TradeError::SubmissionRejected(msg),
            SubmitError::Failed(msg) => TradeError::SubmissionFailed(msg),
        }
    }
}

/// Configuration errors. These are the only errors allowed to abort the process.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_error_classification() {
        let rejected: TradeError = SubmitError::Rejected("gas budget too low".into()).into();
        let failed: TradeError = SubmitError::Failed("rpc timeout".into()).into();

        assert!(matches!(rejected, TradeError::SubmissionRejected(_)));
        assert!(!rejected.is_transient());
        assert!(failed.is_transient());
    }

    #[test]
    fn test_insufficient_balance_message() {
        let err = TradeError::InsufficientBalance {
            asset: "USDC".into(),
            requested: 50,
            available: 20,
        };
        assert_eq!(
            err.to_string(),
            "insufficient balance of USDC: requested 50, available 20"
        );
    }
}
