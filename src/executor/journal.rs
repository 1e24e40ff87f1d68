//! Trade journal
//!
//! One JSON object per line for every batch the engine submits or
//! (in dry-run mode) would have submitted.

use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

use crate::brain::TradeOrder;
use crate::cartographer::VenueEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    DryRun,
    Executed,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalOrder {
    pub strategy: String,
    pub direction: String,
    pub asset_in: String,
    pub asset_out: String,
    pub amount_in: f64,
    pub amount_out: f64,
    pub estimated_price: f64,
}

impl From<&TradeOrder> for JournalOrder {
    fn from(order: &TradeOrder) -> Self {
        Self {
            strategy: order.strategy.clone(),
            direction: order.direction.to_string(),
            asset_in: order.asset_in.clone(),
            asset_out: order.asset_out.clone(),
            amount_in: order.amount_in,
            amount_out: order.amount_out,
            estimated_price: order.estimated_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub cycle: u64,
    pub venue: Uuid,
    pub venue_name: String,
    pub outcome: BatchOutcome,
    pub orders: Vec<JournalOrder>,
    pub commands: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<VenueEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TradeLogEntry {
    /// Append this entry to a file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}
