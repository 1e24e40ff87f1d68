//! Transaction model
//!
//! A transaction is an ordered list of commands executed atomically by the
//! ledger. Commands refer to coins either directly (gas coin, an owned unit)
//! or by the index of an earlier command's result.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cartographer::Direction;

/// A coin argument inside a transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoinArg {
    /// The implicit fee-payment coin
    GasCoin,
    /// An owned unit by id
    Unit(String),
    /// Output of the command at this index
    Result(usize),
}

/// One ledger operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Split `amount` off `coin` into a new coin (the command's result)
    SplitCoins { coin: CoinArg, amount: u64 },
    /// Merge every source into `target`
    MergeCoins { target: CoinArg, sources: Vec<CoinArg> },
    /// Swap the whole of `input` on a venue
    Swap {
        venue: Uuid,
        direction: Direction,
        asset_in: String,
        asset_out: String,
        input: CoinArg,
        amount: u64,
        min_out: u64,
    },
}

/// A built transaction ready for submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub gas_budget: u64,
    pub commands: Vec<Command>,
}

impl Transaction {
    pub fn swap_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Swap { .. }))
            .count()
    }
}

/// Incremental transaction builder
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    sender: String,
    gas_budget: u64,
    commands: Vec<Command>,
}

impl TransactionBuilder {
    pub fn new(sender: &str, gas_budget: u64) -> Self {
        Self {
            sender: sender.to_string(),
            gas_budget,
            commands: Vec::new(),
        }
    }

    /// Append a command; returns a handle to its result
    pub fn push(&mut self, command: Command) -> CoinArg {
        self.commands.push(command);
        CoinArg::Result(self.commands.len() - 1)
    }

    pub fn extend(&mut self, commands: Vec<Command>) {
        self.commands.extend(commands);
    }

    pub fn split(&mut self, coin: CoinArg, amount: u64) -> CoinArg {
        self.push(Command::SplitCoins { coin, amount })
    }

    pub fn merge(&mut self, target: CoinArg, sources: Vec<CoinArg>) {
        self.push(Command::MergeCoins { target, sources });
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn finish(self) -> Transaction {
        Transaction {
            sender: self.sender,
            gas_budget: self.gas_budget,
            commands: self.commands,
        }
    }
}
