//! Paper venue
//!
//! An in-memory Venue Adapter. A shared `PaperLedger` plays the chain: it
//! holds each owner's units and gas balance and executes transactions
//! atomically. `PaperVenue` quotes a configured (optionally drifting) price
//! and fills swaps against it. Used by the host in place of a chain adapter
//! and as the adapter double in tests.

use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};

use super::venue::{
    Direction, ImbalanceSnapshot, OwnedUnit, Quote, SwapRequest, Venue, VenueAdapter, VenueEvent,
};
use crate::coins::{CoinRegistry, NATIVE_COIN_ID};
use crate::error::{SubmitError, VenueError};
use crate::executor::{CoinArg, Command, Transaction};

/// Gas charged per command
pub const GAS_PER_COMMAND: u64 = 250_000;

// ============================================
// LEDGER
// ============================================

#[derive(Debug, Clone, Default)]
struct Account {
    units: Vec<OwnedUnit>,
    gas: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<String, Account>,
    next_id: u64,
}

impl LedgerState {
    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("0x{:064x}", self.next_id)
    }
}

/// One swap leg handed to the fill function
#[derive(Debug, Clone)]
pub struct SwapLeg {
    pub venue: uuid::Uuid,
    pub direction: Direction,
    pub asset_in: String,
    pub asset_out: String,
    pub amount: u64,
}

/// A coin produced mid-transaction
#[derive(Debug, Clone)]
struct TempCoin {
    asset: String,
    balance: u64,
}

/// Shared in-memory ledger
#[derive(Debug, Default)]
pub struct PaperLedger {
    state: Mutex<LedgerState>,
}

impl PaperLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a new unit; returns its id. The native coin is credited to
    /// the gas coin instead and yields an empty id.
    pub async fn mint(&self, owner: &str, asset: &str, balance: u64) -> String {
        let mut state = self.state.lock().await;
        if asset == NATIVE_COIN_ID {
            let account = state.accounts.entry(owner.to_string()).or_default();
            account.gas = account.gas.saturating_add(balance);
            return String::new();
        }
        let unit_id = state.fresh_id();
        state
            .accounts
            .entry(owner.to_string())
            .or_default()
            .units
            .push(OwnedUnit {
                asset: asset.to_string(),
                unit_id: unit_id.clone(),
                balance,
            });
        unit_id
    }

    pub async fn fund_gas(&self, owner: &str, amount: u64) {
        let mut state = self.state.lock().await;
        let account = state.accounts.entry(owner.to_string()).or_default();
        account.gas = account.gas.saturating_add(amount);
    }

    pub async fn gas_balance(&self, owner: &str) -> u64 {
        let state = self.state.lock().await;
        state.accounts.get(owner).map(|a| a.gas).unwrap_or(0)
    }

    pub async fn units(&self, owner: &str, asset: &str) -> Vec<OwnedUnit> {
        let state = self.state.lock().await;
        state
            .accounts
            .get(owner)
            .map(|a| {
                a.units
                    .iter()
                    .filter(|u| u.asset == asset && u.balance > 0)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total holding of `asset`; the native coin includes the gas coin
    pub async fn balance(&self, owner: &str, asset: &str) -> u64 {
        let units: u64 = self.units(owner, asset).await.iter().map(|u| u.balance).sum();
        if asset == NATIVE_COIN_ID {
            units.saturating_add(self.gas_balance(owner).await)
        } else {
            units
        }
    }

    /// Execute `tx` atomically. `fill` prices each swap leg and returns the
    /// raw output amount. Nothing is committed unless every command succeeds.
    pub async fn execute<F>(&self, tx: &Transaction, mut fill: F) -> Result<Vec<VenueEvent>, SubmitError>
    where
        F: FnMut(&SwapLeg) -> Result<u64, SubmitError> + Send,
    {
        let gas_needed = GAS_PER_COMMAND.saturating_mul(tx.commands.len() as u64);
        if gas_needed > tx.gas_budget {
            return Err(SubmitError::Rejected(format!(
                "gas budget {} below required {}",
                tx.gas_budget, gas_needed
            )));
        }

        let mut state = self.state.lock().await;
        let mut account = state.accounts.get(&tx.sender).cloned().unwrap_or_default();
        if account.gas < tx.gas_budget {
            return Err(SubmitError::Rejected(format!(
                "insufficient gas: balance {} below budget {}",
                account.gas, tx.gas_budget
            )));
        }

        let mut results: Vec<Option<TempCoin>> = Vec::with_capacity(tx.commands.len());
        let mut minted: Vec<OwnedUnit> = Vec::new();
        let mut events = Vec::new();

        for command in &tx.commands {
            match command {
                Command::SplitCoins { coin, amount } => {
                    let asset = withdraw(&mut account, &mut results, coin, *amount)?;
                    results.push(Some(TempCoin {
                        asset,
                        balance: *amount,
                    }));
                }
                Command::MergeCoins { target, sources } => {
                    let asset = coin_asset(&account, &results, target)?;
                    let mut total = 0u64;
                    for source in sources {
                        if source == target || *source == CoinArg::GasCoin {
                            return Err(SubmitError::Rejected(format!(
                                "invalid merge source {:?}",
                                source
                            )));
                        }
                        if coin_asset(&account, &results, source)? != asset {
                            return Err(SubmitError::Rejected("merge across assets".to_string()));
                        }
                        total = total.saturating_add(drain(&mut account, &mut results, source)?);
                    }
                    deposit(&mut account, &mut results, target, total)?;
                    results.push(None);
                }
                Command::Swap {
                    venue,
                    direction,
                    asset_in,
                    asset_out,
                    input,
                    amount,
                    min_out,
                } => {
                    if coin_asset(&account, &results, input)? != *asset_in {
                        return Err(SubmitError::Rejected("swap input asset mismatch".to_string()));
                    }
                    let paid = drain(&mut account, &mut results, input)?;
                    if paid != *amount {
                        return Err(SubmitError::Rejected(format!(
                            "swap input holds {} but {} declared",
                            paid, amount
                        )));
                    }

                    let leg = SwapLeg {
                        venue: *venue,
                        direction: *direction,
                        asset_in: asset_in.clone(),
                        asset_out: asset_out.clone(),
                        amount: *amount,
                    };
                    let out = fill(&leg)?;
                    if out < *min_out {
                        return Err(SubmitError::Failed(format!(
                            "slippage: output {} below minimum {}",
                            out, min_out
                        )));
                    }

                    minted.push(OwnedUnit {
                        asset: asset_out.clone(),
                        unit_id: String::new(),
                        balance: out,
                    });
                    events.push(VenueEvent::Swap {
                        venue: *venue,
                        asset_in: asset_in.clone(),
                        asset_out: asset_out.clone(),
                        amount_in: *amount,
                        amount_out: out,
                    });
                    results.push(None);
                }
            }
        }

        // Unconsumed intermediate coins go back to the sender
        for leftover in results.into_iter().flatten() {
            if leftover.balance > 0 {
                minted.push(OwnedUnit {
                    asset: leftover.asset,
                    unit_id: String::new(),
                    balance: leftover.balance,
                });
            }
        }
        // Native proceeds join the gas coin, the only native coin the
        // payment path ever spends from
        for mut unit in minted {
            if unit.asset == NATIVE_COIN_ID {
                account.gas = account.gas.saturating_add(unit.balance);
                continue;
            }
            unit.unit_id = state.fresh_id();
            account.units.push(unit);
        }
        account.units.retain(|u| u.balance > 0);

        account.gas = account
            .gas
            .checked_sub(gas_needed)
            .ok_or_else(|| SubmitError::Rejected("gas coin exhausted by splits".to_string()))?;
        events.push(VenueEvent::GasCharged { amount: gas_needed });

        state.accounts.insert(tx.sender.clone(), account);
        Ok(events)
    }
}

fn coin_asset(
    account: &Account,
    results: &[Option<TempCoin>],
    coin: &CoinArg,
) -> Result<String, SubmitError> {
    match coin {
        CoinArg::GasCoin => Ok(NATIVE_COIN_ID.to_string()),
        CoinArg::Unit(id) => account
            .units
            .iter()
            .find(|u| &u.unit_id == id)
            .map(|u| u.asset.clone())
            .ok_or_else(|| SubmitError::Rejected(format!("unit {} not owned by sender", id))),
        CoinArg::Result(i) => results
            .get(*i)
            .and_then(|r| r.as_ref())
            .map(|c| c.asset.clone())
            .ok_or_else(|| SubmitError::Rejected(format!("command {} produced no coin", i))),
    }
}

fn withdraw(
    account: &mut Account,
    results: &mut [Option<TempCoin>],
    coin: &CoinArg,
    amount: u64,
) -> Result<String, SubmitError> {
    let asset = coin_asset(account, results, coin)?;
    let balance = match coin {
        CoinArg::GasCoin => &mut account.gas,
        CoinArg::Unit(id) => match account.units.iter_mut().find(|u| &u.unit_id == id) {
            Some(unit) => &mut unit.balance,
            None => return Err(SubmitError::Rejected(format!("unit {} missing", id))),
        },
        CoinArg::Result(i) => match results.get_mut(*i).and_then(|r| r.as_mut()) {
            Some(temp) => &mut temp.balance,
            None => return Err(SubmitError::Rejected(format!("result {} missing", i))),
        },
    };
    if *balance < amount {
        return Err(SubmitError::Rejected(format!(
            "cannot split {} from coin holding {}",
            amount, balance
        )));
    }
    *balance -= amount;
    Ok(asset)
}

fn drain(
    account: &mut Account,
    results: &mut [Option<TempCoin>],
    coin: &CoinArg,
) -> Result<u64, SubmitError> {
    match coin {
        CoinArg::GasCoin => Err(SubmitError::Rejected("gas coin cannot be consumed".to_string())),
        CoinArg::Unit(id) => {
            let position = account
                .units
                .iter()
                .position(|u| &u.unit_id == id)
                .ok_or_else(|| SubmitError::Rejected(format!("unit {} missing", id)))?;
            Ok(account.units.remove(position).balance)
        }
        CoinArg::Result(i) => results
            .get_mut(*i)
            .and_then(|r| r.take())
            .map(|c| c.balance)
            .ok_or_else(|| SubmitError::Rejected(format!("result {} already consumed", i))),
    }
}

fn deposit(
    account: &mut Account,
    results: &mut [Option<TempCoin>],
    coin: &CoinArg,
    amount: u64,
) -> Result<(), SubmitError> {
    let balance = match coin {
        CoinArg::GasCoin => &mut account.gas,
        CoinArg::Unit(id) => match account.units.iter_mut().find(|u| &u.unit_id == id) {
            Some(unit) => &mut unit.balance,
            None => return Err(SubmitError::Rejected(format!("unit {} missing", id))),
        },
        CoinArg::Result(i) => match results.get_mut(*i).and_then(|r| r.as_mut()) {
            Some(temp) => &mut temp.balance,
            None => return Err(SubmitError::Rejected(format!("result {} missing", i))),
        },
    };
    *balance = balance.saturating_add(amount);
    Ok(())
}

// ============================================
// VENUE
// ============================================

#[derive(Debug, Clone)]
struct MarketState {
    price: f64,
    fee: f64,
    volatility: f64,
    online: bool,
}

/// Paper-traded venue over a shared ledger
pub struct PaperVenue {
    venue: Venue,
    registry: Arc<CoinRegistry>,
    ledger: Arc<PaperLedger>,
    market: RwLock<MarketState>,
    imbalance: Option<HashMap<String, f64>>,
    failures: Mutex<VecDeque<SubmitError>>,
    imbalance_queries: AtomicUsize,
    unit_queries: AtomicUsize,
}

impl PaperVenue {
    pub fn new(
        venue: Venue,
        price: f64,
        fee: f64,
        registry: Arc<CoinRegistry>,
        ledger: Arc<PaperLedger>,
    ) -> Self {
        Self {
            venue,
            registry,
            ledger,
            market: RwLock::new(MarketState {
                price,
                fee,
                volatility: 0.0,
                online: true,
            }),
            imbalance: None,
            failures: Mutex::new(VecDeque::new()),
            imbalance_queries: AtomicUsize::new(0),
            unit_queries: AtomicUsize::new(0),
        }
    }

    /// Report fixed imbalance ratios, making this a gated venue
    pub fn with_imbalance(mut self, ratios: HashMap<String, f64>) -> Self {
        self.imbalance = Some(ratios);
        self
    }

    /// Random-walk the price by up to `volatility` (relative) per quote
    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.market.get_mut().volatility = volatility.abs();
        self
    }

    pub fn venue(&self) -> &Venue {
        &self.venue
    }

    pub async fn set_price(&self, price: f64) {
        self.market.write().await.price = price;
    }

    pub async fn set_fee(&self, fee: f64) {
        self.market.write().await.fee = fee;
    }

    pub async fn set_online(&self, online: bool) {
        self.market.write().await.online = online;
    }

    /// Fail the next submission with `err`
    pub async fn inject_failure(&self, err: SubmitError) {
        self.failures.lock().await.push_back(err);
    }

    pub fn imbalance_queries(&self) -> usize {
        self.imbalance_queries.load(Ordering::Relaxed)
    }

    pub fn unit_queries(&self) -> usize {
        self.unit_queries.load(Ordering::Relaxed)
    }

    fn fill(
        &self,
        leg: &SwapLeg,
        price: f64,
        fee: f64,
    ) -> Result<u64, SubmitError> {
        let human_in = self
            .registry
            .from_raw(&leg.asset_in, leg.amount)
            .map_err(|e| SubmitError::Rejected(e.to_string()))?;
        let rate = match leg.direction {
            Direction::AToB => price,
            Direction::BToA => 1.0 / price,
        };
        let human_out = human_in * rate * (1.0 - fee);
        self.registry
            .to_raw(&leg.asset_out, human_out)
            .map_err(|e| SubmitError::Rejected(e.to_string()))
    }
}

fn drift(volatility: f64) -> f64 {
    if volatility <= 0.0 {
        return 1.0;
    }
    1.0 + rand::thread_rng().gen_range(-volatility..=volatility)
}

#[async_trait]
impl VenueAdapter for PaperVenue {
    fn protocol(&self) -> &str {
        "paper"
    }

    async fn quote(&self, venue: &Venue) -> Result<Quote, VenueError> {
        if venue.identity() != self.venue.identity() {
            return Err(VenueError::Query(format!("unknown venue {}", venue.name)));
        }

        let mut market = self.market.write().await;
        if !market.online {
            return Err(VenueError::Unavailable(self.venue.name.clone()));
        }
        market.price *= drift(market.volatility);
        trace!("{} quoted {:.6}", self.venue.name, market.price);

        Ok(Quote {
            price: market.price,
            fee: market.fee,
        })
    }

    async fn owned_units(&self, owner: &str, asset: &str) -> Result<Vec<OwnedUnit>, VenueError> {
        self.unit_queries.fetch_add(1, Ordering::Relaxed);
        Ok(self.ledger.units(owner, asset).await)
    }

    fn build_swap(
        &self,
        venue: &Venue,
        request: &SwapRequest,
        input: CoinArg,
    ) -> Result<Vec<Command>, VenueError> {
        if venue.identity() != self.venue.identity() {
            return Err(VenueError::Build(format!("unknown venue {}", venue.name)));
        }
        if request.amount == 0 {
            return Err(VenueError::Build("zero swap amount".to_string()));
        }

        Ok(vec![Command::Swap {
            venue: venue.identity(),
            direction: request.direction,
            asset_in: venue.asset_in(request.direction).to_string(),
            asset_out: venue.asset_out(request.direction).to_string(),
            input,
            amount: request.amount,
            min_out: request.min_out,
        }])
    }

    async fn imbalance(&self, _venue: &Venue) -> Result<Option<ImbalanceSnapshot>, VenueError> {
        self.imbalance_queries.fetch_add(1, Ordering::Relaxed);
        if !self.market.read().await.online {
            return Err(VenueError::Unavailable(self.venue.name.clone()));
        }
        Ok(self.imbalance.as_ref().map(|ratios| ImbalanceSnapshot {
            ratios: ratios.clone(),
        }))
    }

    async fn submit(&self, tx: &Transaction) -> Result<Vec<VenueEvent>, SubmitError> {
        if let Some(err) = self.failures.lock().await.pop_front() {
            debug!("{}: injected failure {}", self.venue.name, err);
            return Err(err);
        }

        let foreign = tx.commands.iter().any(|c| {
            matches!(c, Command::Swap { venue, .. } if *venue != self.venue.identity())
        });
        if foreign {
            return Err(SubmitError::Rejected(format!(
                "transaction swaps outside {}",
                self.venue.name
            )));
        }

        let (price, fee) = {
            let market = self.market.read().await;
            (market.price, market.fee)
        };
        self.ledger
            .execute(tx, |leg| self.fill(leg, price, fee))
            .await
    }
}
