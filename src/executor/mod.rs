//! Phase 3: The Executor
//!
//! This module drives the trading loop:
//! - Polling every price source (fail-fast on the first miss)
//! - Routing observations to subscribed strategies
//! - Gating, payment selection and one transaction per venue
//! - Submission, fill feedback and adaptive backoff
//!
//! Everything runs in program order on one task. No two submissions are
//! ever in flight together, so owned units cannot be double-spent.

mod backoff;
mod journal;
mod payment;
mod stats;
mod transaction;

pub use backoff::DelayController;
pub use journal::{BatchOutcome, JournalOrder, TradeLogEntry};
pub use payment::{select_units, PaymentPlan, PaymentSelector, PaymentSource};
pub use stats::{VenueVolume, VolumeStats};
pub use transaction::{CoinArg, Command, Transaction, TransactionBuilder};

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::brain::{Strategy, TradeOrder};
use crate::cartographer::{
    DataPoint, FillPoint, ImbalanceGate, PricePoint, PriceSource, SwapRequest, Venue, VenueAdapter,
    VenueEvent,
};
use crate::coins::CoinRegistry;
use crate::config::{Config, ExecutionMode};
use crate::error::TradeError;

/// A venue the engine can trade on, with the identity that signs for it
#[derive(Clone)]
struct VenueHandle {
    venue: Venue,
    adapter: Arc<dyn VenueAdapter>,
    signer: String,
}

struct RegisteredStrategy {
    strategy: Box<dyn Strategy>,
    subscriptions: HashSet<Uuid>,
}

/// What happened in one loop iteration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    /// A source produced no data; nothing else ran
    pub skipped: bool,
    pub observations: usize,
    pub orders: usize,
    /// Transactions built (one per venue touched)
    pub batches: usize,
    pub submitted: usize,
    pub dry_runs: usize,
    pub rejected: usize,
    pub failed: usize,
    pub gated: usize,
    pub insufficient: usize,
    pub fills: usize,
}

impl CycleReport {
    pub fn had_failure(&self) -> bool {
        self.failed > 0
    }
}

/// Totals over a whole run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub cycles: u64,
    pub skipped_cycles: u64,
    pub orders: u64,
    pub submissions: u64,
    pub dry_runs: u64,
    pub rejections: u64,
    pub failures: u64,
    pub gating_blocks: u64,
    pub insufficient_balance: u64,
    pub final_delay: Duration,
}

impl RunSummary {
    fn absorb(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.skipped_cycles += report.skipped as u64;
        self.orders += report.orders as u64;
        self.submissions += report.submitted as u64;
        self.dry_runs += report.dry_runs as u64;
        self.rejections += report.rejected as u64;
        self.failures += report.failed as u64;
        self.gating_blocks += report.gated as u64;
        self.insufficient_balance += report.insufficient as u64;
    }
}

/// The main execution engine
pub struct ExecutionEngine {
    mode: ExecutionMode,
    owner: String,
    gas_budget: u64,
    trade_log: Option<PathBuf>,
    registry: Arc<CoinRegistry>,
    sources: Vec<PriceSource>,
    venues: HashMap<Uuid, VenueHandle>,
    strategies: Vec<RegisteredStrategy>,
    gate: ImbalanceGate,
    delay: DelayController,
    stats: VolumeStats,
    cycle: u64,
}

impl ExecutionEngine {
    pub fn new(config: &Config, registry: Arc<CoinRegistry>) -> Self {
        Self {
            mode: config.execution_mode,
            owner: config.owner_address.clone(),
            gas_budget: config.gas_budget,
            trade_log: config
                .trade_log
                .then(|| PathBuf::from(&config.trade_log_path)),
            registry,
            sources: Vec::new(),
            venues: HashMap::new(),
            strategies: Vec::new(),
            gate: ImbalanceGate::new(
                config.imbalance_threshold,
                Duration::from_secs(config.imbalance_cache_secs),
            ),
            delay: DelayController::new(
                Duration::from_millis(config.base_delay_ms),
                Duration::from_millis(config.max_delay_ms),
                config.backoff_factor,
            ),
            stats: VolumeStats::new(),
            cycle: 0,
        }
    }

    /// Track a price source. Its venue becomes tradable, signed by the
    /// owner unless `register_venue` set another signer.
    pub fn register_source(&mut self, source: PriceSource) {
        let venue = source.venue().clone();
        self.venues
            .entry(venue.identity())
            .or_insert_with(|| VenueHandle {
                adapter: source.adapter(),
                signer: self.owner.clone(),
                venue,
            });
        self.sources.push(source);
    }

    /// Make a venue tradable with an explicit signer
    pub fn register_venue(&mut self, venue: Venue, adapter: Arc<dyn VenueAdapter>, signer: Option<String>) {
        let signer = signer.unwrap_or_else(|| self.owner.clone());
        self.venues.insert(
            venue.identity(),
            VenueHandle {
                venue,
                adapter,
                signer,
            },
        );
    }

    /// Register a strategy. Every subscription must name a registered source.
    pub fn register_strategy(&mut self, strategy: Box<dyn Strategy>) -> Result<(), TradeError> {
        let known: HashSet<Uuid> = self.sources.iter().map(|s| s.identity()).collect();
        let subscriptions: HashSet<Uuid> = strategy.subscriptions().into_iter().collect();

        if let Some(missing) = subscriptions.iter().find(|id| !known.contains(id)) {
            return Err(TradeError::UnknownSubscription {
                strategy: strategy.name().to_string(),
                identity: *missing,
            });
        }

        info!(
            "Registered strategy '{}' on {} source(s)",
            strategy.name(),
            subscriptions.len()
        );
        self.strategies.push(RegisteredStrategy {
            strategy,
            subscriptions,
        });
        Ok(())
    }

    pub fn sources(&self) -> &[PriceSource] {
        &self.sources
    }

    pub fn stats(&self) -> &VolumeStats {
        &self.stats
    }

    pub fn delay(&self) -> &DelayController {
        &self.delay
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Run cycles until `duration` has elapsed
    pub async fn run(&mut self, duration: Duration) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        info!(
            "🚀 Running {} source(s), {} strateg(ies) for {:?} in {} mode",
            self.sources.len(),
            self.strategies.len(),
            duration,
            self.mode
        );

        while started.elapsed() < duration {
            let report = self.run_cycle().await;
            summary.absorb(&report);

            let remaining = duration.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.delay.current().min(remaining)).await;
        }

        summary.final_delay = self.delay.current();
        summary
    }

    /// One iteration: poll, evaluate, submit, adjust delay
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };

        // ===== POLL =====
        let Some(points) = self.poll_all().await else {
            report.skipped = true;
            self.settle_delay(false);
            return report;
        };
        report.observations = points.len();

        // ===== EVALUATE =====
        let points: Vec<DataPoint> = points.into_iter().map(DataPoint::Price).collect();
        let orders = self.evaluate(&points);
        report.orders = orders.len();
        if orders.is_empty() {
            self.settle_delay(false);
            return report;
        }

        // ===== EXECUTE =====
        let mut fills = Vec::new();
        for (venue_id, batch) in group_by_venue(orders) {
            self.execute_batch(venue_id, batch, &mut report, &mut fills).await;
        }

        // ===== FEEDBACK =====
        report.fills = fills.len();
        self.deliver_fills(fills);

        self.settle_delay(report.had_failure());
        report
    }

    fn settle_delay(&mut self, failed: bool) {
        if failed {
            let delay = self.delay.on_failure();
            warn!("⏳ Backing off: next cycle in {:?}", delay);
        } else {
            if self.delay.is_backed_off() {
                info!("Clean cycle, delay back to {:?}", self.delay.base());
            }
            self.delay.on_clean_cycle();
        }
    }

    /// Poll every source in order. `None` as soon as one has no data.
    async fn poll_all(&mut self) -> Option<Vec<PricePoint>> {
        let mut points = Vec::with_capacity(self.sources.len());
        for source in &mut self.sources {
            match source.poll().await {
                Ok(point) => points.push(point),
                Err(e) => {
                    warn!("⚠️  Skipping cycle {}: {}", self.cycle, e);
                    return None;
                }
            }
        }
        Some(points)
    }

    /// Hand every strategy its subscribed observations for the cycle in one
    /// call. Orders are tagged with the index of the strategy that placed
    /// them; orders for venues it never declared are dropped.
    fn evaluate(&mut self, points: &[DataPoint]) -> Vec<(usize, TradeOrder)> {
        let mut orders = Vec::new();
        for (index, registered) in self.strategies.iter_mut().enumerate() {
            let subscribed: Vec<DataPoint> = points
                .iter()
                .filter(|p| registered.subscriptions.contains(&p.source()))
                .cloned()
                .collect();
            if subscribed.is_empty() {
                continue;
            }
            for order in registered.strategy.evaluate_cycle(&subscribed) {
                if registered.subscriptions.contains(&order.venue) {
                    orders.push((index, order));
                } else {
                    warn!(
                        "Dropping order from '{}' for undeclared venue {}",
                        registered.strategy.name(),
                        order.venue
                    );
                }
            }
        }
        orders
    }

    /// Each fill goes back only to the strategy whose order produced it
    fn deliver_fills(&mut self, fills: Vec<(usize, FillPoint)>) {
        let mut late = 0;
        for (index, fill) in fills {
            if let Some(registered) = self.strategies.get_mut(index) {
                late += registered.strategy.evaluate(&DataPoint::Fill(fill)).len();
            }
        }
        if late > 0 {
            debug!("Dropped {} order(s) emitted in response to fills", late);
        }
    }

    async fn execute_batch(
        &mut self,
        venue_id: Uuid,
        orders: Vec<(usize, TradeOrder)>,
        report: &mut CycleReport,
        fills: &mut Vec<(usize, FillPoint)>,
    ) {
        let Some(handle) = self.venues.get(&venue_id).cloned() else {
            warn!("No venue registered for {}, dropping {} order(s)", venue_id, orders.len());
            return;
        };
        let adapter = handle.adapter.as_ref();

        // Gate once per asset paid into the venue
        let mut blocked: HashSet<String> = HashSet::new();
        let mut cleared: HashSet<String> = HashSet::new();
        let mut admitted = Vec::with_capacity(orders.len());
        for (index, order) in orders {
            if !cleared.contains(&order.asset_in) && !blocked.contains(&order.asset_in) {
                match self.gate.check(&handle.venue, adapter, &order.asset_in).await {
                    Ok(()) => {
                        cleared.insert(order.asset_in.clone());
                    }
                    Err(e) => {
                        info!("🚧 {}", e);
                        blocked.insert(order.asset_in.clone());
                    }
                }
            }
            if blocked.contains(&order.asset_in) {
                report.gated += 1;
            } else {
                admitted.push((index, order));
            }
        }

        let mut selector = PaymentSelector::new(adapter, &self.registry, &handle.signer);
        let mut builder = TransactionBuilder::new(&handle.signer, self.gas_budget);
        let mut included = Vec::with_capacity(admitted.len());

        for (index, order) in admitted {
            let min_out = match order.min_out(&self.registry) {
                Ok(min_out) => min_out,
                Err(e) => {
                    warn!("Skipping order on {}: {}", handle.venue.name, e);
                    continue;
                }
            };

            let plan = match selector.select(&order.asset_in, order.raw_amount_in).await {
                Ok(plan) => plan,
                Err(e) => {
                    if matches!(e, TradeError::InsufficientBalance { .. }) {
                        report.insufficient += 1;
                    }
                    warn!("Skipping order on {}: {}", handle.venue.name, e);
                    continue;
                }
            };

            let mut draft = builder.clone();
            let input = plan.apply(&mut draft);
            let request = SwapRequest {
                direction: order.direction,
                amount: order.raw_amount_in,
                min_out,
            };
            match adapter.build_swap(&handle.venue, &request, input) {
                Ok(commands) => {
                    draft.extend(commands);
                    builder = draft;
                    selector.commit(&plan);
                    debug!(
                        "  {} {} {:.6} {} → ≥{} raw {}",
                        handle.venue.name,
                        order.direction,
                        order.amount_in,
                        self.registry.symbol(&order.asset_in),
                        min_out,
                        self.registry.symbol(&order.asset_out)
                    );
                    included.push((index, order));
                }
                Err(e) => warn!("Cannot build swap on {}: {}", handle.venue.name, e),
            }
        }

        if included.is_empty() {
            return;
        }
        report.batches += 1;
        let tx = builder.finish();

        let (outcome, events, failure) = match self.mode {
            ExecutionMode::DryRun => {
                info!(
                    "🔬 DRY RUN: would submit {} swap(s) in {} command(s) on {}",
                    tx.swap_count(),
                    tx.commands.len(),
                    handle.venue.name
                );
                report.dry_runs += 1;
                (BatchOutcome::DryRun, Vec::new(), None)
            }
            ExecutionMode::Live => match adapter.submit(&tx).await.map_err(TradeError::from) {
                Ok(events) => {
                    info!(
                        "✅ Executed {} swap(s) on {}",
                        tx.swap_count(),
                        handle.venue.name
                    );
                    report.submitted += 1;
                    self.stats.record(&events);
                    fills.extend(self.attribute_fills(&included, &events));
                    (BatchOutcome::Executed, events, None)
                }
                Err(e) if e.is_transient() => {
                    warn!("Submission to {} failed: {}", handle.venue.name, e);
                    report.failed += 1;
                    (BatchOutcome::Failed, Vec::new(), Some(e.to_string()))
                }
                Err(e) => {
                    error!("❌ {}: {}", handle.venue.name, e);
                    report.rejected += 1;
                    (BatchOutcome::Rejected, Vec::new(), Some(e.to_string()))
                }
            },
        };

        if let Some(path) = &self.trade_log {
            let entry = TradeLogEntry {
                timestamp: Utc::now(),
                cycle: self.cycle,
                venue: venue_id,
                venue_name: handle.venue.name.clone(),
                outcome,
                orders: included.iter().map(|(_, order)| JournalOrder::from(order)).collect(),
                commands: tx.commands.len(),
                events,
                error: failure,
            };
            if let Err(e) = entry.append_to_file(path) {
                warn!("Failed to write trade log {}: {}", path.display(), e);
            }
        }
    }

    /// Pair swap events with the included orders that produced them.
    /// Adapters emit one swap event per swap, in command order.
    fn attribute_fills(
        &self,
        included: &[(usize, TradeOrder)],
        events: &[VenueEvent],
    ) -> Vec<(usize, FillPoint)> {
        let swaps = events
            .iter()
            .filter(|e| matches!(e, VenueEvent::Swap { .. }));
        included
            .iter()
            .zip(swaps)
            .filter_map(|((index, order), event)| {
                let fill = self.fill_point(event)?;
                (fill.source == order.venue).then_some((*index, fill))
            })
            .collect()
    }

    fn fill_point(&self, event: &VenueEvent) -> Option<FillPoint> {
        let VenueEvent::Swap {
            venue,
            asset_in,
            asset_out,
            amount_in,
            amount_out,
        } = event
        else {
            return None;
        };
        Some(FillPoint {
            source: *venue,
            asset_in: asset_in.clone(),
            asset_out: asset_out.clone(),
            amount_in: self.registry.from_raw(asset_in, *amount_in).ok()?,
            amount_out: self.registry.from_raw(asset_out, *amount_out).ok()?,
            observed_at: Utc::now(),
        })
    }
}

/// Group tagged orders by venue, keeping first-seen venue order and order
/// within each venue
fn group_by_venue(orders: Vec<(usize, TradeOrder)>) -> Vec<(Uuid, Vec<(usize, TradeOrder)>)> {
    let mut groups: Vec<(Uuid, Vec<(usize, TradeOrder)>)> = Vec::new();
    for (index, order) in orders {
        let venue = order.venue;
        match groups.iter_mut().find(|(id, _)| *id == venue) {
            Some((_, batch)) => batch.push((index, order)),
            None => groups.push((venue, vec![(index, order)])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::{ArbitrageStrategy, Hop, TrendParams, TrendStrategy};
    use crate::cartographer::{Direction, PaperLedger, PaperVenue};
    use crate::coins::Coin;
    use crate::error::SubmitError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::assert_ok;

    const OWNER: &str = "0xowner";
    const X: &str = "0x1::x::X";
    const Y: &str = "0x1::y::Y";

    struct Market {
        registry: Arc<CoinRegistry>,
        ledger: Arc<PaperLedger>,
        xy: Arc<PaperVenue>,
        yx: Arc<PaperVenue>,
    }

    fn registry() -> Arc<CoinRegistry> {
        let mut registry = CoinRegistry::new();
        registry.insert(Coin::new("X", X, 6));
        registry.insert(Coin::new("Y", Y, 6));
        Arc::new(registry)
    }

    fn config(mode: ExecutionMode) -> Config {
        Config {
            execution_mode: mode,
            owner_address: OWNER.to_string(),
            base_delay_ms: 10,
            max_delay_ms: 1_000,
            backoff_factor: 10,
            gas_budget: 10_000_000,
            trade_log: false,
            ..Config::default()
        }
    }

    async fn market(xy_price: f64, yx_price: f64) -> Market {
        let registry = registry();
        let ledger = Arc::new(PaperLedger::new());
        ledger.fund_gas(OWNER, 1_000_000_000).await;
        ledger.mint(OWNER, X, 4_000_000).await;
        ledger.mint(OWNER, X, 7_000_000).await;
        ledger.mint(OWNER, Y, 25_000_000).await;

        let xy = Venue::new("XY", "paper", "0xpool_xy", X, Y);
        let yx = Venue::new("YX", "paper", "0xpool_yx", Y, X);
        Market {
            xy: Arc::new(PaperVenue::new(xy, xy_price, 0.003, registry.clone(), ledger.clone())),
            yx: Arc::new(PaperVenue::new(yx, yx_price, 0.003, registry.clone(), ledger.clone())),
            registry,
            ledger,
        }
    }

    fn engine(config: &Config, market: &Market) -> ExecutionEngine {
        let mut engine = ExecutionEngine::new(config, market.registry.clone());
        for paper in [&market.xy, &market.yx] {
            let adapter: Arc<dyn VenueAdapter> = paper.clone();
            engine.register_source(PriceSource::new(paper.venue().clone(), adapter));
        }
        engine
    }

    fn arbitrage(market: &Market) -> Box<dyn Strategy> {
        let strategy = ArbitrageStrategy::new(
            "arb",
            vec![
                Hop::new(market.xy.venue().clone(), Direction::AToB),
                Hop::new(market.yx.venue().clone(), Direction::AToB),
            ],
            HashMap::from([(X.to_string(), 10.0), (Y.to_string(), 20.0)]),
            1.0005,
            0.01,
            market.registry.clone(),
        )
        .unwrap();
        Box::new(strategy)
    }

    /// Emits a fixed set of orders on every price from its trigger venue
    /// and counts the fills it is shown
    struct Scripted {
        trigger: Uuid,
        subscriptions: Vec<Uuid>,
        orders: Vec<TradeOrder>,
        fills: Arc<AtomicUsize>,
    }

    impl Strategy for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn subscriptions(&self) -> Vec<Uuid> {
            self.subscriptions.clone()
        }

        fn evaluate(&mut self, point: &DataPoint) -> Vec<TradeOrder> {
            match point {
                DataPoint::Price(p) if p.source == self.trigger => self.orders.clone(),
                DataPoint::Fill(_) => {
                    self.fills.fetch_add(1, Ordering::Relaxed);
                    Vec::new()
                }
                _ => Vec::new(),
            }
        }
    }

    fn order(venue: &Venue, direction: Direction, amount: f64, registry: &CoinRegistry) -> TradeOrder {
        crate::brain::build_order("scripted", registry, venue, direction, amount, 1.0, 0.0, 0.5).unwrap()
    }

    #[tokio::test]
    async fn test_profitable_chain_trades_through_both_venues() {
        let market = market(2.0, 0.52).await;
        let mut engine = engine(&config(ExecutionMode::Live), &market);
        assert_ok!(engine.register_strategy(arbitrage(&market)));

        let report = engine.run_cycle().await;
        assert!(!report.skipped);
        assert_eq!(report.observations, 2);
        assert_eq!(report.orders, 2);
        assert_eq!(report.batches, 2);
        assert_eq!(report.submitted, 2);
        assert_eq!(report.fills, 2);
        assert_eq!(engine.stats().total_swaps(), 2);

        // 11 X - 10 X + 20 Y * 0.52 * 0.997
        assert_eq!(market.ledger.balance(OWNER, X).await, 11_368_800);
        assert_eq!(engine.delay().current(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_missing_observation_skips_whole_cycle() {
        let market = market(2.0, 0.52).await;
        let mut engine = engine(&config(ExecutionMode::Live), &market);
        assert_ok!(engine.register_strategy(arbitrage(&market)));

        market.xy.set_online(false).await;
        let report = engine.run_cycle().await;

        assert!(report.skipped);
        assert_eq!(report.orders, 0);
        // Polling stopped at the first miss
        assert!(engine.sources()[1].last().is_none());
        assert_eq!(market.ledger.balance(OWNER, X).await, 11_000_000);
    }

    #[tokio::test]
    async fn test_orders_for_one_venue_share_a_transaction() {
        let market = market(1.0, 1.0).await;
        let mut engine = engine(&config(ExecutionMode::Live), &market);
        let xy = market.xy.venue().clone();
        let yx = market.yx.venue().clone();
        let fills = Arc::new(AtomicUsize::new(0));

        let scripted = Scripted {
            trigger: xy.identity(),
            subscriptions: vec![xy.identity(), yx.identity()],
            orders: vec![
                order(&xy, Direction::AToB, 3.0, &market.registry),
                order(&yx, Direction::AToB, 2.0, &market.registry),
                order(&xy, Direction::AToB, 5.0, &market.registry),
            ],
            fills: fills.clone(),
        };
        assert_ok!(engine.register_strategy(Box::new(scripted)));

        let report = engine.run_cycle().await;
        assert_eq!(report.orders, 3);
        assert_eq!(report.batches, 2);
        assert_eq!(report.submitted, 2);
        assert_eq!(engine.stats().venue(xy.identity()).map(|v| v.swaps), Some(2));
        assert_eq!(engine.stats().venue(yx.identity()).map(|v| v.swaps), Some(1));
        assert_eq!(fills.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_fills_return_only_to_the_ordering_strategy() {
        // Reverse chain buys X on XY, the venue the trend follows
        let market = market(2.0, 0.49).await;
        let mut engine = engine(&config(ExecutionMode::Live), &market);
        assert_ok!(engine.register_strategy(arbitrage(&market)));
        let trend = TrendStrategy::new(
            "trend",
            market.xy.venue().clone(),
            TrendParams {
                short_window: 1,
                long_window: 2,
                quote_amount: 5.0,
                base_amount: 1.0,
                slippage: 0.01,
            },
            market.registry.clone(),
        )
        .unwrap();
        assert_ok!(engine.register_strategy(Box::new(trend)));

        let report = engine.run_cycle().await;
        assert_eq!(report.orders, 2);
        assert_eq!(report.fills, 2);

        // Chain back inside the band from here on
        market.yx.set_price(0.5).await;
        let report = engine.run_cycle().await;
        assert_eq!(report.orders, 0);

        // Upward cross: the arbitrage fill on XY must not count as a trend position
        market.xy.set_price(2.2).await;
        market.yx.set_price(1.0 / 2.2).await;
        let report = engine.run_cycle().await;
        assert_eq!(report.orders, 1);
        assert_eq!(report.submitted, 1);

        // Downward cross sells what the trend itself bought
        market.xy.set_price(1.8).await;
        market.yx.set_price(1.0 / 1.8).await;
        let y_before = market.ledger.balance(OWNER, Y).await;
        let report = engine.run_cycle().await;
        assert_eq!(report.orders, 1);
        assert_eq!(report.submitted, 1);
        assert!(market.ledger.balance(OWNER, Y).await > y_before);
    }

    #[tokio::test]
    async fn test_gated_asset_is_not_traded() {
        let registry = registry();
        let ledger = Arc::new(PaperLedger::new());
        ledger.fund_gas(OWNER, 1_000_000_000).await;
        ledger.mint(OWNER, X, 50_000_000).await;
        ledger.mint(OWNER, Y, 50_000_000).await;

        let venue = Venue::new("XY", "paper", "0xpool_xy", X, Y);
        let paper = Arc::new(
            PaperVenue::new(venue.clone(), 1.0, 0.0, registry.clone(), ledger.clone())
                .with_imbalance(HashMap::from([(X.to_string(), 1.5), (Y.to_string(), 0.9)])),
        );
        let adapter: Arc<dyn VenueAdapter> = paper.clone();

        let mut engine = ExecutionEngine::new(&config(ExecutionMode::Live), registry.clone());
        engine.register_source(PriceSource::new(venue.clone(), adapter));
        let scripted = Scripted {
            trigger: venue.identity(),
            subscriptions: vec![venue.identity()],
            orders: vec![
                order(&venue, Direction::AToB, 1.0, &registry),
                order(&venue, Direction::AToB, 2.0, &registry),
                order(&venue, Direction::BToA, 3.0, &registry),
            ],
            fills: Arc::new(AtomicUsize::new(0)),
        };
        assert_ok!(engine.register_strategy(Box::new(scripted)));

        let report = engine.run_cycle().await;
        assert_eq!(report.gated, 2);
        assert_eq!(report.submitted, 1);
        assert_eq!(engine.stats().total_swaps(), 1);
        assert_eq!(ledger.balance(OWNER, X).await, 53_000_000);

        // Snapshot reused while fresh
        engine.run_cycle().await;
        assert_eq!(paper.imbalance_queries(), 1);
    }

    #[tokio::test]
    async fn test_rejection_does_not_back_off_but_failure_does() {
        let market = market(1.0, 1.0).await;
        let mut engine = engine(&config(ExecutionMode::Live), &market);
        let xy = market.xy.venue().clone();
        let scripted = Scripted {
            trigger: xy.identity(),
            subscriptions: vec![xy.identity()],
            orders: vec![order(&xy, Direction::AToB, 1.0, &market.registry)],
            fills: Arc::new(AtomicUsize::new(0)),
        };
        assert_ok!(engine.register_strategy(Box::new(scripted)));

        market
            .xy
            .inject_failure(SubmitError::Rejected("gas budget too low".into()))
            .await;
        let report = engine.run_cycle().await;
        assert_eq!(report.rejected, 1);
        assert_eq!(engine.delay().current(), Duration::from_millis(10));

        market.xy.inject_failure(SubmitError::Failed("timeout".into())).await;
        let report = engine.run_cycle().await;
        assert_eq!(report.failed, 1);
        assert_eq!(engine.delay().current(), Duration::from_millis(100));

        for _ in 0..3 {
            market.xy.inject_failure(SubmitError::Failed("timeout".into())).await;
            engine.run_cycle().await;
            assert!(engine.delay().current() <= Duration::from_millis(1_000));
        }
        assert_eq!(engine.delay().current(), Duration::from_millis(1_000));

        let report = engine.run_cycle().await;
        assert_eq!(report.submitted, 1);
        assert_eq!(engine.delay().current(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_underfunded_order_is_skipped() {
        let market = market(1.0, 1.0).await;
        let mut engine = engine(&config(ExecutionMode::Live), &market);
        let xy = market.xy.venue().clone();
        let scripted = Scripted {
            trigger: xy.identity(),
            subscriptions: vec![xy.identity()],
            orders: vec![
                order(&xy, Direction::AToB, 500.0, &market.registry),
                order(&xy, Direction::AToB, 2.0, &market.registry),
            ],
            fills: Arc::new(AtomicUsize::new(0)),
        };
        assert_ok!(engine.register_strategy(Box::new(scripted)));

        let report = engine.run_cycle().await;
        assert_eq!(report.insufficient, 1);
        assert_eq!(report.submitted, 1);
        assert_eq!(engine.stats().total_swaps(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_builds_but_never_submits() {
        let market = market(2.0, 0.52).await;
        let path = std::env::temp_dir()
            .join(format!("arbiter-engine-{}", Uuid::new_v4()))
            .join("trades.jsonl");
        let config = Config {
            trade_log: true,
            trade_log_path: path.display().to_string(),
            ..config(ExecutionMode::DryRun)
        };
        let mut engine = engine(&config, &market);
        assert_ok!(engine.register_strategy(arbitrage(&market)));

        let report = engine.run_cycle().await;
        assert_eq!(report.batches, 2);
        assert_eq!(report.dry_runs, 2);
        assert_eq!(report.submitted, 0);
        assert_eq!(engine.stats().total_swaps(), 0);
        assert_eq!(market.ledger.balance(OWNER, X).await, 11_000_000);

        let journal = std::fs::read_to_string(&path).unwrap();
        assert_eq!(journal.lines().count(), 2);
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).unwrap();
        }
    }

    #[tokio::test]
    async fn test_unknown_subscription_is_rejected() {
        let market = market(1.0, 1.0).await;
        let mut engine = ExecutionEngine::new(&config(ExecutionMode::Live), market.registry.clone());
        let adapter: Arc<dyn VenueAdapter> = market.xy.clone();
        engine.register_source(PriceSource::new(market.xy.venue().clone(), adapter));

        let err = engine.register_strategy(arbitrage(&market)).unwrap_err();
        assert!(matches!(
            err,
            TradeError::UnknownSubscription { identity, .. } if identity == market.yx.venue().identity()
        ));
    }

    #[tokio::test]
    async fn test_per_venue_signer() {
        let market = market(1.0, 1.0).await;
        market.ledger.fund_gas("0xdesk", 1_000_000_000).await;
        market.ledger.mint("0xdesk", X, 9_000_000).await;

        let mut engine = engine(&config(ExecutionMode::Live), &market);
        let xy = market.xy.venue().clone();
        let adapter: Arc<dyn VenueAdapter> = market.xy.clone();
        engine.register_venue(xy.clone(), adapter, Some("0xdesk".to_string()));
        let scripted = Scripted {
            trigger: xy.identity(),
            subscriptions: vec![xy.identity()],
            orders: vec![order(&xy, Direction::AToB, 4.0, &market.registry)],
            fills: Arc::new(AtomicUsize::new(0)),
        };
        assert_ok!(engine.register_strategy(Box::new(scripted)));

        let report = engine.run_cycle().await;
        assert_eq!(report.submitted, 1);
        assert_eq!(market.ledger.balance("0xdesk", X).await, 5_000_000);
        assert_eq!(market.ledger.balance(OWNER, X).await, 11_000_000);
    }

    #[tokio::test]
    async fn test_run_stops_after_duration() {
        let market = market(2.0, 0.52).await;
        let mut engine = engine(&config(ExecutionMode::DryRun), &market);
        assert_ok!(engine.register_strategy(arbitrage(&market)));

        let summary = engine.run(Duration::from_millis(50)).await;
        assert!(summary.cycles >= 1);
        assert_eq!(summary.submissions, 0);
        // One full chain per cycle, decided on the cycle's complete rates
        assert_eq!(summary.orders, summary.cycles * 2);
        assert_eq!(summary.dry_runs, summary.cycles * 2);
        assert_eq!(summary.final_delay, Duration::from_millis(10));

        let summary = engine.run(Duration::ZERO).await;
        assert_eq!(summary.cycles, 0);
    }
}
