//! Arbiter - Multi-venue Arbitrage & Trend Agent
//!
//! Run with: cargo run -- --duration 120
//!
//! Wires the paper market described by the configuration into the
//! execution engine and runs it for the configured duration.

use arbiter::brain::{ArbitrageStrategy, Hop, TrendParams, TrendStrategy};
use arbiter::cartographer::{PaperLedger, PaperVenue, PriceSource, Venue, VenueAdapter};
use arbiter::coins::{CoinRegistry, NATIVE_COIN_ID};
use arbiter::config::{Config, ExecutionMode, VenueConfig};
use arbiter::executor::{ExecutionEngine, RunSummary, VolumeStats};
use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use console::style;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-venue arbitrage and trend agent")]
struct Cli {
    /// Path to a TOML config file (default: environment + paper market)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run duration in seconds (overrides config/env)
    #[arg(long)]
    duration: Option<u64>,

    /// Build transactions but never submit them
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" ⚖️  ARBITER - Multi-venue Arbitrage & Trend Agent").cyan().bold()
    );
    println!(
        "{}",
        style("    Cyclic Arbitrage | MA Crossover | Imbalance Gating").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            dotenvy::dotenv().ok();
            let mut config = Config::from_file(path)?.with_paper_market();
            if config.owner_address.is_empty() {
                config.owner_address = std::env::var("OWNER_ADDRESS").unwrap_or_default();
            }
            config
        }
        None => Config::from_env()?,
    };

    if let Some(duration) = cli.duration {
        config.run_duration_secs = duration;
    }
    if cli.dry_run {
        config.execution_mode = ExecutionMode::DryRun;
    }
    Ok(config)
}

/// Build the paper adapter for one configured venue
fn build_venue(
    config: &VenueConfig,
    registry: &Arc<CoinRegistry>,
    ledger: &Arc<PaperLedger>,
) -> Result<(Venue, Arc<PaperVenue>)> {
    if config.protocol != "paper" {
        return Err(eyre!(
            "venue '{}': no adapter for protocol '{}'",
            config.name,
            config.protocol
        ));
    }

    let asset_a = registry.resolve(&config.asset_a)?.canonical_id.clone();
    let asset_b = registry.resolve(&config.asset_b)?.canonical_id.clone();
    let venue = Venue::new(&config.name, &config.protocol, &config.address, &asset_a, &asset_b);

    let mut paper = PaperVenue::new(
        venue.clone(),
        config.price,
        config.fee,
        registry.clone(),
        ledger.clone(),
    )
    .with_volatility(config.volatility);

    if let Some(ratios) = &config.imbalance {
        let mut resolved = HashMap::new();
        for (asset, ratio) in ratios {
            resolved.insert(registry.resolve(asset)?.canonical_id.clone(), *ratio);
        }
        paper = paper.with_imbalance(resolved);
    }

    Ok((venue, Arc::new(paper)))
}

/// Fund gas for every signer and mint the configured holdings
async fn seed_ledger(config: &Config, registry: &CoinRegistry, ledger: &PaperLedger) -> Result<()> {
    let gas = registry.to_raw(NATIVE_COIN_ID, config.paper_gas)?;
    let signers: BTreeSet<&str> = std::iter::once(config.owner_address.as_str())
        .chain(config.venues.iter().filter_map(|v| v.signer.as_deref()))
        .collect();
    for signer in signers {
        ledger.fund_gas(signer, gas).await;
    }

    for holding in &config.holdings {
        let coin = registry.resolve(&holding.asset)?;
        let owner = holding.owner.as_deref().unwrap_or(&config.owner_address);
        for amount in &holding.units {
            let raw = registry.to_raw(&coin.canonical_id, *amount)?;
            ledger.mint(owner, &coin.canonical_id, raw).await;
        }
    }
    Ok(())
}

fn print_run_summary(summary: &RunSummary, stats: &VolumeStats, registry: &CoinRegistry) {
    println!();
    println!(
        "{}",
        style("═══ RUN SUMMARY ═══").green().bold()
    );
    println!();
    println!("   Cycles run:        {}", summary.cycles);
    println!("   Skipped cycles:    {}", summary.skipped_cycles);
    println!("   Orders emitted:    {}", summary.orders);
    println!("   Submissions:       {}", style(summary.submissions).green());
    println!("   Dry runs:          {}", summary.dry_runs);
    println!("   Rejections:        {}", style(summary.rejections).red());
    println!("   Failures:          {}", style(summary.failures).yellow());
    println!("   Gating blocks:     {}", summary.gating_blocks);
    println!("   Underfunded:       {}", summary.insufficient_balance);
    println!("   Final delay:       {:?}", summary.final_delay);

    if stats.total_swaps() > 0 {
        println!();
        println!("   Volume paid in ({} swaps):", stats.total_swaps());
        for line in stats.summary_lines(registry) {
            println!("     {}", line);
        }
        let gas = registry
            .from_raw(NATIVE_COIN_ID, stats.gas_spent())
            .unwrap_or_default();
        println!("   Gas spent:         {:.6} SUI", gas);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("arbiter=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    print_banner();

    // Load configuration
    let config = load_config(&cli)?;

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file or --config");
        return Err(e.into());
    }

    // Print configuration summary
    config.print_summary();
    println!();

    // =============================================
    // PHASE 1: THE CARTOGRAPHER
    // =============================================
    println!(
        "{}",
        style("═══ PHASE 1: THE CARTOGRAPHER ═══").blue().bold()
    );
    println!();

    let registry = Arc::new(config.registry());
    let ledger = Arc::new(PaperLedger::new());
    seed_ledger(&config, &registry, &ledger).await?;
    println!(
        "{} Seeded paper ledger ({} coins known)",
        style("✓").green(),
        registry.len()
    );

    let mut engine = ExecutionEngine::new(&config, registry.clone());
    let mut venues: HashMap<String, Venue> = HashMap::new();
    for venue_config in &config.venues {
        let (venue, paper) = build_venue(venue_config, &registry, &ledger)?;
        let adapter: Arc<dyn VenueAdapter> = paper;

        engine.register_source(PriceSource::new(venue.clone(), adapter.clone()));
        if let Some(signer) = &venue_config.signer {
            engine.register_venue(venue.clone(), adapter, Some(signer.clone()));
        }

        println!(
            "   {} {} ({}/{}, fee {:.2}%)",
            style("•").blue(),
            venue.uri(),
            registry.symbol(&venue.asset_a),
            registry.symbol(&venue.asset_b),
            venue_config.fee * 100.0
        );
        venues.insert(venue_config.name.clone(), venue);
    }
    println!(
        "{} Tracking {} venue(s)",
        style("✓").green(),
        venues.len()
    );

    // =============================================
    // PHASE 2: THE BRAIN
    // =============================================
    println!();
    println!(
        "{}",
        style("═══ PHASE 2: THE BRAIN ═══").magenta().bold()
    );
    println!();

    let amounts = config.resolve_amounts(&registry)?;
    let lookup = |name: &str| -> Result<Venue> {
        venues
            .get(name)
            .cloned()
            .ok_or_else(|| eyre!("unknown venue '{}'", name))
    };

    for chain in &config.arbitrage {
        let hops = chain
            .hops
            .iter()
            .map(|hop| -> Result<Hop> { Ok(Hop::new(lookup(&hop.venue)?, hop.direction)) })
            .collect::<Result<Vec<_>>>()?;
        let strategy = ArbitrageStrategy::new(
            &chain.name,
            hops,
            amounts.clone(),
            chain.lower_limit.unwrap_or(config.arbitrage_lower_limit),
            config.max_slippage,
            registry.clone(),
        )?;
        println!(
            "{} Arbitrage '{}': {} (limit {:.4})",
            style("✓").green(),
            chain.name,
            strategy.path(),
            strategy.lower_limit()
        );
        engine.register_strategy(Box::new(strategy))?;
    }

    for trend in &config.trend {
        let strategy = TrendStrategy::new(
            &trend.name,
            lookup(&trend.venue)?,
            TrendParams {
                short_window: trend.short_window,
                long_window: trend.long_window,
                quote_amount: trend.quote_amount,
                base_amount: trend.base_amount,
                slippage: config.max_slippage,
            },
            registry.clone(),
        )?;
        println!(
            "{} Trend '{}' on {} (MA {}/{})",
            style("✓").green(),
            trend.name,
            trend.venue,
            trend.short_window,
            trend.long_window
        );
        engine.register_strategy(Box::new(strategy))?;
    }

    // =============================================
    // PHASE 3: THE EXECUTOR
    // =============================================
    println!();
    println!(
        "{}",
        style("═══ PHASE 3: THE EXECUTOR ═══").yellow().bold()
    );
    println!();

    if config.execution_mode == ExecutionMode::DryRun {
        println!(
            "{}",
            style("🔬 DRY RUN: transactions are built and logged, never submitted").yellow()
        );
    }

    let summary = engine
        .run(Duration::from_secs(config.run_duration_secs))
        .await;
    info!("Run complete after {} cycle(s)", summary.cycles);

    print_run_summary(&summary, engine.stats(), &registry);

    println!();
    println!("   Final holdings of {}:", config.owner_address);
    for coin in registry.iter() {
        let raw = ledger.balance(&config.owner_address, &coin.canonical_id).await;
        if raw > 0 {
            let human = registry.from_raw(&coin.canonical_id, raw)?;
            println!("     {:<8} {:>20.6}", coin.symbol, human);
        }
    }
    println!();

    Ok(())
}
