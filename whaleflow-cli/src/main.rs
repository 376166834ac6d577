//! WhaleFlow CLI: backtest, walk-forward, sweep and synthetic-data commands.
//!
//! Commands:
//! - `backtest`: one run over CSV bars (and optional whale events)
//! - `walk-forward`: fold-by-fold validation with a chosen warm-up mode
//! - `sweep`: parallel grid search from the config's `[sweep]` section
//! - `synth`: write a seeded synthetic market as CSV

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use whaleflow_core::MarketData;
use whaleflow_runner::{
    load_market, run_single, run_sweep, run_walk_forward, synthetic_market, write_bars_csv,
    write_whales_csv, BacktestConfig, BacktestResult, SweepOptions, SweepResult,
    SyntheticConfig, WalkForwardResult, WarmupMode,
};

#[derive(Parser)]
#[command(
    name = "whaleflow",
    about = "WhaleFlow CLI: on-chain flow + technical signal backtester"
)]
struct Cli {
    /// Log verbosity: -v info, -vv debug, -vvv trace.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Inputs shared by every command that runs the engine.
#[derive(clap::Args)]
struct DataArgs {
    /// TOML run config. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Price bars CSV: symbol,timestamp,open,high,low,close,volume.
    #[arg(long)]
    bars: PathBuf,

    /// Whale events CSV: symbol,timestamp,usd_value,counterparty_kind,entity_label,direction.
    #[arg(long)]
    whales: Option<PathBuf>,

    /// Write the full JSON report here.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest.
    Backtest {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Walk-forward validation over contiguous folds.
    WalkForward {
        #[command(flatten)]
        data: DataArgs,

        /// Number of folds (overrides the config).
        #[arg(long)]
        splits: Option<usize>,

        /// Feed this many bars before each fold as indicator history.
        #[arg(long)]
        lookback: Option<usize>,
    },
    /// Parameter sweep over the config's [sweep.grid].
    Sweep {
        #[command(flatten)]
        data: DataArgs,

        /// Worker threads (overrides the config; 0 = all cores).
        #[arg(long)]
        threads: Option<usize>,

        /// Rows to print from the ranking.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Generate a synthetic market as bars.csv + whales.csv.
    Synth {
        /// Output directory.
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,

        #[arg(long, default_value_t = 1000)]
        bars: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Comma-separated symbols.
        #[arg(long, value_delimiter = ',', default_value = "BTC,ETH,SOL")]
        symbols: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Backtest { data } => run_backtest_cmd(&data),
        Commands::WalkForward {
            data,
            splits,
            lookback,
        } => run_walk_forward_cmd(&data, splits, lookback),
        Commands::Sweep { data, threads, top } => run_sweep_cmd(&data, threads, top),
        Commands::Synth {
            out_dir,
            bars,
            seed,
            symbols,
        } => run_synth_cmd(&out_dir, bars, seed, symbols),
    }
}

fn load_inputs(args: &DataArgs) -> Result<(BacktestConfig, MarketData)> {
    let config = match &args.config {
        Some(path) => BacktestConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => BacktestConfig::default(),
    };
    let market = load_market(&args.bars, args.whales.as_deref()).context("loading market data")?;
    info!(
        symbols = market.bars.len(),
        bars = market.bar_count(),
        events = market.whale_events.len(),
        "inputs loaded"
    );
    Ok((config, market))
}

fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    println!("Report written to: {}", path.display());
    Ok(())
}

fn run_backtest_cmd(args: &DataArgs) -> Result<()> {
    let (config, market) = load_inputs(args)?;
    let result = run_single(
        &market,
        &config.strategy,
        &config.run_options(),
        &config.metrics_options(),
    )?;
    print_backtest(&result);
    write_json(args.output.as_deref(), &result)
}

fn run_walk_forward_cmd(args: &DataArgs, splits: Option<usize>, lookback: Option<usize>) -> Result<()> {
    let (mut config, market) = load_inputs(args)?;
    if splits.is_some() {
        config.walk_forward.splits = splits;
    }
    if let Some(bars) = lookback {
        config.walk_forward.warmup = WarmupMode::Lookback { bars };
    }
    let result = run_walk_forward(
        &market,
        &config.strategy,
        &config.walk_forward,
        config.backtest.initial_capital,
        &config.metrics_options(),
    )?;
    print_walk_forward(&result);
    write_json(args.output.as_deref(), &result)
}

fn run_sweep_cmd(args: &DataArgs, threads: Option<usize>, top: usize) -> Result<()> {
    let (config, market) = load_inputs(args)?;
    if config.sweep.grid.axes.is_empty() {
        bail!("the config has no [sweep.grid] axes to sweep");
    }
    let opts = SweepOptions {
        threads: threads.unwrap_or(config.sweep.threads),
        run: config.run_options(),
        metrics: config.metrics_options(),
    };
    let result = run_sweep(&market, &config.strategy, &config.sweep.grid, &opts, None)?;
    print_sweep(&result, top);
    write_json(args.output.as_deref(), &result)
}

fn run_synth_cmd(out_dir: &Path, bars: usize, seed: u64, symbols: Vec<String>) -> Result<()> {
    if symbols.is_empty() {
        bail!("at least one symbol is required");
    }
    std::fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let market = synthetic_market(&SyntheticConfig {
        symbols,
        bars_per_symbol: bars,
        seed,
        ..SyntheticConfig::default()
    });
    write_bars_csv(&out_dir.join("bars.csv"), &market)?;
    write_whales_csv(&out_dir.join("whales.csv"), &market.whale_events)?;
    println!(
        "Wrote {} bars and {} whale events to {}",
        market.bar_count(),
        market.whale_events.len(),
        out_dir.display()
    );
    Ok(())
}

// ─── Output ──────────────────────────────────────────────────────────

fn print_backtest(result: &BacktestResult) {
    let m = &result.metrics;
    println!("=== Backtest ===");
    println!("Config:        {}", &result.config_hash[..result.config_hash.len().min(12)]);
    println!("Symbols:       {}", result.symbol_count);
    println!("Bars:          {}", result.bar_count);
    println!("Signals:       {}", result.signals.len());
    println!("Trades:        {}", m.trade_count);
    println!("Missed:        {}", result.missed_entries.len());
    println!();
    println!("Initial:       ${:.2}", result.initial_capital);
    println!("Final:         ${:.2}", result.final_equity);
    println!("Total Return:  {:.2}%", m.total_return * 100.0);
    println!("Sharpe:        {}", m.sharpe);
    println!("Sortino:       {}", m.sortino);
    println!("Calmar:        {}", m.calmar);
    println!("Max Drawdown:  {:.2}%", m.max_drawdown * 100.0);
    println!("Profit Factor: {}", m.profit_factor);
    println!("Win Rate:      {}", m.win_rate);
    println!("Avg Win:       {}", m.avg_win);
    println!("Avg Loss:      {}", m.avg_loss);
}

fn print_walk_forward(result: &WalkForwardResult) {
    println!("=== Walk-Forward ({} folds, {:?}) ===", result.splits, result.warmup);
    println!(
        "{:<5} {:<22} {:<22} {:>12} {:>10} {:>7}",
        "Fold", "Start", "End", "PnL", "Sharpe", "Trades"
    );
    println!("{}", "-".repeat(83));
    for fold in &result.folds {
        println!(
            "{:<5} {:<22} {:<22} {:>12.2} {:>10} {:>7}",
            fold.fold_index,
            fold.test_start.format("%Y-%m-%d %H:%M"),
            fold.test_end.format("%Y-%m-%d %H:%M"),
            fold.pnl,
            fold.sharpe.to_string(),
            fold.trades.len()
        );
    }
    for skipped in &result.skipped {
        println!("{:<5} skipped: {}", skipped.fold_index, skipped.cause);
    }
    let s = &result.summary;
    println!();
    println!("Completed:        {} / {}", s.completed, s.completed + s.skipped);
    if let Some(r) = s.mean_return {
        println!("Mean Return:      {:.2}%", r * 100.0);
    }
    println!("Mean Sharpe:      {}", s.mean_sharpe);
    if let Some(dd) = s.mean_max_drawdown {
        println!("Mean Max DD:      {:.2}%", dd * 100.0);
    }
    println!("Total Trades:     {}", s.total_trades);
    println!("Fold Consistency: {}", s.fold_consistency);
}

fn print_sweep(result: &SweepResult, top: usize) {
    println!(
        "=== Sweep: {} combinations, {} completed, {} failed, {} cancelled ===",
        result.total,
        result.ranked.len(),
        result.failed.len(),
        result.cancelled
    );
    println!("{:<5} {:>12} {:>10} {:>7}  Params", "Rank", "PnL", "Sharpe", "Trades");
    println!("{}", "-".repeat(70));
    for (rank, run) in result.ranked.iter().take(top).enumerate() {
        println!(
            "{:<5} {:>12.2} {:>10} {:>7}  {}",
            rank + 1,
            run.total_pnl,
            run.metrics.sharpe.to_string(),
            run.metrics.trade_count,
            whaleflow_runner::sweep::describe(&run.params)
        );
    }
    for failed in &result.failed {
        println!(
            "failed #{}: {} ({})",
            failed.index,
            failed.cause,
            whaleflow_runner::sweep::describe(&failed.params)
        );
    }
}
