//! Bracket Monitor Binary
//!
//! Places and watches take-profit / stop-loss pairs, cancelling the survivor
//! once either side fills.
//!
//! # Usage
//!
//! ```bash
//! bracket-monitor orders
//! bracket-monitor bracket --symbol AAPL --take-profit 510 --stop-loss 495
//! bracket-monitor watch --symbol AAPL --take-profit-id A --stop-id B --qty 10 --direction long
//! bracket-monitor --simulate bracket --symbol AAPL --take-profit 510 --stop-loss 495 \
//!     --qty 10 --entry-price 500 --sim-fill take-profit --interval-secs 1
//! ```
//!
//! # Environment Variables
//!
//! - `ALPACA_KEY` / `ALPACA_SECRET`: credentials when the config file has none
//! - `RUST_LOG`: overrides `observability.logging.level`
//!
//! Exit code is 2 when a sibling cancel could not be confirmed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bracket_monitor::application::ports::OrderGateway;
use bracket_monitor::application::services::{
    MonitorOptions, SessionEnd, SessionSummary, start_bracket_monitor,
};
use bracket_monitor::application::use_cases::{PlaceBracketRequest, PlaceBracketUseCase};
use bracket_monitor::config::{Config, RunMode, load_config, validate_config, validate_startup};
use bracket_monitor::domain::bracket::{
    Bracket, BracketLeg, PositionDirection, ResolutionReport,
};
use bracket_monitor::domain::order::{
    OrderKind, OrderSide, OrderSnapshot, OrderStatus, PositionSnapshot,
};
use bracket_monitor::domain::shared::{BracketId, OrderId, Symbol};
use bracket_monitor::infrastructure::broker::{AlpacaOrderGateway, InMemoryOrderGateway};
use bracket_monitor::observability::{MetricsConfig, init_metrics};
use bracket_monitor::telemetry::{LogFormat, init_tracing};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

/// Exit code when a resolved bracket left an unconfirmed sibling cancel.
const CANCELLATION_FAILED_EXIT: u8 = 2;

#[derive(Parser)]
#[command(
    name = "bracket-monitor",
    version,
    about = "Place and watch take-profit/stop-loss pairs with auto-cancel"
)]
struct Cli {
    /// Path to a YAML config file. Defaults to ./bracket-monitor.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seconds between polls.
    #[arg(long, global = true)]
    interval_secs: Option<u64>,

    /// Polls before unresolved brackets expire.
    #[arg(long, global = true)]
    max_ticks: Option<u64>,

    /// Trade against the live Alpaca endpoint.
    #[arg(long, global = true, default_value_t = false, conflicts_with = "simulate")]
    live: bool,

    /// Use the in-memory simulated gateway instead of Alpaca.
    #[arg(long, global = true, default_value_t = false)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every order the gateway reports.
    Orders,
    /// Print open positions.
    Positions,
    /// Cancel one order.
    Cancel {
        /// Gateway order id.
        order_id: String,
    },
    /// Place both protective orders for an open position, then monitor them.
    Bracket(BracketArgs),
    /// Monitor an already placed take-profit/stop pair.
    Watch(WatchArgs),
}

#[derive(Args)]
struct BracketArgs {
    /// Instrument symbol.
    #[arg(long)]
    symbol: String,

    /// Take-profit limit price.
    #[arg(long)]
    take_profit: Decimal,

    /// Stop-loss trigger price.
    #[arg(long)]
    stop_loss: Decimal,

    /// Limit price once the stop triggers (stop-limit instead of stop).
    #[arg(long)]
    stop_limit: Option<Decimal>,

    /// Quantity to protect. Defaults to the open position size.
    #[arg(long)]
    qty: Option<Decimal>,

    /// Entry price for P&L estimates. Defaults to the position's average price.
    #[arg(long)]
    entry_price: Option<Decimal>,

    /// Order that opened the position.
    #[arg(long)]
    entry_order_id: Option<String>,

    #[command(flatten)]
    sim: SimulationArgs,
}

#[derive(Args)]
struct WatchArgs {
    /// Instrument symbol.
    #[arg(long)]
    symbol: String,

    /// Take-profit order id.
    #[arg(long)]
    take_profit_id: String,

    /// Stop-loss order id.
    #[arg(long)]
    stop_id: String,

    /// Position quantity.
    #[arg(long)]
    qty: Decimal,

    /// Position direction.
    #[arg(long, value_enum)]
    direction: DirectionArg,

    /// Entry price for P&L estimates.
    #[arg(long)]
    entry_price: Option<Decimal>,

    /// Take-profit price, used when the gateway reports no fill price.
    #[arg(long, requires = "stop_loss")]
    take_profit: Option<Decimal>,

    /// Stop-loss price, used when the gateway reports no fill price.
    #[arg(long, requires = "take_profit")]
    stop_loss: Option<Decimal>,

    #[command(flatten)]
    sim: SimulationArgs,
}

/// Scripted market for `--simulate`.
#[derive(Args)]
struct SimulationArgs {
    /// Which leg the simulated market fills.
    #[arg(long, value_enum)]
    sim_fill: Option<SimFill>,

    /// Poll on which the simulated fill becomes visible.
    #[arg(long, default_value_t = 3)]
    sim_fill_after: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Long,
    Short,
}

impl From<DirectionArg> for PositionDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Long => Self::Long,
            DirectionArg::Short => Self::Short,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SimFill {
    TakeProfit,
    StopLoss,
    Both,
}

/// Gateway handles for the selected mode.
struct Gateways {
    gateway: Arc<dyn OrderGateway>,
    simulator: Option<Arc<InMemoryOrderGateway>>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    load_dotenv();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("loading configuration")?;
    apply_overrides(&mut config, &cli)?;

    let format: LogFormat = config.observability.logging.format.parse()?;
    init_tracing(&config.observability.logging.level, format)?;

    if let Some(port) = config.observability.metrics_port {
        init_metrics(&MetricsConfig::with_port(port)).context("starting metrics exporter")?;
    }

    let mode = run_mode(&cli, &config)?;
    let validation = validate_startup(&config, mode)?;
    for warning in &validation.warnings {
        tracing::warn!(%warning, "Startup check");
    }
    tracing::info!(
        %mode,
        interval_secs = config.monitor.interval_secs,
        max_ticks = config.monitor.max_ticks,
        "Bracket monitor starting"
    );

    let gateways = create_gateways(&config, mode)?;
    let options = config.monitor.to_options();

    match cli.command {
        Commands::Orders => print_orders(gateways.gateway.as_ref()).await?,
        Commands::Positions => print_positions(gateways.gateway.as_ref()).await?,
        Commands::Cancel { order_id } => {
            let order_id = OrderId::new(order_id);
            gateways
                .gateway
                .cancel_order(&order_id)
                .await
                .with_context(|| format!("cancelling {order_id}"))?;
            println!("cancel requested for {order_id}");
        }
        Commands::Bracket(args) => return place_and_monitor(&gateways, args, options).await,
        Commands::Watch(args) => return watch(&gateways, args, options).await,
    }
    Ok(ExitCode::SUCCESS)
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(interval) = cli.interval_secs {
        config.monitor.interval_secs = interval;
        // A file timeout tuned for a longer interval would fail validation.
        if config
            .monitor
            .request_timeout_secs
            .is_some_and(|timeout| timeout >= interval)
        {
            config.monitor.request_timeout_secs = None;
        }
    }
    if let Some(max_ticks) = cli.max_ticks {
        config.monitor.max_ticks = max_ticks;
    }
    if cli.live {
        config.broker.environment = "LIVE".to_string();
    }
    validate_config(config).context("invalid command-line overrides")?;
    Ok(())
}

fn run_mode(cli: &Cli, config: &Config) -> Result<RunMode> {
    if cli.simulate {
        return Ok(RunMode::Simulate);
    }
    let environment = config.broker.trading_environment()?;
    Ok(if environment.is_live() {
        RunMode::Live
    } else {
        RunMode::Paper
    })
}

fn create_gateways(config: &Config, mode: RunMode) -> Result<Gateways> {
    if mode == RunMode::Simulate {
        let simulator = Arc::new(InMemoryOrderGateway::new());
        return Ok(Gateways {
            gateway: Arc::clone(&simulator) as Arc<dyn OrderGateway>,
            simulator: Some(simulator),
        });
    }
    let alpaca = AlpacaOrderGateway::new(&config.broker.to_alpaca_config()?)
        .context("creating Alpaca gateway")?;
    Ok(Gateways {
        gateway: Arc::new(alpaca),
        simulator: None,
    })
}

async fn print_orders(gateway: &dyn OrderGateway) -> Result<()> {
    let orders = gateway.list_orders().await.context("listing orders")?;
    if orders.is_empty() {
        println!("no orders");
    }
    for order in orders {
        println!(
            "{:<38} {:<6} {:<4} {:<10} {:>8} {:<9} limit={} stop={} filled={}",
            order.order_id,
            order.symbol,
            order.side,
            order.kind,
            order.quantity,
            order.status,
            display_price(order.limit_price),
            display_price(order.stop_price),
            display_price(order.filled_price),
        );
    }
    Ok(())
}

async fn print_positions(gateway: &dyn OrderGateway) -> Result<()> {
    let positions = gateway.list_positions().await.context("listing positions")?;
    if positions.is_empty() {
        println!("no open positions");
    }
    for position in positions {
        println!(
            "{:<6} qty={:>8} avg={}",
            position.symbol, position.net_quantity, position.avg_price
        );
    }
    Ok(())
}

async fn place_and_monitor(
    gateways: &Gateways,
    args: BracketArgs,
    options: MonitorOptions,
) -> Result<ExitCode> {
    let symbol = Symbol::new(&args.symbol);
    if let Some(simulator) = &gateways.simulator {
        seed_simulated_position(simulator, &symbol, &args)?;
    }

    let mut request = PlaceBracketRequest::new(symbol, args.take_profit, args.stop_loss);
    if let Some(limit) = args.stop_limit {
        request = request.with_stop_limit(limit);
    }
    if let Some(qty) = args.qty {
        request.quantity = Some(qty);
    }
    if let Some(price) = args.entry_price {
        request = request.with_entry_price(price);
    }
    if let Some(order_id) = args.entry_order_id {
        request = request.with_entry_order_id(order_id);
    }

    let use_case = PlaceBracketUseCase::new(Arc::clone(&gateways.gateway));
    let bracket = match use_case.execute(request).await {
        Ok(bracket) => bracket,
        Err(e) => {
            if let Some(orphan) = e.orphan_order_id() {
                tracing::error!(order_id = %orphan, "Take-profit order left live without a stop");
                bail!("bracket placement failed, take-profit order {orphan} is live and unprotected: {e}");
            }
            bail!("bracket placement failed: {e}");
        }
    };
    println!(
        "bracket {} placed: take-profit {} / stop {}",
        bracket.id(),
        bracket.protective_order_id(),
        bracket.stop_order_id()
    );

    if let Some(simulator) = &gateways.simulator {
        script_simulated_fill(simulator, &bracket, args.sim.sim_fill, args.sim.sim_fill_after);
    }
    monitor(gateways, bracket, options).await
}

async fn watch(gateways: &Gateways, args: WatchArgs, options: MonitorOptions) -> Result<ExitCode> {
    let symbol = Symbol::new(&args.symbol);
    let direction = PositionDirection::from(args.direction);

    let mut protective = BracketLeg::new(args.take_profit_id.as_str());
    let mut stop = BracketLeg::new(args.stop_id.as_str());
    if let (Some(take_profit), Some(stop_loss)) = (args.take_profit, args.stop_loss) {
        protective = protective.at(take_profit);
        stop = stop.at(stop_loss);
    }

    let mut bracket = Bracket::new(
        BracketId::generate(),
        symbol,
        direction,
        args.qty,
        protective,
        stop,
    )?;
    if let Some(price) = args.entry_price {
        bracket = bracket.with_entry_price(price);
    }

    if let Some(simulator) = &gateways.simulator {
        seed_simulated_legs(simulator, &bracket);
        script_simulated_fill(simulator, &bracket, args.sim.sim_fill, args.sim.sim_fill_after);
    }
    monitor(gateways, bracket, options).await
}

async fn monitor(gateways: &Gateways, bracket: Bracket, options: MonitorOptions) -> Result<ExitCode> {
    let handle = start_bracket_monitor(Arc::clone(&gateways.gateway), bracket, options)?;
    handle.on_resolved(print_report);

    let shutdown = handle.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping monitor; orders stay live");
            shutdown.cancel();
        }
    });

    let summary = handle.wait().await?;
    print_summary(&summary);

    if summary.any_cancellation_failed() {
        return Ok(ExitCode::from(CANCELLATION_FAILED_EXIT));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &ResolutionReport) {
    let outcome = report.outcome.as_ref().map_or_else(
        || "n/a".to_string(),
        |o| format!("exit {} pnl {}", o.exit_price, o.pnl),
    );
    println!(
        "{} {} -> {} ({}) tick {} outcome: {}",
        report.bracket_id, report.symbol, report.state, report.reason, report.ticks, outcome
    );
    if report.cancellation_failed {
        println!(
            "WARNING: order {} may still be live: {}",
            report
                .cancelled_order_id
                .as_ref()
                .map_or_else(|| "?".to_string(), ToString::to_string),
            report.cancellation_error.as_deref().unwrap_or("cancel not confirmed")
        );
    }
}

fn print_summary(summary: &SessionSummary) {
    match summary.end {
        SessionEnd::AllResolved => {
            println!("session finished after {} ticks", summary.ticks);
        }
        SessionEnd::Stopped => {
            println!(
                "session stopped after {} ticks; {} bracket(s) left unmonitored, orders untouched",
                summary.ticks,
                summary.unresolved.len()
            );
        }
    }
}

fn display_price(price: Option<Decimal>) -> String {
    price.map_or_else(|| "-".to_string(), |p| p.to_string())
}

fn seed_simulated_position(
    simulator: &InMemoryOrderGateway,
    symbol: &Symbol,
    args: &BracketArgs,
) -> Result<()> {
    let Some(qty) = args.qty else {
        bail!("--simulate needs --qty to open a simulated position");
    };
    let direction = if args.take_profit > args.stop_loss {
        PositionDirection::Long
    } else {
        PositionDirection::Short
    };
    let avg_price = args
        .entry_price
        .unwrap_or((args.take_profit + args.stop_loss) / Decimal::TWO);
    let net_quantity = match direction {
        PositionDirection::Long => qty,
        PositionDirection::Short => -qty,
    };
    simulator.add_position(PositionSnapshot {
        symbol: symbol.clone(),
        net_quantity,
        avg_price,
    });
    Ok(())
}

fn seed_simulated_legs(simulator: &InMemoryOrderGateway, bracket: &Bracket) {
    let exit_side: OrderSide = bracket.direction().exit_side();
    let mut take_profit = OrderSnapshot::new(
        bracket.protective_order_id().clone(),
        bracket.symbol().clone(),
        exit_side,
        OrderKind::Limit,
        bracket.quantity(),
        OrderStatus::Open,
    );
    if let Some(price) = bracket.protective().price {
        take_profit = take_profit.with_limit_price(price);
    }
    let mut stop = OrderSnapshot::new(
        bracket.stop_order_id().clone(),
        bracket.symbol().clone(),
        exit_side,
        OrderKind::Stop,
        bracket.quantity(),
        OrderStatus::Open,
    );
    if let Some(price) = bracket.stop().price {
        stop = stop.with_stop_price(price);
    }
    simulator.insert_order(take_profit);
    simulator.insert_order(stop);
}

fn script_simulated_fill(
    simulator: &InMemoryOrderGateway,
    bracket: &Bracket,
    fill: Option<SimFill>,
    after: u64,
) {
    let Some(fill) = fill else {
        return;
    };
    let legs = match fill {
        SimFill::TakeProfit => vec![bracket.protective()],
        SimFill::StopLoss => vec![bracket.stop()],
        SimFill::Both => vec![bracket.protective(), bracket.stop()],
    };
    for leg in legs {
        tracing::info!(order_id = %leg.order_id, on_poll = after, "Scripting simulated fill");
        simulator.schedule_status(&leg.order_id, after, OrderStatus::Filled, leg.price);
    }
}
