//! CLI definition and dispatch.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

use crate::adapters::csv_bar_source::CsvBarSource;
use crate::adapters::csv_report::CsvReportSink;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::tcp_client::{run_session, FeedClient, SessionOutcome};
use crate::adapters::tcp_server::FeedServer;
use crate::domain::bar::TIMESTAMP_FORMAT;
use crate::domain::error::TickfeedError;
use crate::domain::ledger::{PortfolioLedger, QuantityPolicy};
use crate::domain::session::SessionEngine;
use crate::domain::strategy::{BarHistory, StrategyKind};
use crate::ports::bar_source::BarSource;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_sink::{ReportSink, Termination};

#[derive(Parser, Debug)]
#[command(name = "tickfeed", about = "Market-data replay feed and paper trading client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a dataset over TCP to connected clients
    Serve(ServeArgs),
    /// Connect to a feed server and paper-trade the stream
    Trade(TradeArgs),
    /// Summarize a dataset without serving it
    Inspect {
        #[arg(short, long)]
        data: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// INI config supplying defaults for the [server] section
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Address to listen on
    #[arg(long)]
    pub host: Option<String>,
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,
    /// CSV dataset to replay
    #[arg(short, long)]
    pub data: Option<PathBuf>,
    /// Seconds between broadcast ticks (fractional allowed)
    #[arg(short, long)]
    pub interval: Option<f64>,
}

#[derive(Args, Debug, Default)]
pub struct TradeArgs {
    /// INI config supplying defaults for the [client] section
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Feed server host
    #[arg(long)]
    pub host: Option<String>,
    /// Feed server port
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Initial cash balance
    #[arg(long)]
    pub cash: Option<f64>,
    /// Session report output path
    #[arg(short, long)]
    pub report: Option<PathBuf>,
    /// Strategy rule: close-below-open or sma-momentum
    #[arg(short, long)]
    pub strategy: Option<String>,
    /// Look-back window for sma-momentum
    #[arg(short, long)]
    pub window: Option<usize>,
    /// Units per BUY/SELL
    #[arg(short, long)]
    pub units: Option<i64>,
    /// SELL closes the whole position instead of a fixed block
    #[arg(long)]
    pub liquidate_on_sell: bool,
    /// Cap the bar history kept in memory (unbounded when absent)
    #[arg(long)]
    pub history_cap: Option<usize>,
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing();
    let result = match cli.command {
        Command::Serve(args) => run_serve(&args),
        Command::Trade(args) => run_trade(&args),
        Command::Inspect { data } => run_inspect(&data),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub dataset: PathBuf,
    pub interval_secs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub host: String,
    pub port: u16,
    pub initial_cash: f64,
    pub report: PathBuf,
    pub strategy: StrategyKind,
    pub window: usize,
    pub units_per_trade: i64,
    pub liquidate_on_sell: bool,
    pub history_cap: Option<usize>,
}

fn load_optional_config(path: Option<&PathBuf>) -> Result<Option<FileConfigAdapter>, TickfeedError> {
    match path {
        Some(p) => Ok(Some(FileConfigAdapter::from_file(p)?)),
        None => Ok(None),
    }
}

pub fn resolve_server_settings(
    args: &ServeArgs,
    config: Option<&dyn ConfigPort>,
) -> Result<ServerSettings, TickfeedError> {
    let host = args
        .host
        .clone()
        .or_else(|| config.and_then(|c| c.get_string("server", "host")))
        .unwrap_or_else(|| "127.0.0.1".to_string());

    let port = match args.port {
        Some(p) => p,
        None => {
            let raw = config.map_or(9999, |c| c.get_int("server", "port", 9999));
            u16::try_from(raw).map_err(|_| TickfeedError::ConfigInvalid {
                section: "server".into(),
                key: "port".into(),
                reason: format!("{} is out of range", raw),
            })?
        }
    };

    let dataset = args
        .data
        .clone()
        .or_else(|| {
            config
                .and_then(|c| c.get_string("server", "dataset"))
                .map(PathBuf::from)
        })
        .ok_or_else(|| TickfeedError::ConfigMissing {
            section: "server".into(),
            key: "dataset".into(),
        })?;

    let interval_secs = args
        .interval
        .unwrap_or_else(|| config.map_or(1.0, |c| c.get_double("server", "interval", 1.0)));
    if !interval_secs.is_finite() || interval_secs <= 0.0 {
        return Err(TickfeedError::ConfigInvalid {
            section: "server".into(),
            key: "interval".into(),
            reason: "must be a positive number of seconds".into(),
        });
    }

    Ok(ServerSettings {
        host,
        port,
        dataset,
        interval_secs,
    })
}

pub fn resolve_client_settings(
    args: &TradeArgs,
    config: Option<&dyn ConfigPort>,
) -> Result<ClientSettings, TickfeedError> {
    let host = args
        .host
        .clone()
        .or_else(|| config.and_then(|c| c.get_string("client", "host")))
        .unwrap_or_else(|| "127.0.0.1".to_string());

    let port = match args.port {
        Some(p) => p,
        None => {
            let raw = config.map_or(9999, |c| c.get_int("client", "port", 9999));
            u16::try_from(raw).map_err(|_| TickfeedError::ConfigInvalid {
                section: "client".into(),
                key: "port".into(),
                reason: format!("{} is out of range", raw),
            })?
        }
    };

    let initial_cash = args
        .cash
        .unwrap_or_else(|| config.map_or(100_000.0, |c| c.get_double("client", "initial_cash", 100_000.0)));
    if !initial_cash.is_finite() || initial_cash < 0.0 {
        return Err(TickfeedError::ConfigInvalid {
            section: "client".into(),
            key: "initial_cash".into(),
            reason: "must be a non-negative number".into(),
        });
    }

    let report = args
        .report
        .clone()
        .or_else(|| {
            config
                .and_then(|c| c.get_string("client", "report"))
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from("session_report.csv"));

    let strategy_name = args
        .strategy
        .clone()
        .or_else(|| config.and_then(|c| c.get_string("client", "strategy")))
        .unwrap_or_else(|| "close-below-open".to_string());
    let strategy =
        strategy_name
            .parse::<StrategyKind>()
            .map_err(|reason| TickfeedError::ConfigInvalid {
                section: "client".into(),
                key: "strategy".into(),
                reason,
            })?;

    let window = match args.window {
        Some(w) => w,
        None => {
            let raw = config.map_or(5, |c| c.get_int("client", "window", 5));
            usize::try_from(raw).map_err(|_| TickfeedError::ConfigInvalid {
                section: "client".into(),
                key: "window".into(),
                reason: format!("{} is out of range", raw),
            })?
        }
    };
    if strategy == StrategyKind::SmaMomentum && window == 0 {
        return Err(TickfeedError::ConfigInvalid {
            section: "client".into(),
            key: "window".into(),
            reason: "must be at least 1".into(),
        });
    }

    let units_per_trade = args
        .units
        .unwrap_or_else(|| config.map_or(1, |c| c.get_int("client", "units", 1)));
    if units_per_trade < 1 {
        return Err(TickfeedError::ConfigInvalid {
            section: "client".into(),
            key: "units".into(),
            reason: "must be at least 1".into(),
        });
    }

    let liquidate_on_sell = args.liquidate_on_sell
        || config.is_some_and(|c| c.get_bool("client", "liquidate_on_sell", false));

    let history_cap = args.history_cap.or_else(|| {
        config
            .and_then(|c| c.get_string("client", "history_cap"))
            .and_then(|s| s.parse().ok())
    });
    if let Some(cap) = history_cap {
        if strategy == StrategyKind::SmaMomentum && cap < window {
            return Err(TickfeedError::ConfigInvalid {
                section: "client".into(),
                key: "history_cap".into(),
                reason: format!("must be at least the window size ({})", window),
            });
        }
    }

    Ok(ClientSettings {
        host,
        port,
        initial_cash,
        report,
        strategy,
        window,
        units_per_trade,
        liquidate_on_sell,
        history_cap,
    })
}

fn run_serve(args: &ServeArgs) -> Result<(), TickfeedError> {
    let config = load_optional_config(args.config.as_ref())?;
    let settings = resolve_server_settings(args, config.as_ref().map(|c| c as &dyn ConfigPort))?;

    let source = CsvBarSource::open(&settings.dataset)?;
    let addr = format!("{}:{}", settings.host, settings.port);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let server = FeedServer::bind(&addr).await?;
        info!(
            addr = %server.local_addr()?,
            dataset = %settings.dataset.display(),
            interval = settings.interval_secs,
            "feed server listening"
        );
        tokio::select! {
            result = server.run(source, Duration::from_secs_f64(settings.interval_secs)) => {
                result.map(|_| ())
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing all connections");
                Ok(())
            }
        }
    })
}

fn run_trade(args: &TradeArgs) -> Result<(), TickfeedError> {
    let config = load_optional_config(args.config.as_ref())?;
    let settings = resolve_client_settings(args, config.as_ref().map(|c| c as &dyn ConfigPort))?;

    let history = match settings.history_cap {
        Some(cap) => BarHistory::bounded(cap),
        None => BarHistory::unbounded(),
    };
    let ledger = PortfolioLedger::new(
        settings.initial_cash,
        QuantityPolicy {
            units_per_trade: settings.units_per_trade,
            liquidate_on_sell: settings.liquidate_on_sell,
        },
    );
    let mut engine = SessionEngine::new(settings.strategy.build(settings.window), history, ledger);
    let addr = format!("{}:{}", settings.host, settings.port);

    let runtime = tokio::runtime::Runtime::new()?;
    // No report file exists until the connection is up, so a refused
    // connection leaves nothing behind.
    let mut client = runtime.block_on(FeedClient::connect(&addr))?;
    let mut sink = CsvReportSink::create(&settings.report)?;

    let outcome: Option<SessionOutcome> = runtime.block_on(async {
        let session = run_session(&mut client, &mut engine, &mut sink);
        tokio::pin!(session);
        tokio::select! {
            result = &mut session => result.map(Some),
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing session");
                Ok(None)
            }
        }
    })?;

    match outcome {
        Some(outcome) => {
            let snap = engine.final_snapshot();
            eprintln!("\n=== Session Summary ===");
            eprintln!("Strategy:        {}", engine.strategy_name());
            eprintln!("Bars processed:  {}", outcome.bars_processed);
            eprintln!("Cash:            {:.2}", snap.cash);
            eprintln!("Position:        {}", snap.position);
            eprintln!("Realized PnL:    {:.2}", snap.realized_pnl);
            eprintln!("Unrealized PnL:  {:.2}", snap.unrealized_pnl);
            eprintln!("Report written to: {}", settings.report.display());
        }
        None => {
            // User interrupt: seal the report so it is never left without
            // a trailer.
            sink.finish(&Termination::Premature("interrupted".into()))?;
        }
    }
    Ok(())
}

fn run_inspect(data: &PathBuf) -> Result<(), TickfeedError> {
    let mut source = CsvBarSource::open(data)?;

    let mut count: u64 = 0;
    let mut first = None;
    let mut last = None;
    while let Some(bar) = source.next_bar()? {
        if first.is_none() {
            first = Some(bar.timestamp);
        }
        last = Some(bar.timestamp);
        count += 1;
    }

    match (first, last) {
        (Some(first), Some(last)) => {
            println!(
                "{}: {} bars, {} to {}",
                data.display(),
                count,
                first.format(TIMESTAMP_FORMAT),
                last.format(TIMESTAMP_FORMAT)
            );
            if source.skipped() > 0 {
                eprintln!("{} rows skipped", source.skipped());
            }
            Ok(())
        }
        _ => Err(TickfeedError::NoData {
            path: data.display().to_string(),
        }),
    }
}
