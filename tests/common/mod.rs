#![allow(dead_code)]

use chrono::NaiveDateTime;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;

use tickfeed::adapters::csv_bar_source::CsvBarSource;
use tickfeed::adapters::tcp_server::FeedServer;
use tickfeed::domain::bar::{Bar, TIMESTAMP_FORMAT};
use tickfeed::domain::error::TickfeedError;
use tickfeed::domain::ledger::{PortfolioLedger, QuantityPolicy};
use tickfeed::domain::session::SessionEngine;
use tickfeed::domain::strategy::{BarHistory, CloseBelowOpen};

pub const DATASET_HEADER: &str = "timestamp,open,high,low,close,volume\n";

/// The three-bar scenario: BUY at 9, SELL at 8, SELL blocked at 6.
pub const THREE_BAR_ROWS: &str = "2024-01-15 09:30:00,10.0,10.5,8.5,9.0,1000\n\
     2024-01-15 09:31:00,8.0,8.5,7.5,8.0,2000\n\
     2024-01-15 09:32:00,5.0,7.0,4.5,6.0,1500\n";

pub fn make_bar(minute: u32, open: f64, close: f64) -> Bar {
    let ts = format!("2024-01-15 09:{:02}:00", minute);
    Bar {
        timestamp: NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).unwrap(),
        open,
        high: open.max(close) + 1.0,
        low: open.min(close) - 1.0,
        close,
        volume: 1000,
    }
}

pub fn dataset_file(rows: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}{}", DATASET_HEADER, rows).unwrap();
    file
}

pub fn baseline_engine(initial_cash: f64) -> SessionEngine {
    SessionEngine::new(
        Box::new(CloseBelowOpen),
        BarHistory::unbounded(),
        PortfolioLedger::new(initial_cash, QuantityPolicy::default()),
    )
}

/// Bind a replay server on an ephemeral port and start it over the given
/// dataset rows. Returns the address to connect to and the server handle.
pub async fn spawn_server(
    rows: &str,
    tick: Duration,
) -> (
    String,
    NamedTempFile,
    JoinHandle<Result<u64, TickfeedError>>,
) {
    let file = dataset_file(rows);
    let source = CsvBarSource::open(file.path()).unwrap();
    let server = FeedServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let handle = tokio::spawn(server.run(source, tick));
    (addr, file, handle)
}
