//! Feed server/client integration tests over localhost.
//!
//! Tests cover:
//! - The documented three-bar scenario end to end (BUY, SELL, blocked SELL)
//! - Broadcast fan-out: every connected peer sees the same bars in order
//! - Early disconnect: a dropped peer gets a premature report, others finish
//! - Transport vs clean termination, decode-failure tolerance and threshold
//! - Replay idempotence of the session report

mod common;

use common::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use tickfeed::adapters::csv_bar_source::CsvBarSource;
use tickfeed::adapters::csv_report::CsvReportSink;
use tickfeed::adapters::tcp_client::{run_session, FeedClient, FeedEvent, SessionState};
use tickfeed::adapters::wire::{encode_line, FeedMessage};
use tickfeed::domain::bar::Bar;
use tickfeed::domain::error::TickfeedError;
use tickfeed::domain::session::ReportRow;
use tickfeed::ports::bar_source::BarSource;
use tickfeed::ports::report_sink::{ReportSink, Termination};

mod end_to_end {
    use super::*;

    #[tokio::test]
    async fn three_bar_scenario_over_the_wire() {
        let (addr, _file, server) = spawn_server(THREE_BAR_ROWS, Duration::from_millis(10)).await;

        let dir = TempDir::new().unwrap();
        let report_path = dir.path().join("report.csv");
        let mut engine = baseline_engine(100.0);
        let mut sink = CsvReportSink::create(&report_path).unwrap();

        let mut client = FeedClient::connect(&addr).await.unwrap();
        let outcome = run_session(&mut client, &mut engine, &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.bars_processed, 3);
        assert_eq!(client.state(), SessionState::Closed);

        let snap = engine.final_snapshot();
        assert!((snap.cash - 99.0).abs() < 1e-9);
        assert_eq!(snap.position, 0);
        assert!((snap.realized_pnl - (-1.0)).abs() < 1e-9);

        let report = fs::read_to_string(&report_path).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].contains(",BUY,9.00,91.00,1,"));
        assert!(lines[2].contains(",SELL,8.00,99.00,0,-1.00,"));
        assert!(lines[3].contains(",HOLD,6.00,99.00,0,-1.00,"));
        assert_eq!(lines[4], "#complete");

        assert_eq!(server.await.unwrap().unwrap(), 3);
    }

    #[tokio::test]
    async fn bars_arrive_in_dataset_order_without_duplication() {
        let rows = (0..8)
            .map(|i| format!("2024-01-15 09:{:02}:00,10.0,11.0,9.0,{}.0,100\n", 30 + i, 20 + i))
            .collect::<String>();
        let (addr, _file, server) = spawn_server(&rows, Duration::from_millis(5)).await;

        let mut client = FeedClient::connect(&addr).await.unwrap();
        let mut closes = Vec::new();
        loop {
            match client.receive().await.unwrap() {
                FeedEvent::Bar(bar) => closes.push(bar.close),
                FeedEvent::EndOfStream => break,
            }
        }

        let expected: Vec<f64> = (0..8).map(|i| (20 + i) as f64).collect();
        assert_eq!(closes, expected);
        assert_eq!(server.await.unwrap().unwrap(), 8);
    }
}

mod fan_out {
    use super::*;

    #[tokio::test]
    async fn all_peers_see_the_same_stream() {
        let (addr, _file, server) = spawn_server(THREE_BAR_ROWS, Duration::from_millis(50)).await;

        let mut alice = FeedClient::connect(&addr).await.unwrap();
        let mut bob = FeedClient::connect(&addr).await.unwrap();

        async fn collect(client: &mut FeedClient) -> Vec<Bar> {
            let mut bars = Vec::new();
            loop {
                match client.receive().await.unwrap() {
                    FeedEvent::Bar(bar) => bars.push(bar),
                    FeedEvent::EndOfStream => return bars,
                }
            }
        }

        let (a, b) = tokio::join!(collect(&mut alice), collect(&mut bob));
        assert_eq!(a.len(), 3);
        assert_eq!(a, b);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn early_disconnect_leaves_partial_report_and_other_peers_unaffected() {
        let (addr, _file, server) = spawn_server(THREE_BAR_ROWS, Duration::from_millis(50)).await;

        let dir = TempDir::new().unwrap();
        let report_path = dir.path().join("partial.csv");

        let mut survivor = FeedClient::connect(&addr).await.unwrap();
        let mut quitter = FeedClient::connect(&addr).await.unwrap();

        // The quitter processes two bars, then drops its connection.
        let mut engine = baseline_engine(100.0);
        let mut sink = CsvReportSink::create(&report_path).unwrap();
        for _ in 0..2 {
            match quitter.receive().await.unwrap() {
                FeedEvent::Bar(bar) => {
                    let row = engine.on_bar(&bar);
                    sink.append(&row).unwrap();
                }
                FeedEvent::EndOfStream => panic!("stream ended too early"),
            }
        }
        sink.finish(&Termination::Premature("client disconnected".into()))
            .unwrap();
        drop(quitter);

        // The survivor still gets the full session.
        let mut survivor_bars = 0;
        loop {
            match survivor.receive().await.unwrap() {
                FeedEvent::Bar(_) => survivor_bars += 1,
                FeedEvent::EndOfStream => break,
            }
        }
        assert_eq!(survivor_bars, 3);
        assert_eq!(server.await.unwrap().unwrap(), 3);

        let report = fs::read_to_string(&report_path).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        // Header, two rows, premature trailer.
        assert_eq!(lines.len(), 4);
        assert!(lines[3].starts_with("#premature"));
    }
}

mod error_handling {
    use super::*;

    async fn raw_server(lines: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for line in lines {
                stream.write_all(line.as_bytes()).await.unwrap();
            }
            stream.shutdown().await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn connection_refused_is_a_connect_error() {
        // Bind then immediately drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = FeedClient::connect(&addr).await.unwrap_err();
        assert!(matches!(err, TickfeedError::Connect { .. }));
    }

    #[tokio::test]
    async fn eof_without_sentinel_is_connection_lost() {
        let bar_line = encode_line(&FeedMessage::Bar(make_bar(30, 10.0, 9.0))).unwrap();
        let addr = raw_server(vec![bar_line]).await;

        let mut client = FeedClient::connect(&addr).await.unwrap();
        assert!(matches!(
            client.receive().await.unwrap(),
            FeedEvent::Bar(_)
        ));

        let err = client.receive().await.unwrap_err();
        assert!(matches!(err, TickfeedError::ConnectionLost { .. }));
        assert_eq!(client.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn isolated_decode_failures_are_skipped() {
        let bar_line = encode_line(&FeedMessage::Bar(make_bar(30, 10.0, 9.0))).unwrap();
        let eos_line = encode_line(&FeedMessage::EndOfStream).unwrap();
        let addr = raw_server(vec![
            "garbage\n".into(),
            "{\"type\":\"bar\"}\n".into(),
            bar_line,
            "more garbage\n".into(),
            eos_line,
        ])
        .await;

        let mut client = FeedClient::connect(&addr).await.unwrap();
        // Two consecutive failures are tolerated; the bar still comes through.
        match client.receive().await.unwrap() {
            FeedEvent::Bar(bar) => assert!((bar.close - 9.0).abs() < f64::EPSILON),
            FeedEvent::EndOfStream => panic!("expected a bar"),
        }
        // The counter reset on the good record, so one more failure is fine.
        assert_eq!(client.receive().await.unwrap(), FeedEvent::EndOfStream);
        assert_eq!(client.state(), SessionState::Draining);
    }

    #[tokio::test]
    async fn three_consecutive_decode_failures_corrupt_the_stream() {
        let addr = raw_server(vec![
            "junk one\n".into(),
            "junk two\n".into(),
            "junk three\n".into(),
        ])
        .await;

        let mut client = FeedClient::connect(&addr).await.unwrap();
        let err = client.receive().await.unwrap_err();
        assert!(matches!(
            err,
            TickfeedError::CorruptStream { failures: 3 }
        ));
        assert_eq!(client.state(), SessionState::Closed);
    }

    /// Report sink that runs out of disk after a fixed number of appends.
    struct FailingSink {
        inner: CsvReportSink,
        appends_left: u64,
    }

    impl ReportSink for FailingSink {
        fn append(&mut self, row: &ReportRow) -> Result<(), TickfeedError> {
            if self.appends_left == 0 {
                return Err(TickfeedError::Io(std::io::Error::other("disk full")));
            }
            self.appends_left -= 1;
            self.inner.append(row)
        }

        fn finish(&mut self, termination: &Termination) -> Result<(), TickfeedError> {
            self.inner.finish(termination)
        }
    }

    #[tokio::test]
    async fn append_failure_still_seals_the_report() {
        let (addr, _file, _server) = spawn_server(THREE_BAR_ROWS, Duration::from_millis(10)).await;

        let dir = TempDir::new().unwrap();
        let report_path = dir.path().join("report.csv");
        let mut engine = baseline_engine(100.0);
        let mut sink = FailingSink {
            inner: CsvReportSink::create(&report_path).unwrap(),
            appends_left: 1,
        };

        let mut client = FeedClient::connect(&addr).await.unwrap();
        let err = run_session(&mut client, &mut engine, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, TickfeedError::Io(_)));

        let report = fs::read_to_string(&report_path).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        // Header, the one row that made it to disk, premature trailer.
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("#premature"));
    }

    #[tokio::test]
    async fn session_seals_the_report_on_transport_failure() {
        let bar_line = encode_line(&FeedMessage::Bar(make_bar(30, 10.0, 9.0))).unwrap();
        // One bar, then the connection dies with no sentinel.
        let addr = raw_server(vec![bar_line]).await;

        let dir = TempDir::new().unwrap();
        let report_path = dir.path().join("report.csv");
        let mut engine = baseline_engine(100.0);
        let mut sink = CsvReportSink::create(&report_path).unwrap();

        let mut client = FeedClient::connect(&addr).await.unwrap();
        let err = run_session(&mut client, &mut engine, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, TickfeedError::ConnectionLost { .. }));

        let report = fs::read_to_string(&report_path).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("#premature"));
    }
}

mod replay_determinism {
    use super::*;

    fn run_local_session(dataset_rows: &str, report_path: &std::path::Path) {
        let file = dataset_file(dataset_rows);
        let mut source = CsvBarSource::open(file.path()).unwrap();
        let mut engine = baseline_engine(500.0);
        let mut sink = CsvReportSink::create(report_path).unwrap();

        while let Some(bar) = source.next_bar().unwrap() {
            let row = engine.on_bar(&bar);
            sink.append(&row).unwrap();
        }
        sink.finish(&Termination::Complete).unwrap();
    }

    #[test]
    fn identical_inputs_produce_identical_reports() {
        let rows = (0..12)
            .map(|i| {
                format!(
                    "2024-01-15 09:{:02}:00,{}.0,{}.0,{}.0,{}.0,500\n",
                    30 + i,
                    10 + (i % 4),
                    12 + (i % 4),
                    8,
                    9 + ((i * 3) % 5)
                )
            })
            .collect::<String>();

        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");

        run_local_session(&rows, &first);
        run_local_session(&rows, &second);

        let a = fs::read_to_string(&first).unwrap();
        let b = fs::read_to_string(&second).unwrap();
        assert_eq!(a, b);
        assert!(a.lines().last().unwrap().starts_with("#complete"));
    }
}
