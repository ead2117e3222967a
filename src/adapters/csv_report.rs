//! CSV session report adapter.
//!
//! Append-only: a header, one row per processed bar, then a termination
//! trailer. Every append is flushed so an interrupted session still leaves
//! a readable report, and the trailer makes premature termination visible
//! post-hoc.

use std::fs::File;
use std::path::Path;

use crate::domain::bar::TIMESTAMP_FORMAT;
use crate::domain::error::TickfeedError;
use crate::domain::session::ReportRow;
use crate::ports::report_sink::{ReportSink, Termination};

pub const REPORT_HEADER: [&str; 7] = [
    "timestamp",
    "decision",
    "price",
    "cash",
    "position",
    "realized_pnl",
    "unrealized_pnl",
];

pub struct CsvReportSink {
    writer: csv::Writer<File>,
    rows: u64,
}

impl CsvReportSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, TickfeedError> {
        let file = File::create(path.as_ref())?;
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
        writer.write_record(REPORT_HEADER)?;
        writer.flush()?;
        Ok(CsvReportSink { writer, rows: 0 })
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }
}

impl From<csv::Error> for TickfeedError {
    fn from(err: csv::Error) -> Self {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => TickfeedError::Io(io),
            other => TickfeedError::Data {
                path: String::new(),
                reason: format!("{:?}", other),
            },
        }
    }
}

impl ReportSink for CsvReportSink {
    fn append(&mut self, row: &ReportRow) -> Result<(), TickfeedError> {
        self.writer.write_record([
            row.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            row.decision.to_string(),
            format!("{:.2}", row.price),
            format!("{:.2}", row.cash),
            row.position.to_string(),
            format!("{:.2}", row.realized_pnl),
            format!("{:.2}", row.unrealized_pnl),
        ])?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self, termination: &Termination) -> Result<(), TickfeedError> {
        match termination {
            Termination::Complete => {
                self.writer.write_record(["#complete"])?;
            }
            Termination::Premature(reason) => {
                self.writer.write_record(["#premature", reason.as_str()])?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::Decision;
    use chrono::NaiveDateTime;
    use std::fs;
    use tempfile::TempDir;

    fn sample_row(minute: u32, decision: Decision) -> ReportRow {
        let ts = format!("2024-01-15 09:{:02}:00", minute);
        ReportRow {
            timestamp: NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).unwrap(),
            decision,
            price: 9.0,
            cash: 91.0,
            position: 1,
            realized_pnl: 0.0,
            unrealized_pnl: -0.5,
        }
    }

    #[test]
    fn complete_session_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");

        let mut sink = CsvReportSink::create(&path).unwrap();
        sink.append(&sample_row(30, Decision::Buy)).unwrap();
        sink.append(&sample_row(31, Decision::Hold)).unwrap();
        sink.finish(&Termination::Complete).unwrap();
        assert_eq!(sink.rows_written(), 2);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "timestamp,decision,price,cash,position,realized_pnl,unrealized_pnl"
        );
        assert_eq!(lines[1], "2024-01-15 09:30:00,BUY,9.00,91.00,1,0.00,-0.50");
        assert!(lines[2].starts_with("2024-01-15 09:31:00,HOLD"));
        assert_eq!(lines[3], "#complete");
    }

    #[test]
    fn premature_termination_leaves_a_trailer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");

        let mut sink = CsvReportSink::create(&path).unwrap();
        sink.append(&sample_row(30, Decision::Buy)).unwrap();
        sink.finish(&Termination::Premature("connection lost".into()))
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let last = content.lines().last().unwrap();
        assert_eq!(last, "#premature,connection lost");
    }

    #[test]
    fn rows_are_durable_before_finish() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");

        let mut sink = CsvReportSink::create(&path).unwrap();
        sink.append(&sample_row(30, Decision::Buy)).unwrap();

        // Flushed on append: visible on disk while the sink is still open.
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
