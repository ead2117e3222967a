//! CSV dataset adapter.
//!
//! Streams bars one row at a time in file order. Malformed, truncated, or
//! out-of-order rows are skipped with a logged warning; only an unreadable
//! file is fatal.

use chrono::NaiveDateTime;
use std::fs::File;
use std::path::Path;
use tracing::warn;

use crate::domain::bar::{Bar, TIMESTAMP_FORMAT};
use crate::domain::error::TickfeedError;
use crate::ports::bar_source::BarSource;

pub struct CsvBarSource {
    records: csv::StringRecordsIntoIter<File>,
    path: String,
    last_timestamp: Option<NaiveDateTime>,
    skipped: u64,
}

impl CsvBarSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TickfeedError> {
        let display = path.as_ref().display().to_string();
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path.as_ref())
            .map_err(|e| TickfeedError::Data {
                path: display.clone(),
                reason: e.to_string(),
            })?;
        Ok(CsvBarSource {
            records: reader.into_records(),
            path: display,
            last_timestamp: None,
            skipped: 0,
        })
    }

    /// Rows dropped so far (malformed, invalid, or out of order).
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn parse_record(record: &csv::StringRecord) -> Result<Bar, String> {
        let field = |i: usize, name: &str| -> Result<&str, String> {
            record.get(i).ok_or_else(|| format!("missing {} column", name))
        };

        let timestamp = NaiveDateTime::parse_from_str(field(0, "timestamp")?, TIMESTAMP_FORMAT)
            .map_err(|e| format!("invalid timestamp: {}", e))?;
        let open: f64 = field(1, "open")?
            .parse()
            .map_err(|e| format!("invalid open: {}", e))?;
        let high: f64 = field(2, "high")?
            .parse()
            .map_err(|e| format!("invalid high: {}", e))?;
        let low: f64 = field(3, "low")?
            .parse()
            .map_err(|e| format!("invalid low: {}", e))?;
        let close: f64 = field(4, "close")?
            .parse()
            .map_err(|e| format!("invalid close: {}", e))?;
        let volume: i64 = field(5, "volume")?
            .parse()
            .map_err(|e| format!("invalid volume: {}", e))?;

        let bar = Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        };
        if !bar.is_valid() {
            return Err("non-positive price or negative volume".into());
        }
        Ok(bar)
    }
}

impl BarSource for CsvBarSource {
    fn next_bar(&mut self) -> Result<Option<Bar>, TickfeedError> {
        for result in self.records.by_ref() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    self.skipped += 1;
                    warn!(path = %self.path, "skipping unreadable row: {e}");
                    continue;
                }
            };

            match Self::parse_record(&record) {
                Ok(bar) => {
                    if let Some(last) = self.last_timestamp {
                        if bar.timestamp < last {
                            self.skipped += 1;
                            warn!(
                                path = %self.path,
                                timestamp = %bar.timestamp,
                                "skipping out-of-order row"
                            );
                            continue;
                        }
                    }
                    self.last_timestamp = Some(bar.timestamp);
                    return Ok(Some(bar));
                }
                Err(reason) => {
                    self.skipped += 1;
                    warn!(path = %self.path, "skipping malformed row: {reason}");
                }
            }
        }
        Ok(None)
    }
}
