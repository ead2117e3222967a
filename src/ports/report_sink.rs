//! Session report port trait.

use crate::domain::error::TickfeedError;
use crate::domain::session::ReportRow;

/// How a session ended. A premature termination still leaves a well-formed
/// report, just with a trailer saying it was cut short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Complete,
    Premature(String),
}

/// Append-only sink for session report rows. Rows are never rewritten, and
/// every appended row must be durable before the client process reports
/// success; `finish` seals the report with a termination trailer.
pub trait ReportSink {
    fn append(&mut self, row: &ReportRow) -> Result<(), TickfeedError>;
    fn finish(&mut self, termination: &Termination) -> Result<(), TickfeedError>;
}
