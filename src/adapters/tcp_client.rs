//! TCP feed client.
//!
//! A blocking pull over one connection, modelled as an explicit state
//! machine: CONNECTING until the socket is up, STREAMING while bars arrive,
//! DRAINING once the end-of-stream sentinel is seen, CLOSED on any terminal
//! condition. The only suspension point is awaiting the next line.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::adapters::wire::{self, FeedMessage};
use crate::domain::bar::Bar;
use crate::domain::error::TickfeedError;
use crate::domain::session::SessionEngine;
use crate::ports::report_sink::{ReportSink, Termination};

/// Consecutive decode failures after which the stream is treated as
/// corrupted and the connection closed.
pub const MAX_CONSECUTIVE_DECODE_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Draining,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Bar(Bar),
    EndOfStream,
}

#[derive(Debug)]
pub struct FeedClient {
    reader: BufReader<TcpStream>,
    state: SessionState,
    decode_failures: u32,
}

impl FeedClient {
    /// The client is `Connecting` for the duration of this call and
    /// `Streaming` once it returns.
    pub async fn connect(addr: &str) -> Result<Self, TickfeedError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TickfeedError::Connect {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        info!(%addr, "connected to feed");
        Ok(FeedClient {
            reader: BufReader::new(stream),
            state: SessionState::Streaming,
            decode_failures: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Pull the next decoded event in arrival order. A malformed record is
    /// skipped and the next one requested; three consecutive failures close
    /// the connection as corrupted. EOF without the sentinel is a transport
    /// error, kept distinct from clean end-of-stream so callers can tell
    /// "simulation completed" from "transport failed".
    pub async fn receive(&mut self) -> Result<FeedEvent, TickfeedError> {
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await.map_err(|e| {
                self.state = SessionState::Closed;
                TickfeedError::ConnectionLost {
                    reason: e.to_string(),
                }
            })?;
            if n == 0 {
                self.state = SessionState::Closed;
                return Err(TickfeedError::ConnectionLost {
                    reason: "server closed the connection without end-of-stream".into(),
                });
            }

            match wire::decode_line(&line) {
                Ok(FeedMessage::Bar(bar)) => {
                    self.decode_failures = 0;
                    return Ok(FeedEvent::Bar(bar));
                }
                Ok(FeedMessage::EndOfStream) => {
                    self.state = SessionState::Draining;
                    return Ok(FeedEvent::EndOfStream);
                }
                Err(e) => {
                    self.decode_failures += 1;
                    warn!(
                        consecutive = self.decode_failures,
                        "skipping malformed record: {e}"
                    );
                    if self.decode_failures >= MAX_CONSECUTIVE_DECODE_FAILURES {
                        self.state = SessionState::Closed;
                        return Err(TickfeedError::CorruptStream {
                            failures: self.decode_failures,
                        });
                    }
                }
            }
        }
    }

    /// Drop the connection; further receives are invalid.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}

/// Outcome of a completed client session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub bars_processed: u64,
}

/// Drive one full session: pull bars until end-of-stream, feeding each
/// through the engine and appending the resulting row to the report. The
/// report is sealed before this function returns, on both the clean path
/// and every error path; sealing on an error is best-effort and never
/// masks the error that ended the session.
pub async fn run_session<R: ReportSink>(
    client: &mut FeedClient,
    engine: &mut SessionEngine,
    sink: &mut R,
) -> Result<SessionOutcome, TickfeedError> {
    loop {
        match client.receive().await {
            Ok(FeedEvent::Bar(bar)) => {
                let row = engine.on_bar(&bar);
                if let Err(e) = sink.append(&row) {
                    let _ = sink.finish(&Termination::Premature(e.to_string()));
                    client.close();
                    return Err(e);
                }
            }
            Ok(FeedEvent::EndOfStream) => {
                sink.finish(&Termination::Complete)?;
                client.close();
                info!(bars = engine.bars_processed(), "session complete");
                return Ok(SessionOutcome {
                    bars_processed: engine.bars_processed(),
                });
            }
            Err(e) => {
                let _ = sink.finish(&Termination::Premature(e.to_string()));
                client.close();
                return Err(e);
            }
        }
    }
}
