//! Wire protocol: newline-delimited JSON, one message per line.
//!
//! Each bar travels as a single tagged JSON object; the end-of-stream
//! sentinel is a distinct tag no valid bar can collide with. This is a
//! closed-loop simulation format, not a real market-data protocol.

use serde::{Deserialize, Serialize};

use crate::domain::bar::Bar;
use crate::domain::error::TickfeedError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    Bar(Bar),
    EndOfStream,
}

/// Serialize one message as a single line, trailing newline included.
pub fn encode_line(message: &FeedMessage) -> Result<String, TickfeedError> {
    let mut line = serde_json::to_string(message).map_err(|e| TickfeedError::Decode {
        reason: e.to_string(),
    })?;
    line.push('\n');
    Ok(line)
}

/// Parse one received line (with or without its newline).
pub fn decode_line(line: &str) -> Result<FeedMessage, TickfeedError> {
    serde_json::from_str(line.trim_end()).map_err(|e| TickfeedError::Decode {
        reason: e.to_string(),
    })
}
