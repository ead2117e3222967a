//! Error taxonomy and exit-code mapping.
//!
//! Transport and terminal decode errors propagate to the top level and end
//! the session. Single malformed records (dataset rows on the server, wire
//! messages on the client) and blocked trades are absorbed where they occur.

/// Top-level error type for tickfeed.
#[derive(Debug, thiserror::Error)]
pub enum TickfeedError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("malformed feed message: {reason}")]
    Decode { reason: String },

    #[error("stream corrupted: {failures} consecutive decode failures")]
    CorruptStream { failures: u32 },

    #[error("dataset error in {path}: {reason}")]
    Data { path: String, reason: String },

    #[error("no usable bars in dataset {path}")]
    NoData { path: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TickfeedError> for std::process::ExitCode {
    fn from(err: &TickfeedError) -> Self {
        let code: u8 = match err {
            TickfeedError::Io(_) => 1,
            TickfeedError::ConfigParse { .. }
            | TickfeedError::ConfigMissing { .. }
            | TickfeedError::ConfigInvalid { .. } => 2,
            TickfeedError::Bind { .. }
            | TickfeedError::Connect { .. }
            | TickfeedError::ConnectionLost { .. } => 3,
            TickfeedError::Decode { .. } | TickfeedError::CorruptStream { .. } => 4,
            TickfeedError::Data { .. } | TickfeedError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
