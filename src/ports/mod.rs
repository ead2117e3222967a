//! Port traits implemented by adapters.

pub mod bar_source;
pub mod config_port;
pub mod report_sink;
