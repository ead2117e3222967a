//! Concrete adapter implementations for ports, plus the TCP feed endpoints.

pub mod csv_bar_source;
pub mod csv_report;
pub mod file_config_adapter;
pub mod tcp_client;
pub mod tcp_server;
pub mod wire;
