//! Core domain types and logic.

pub mod bar;
pub mod decision;
pub mod error;
pub mod ledger;
pub mod session;
pub mod strategy;
