//! Per-bar session pipeline: strategy, ledger, report row.
//!
//! One engine per client session. Bars flow through in strict arrival order;
//! the strategy sees only history that precedes the bar it is evaluating.

use chrono::NaiveDateTime;

use super::bar::Bar;
use super::decision::Decision;
use super::ledger::{PortfolioLedger, PortfolioSnapshot};
use super::strategy::{BarHistory, Strategy};

/// One line of the session report, produced for every processed bar.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub timestamp: NaiveDateTime,
    pub decision: Decision,
    pub price: f64,
    pub cash: f64,
    pub position: i64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
}

pub struct SessionEngine {
    strategy: Box<dyn Strategy + Send>,
    history: BarHistory,
    ledger: PortfolioLedger,
    bars_processed: u64,
}

impl SessionEngine {
    pub fn new(
        strategy: Box<dyn Strategy + Send>,
        history: BarHistory,
        ledger: PortfolioLedger,
    ) -> Self {
        SessionEngine {
            strategy,
            history,
            ledger,
            bars_processed: 0,
        }
    }

    /// Evaluate the strategy against the bar, apply the decision to the
    /// ledger at the bar's close, then admit the bar into history. The
    /// returned row carries the decision that actually took effect (a
    /// blocked trade reports HOLD).
    pub fn on_bar(&mut self, bar: &Bar) -> ReportRow {
        let decision = self.strategy.evaluate(bar, self.history.bars());
        let (effective, snapshot) = self.ledger.apply(decision, bar.close);
        self.history.push(bar.clone());
        self.bars_processed += 1;

        ReportRow {
            timestamp: bar.timestamp,
            decision: effective,
            price: bar.close,
            cash: snapshot.cash,
            position: snapshot.position,
            realized_pnl: snapshot.realized_pnl,
            unrealized_pnl: snapshot.unrealized_pnl,
        }
    }

    pub fn ledger(&self) -> &PortfolioLedger {
        &self.ledger
    }

    pub fn final_snapshot(&self) -> PortfolioSnapshot {
        self.ledger.snapshot()
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn bars_processed(&self) -> u64 {
        self.bars_processed
    }
}
