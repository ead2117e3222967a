//! Strategy rules and the bar history they evaluate against.
//!
//! A strategy is a pure function of the current bar and the bars received
//! before it. Identical inputs must yield identical decisions; no rule may
//! look at data that has not arrived yet. Rules are selected by
//! configuration, not by branching inside the ledger.

use std::str::FromStr;

use super::bar::Bar;
use super::decision::Decision;

pub trait Strategy {
    fn name(&self) -> &str;

    /// `history` holds previously received bars in arrival order and never
    /// includes `bar` itself.
    fn evaluate(&self, bar: &Bar, history: &[Bar]) -> Decision;
}

/// Baseline rule: BUY when the bar closed below its open, SELL otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloseBelowOpen;

impl Strategy for CloseBelowOpen {
    fn name(&self) -> &str {
        "close-below-open"
    }

    fn evaluate(&self, bar: &Bar, _history: &[Bar]) -> Decision {
        if bar.close < bar.open {
            Decision::Buy
        } else {
            Decision::Sell
        }
    }
}

/// Mean-reversion rule over a look-back window: BUY when the close is below
/// the simple moving average of the last `window` closes, SELL when above,
/// HOLD until enough history has accumulated or when the close sits exactly
/// on the average.
#[derive(Debug, Clone, Copy)]
pub struct SmaMomentum {
    pub window: usize,
}

impl Strategy for SmaMomentum {
    fn name(&self) -> &str {
        "sma-momentum"
    }

    fn evaluate(&self, bar: &Bar, history: &[Bar]) -> Decision {
        if self.window == 0 || history.len() < self.window {
            return Decision::Hold;
        }
        let tail = &history[history.len() - self.window..];
        let sma: f64 = tail.iter().map(|b| b.close).sum::<f64>() / self.window as f64;
        if bar.close < sma {
            Decision::Buy
        } else if bar.close > sma {
            Decision::Sell
        } else {
            Decision::Hold
        }
    }
}

/// Which rule a session runs, as named in config or on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    CloseBelowOpen,
    SmaMomentum,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "close-below-open" => Ok(StrategyKind::CloseBelowOpen),
            "sma-momentum" => Ok(StrategyKind::SmaMomentum),
            other => Err(format!(
                "unknown strategy '{}' (expected close-below-open or sma-momentum)",
                other
            )),
        }
    }
}

impl StrategyKind {
    pub fn build(self, window: usize) -> Box<dyn Strategy + Send> {
        match self {
            StrategyKind::CloseBelowOpen => Box::new(CloseBelowOpen),
            StrategyKind::SmaMomentum => Box::new(SmaMomentum { window }),
        }
    }
}

/// Look-back window of received bars, oldest first. A capacity of `None`
/// keeps the whole session.
#[derive(Debug, Clone)]
pub struct BarHistory {
    bars: Vec<Bar>,
    capacity: Option<usize>,
}

impl BarHistory {
    pub fn unbounded() -> Self {
        BarHistory {
            bars: Vec::new(),
            capacity: None,
        }
    }

    pub fn bounded(capacity: usize) -> Self {
        BarHistory {
            bars: Vec::new(),
            capacity: Some(capacity),
        }
    }

    pub fn push(&mut self, bar: Bar) {
        self.bars.push(bar);
        if let Some(cap) = self.capacity {
            while self.bars.len() > cap {
                self.bars.remove(0);
            }
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
