//! Per-tick trading decision.

use std::fmt;

/// The strategy's output for one bar. `Hold` is also what a blocked trade
/// degrades to in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::Buy => "BUY",
            Decision::Sell => "SELL",
            Decision::Hold => "HOLD",
        };
        f.write_str(s)
    }
}
