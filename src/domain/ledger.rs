//! Portfolio ledger: cash, position, cost basis and P&L.
//!
//! The ledger is the only component that mutates portfolio state, and it is
//! driven from a single stream of decisions per session. Trade order is
//! economically meaningful, so there is no concurrent mutation path.

use tracing::debug;

use super::decision::Decision;

/// How many units a BUY or SELL represents. The source material left this
/// implicit, so it is an explicit configuration parameter here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityPolicy {
    pub units_per_trade: i64,
    /// When set, a SELL closes the whole position instead of `units_per_trade`.
    pub liquidate_on_sell: bool,
}

impl Default for QuantityPolicy {
    fn default() -> Self {
        QuantityPolicy {
            units_per_trade: 1,
            liquidate_on_sell: false,
        }
    }
}

/// Point-in-time copy of the ledger, taken after each tick is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioSnapshot {
    pub cash: f64,
    pub position: i64,
    pub cost_basis: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
}

/// Long-only single-instrument ledger. Created with the session's initial
/// cash and discarded when the session ends.
#[derive(Debug, Clone)]
pub struct PortfolioLedger {
    pub cash: f64,
    pub initial_cash: f64,
    pub position: i64,
    pub cost_basis: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    policy: QuantityPolicy,
}

impl PortfolioLedger {
    pub fn new(initial_cash: f64, policy: QuantityPolicy) -> Self {
        PortfolioLedger {
            cash: initial_cash,
            initial_cash,
            position: 0,
            cost_basis: 0.0,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            policy,
        }
    }

    /// Apply one decision at the bar's close price. A BUY without enough cash
    /// or a SELL with no open position degrades to HOLD for that tick; the
    /// returned decision is the one that actually took effect. Unrealized
    /// P&L is marked to `price` on every tick, HOLD included.
    pub fn apply(&mut self, decision: Decision, price: f64) -> (Decision, PortfolioSnapshot) {
        let effective = match decision {
            Decision::Buy => self.buy(price),
            Decision::Sell => self.sell(price),
            Decision::Hold => Decision::Hold,
        };
        self.unrealized_pnl = (price - self.cost_basis) * self.position as f64;
        (effective, self.snapshot())
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            cash: self.cash,
            position: self.position,
            cost_basis: self.cost_basis,
            realized_pnl: self.realized_pnl,
            unrealized_pnl: self.unrealized_pnl,
        }
    }

    fn buy(&mut self, price: f64) -> Decision {
        let quantity = self.policy.units_per_trade;
        let cost = price * quantity as f64;
        if quantity <= 0 || cost > self.cash {
            debug!(price, cash = self.cash, "buy blocked: insufficient cash");
            return Decision::Hold;
        }
        let prior_value = self.cost_basis * self.position as f64;
        self.position += quantity;
        self.cost_basis = (prior_value + cost) / self.position as f64;
        self.cash -= cost;
        Decision::Buy
    }

    fn sell(&mut self, price: f64) -> Decision {
        if self.position <= 0 {
            debug!(price, "sell blocked: no open position");
            return Decision::Hold;
        }
        let quantity = if self.policy.liquidate_on_sell {
            self.position
        } else {
            self.policy.units_per_trade.min(self.position)
        };
        self.cash += price * quantity as f64;
        self.realized_pnl += (price - self.cost_basis) * quantity as f64;
        self.position -= quantity;
        if self.position == 0 {
            self.cost_basis = 0.0;
        }
        Decision::Sell
    }
}
