//! Position and cash bookkeeping - weighted-average-cost accounting.
//!
//! The ledger is the single record of positions, cash, realized P&L, and
//! trade history for one account. Average entry price is always derived
//! from total cost basis and total quantity; nothing is incrementally
//! averaged, so repeated fills cannot accumulate rounding drift.
//!
//! Invariant: `cash + sum(cost basis) == starting capital + realized
//! P&L` after every applied fill. An enforcing ledger (the simulated
//! venue) rejects fills that would overspend cash or oversell a
//! position; a shadow ledger for a live account absorbs whatever the
//! venue reports and treats the invariant as a reconciliation target.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::{Error, PositionReport, Result, Side, Symbol};

/// One open position. `avg_price` is derived; `cost_basis` is the source
/// of truth. Quantity is signed: positive long, negative short.
#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: Symbol,
    pub quantity: i64,
    pub cost_basis: Decimal,
    pub realized_pnl: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    fn new(symbol: Symbol, opened_at: DateTime<Utc>) -> Self {
        Self {
            symbol,
            quantity: 0,
            cost_basis: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            opened_at,
        }
    }

    /// Volume-weighted average entry price, recomputed from the basis.
    pub fn avg_price(&self) -> Decimal {
        if self.quantity == 0 {
            Decimal::ZERO
        } else {
            self.cost_basis / Decimal::from(self.quantity)
        }
    }

    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        mark * Decimal::from(self.quantity) - self.cost_basis
    }
}

/// A filled trade, appended to the ledger's history. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: u64,
    pub price: Decimal,
    pub realized_pnl: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// What a single applied fill did to the ledger.
#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub realized_pnl: Decimal,
    pub position_quantity: i64,
    pub cash: Decimal,
}

/// Immutable view of the ledger consumed by the risk gate and reporting.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub cash: Decimal,
    pub starting_capital: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub positions: Vec<PositionReport>,
    pub trade_count: usize,
}

impl LedgerSnapshot {
    /// Cash plus every position valued at its last known price.
    pub fn portfolio_value(&self) -> Decimal {
        self.cash + self.positions.iter().map(|p| p.notional()).sum::<Decimal>()
    }

    pub fn open_positions(&self) -> usize {
        self.positions.len()
    }

    pub fn holds(&self, symbol: &Symbol) -> bool {
        self.positions.iter().any(|p| &p.symbol == symbol)
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&PositionReport> {
        self.positions.iter().find(|p| &p.symbol == symbol)
    }
}

struct LedgerInner {
    cash: Decimal,
    positions: HashMap<Symbol, Position>,
    realized_pnl: Decimal,
    trades: Vec<TradeRecord>,
    marks: HashMap<Symbol, Decimal>,
}

/// Thread-safe position ledger for one account.
///
/// Interior locking makes reads and marks safe from any task; the strict
/// serialization of validate-then-fill belongs to the router's
/// per-account mutex, not to this type.
pub struct PositionLedger {
    starting_capital: Decimal,
    enforce: bool,
    inner: RwLock<LedgerInner>,
}

impl PositionLedger {
    /// Enforcing ledger: fills that would overspend or oversell are
    /// rejected. This is the simulated venue's ledger.
    pub fn new(starting_capital: Decimal) -> Self {
        Self::build(starting_capital, true)
    }

    /// Non-enforcing shadow ledger for a live-backed account: absorbs
    /// venue-reported fills as-is, including shorts and negative cash
    /// flow, for later reconciliation against venue figures.
    pub fn shadow() -> Self {
        Self::build(Decimal::ZERO, false)
    }

    fn build(starting_capital: Decimal, enforce: bool) -> Self {
        Self {
            starting_capital,
            enforce,
            inner: RwLock::new(LedgerInner {
                cash: starting_capital,
                positions: HashMap::new(),
                realized_pnl: Decimal::ZERO,
                trades: Vec::new(),
                marks: HashMap::new(),
            }),
        }
    }

    pub fn starting_capital(&self) -> Decimal {
        self.starting_capital
    }

    pub fn cash(&self) -> Decimal {
        self.inner.read().cash
    }

    /// Apply a fill. Buys deduct cash and extend the cost basis; sells
    /// credit cash and realize `(price - avg) * qty` on the closed
    /// portion. A position entry is dropped when its quantity returns to
    /// zero; realized P&L survives in the trade history.
    pub fn apply_fill(
        &self,
        symbol: &Symbol,
        side: Side,
        quantity: u64,
        price: Decimal,
    ) -> Result<FillOutcome> {
        let mut inner = self.inner.write();
        let now = Utc::now();
        let gross = price * Decimal::from(quantity);
        let held = inner
            .positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(0);

        if self.enforce {
            match side {
                Side::Buy if gross > inner.cash => {
                    return Err(Error::InsufficientLedgerFunds {
                        required: gross,
                        available: inner.cash,
                    });
                }
                Side::Sell if (quantity as i64) > held => {
                    return Err(Error::InsufficientQuantity {
                        symbol: symbol.to_string(),
                        held: held.unsigned_abs(),
                        requested: quantity,
                    });
                }
                _ => {}
            }
        }

        match side {
            Side::Buy => inner.cash -= gross,
            Side::Sell => inner.cash += gross,
        }

        let delta: i64 = match side {
            Side::Buy => quantity as i64,
            Side::Sell => -(quantity as i64),
        };

        let (realized, position_quantity) = {
            let position = inner
                .positions
                .entry(symbol.clone())
                .or_insert_with(|| Position::new(symbol.clone(), now));

            let realized = if position.quantity == 0
                || position.quantity.signum() == delta.signum()
            {
                // Opening or extending: no P&L, just more basis.
                position.quantity += delta;
                position.cost_basis += price * Decimal::from(delta);
                Decimal::ZERO
            } else {
                // Reducing (or reversing through zero). Cost comes out of
                // the basis proportionally so the remainder stays exact.
                let held_abs = position.quantity.unsigned_abs();
                let closed = quantity.min(held_abs);
                let cost_removed = if closed == held_abs {
                    position.cost_basis
                } else {
                    position.cost_basis * Decimal::from(closed) / Decimal::from(held_abs)
                };
                let direction = if position.quantity > 0 {
                    Decimal::ONE
                } else {
                    -Decimal::ONE
                };
                let realized = Decimal::from(closed) * price * direction - cost_removed;

                position.quantity += delta;
                position.cost_basis -= cost_removed;
                // Reversal: the excess opens fresh at the fill price.
                if position.quantity != 0 && position.quantity.signum() == delta.signum() {
                    position.cost_basis = price * Decimal::from(position.quantity);
                }
                position.realized_pnl += realized;
                realized
            };

            (realized, position.quantity)
        };

        if position_quantity == 0 {
            inner.positions.remove(symbol);
        }
        inner.realized_pnl += realized;

        // A fill is also the freshest price we know for the symbol.
        inner.marks.insert(symbol.clone(), price);

        inner.trades.push(TradeRecord {
            symbol: symbol.clone(),
            side,
            quantity,
            price,
            realized_pnl: realized,
            executed_at: now,
        });

        Ok(FillOutcome {
            realized_pnl: realized,
            position_quantity,
            cash: inner.cash,
        })
    }

    /// Update the valuation price for a symbol without touching quantity.
    pub fn mark(&self, symbol: &Symbol, price: Decimal) {
        self.inner.write().marks.insert(symbol.clone(), price);
    }

    /// Last known price for a symbol, from fills or marks.
    pub fn last_price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.inner.read().marks.get(symbol).copied()
    }

    /// Immutable view of the current state. Positions with no mark yet
    /// are valued at their average entry price.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let inner = self.inner.read();
        let positions: Vec<PositionReport> = inner
            .positions
            .values()
            .map(|p| {
                let last = inner
                    .marks
                    .get(&p.symbol)
                    .copied()
                    .unwrap_or_else(|| p.avg_price());
                PositionReport {
                    symbol: p.symbol.clone(),
                    quantity: p.quantity,
                    avg_price: p.avg_price(),
                    last_price: last,
                    realized_pnl: p.realized_pnl,
                    unrealized_pnl: p.unrealized_pnl(last),
                }
            })
            .collect();

        let unrealized_pnl = positions.iter().map(|p| p.unrealized_pnl).sum();

        LedgerSnapshot {
            cash: inner.cash,
            starting_capital: self.starting_capital,
            realized_pnl: inner.realized_pnl,
            unrealized_pnl,
            positions,
            trade_count: inner.trades.len(),
        }
    }

    pub fn trades(&self) -> Vec<TradeRecord> {
        self.inner.read().trades.clone()
    }

    pub fn trade_count(&self) -> usize {
        self.inner.read().trades.len()
    }

    /// Restore the initial starting-capital state and clear history.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.cash = self.starting_capital;
        inner.positions.clear();
        inner.realized_pnl = Decimal::ZERO;
        inner.trades.clear();
        inner.marks.clear();
    }

    /// Start a fresh trading day: zero the daily realized P&L and trade
    /// log while keeping positions, cash, and marks.
    pub fn start_new_day(&self) {
        let mut inner = self.inner.write();
        inner.realized_pnl = Decimal::ZERO;
        inner.trades.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn symbol(s: &str) -> Symbol {
        Symbol::new(s)
    }

    /// cash + sum(cost basis) must equal starting capital + realized P&L.
    fn assert_invariant(ledger: &PositionLedger) {
        let snapshot = ledger.snapshot();
        let basis: Decimal = snapshot
            .positions
            .iter()
            .map(|p| p.avg_price * Decimal::from(p.quantity))
            .sum();
        assert_eq!(
            snapshot.cash + basis,
            ledger.starting_capital() + snapshot.realized_pnl,
        );
    }

    #[test]
    fn buy_then_sell_round_trip() {
        let ledger = PositionLedger::new(dec!(100_000));

        ledger
            .apply_fill(&symbol("RELIANCE"), Side::Buy, 5, dec!(2500))
            .unwrap();
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.cash, dec!(87_500));
        let position = snapshot.position(&symbol("RELIANCE")).unwrap();
        assert_eq!(position.quantity, 5);
        assert_eq!(position.avg_price, dec!(2500));

        let outcome = ledger
            .apply_fill(&symbol("RELIANCE"), Side::Sell, 5, dec!(2700))
            .unwrap();
        assert_eq!(outcome.realized_pnl, dec!(1000));
        assert_eq!(outcome.position_quantity, 0);

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.cash, dec!(100_500));
        assert_eq!(snapshot.realized_pnl, dec!(1000));
        assert!(!snapshot.holds(&symbol("RELIANCE")));
    }

    #[test]
    fn weighted_average_recomputed_from_basis() {
        let ledger = PositionLedger::new(dec!(100_000));
        ledger
            .apply_fill(&symbol("TCS"), Side::Buy, 10, dec!(3000))
            .unwrap();
        ledger
            .apply_fill(&symbol("TCS"), Side::Buy, 10, dec!(3200))
            .unwrap();

        let snapshot = ledger.snapshot();
        let position = snapshot.position(&symbol("TCS")).unwrap();
        assert_eq!(position.quantity, 20);
        assert_eq!(position.avg_price, dec!(3100));
    }

    #[test]
    fn partial_sell_keeps_avg_and_realizes_proportionally() {
        let ledger = PositionLedger::new(dec!(100_000));
        ledger
            .apply_fill(&symbol("INFY"), Side::Buy, 20, dec!(1500))
            .unwrap();
        let outcome = ledger
            .apply_fill(&symbol("INFY"), Side::Sell, 8, dec!(1600))
            .unwrap();

        assert_eq!(outcome.realized_pnl, dec!(800));
        let snapshot = ledger.snapshot();
        let position = snapshot.position(&symbol("INFY")).unwrap();
        assert_eq!(position.quantity, 12);
        assert_eq!(position.avg_price, dec!(1500));
        assert_invariant(&ledger);
    }

    #[test]
    fn no_value_created_or_destroyed_across_fill_sequence() {
        let ledger = PositionLedger::new(dec!(100_000));
        let fills: &[(&str, Side, u64, Decimal)] = &[
            ("RELIANCE", Side::Buy, 5, dec!(2500)),
            ("TCS", Side::Buy, 4, dec!(3250)),
            ("RELIANCE", Side::Buy, 3, dec!(2600)),
            ("RELIANCE", Side::Sell, 6, dec!(2550)),
            ("TCS", Side::Sell, 4, dec!(3100)),
            ("INFY", Side::Buy, 10, dec!(1450)),
            ("RELIANCE", Side::Sell, 2, dec!(2700)),
        ];

        for (sym, side, qty, price) in fills {
            ledger.apply_fill(&symbol(sym), *side, *qty, *price).unwrap();
            // Invariant must hold for every prefix, not just the end state.
            assert_invariant(&ledger);
        }
        assert_eq!(ledger.trade_count(), fills.len());
    }

    #[test]
    fn rejects_overspend_and_oversell() {
        let ledger = PositionLedger::new(dec!(10_000));

        let err = ledger
            .apply_fill(&symbol("RELIANCE"), Side::Buy, 5, dec!(2500))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientLedgerFunds { .. }));

        ledger
            .apply_fill(&symbol("INFY"), Side::Buy, 4, dec!(1500))
            .unwrap();
        let err = ledger
            .apply_fill(&symbol("INFY"), Side::Sell, 5, dec!(1500))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientQuantity { .. }));

        // Failed fills leave no trace.
        assert_eq!(ledger.trade_count(), 1);
        assert_invariant(&ledger);
    }

    #[test]
    fn shadow_ledger_absorbs_shorts_and_negative_cash() {
        let ledger = PositionLedger::shadow();

        // Sell first: a short position the venue reported.
        ledger
            .apply_fill(&symbol("NIFTYFUT"), Side::Sell, 10, dec!(22_000))
            .unwrap();
        let snapshot = ledger.snapshot();
        let position = snapshot.position(&symbol("NIFTYFUT")).unwrap();
        assert_eq!(position.quantity, -10);
        assert_eq!(position.avg_price, dec!(22_000));
        assert_eq!(snapshot.cash, dec!(220_000));

        // Buying back below the entry realizes a short profit.
        let outcome = ledger
            .apply_fill(&symbol("NIFTYFUT"), Side::Buy, 10, dec!(21_500))
            .unwrap();
        assert_eq!(outcome.realized_pnl, dec!(5_000));
        assert_eq!(outcome.position_quantity, 0);
        assert_invariant(&ledger);

        // Buys with no cash on hand go negative instead of erroring.
        ledger
            .apply_fill(&symbol("TCS"), Side::Buy, 100, dec!(3000))
            .unwrap();
        assert_invariant(&ledger);
    }

    #[test]
    fn reversal_opens_remainder_at_fill_price() {
        let ledger = PositionLedger::shadow();
        ledger
            .apply_fill(&symbol("TCS"), Side::Buy, 5, dec!(3000))
            .unwrap();
        // Sell 8: closes 5, opens a 3-lot short at 3100.
        let outcome = ledger
            .apply_fill(&symbol("TCS"), Side::Sell, 8, dec!(3100))
            .unwrap();

        assert_eq!(outcome.realized_pnl, dec!(500));
        assert_eq!(outcome.position_quantity, -3);
        let snapshot = ledger.snapshot();
        let position = snapshot.position(&symbol("TCS")).unwrap();
        assert_eq!(position.avg_price, dec!(3100));
        assert_invariant(&ledger);
    }

    #[test]
    fn mark_updates_valuation_only() {
        let ledger = PositionLedger::new(dec!(100_000));
        ledger
            .apply_fill(&symbol("TCS"), Side::Buy, 10, dec!(3000))
            .unwrap();

        ledger.mark(&symbol("TCS"), dec!(3300));
        let snapshot = ledger.snapshot();
        let position = snapshot.position(&symbol("TCS")).unwrap();
        assert_eq!(position.quantity, 10);
        assert_eq!(position.avg_price, dec!(3000));
        assert_eq!(position.unrealized_pnl, dec!(3000));
        assert_eq!(snapshot.portfolio_value(), dec!(103_000));
    }

    #[test]
    fn reset_restores_initial_state() {
        let ledger = PositionLedger::new(dec!(100_000));
        ledger
            .apply_fill(&symbol("TCS"), Side::Buy, 10, dec!(3000))
            .unwrap();
        ledger.reset();

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.cash, dec!(100_000));
        assert_eq!(snapshot.realized_pnl, Decimal::ZERO);
        assert!(snapshot.positions.is_empty());
        assert_eq!(snapshot.trade_count, 0);
    }

    #[test]
    fn new_day_keeps_positions_but_zeroes_daily_pnl() {
        let ledger = PositionLedger::new(dec!(100_000));
        ledger
            .apply_fill(&symbol("TCS"), Side::Buy, 10, dec!(3000))
            .unwrap();
        ledger
            .apply_fill(&symbol("TCS"), Side::Sell, 5, dec!(2900))
            .unwrap();
        assert_eq!(ledger.snapshot().realized_pnl, dec!(-500));

        ledger.start_new_day();
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.realized_pnl, Decimal::ZERO);
        assert_eq!(snapshot.trade_count, 0);
        assert!(snapshot.holds(&symbol("TCS")));
    }
}
