//! Simulated trading backend - strategy testing with virtual money.
//!
//! `PaperBackend` implements the full venue contract entirely in memory
//! over an owned [`PositionLedger`]. The isolation from live venues is
//! structural: this type holds no HTTP client, no credentials, and no
//! reference to any live adapter, so no refactor can accidentally wire
//! paper flow into a real venue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{Credentials, ExecutionBackend};
use crate::core::{
    Candle, CandleInterval, Error, ExecutionResult, ExecutionStatus, Holding, OrderIntent,
    OrderKind, OrderRecord, PositionReport, Result, Symbol,
};
use crate::ledger::PositionLedger;

pub const PAPER_BACKEND_NAME: &str = "paper";

/// Paper trading account summary.
#[derive(Debug, Clone, Serialize)]
pub struct PaperSummary {
    pub starting_capital: Decimal,
    pub current_capital: Decimal,
    pub portfolio_value: Decimal,
    pub realized_pnl: Decimal,
    pub pnl_percent: Decimal,
    pub open_positions: usize,
    pub total_trades: usize,
    pub is_connected: bool,
}

/// In-memory venue. Fills are synchronous and always complete - no
/// partial fills, no order book, no settlement delay.
pub struct PaperBackend {
    ledger: Arc<PositionLedger>,
    connected: AtomicBool,
    orders: RwLock<Vec<OrderRecord>>,
    results_by_key: RwLock<HashMap<String, ExecutionResult>>,
}

impl PaperBackend {
    pub fn new(starting_capital: Decimal) -> Self {
        Self {
            ledger: Arc::new(PositionLedger::new(starting_capital)),
            connected: AtomicBool::new(false),
            orders: RwLock::new(Vec::new()),
            results_by_key: RwLock::new(HashMap::new()),
        }
    }

    /// Shared handle to the owned ledger; the account context for a paper
    /// account uses this same handle, so fills settled here are visible
    /// to the risk gate without a second application.
    pub fn ledger(&self) -> Arc<PositionLedger> {
        Arc::clone(&self.ledger)
    }

    /// Restore the initial starting-capital state and wipe all history.
    pub fn reset(&self) {
        self.ledger.reset();
        self.orders.write().clear();
        self.results_by_key.write().clear();
        info!(
            capital = %self.ledger.starting_capital(),
            "paper backend reset"
        );
    }

    pub fn summary(&self) -> PaperSummary {
        let snapshot = self.ledger.snapshot();
        let starting = snapshot.starting_capital;
        let pnl_percent = if starting > Decimal::ZERO {
            snapshot.realized_pnl / starting * Decimal::from(100)
        } else {
            Decimal::ZERO
        };
        PaperSummary {
            starting_capital: starting,
            current_capital: snapshot.cash,
            portfolio_value: snapshot.portfolio_value(),
            realized_pnl: snapshot.realized_pnl,
            pnl_percent,
            open_positions: snapshot.open_positions(),
            total_trades: snapshot.trade_count,
            is_connected: self.is_connected(),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(Error::BackendUnavailable(
                "paper session not connected; call connect() first".into(),
            ));
        }
        Ok(())
    }

    /// Fill price: the limit price when given, else the last price the
    /// ledger has seen for the symbol.
    fn resolve_fill_price(&self, intent: &OrderIntent) -> Result<Decimal> {
        match intent.kind {
            OrderKind::Limit => intent
                .limit_price
                .ok_or_else(|| Error::InvalidIntent("limit order requires a limit price".into())),
            OrderKind::Market => self.ledger.last_price(&intent.symbol).ok_or_else(|| {
                Error::BackendRejected(format!(
                    "no known price for {}; market order cannot fill",
                    intent.symbol
                ))
            }),
        }
    }

    fn record_order(
        &self,
        intent: &OrderIntent,
        order_id: &str,
        status: ExecutionStatus,
        price: Decimal,
        placed_at: DateTime<Utc>,
    ) {
        self.orders.write().push(OrderRecord {
            order_id: order_id.to_string(),
            symbol: intent.symbol.clone(),
            venue: intent.venue,
            side: intent.side,
            kind: intent.kind,
            quantity: intent.quantity,
            price: Some(price),
            status,
            placed_at,
        });
    }
}

#[async_trait]
impl ExecutionBackend for PaperBackend {
    fn name(&self) -> &str {
        PAPER_BACKEND_NAME
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Paper connection always succeeds; credentials are ignored.
    async fn connect(&self, _credentials: &Credentials) -> Result<()> {
        self.connected.store(true, Ordering::Relaxed);
        info!(capital = %self.ledger.cash(), "paper backend connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::Relaxed);
        info!("paper backend disconnected");
        Ok(())
    }

    async fn submit(&self, intent: &OrderIntent) -> Result<ExecutionResult> {
        self.ensure_connected()?;

        // Honor the idempotency key: a repeated submission returns the
        // original result instead of filling twice.
        if let Some(previous) = self.results_by_key.read().get(&intent.idempotency_key) {
            info!(
                key = %intent.idempotency_key,
                order_id = %previous.order_id,
                "duplicate idempotency key; returning original result"
            );
            return Ok(previous.clone());
        }

        let fill_price = self.resolve_fill_price(intent)?;
        let order_id = format!("PAPER-{}", Uuid::new_v4().simple());
        let now = Utc::now();

        let outcome = match self.ledger.apply_fill(
            &intent.symbol,
            intent.side,
            intent.quantity,
            fill_price,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.record_order(intent, &order_id, ExecutionStatus::Rejected, fill_price, now);
                return Err(err);
            }
        };

        info!(
            side = %intent.side,
            symbol = %intent.symbol,
            quantity = intent.quantity,
            price = %fill_price,
            cash = %outcome.cash,
            realized = %outcome.realized_pnl,
            "paper fill"
        );

        self.record_order(intent, &order_id, ExecutionStatus::Filled, fill_price, now);

        let result = ExecutionResult {
            order_id,
            status: ExecutionStatus::Filled,
            fill_price: Some(fill_price),
            fill_quantity: intent.quantity,
            message: format!(
                "paper {} {} x{} @ {}",
                intent.side, intent.symbol, intent.quantity, fill_price
            ),
        };
        self.results_by_key
            .write()
            .insert(intent.idempotency_key.clone(), result.clone());
        Ok(result)
    }

    /// Paper fills are synchronous, so by the time a cancel arrives the
    /// order is already terminal.
    async fn cancel(&self, order_id: &str) -> Result<ExecutionResult> {
        self.ensure_connected()?;

        let mut orders = self.orders.write();
        match orders.iter_mut().find(|o| o.order_id == order_id) {
            Some(order) if order.status == ExecutionStatus::Pending => {
                order.status = ExecutionStatus::Cancelled;
                Ok(ExecutionResult {
                    order_id: order_id.to_string(),
                    status: ExecutionStatus::Cancelled,
                    fill_price: None,
                    fill_quantity: 0,
                    message: "paper order cancelled".into(),
                })
            }
            Some(order) => Err(Error::BackendRejected(format!(
                "paper order {} is already {}",
                order_id, order.status
            ))),
            None => Err(Error::BackendRejected(format!(
                "paper order {} not found",
                order_id
            ))),
        }
    }

    async fn open_positions(&self) -> Result<Vec<PositionReport>> {
        self.ensure_connected()?;
        Ok(self.ledger.snapshot().positions)
    }

    /// Paper holdings mirror open positions.
    async fn holdings(&self) -> Result<Vec<Holding>> {
        self.ensure_connected()?;
        Ok(self
            .ledger
            .snapshot()
            .positions
            .into_iter()
            .map(|p| Holding {
                symbol: p.symbol,
                quantity: p.quantity.unsigned_abs(),
                avg_price: p.avg_price,
                last_price: p.last_price,
                unrealized_pnl: p.unrealized_pnl,
            })
            .collect())
    }

    async fn todays_orders(&self) -> Result<Vec<OrderRecord>> {
        Ok(self.orders.read().clone())
    }

    async fn last_price(&self, symbol: &Symbol) -> Result<Decimal> {
        self.ledger.last_price(symbol).ok_or_else(|| {
            Error::BackendRejected(format!("no known price for {}", symbol))
        })
    }

    /// The simulated venue keeps no candle history.
    async fn candles(
        &self,
        symbol: &Symbol,
        _interval: CandleInterval,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        warn!(%symbol, "paper backend has no historical data");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Side, VenueTag};
    use rust_decimal_macros::dec;

    async fn connected_backend(capital: Decimal) -> PaperBackend {
        let backend = PaperBackend::new(capital);
        backend.connect(&Credentials::default()).await.unwrap();
        backend
    }

    fn limit_buy(symbol: &str, qty: u64, price: Decimal, key: &str) -> OrderIntent {
        OrderIntent::limit(symbol, VenueTag::Nse, Side::Buy, qty, price, key)
    }

    fn limit_sell(symbol: &str, qty: u64, price: Decimal, key: &str) -> OrderIntent {
        OrderIntent::limit(symbol, VenueTag::Nse, Side::Sell, qty, price, key)
    }

    #[tokio::test]
    async fn buy_sell_round_trip_matches_the_book() {
        let backend = connected_backend(dec!(100_000)).await;

        let result = backend
            .submit(&limit_buy("RELIANCE", 5, dec!(2500), "buy-1"))
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Filled);
        assert_eq!(result.fill_price, Some(dec!(2500)));
        assert_eq!(backend.ledger().cash(), dec!(87_500));

        let positions = backend.open_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, 5);
        assert_eq!(positions[0].avg_price, dec!(2500));

        backend
            .submit(&limit_sell("RELIANCE", 5, dec!(2700), "sell-1"))
            .await
            .unwrap();
        assert_eq!(backend.ledger().cash(), dec!(100_500));
        assert!(backend.open_positions().await.unwrap().is_empty());

        let summary = backend.summary();
        assert_eq!(summary.realized_pnl, dec!(1000));
        assert_eq!(summary.pnl_percent, dec!(1));
        assert_eq!(summary.total_trades, 2);
    }

    #[tokio::test]
    async fn rejects_overspend_without_side_effects() {
        let backend = connected_backend(dec!(10_000)).await;

        let err = backend
            .submit(&limit_buy("RELIANCE", 10, dec!(2500), "big"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientLedgerFunds { .. }));
        assert_eq!(backend.ledger().cash(), dec!(10_000));

        // The rejected order still shows up in the order log.
        let orders = backend.todays_orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, ExecutionStatus::Rejected);
    }

    #[tokio::test]
    async fn rejects_sell_of_unheld_symbol() {
        let backend = connected_backend(dec!(100_000)).await;
        let err = backend
            .submit(&limit_sell("TCS", 1, dec!(3000), "naked"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientQuantity { .. }));
    }

    #[tokio::test]
    async fn idempotency_key_yields_one_fill() {
        let backend = connected_backend(dec!(100_000)).await;
        let intent = limit_buy("INFY", 4, dec!(1500), "same-key");

        let first = backend.submit(&intent).await.unwrap();
        let second = backend.submit(&intent).await.unwrap();

        assert_eq!(first.order_id, second.order_id);
        let positions = backend.open_positions().await.unwrap();
        assert_eq!(positions[0].quantity, 4);
        assert_eq!(backend.ledger().trade_count(), 1);
    }

    #[tokio::test]
    async fn market_order_fills_at_last_known_price() {
        let backend = connected_backend(dec!(100_000)).await;
        backend.ledger().mark(&Symbol::new("TCS"), dec!(3200));

        let intent = OrderIntent::market("TCS", VenueTag::Nse, Side::Buy, 2, "mkt-1");
        let result = backend.submit(&intent).await.unwrap();
        assert_eq!(result.fill_price, Some(dec!(3200)));

        // No price known for an unseen symbol: the venue says no.
        let unknown = OrderIntent::market("WIPRO", VenueTag::Nse, Side::Buy, 1, "mkt-2");
        let err = backend.submit(&unknown).await.unwrap_err();
        assert!(matches!(err, Error::BackendRejected(_)));
    }

    #[tokio::test]
    async fn submit_requires_connection() {
        let backend = PaperBackend::new(dec!(100_000));
        let err = backend
            .submit(&limit_buy("TCS", 1, dec!(3000), "k"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn cancel_of_filled_order_is_rejected() {
        let backend = connected_backend(dec!(100_000)).await;
        let result = backend
            .submit(&limit_buy("TCS", 1, dec!(3000), "k1"))
            .await
            .unwrap();

        let err = backend.cancel(&result.order_id).await.unwrap_err();
        assert!(matches!(err, Error::BackendRejected(_)));

        let err = backend.cancel("PAPER-missing").await.unwrap_err();
        assert!(matches!(err, Error::BackendRejected(_)));
    }

    #[tokio::test]
    async fn reset_restores_everything() {
        let backend = connected_backend(dec!(100_000)).await;
        backend
            .submit(&limit_buy("TCS", 2, dec!(3000), "k1"))
            .await
            .unwrap();

        backend.reset();

        let summary = backend.summary();
        assert_eq!(summary.current_capital, dec!(100_000));
        assert_eq!(summary.open_positions, 0);
        assert_eq!(summary.total_trades, 0);
        assert!(backend.todays_orders().await.unwrap().is_empty());

        // A previously used key fills again after reset.
        let result = backend
            .submit(&limit_buy("TCS", 2, dec!(3000), "k1"))
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Filled);
    }

    #[tokio::test]
    async fn candles_are_empty() {
        let backend = connected_backend(dec!(100_000)).await;
        let candles = backend
            .candles(
                &Symbol::new("TCS"),
                CandleInterval::OneDay,
                Utc::now() - chrono::Duration::days(5),
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(candles.is_empty());
    }
}
