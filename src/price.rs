//! Price source - last-traded prices for intents without a limit price.

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::core::{Error, Result, Symbol};

/// External collaborator supplying last-traded prices. Market orders
/// cannot be risk-checked without one.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn last_price(&self, symbol: &Symbol) -> Result<Decimal>;
}

/// Fixed price table, fed by the embedding application or by tests.
#[derive(Default)]
pub struct StaticPriceSource {
    prices: RwLock<HashMap<Symbol, Decimal>>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, symbol: impl Into<Symbol>, price: Decimal) {
        self.prices.write().insert(symbol.into(), price);
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn last_price(&self, symbol: &Symbol) -> Result<Decimal> {
        self.prices
            .read()
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::BackendUnavailable(format!("no price available for {}", symbol)))
    }
}
