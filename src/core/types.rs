//! Core types - strong typing for order flow

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// Tradeable symbol (e.g., "RELIANCE", "TCS")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// Account identifier - one per routed account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId::new(s)
    }
}

/// Venue / exchange segment tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VenueTag {
    Nse,
    Bse,
    Nfo,
    Mcx,
}

impl std::fmt::Display for VenueTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VenueTag::Nse => write!(f, "NSE"),
            VenueTag::Bse => write!(f, "BSE"),
            VenueTag::Nfo => write!(f, "NFO"),
            VenueTag::Mcx => write!(f, "MCX"),
        }
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    Market,
    Limit,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
        }
    }
}

/// A trade intent as submitted by a caller. Immutable once created.
///
/// The idempotency key is caller-supplied; backends that honor it return
/// the original result for a repeated key instead of filling twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: Symbol,
    pub venue: VenueTag,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: u64,
    pub limit_price: Option<Decimal>,
    pub idempotency_key: String,
}

impl OrderIntent {
    pub fn market(
        symbol: impl Into<Symbol>,
        venue: VenueTag,
        side: Side,
        quantity: u64,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            venue,
            side,
            kind: OrderKind::Market,
            quantity,
            limit_price: None,
            idempotency_key: idempotency_key.into(),
        }
    }

    pub fn limit(
        symbol: impl Into<Symbol>,
        venue: VenueTag,
        side: Side,
        quantity: u64,
        limit_price: Decimal,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            venue,
            side,
            kind: OrderKind::Limit,
            quantity,
            limit_price: Some(limit_price),
            idempotency_key: idempotency_key.into(),
        }
    }

    /// Shape validation. Malformed intents are caller bugs and are
    /// rejected before any risk check or backend call.
    pub fn validate(&self) -> Result<()> {
        if self.quantity == 0 {
            return Err(Error::InvalidIntent("quantity must be positive".into()));
        }
        match (self.kind, self.limit_price) {
            (OrderKind::Limit, None) => {
                Err(Error::InvalidIntent("limit order requires a limit price".into()))
            }
            (OrderKind::Limit, Some(p)) if p <= Decimal::ZERO => {
                Err(Error::InvalidIntent("limit price must be positive".into()))
            }
            _ => Ok(()),
        }
    }

    /// Monetary size of the order at the given reference price.
    pub fn notional(&self, reference_price: Decimal) -> Decimal {
        reference_price * Decimal::from(self.quantity)
    }
}

/// Terminal or pending status of a backend execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Pending,
    Filled,
    Cancelled,
    Rejected,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "PENDING"),
            ExecutionStatus::Filled => write!(f, "FILLED"),
            ExecutionStatus::Cancelled => write!(f, "CANCELLED"),
            ExecutionStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Outcome of an accepted order. Never mutated after creation; venue-side
/// corrections arrive as new results keyed by the same order id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub order_id: String,
    pub status: ExecutionStatus,
    pub fill_price: Option<Decimal>,
    pub fill_quantity: u64,
    pub message: String,
}

impl ExecutionResult {
    pub fn is_fill(&self) -> bool {
        self.status == ExecutionStatus::Filled && self.fill_quantity > 0
    }
}

/// Immutable view of one open position, as served to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReport {
    pub symbol: Symbol,
    pub quantity: i64,
    pub avg_price: Decimal,
    pub last_price: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
}

impl PositionReport {
    /// Notional value at the last known price.
    pub fn notional(&self) -> Decimal {
        Decimal::from(self.quantity.unsigned_abs()) * self.last_price
    }
}

/// A long-term holding (delivery stock), as reported by a venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    pub quantity: u64,
    pub avg_price: Decimal,
    pub last_price: Decimal,
    pub unrealized_pnl: Decimal,
}

/// One entry in a backend's order log for the current session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub symbol: Symbol,
    pub venue: VenueTag,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: u64,
    pub price: Option<Decimal>,
    pub status: ExecutionStatus,
    pub placed_at: DateTime<Utc>,
}

/// Candle timeframe for historical data queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandleInterval {
    OneMinute,
    FiveMinute,
    FifteenMinute,
    OneHour,
    OneDay,
}

impl CandleInterval {
    pub fn as_str(&self) -> &str {
        match self {
            CandleInterval::OneMinute => "minute",
            CandleInterval::FiveMinute => "5minute",
            CandleInterval::FifteenMinute => "15minute",
            CandleInterval::OneHour => "60minute",
            CandleInterval::OneDay => "day",
        }
    }
}

/// OHLCV candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}
