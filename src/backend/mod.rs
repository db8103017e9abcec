//! Universal execution-backend contract.
//!
//! Every venue - live adapters and the simulated paper venue - implements
//! the same capability set, so the router and everything above it is
//! completely decoupled from any specific venue API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{
    Candle, CandleInterval, ExecutionResult, Holding, OrderIntent, OrderRecord, PositionReport,
    Result, Symbol,
};
use crate::paper::PaperBackend;

pub mod zerodha;

/// Connection credentials, decrypted by the embedding application.
/// Never stored by adapters beyond the session tokens derived from them.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub request_token: Option<String>,
    /// Venue-specific extras (TOTP secrets, client ids, ...)
    pub extra: HashMap<String, String>,
}

/// Uniform venue contract.
///
/// Any method that performs network I/O can fail with
/// [`Error::BackendUnavailable`](crate::core::Error::BackendUnavailable),
/// which callers must treat differently from
/// [`Error::BackendRejected`](crate::core::Error::BackendRejected): the
/// venue may have acted on an unavailable call, it has definitely not
/// acted on a rejected one.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Backend identifier (e.g. "zerodha", "paper").
    fn name(&self) -> &str;

    /// Whether a session is currently established.
    fn is_connected(&self) -> bool;

    /// Authenticate and establish a session.
    async fn connect(&self, credentials: &Credentials) -> Result<()>;

    /// Close the session and drop venue-side state.
    async fn disconnect(&self) -> Result<()>;

    /// Submit an order. Implementations that honor the intent's
    /// idempotency key return the original result for a repeated key.
    async fn submit(&self, intent: &OrderIntent) -> Result<ExecutionResult>;

    /// Cancel an order by its backend-assigned id.
    async fn cancel(&self, order_id: &str) -> Result<ExecutionResult>;

    /// Currently open positions.
    async fn open_positions(&self) -> Result<Vec<PositionReport>>;

    /// Long-term (delivery) holdings.
    async fn holdings(&self) -> Result<Vec<Holding>>;

    /// All orders placed in the current session/day.
    async fn todays_orders(&self) -> Result<Vec<OrderRecord>>;

    /// Last traded price for a symbol.
    async fn last_price(&self, symbol: &Symbol) -> Result<Decimal>;

    /// Historical OHLCV candles.
    async fn candles(
        &self,
        symbol: &Symbol,
        interval: CandleInterval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;
}

/// Closed set of backend variants an account can route to.
///
/// The split carries the settlement rule: the paper venue owns its ledger
/// and settles fills inside `submit`, while live results are settled by
/// the router into the account's shadow ledger. Keeping the variants
/// closed also keeps the paper/live wall structural - `Paper` holds a
/// concrete type that has no code path to any live venue.
#[derive(Clone)]
pub enum BackendHandle {
    Paper(Arc<PaperBackend>),
    Live(Arc<dyn ExecutionBackend>),
}

impl BackendHandle {
    pub fn as_backend(&self) -> &dyn ExecutionBackend {
        match self {
            BackendHandle::Paper(paper) => paper.as_ref(),
            BackendHandle::Live(live) => live.as_ref(),
        }
    }

    pub fn is_paper(&self) -> bool {
        matches!(self, BackendHandle::Paper(_))
    }

    pub fn paper(&self) -> Option<&Arc<PaperBackend>> {
        match self {
            BackendHandle::Paper(paper) => Some(paper),
            BackendHandle::Live(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        self.as_backend().name()
    }
}
