//! Error handling - typed outcomes at the public boundary

use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons the risk gate rejects an order before it reaches a backend.
///
/// None of these are retryable without changing the order or the limits.
#[derive(Debug, Clone, Error)]
pub enum RejectReason {
    /// Kill switch engaged - carries the reason recorded at activation.
    #[error("trading halted: {reason}")]
    Halted { reason: String },

    /// Single-order notional above the configured cap.
    #[error("order notional {notional} exceeds limit {limit}")]
    OrderTooLarge { notional: Decimal, limit: Decimal },

    /// Daily realized + mark-to-market loss already at the limit.
    #[error("daily loss {loss} has reached limit {limit}; trading halted")]
    DailyLossBreached { loss: Decimal, limit: Decimal },

    /// Opening the position would exceed the concurrent-position cap.
    #[error("already holding {current} positions (max {limit})")]
    TooManyPositions { current: usize, limit: usize },

    /// Resulting position too large a share of portfolio value.
    #[error("position notional {notional} is over {limit_pct}% of portfolio {portfolio}")]
    ConcentrationExceeded {
        notional: Decimal,
        portfolio: Decimal,
        limit_pct: Decimal,
    },

    /// Outside the configured session window, with hard blocking enabled.
    #[error("outside trading hours: {detail}")]
    OutsideSessionHours { detail: String },
}

/// Error taxonomy for the execution core.
///
/// Connectivity failures (`BackendUnavailable`) are always distinct from
/// venue-level rejections (`BackendRejected`) so callers can retry the
/// former - with the same idempotency key - and abandon the latter.
#[derive(Debug, Error)]
pub enum Error {
    /// Order failed a pre-trade check.
    #[error("risk rejected: {0}")]
    RiskRejected(RejectReason),

    /// Trading disabled; retry only after explicit manual deactivation.
    #[error("trading halted: {reason}")]
    Halted { reason: String },

    /// Venue unreachable or timed out at the transport level.
    #[error("venue unavailable: {0}")]
    BackendUnavailable(String),

    /// Venue reached and said no (invalid symbol, margin, session).
    #[error("venue rejected: {0}")]
    BackendRejected(String),

    /// Malformed intent - caller bug, fix and resubmit.
    #[error("invalid intent: {0}")]
    InvalidIntent(String),

    /// Paper ledger only: not enough virtual cash for the fill.
    #[error("insufficient paper funds: need {required}, have {available}")]
    InsufficientLedgerFunds {
        required: Decimal,
        available: Decimal,
    },

    /// Paper ledger only: selling more than is held.
    #[error("insufficient quantity in {symbol}: hold {held}, asked to sell {requested}")]
    InsufficientQuantity {
        symbol: String,
        held: u64,
        requested: u64,
    },

    /// Submit neither completed nor failed before the deadline. The order
    /// may have executed; reconcile against the venue order book before
    /// retrying.
    #[error("outcome unknown for {order_ref}: reconcile against the venue order book")]
    UnknownOutcome { order_ref: String },

    /// No account registered under the given id.
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    /// Operation not valid for the account's backend kind.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Configuration errors.
    #[error("config: {0}")]
    Config(String),

    /// Serialization.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Transport-level failures are retryable; everything the venue
        // actually answered goes through BackendRejected at the call site.
        Error::BackendUnavailable(err.to_string())
    }
}

impl Error {
    /// Whether a caller may retry the same order (same idempotency key)
    /// without modification.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable(_) | Error::UnknownOutcome { .. }
        )
    }
}
