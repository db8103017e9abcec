//! Zerodha (Kite Connect) venue adapter.
//!
//! One of the live conformers of [`ExecutionBackend`]. Only session
//! tokens derived from the credentials are kept after `connect`; the
//! credentials themselves are never stored.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::RwLock;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::backend::{Credentials, ExecutionBackend};
use crate::core::{
    Candle, CandleInterval, Error, ExecutionResult, ExecutionStatus, Holding, OrderIntent,
    OrderKind, OrderRecord, PositionReport, Result, Side, Symbol, VenueTag,
};

const DEFAULT_BASE_URL: &str = "https://api.kite.trade";

/// Kite response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SessionData {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderData {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct NetPositions {
    net: Vec<PositionData>,
}

#[derive(Debug, Deserialize)]
struct PositionData {
    tradingsymbol: String,
    quantity: i64,
    average_price: Decimal,
    last_price: Decimal,
    pnl: Decimal,
}

#[derive(Debug, Deserialize)]
struct HoldingData {
    tradingsymbol: String,
    quantity: u64,
    average_price: Decimal,
    last_price: Decimal,
    pnl: Decimal,
}

#[derive(Debug, Deserialize)]
struct OrderBookEntry {
    order_id: String,
    tradingsymbol: String,
    exchange: String,
    transaction_type: String,
    order_type: String,
    quantity: u64,
    price: Decimal,
    status: String,
    order_timestamp: String,
}

#[derive(Debug, Deserialize)]
struct LtpData {
    last_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct CandleData {
    candles: Vec<(String, Decimal, Decimal, Decimal, Decimal, u64)>,
}

/// Live Zerodha adapter over the Kite Connect REST API.
pub struct ZerodhaBackend {
    client: Client,
    base_url: String,
    api_key: RwLock<Option<String>>,
    access_token: RwLock<Option<String>>,
}

impl ZerodhaBackend {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: RwLock::new(None),
            access_token: RwLock::new(None),
        }
    }

    /// Kite login checksum: SHA-256 over api_key + request_token +
    /// api_secret, hex-encoded.
    fn checksum(api_key: &str, request_token: &str, api_secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(api_key.as_bytes());
        hasher.update(request_token.as_bytes());
        hasher.update(api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn auth_header(&self) -> Result<String> {
        let api_key = self.api_key.read();
        let token = self.access_token.read();
        match (api_key.as_deref(), token.as_deref()) {
            (Some(key), Some(token)) => Ok(format!("token {}:{}", key, token)),
            _ => Err(Error::BackendUnavailable(
                "no active zerodha session; call connect() first".into(),
            )),
        }
    }

    /// Map a non-success HTTP response to a venue rejection, preserving
    /// the venue's own message where possible.
    async fn rejection(response: reqwest::Response) -> Error {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => Error::BackendRejected(format!("{} ({})", body.message, status)),
            Err(_) => Error::BackendRejected(format!("venue returned {}", status)),
        }
    }

    fn map_status(status: &str) -> ExecutionStatus {
        match status {
            "COMPLETE" => ExecutionStatus::Filled,
            "CANCELLED" => ExecutionStatus::Cancelled,
            "REJECTED" => ExecutionStatus::Rejected,
            _ => ExecutionStatus::Pending,
        }
    }

    fn map_venue(exchange: &str) -> VenueTag {
        match exchange {
            "BSE" => VenueTag::Bse,
            "NFO" => VenueTag::Nfo,
            "MCX" => VenueTag::Mcx,
            _ => VenueTag::Nse,
        }
    }

    /// Kite timestamps are venue-local "YYYY-MM-DD HH:MM:SS".
    fn parse_timestamp(raw: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
            .unwrap_or_else(|_| Utc::now())
    }
}

impl Default for ZerodhaBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionBackend for ZerodhaBackend {
    fn name(&self) -> &str {
        "zerodha"
    }

    fn is_connected(&self) -> bool {
        self.access_token.read().is_some()
    }

    async fn connect(&self, credentials: &Credentials) -> Result<()> {
        let (api_key, api_secret, request_token) = match (
            credentials.api_key.as_deref(),
            credentials.api_secret.as_deref(),
            credentials.request_token.as_deref(),
        ) {
            (Some(key), Some(secret), Some(token)) => (key, secret, token),
            _ => {
                return Err(Error::InvalidState(
                    "zerodha connect requires api_key, api_secret, and request_token".into(),
                ));
            }
        };

        let checksum = Self::checksum(api_key, request_token, api_secret);
        let response = self
            .client
            .post(format!("{}/session/token", self.base_url))
            .form(&[
                ("api_key", api_key),
                ("request_token", request_token),
                ("checksum", checksum.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let session: Envelope<SessionData> = response.json().await?;
        *self.api_key.write() = Some(api_key.to_string());
        *self.access_token.write() = Some(session.data.access_token);
        info!("zerodha session established");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Ok(auth) = self.auth_header() {
            let _ = self
                .client
                .delete(format!("{}/session/token", self.base_url))
                .header("Authorization", auth)
                .send()
                .await;
        }
        *self.access_token.write() = None;
        info!("zerodha session closed");
        Ok(())
    }

    async fn submit(&self, intent: &OrderIntent) -> Result<ExecutionResult> {
        let auth = self.auth_header()?;

        let quantity = intent.quantity.to_string();
        let mut form: Vec<(&str, String)> = vec![
            ("tradingsymbol", intent.symbol.to_string()),
            ("exchange", intent.venue.to_string()),
            ("transaction_type", intent.side.to_string()),
            ("order_type", intent.kind.to_string()),
            ("quantity", quantity),
            ("product", "CNC".to_string()),
            ("validity", "DAY".to_string()),
            // Kite echoes the tag back on the order book; the venue
            // dedupes repeated tags within the session.
            ("tag", intent.idempotency_key.chars().take(20).collect()),
        ];
        if intent.kind == OrderKind::Limit {
            if let Some(price) = intent.limit_price {
                form.push(("price", price.to_string()));
            }
        }

        debug!(symbol = %intent.symbol, side = %intent.side, "submitting order to zerodha");
        let response = self
            .client
            .post(format!("{}/orders/regular", self.base_url))
            .header("Authorization", auth)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let order: Envelope<OrderData> = response.json().await?;
        // The venue fills asynchronously; fills arrive via the order book.
        Ok(ExecutionResult {
            order_id: order.data.order_id,
            status: ExecutionStatus::Pending,
            fill_price: None,
            fill_quantity: 0,
            message: "order accepted by venue".into(),
        })
    }

    async fn cancel(&self, order_id: &str) -> Result<ExecutionResult> {
        let auth = self.auth_header()?;
        let response = self
            .client
            .delete(format!(
                "{}/orders/regular/{}",
                self.base_url,
                urlencoding::encode(order_id)
            ))
            .header("Authorization", auth)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let order: Envelope<OrderData> = response.json().await?;
        Ok(ExecutionResult {
            order_id: order.data.order_id,
            status: ExecutionStatus::Cancelled,
            fill_price: None,
            fill_quantity: 0,
            message: "cancel accepted by venue".into(),
        })
    }

    async fn open_positions(&self) -> Result<Vec<PositionReport>> {
        let auth = self.auth_header()?;
        let response = self
            .client
            .get(format!("{}/portfolio/positions", self.base_url))
            .header("Authorization", auth)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let positions: Envelope<NetPositions> = response.json().await?;
        Ok(positions
            .data
            .net
            .into_iter()
            .filter(|p| p.quantity != 0)
            .map(|p| PositionReport {
                symbol: Symbol::new(p.tradingsymbol),
                quantity: p.quantity,
                avg_price: p.average_price,
                last_price: p.last_price,
                realized_pnl: Decimal::ZERO,
                unrealized_pnl: p.pnl,
            })
            .collect())
    }

    async fn holdings(&self) -> Result<Vec<Holding>> {
        let auth = self.auth_header()?;
        let response = self
            .client
            .get(format!("{}/portfolio/holdings", self.base_url))
            .header("Authorization", auth)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let holdings: Envelope<Vec<HoldingData>> = response.json().await?;
        Ok(holdings
            .data
            .into_iter()
            .map(|h| Holding {
                symbol: Symbol::new(h.tradingsymbol),
                quantity: h.quantity,
                avg_price: h.average_price,
                last_price: h.last_price,
                unrealized_pnl: h.pnl,
            })
            .collect())
    }

    async fn todays_orders(&self) -> Result<Vec<OrderRecord>> {
        let auth = self.auth_header()?;
        let response = self
            .client
            .get(format!("{}/orders", self.base_url))
            .header("Authorization", auth)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let orders: Envelope<Vec<OrderBookEntry>> = response.json().await?;
        Ok(orders
            .data
            .into_iter()
            .map(|o| OrderRecord {
                order_id: o.order_id,
                symbol: Symbol::new(o.tradingsymbol),
                venue: Self::map_venue(&o.exchange),
                side: if o.transaction_type == "SELL" {
                    Side::Sell
                } else {
                    Side::Buy
                },
                kind: if o.order_type == "LIMIT" {
                    OrderKind::Limit
                } else {
                    OrderKind::Market
                },
                quantity: o.quantity,
                price: (o.price > Decimal::ZERO).then_some(o.price),
                status: Self::map_status(&o.status),
                placed_at: Self::parse_timestamp(&o.order_timestamp),
            })
            .collect())
    }

    async fn last_price(&self, symbol: &Symbol) -> Result<Decimal> {
        let auth = self.auth_header()?;
        let instrument = format!("NSE:{}", symbol);
        let response = self
            .client
            .get(format!(
                "{}/quote/ltp?i={}",
                self.base_url,
                urlencoding::encode(&instrument)
            ))
            .header("Authorization", auth)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let quotes: Envelope<HashMap<String, LtpData>> = response.json().await?;
        quotes
            .data
            .get(&instrument)
            .map(|q| q.last_price)
            .ok_or_else(|| Error::BackendRejected(format!("no quote for {}", symbol)))
    }

    async fn candles(
        &self,
        symbol: &Symbol,
        interval: CandleInterval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let auth = self.auth_header()?;
        let response = self
            .client
            .get(format!(
                "{}/instruments/historical/NSE:{}/{}",
                self.base_url,
                urlencoding::encode(symbol.as_str()),
                interval.as_str()
            ))
            .query(&[
                ("from", from.format("%Y-%m-%d %H:%M:%S").to_string()),
                ("to", to.format("%Y-%m-%d %H:%M:%S").to_string()),
            ])
            .header("Authorization", auth)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let data: Envelope<CandleData> = response.json().await?;
        Ok(data
            .data
            .candles
            .into_iter()
            .map(|(ts, open, high, low, close, volume)| Candle {
                timestamp: DateTime::parse_from_str(&ts, "%Y-%m-%dT%H:%M:%S%z")
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                open,
                high,
                low,
                close,
                volume,
            })
            .collect())
    }
}
