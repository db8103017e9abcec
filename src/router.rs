//! Order router - the single entry point that composes the risk gate, a
//! selected backend, and the position ledger.
//!
//! Every routed order runs the same pipeline: resolve the account, mark
//! and snapshot its ledger, validate against the risk gate, submit to the
//! backend under a deadline, settle live fills into the shadow ledger,
//! and audit the outcome - including rejections, so every attempted
//! action is recoverable from the audit trail.
//!
//! Work on one account is strictly serialized by a per-account mutex held
//! across validate-submit-settle; two concurrent orders can never both
//! pass the position-count or concentration check against a stale
//! snapshot. Different accounts proceed in parallel.

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::audit::{AuditAction, AuditRecord, AuditSink};
use crate::backend::{BackendHandle, ExecutionBackend};
use crate::core::config::Config;
use crate::core::{
    AccountId, Error, ExecutionResult, OrderIntent, PositionReport, RejectReason, Result,
};
use crate::ledger::PositionLedger;
use crate::paper::{PaperBackend, PaperSummary};
use crate::price::PriceSource;
use crate::risk::{RiskGate, RiskStatusReport, Verdict};

/// Wire-shaped outcome of a submit: definite accepted / rejected /
/// unknown, never a bare error.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    pub order_id: Option<String>,
    pub reason: Option<String>,
    /// True when the submit timed out: the order may have executed and
    /// must be reconciled against the venue order book.
    pub outcome_unknown: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub accepted: bool,
    pub reason: Option<String>,
}

/// One routed account: a backend variant, its ledger, its risk gate, and
/// the mutex that serializes all order work against it.
struct AccountEntry {
    id: AccountId,
    backend: BackendHandle,
    ledger: Arc<PositionLedger>,
    risk: RiskGate,
    serial: Mutex<()>,
}

/// Order-routing pipeline over a registry of independent accounts.
pub struct OrderRouter {
    accounts: RwLock<HashMap<AccountId, Arc<AccountEntry>>>,
    audit: Arc<dyn AuditSink>,
    prices: Arc<dyn PriceSource>,
    submit_timeout: Duration,
}

impl OrderRouter {
    pub fn new(
        audit: Arc<dyn AuditSink>,
        prices: Arc<dyn PriceSource>,
        config: &Config,
    ) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            audit,
            prices,
            submit_timeout: Duration::from_millis(config.router.submit_timeout_ms),
        }
    }

    /// Register a paper-backed account. The account context shares the
    /// backend's own ledger, so fills the backend settles are immediately
    /// visible to the risk gate.
    pub fn register_paper_account(&self, id: AccountId, config: &Config) -> Arc<PaperBackend> {
        let paper = Arc::new(PaperBackend::new(config.paper.starting_capital));
        let ledger = paper.ledger();
        let risk = RiskGate::new(config.risk.clone(), config.session.clone());
        self.insert_account(id, BackendHandle::Paper(Arc::clone(&paper)), ledger, risk);
        paper
    }

    /// Register a live-backed account with a fresh shadow ledger the
    /// router settles from execution results. The shadow is a
    /// reconciliation target against venue-reported figures, not an
    /// enforced invariant.
    pub fn register_live_account(
        &self,
        id: AccountId,
        backend: Arc<dyn ExecutionBackend>,
        config: &Config,
    ) -> Arc<PositionLedger> {
        let ledger = Arc::new(PositionLedger::shadow());
        let risk = RiskGate::new(config.risk.clone(), config.session.clone());
        self.insert_account(id, BackendHandle::Live(backend), Arc::clone(&ledger), risk);
        ledger
    }

    pub fn remove_account(&self, id: &AccountId) -> Result<()> {
        let removed = self.accounts.write().remove(id);
        match removed {
            Some(entry) => {
                self.audit.record(AuditRecord::new(
                    id.as_str(),
                    AuditAction::AccountRemoved,
                    "ok",
                    json!({ "backend": entry.backend.name() }),
                ));
                Ok(())
            }
            None => Err(Error::UnknownAccount(id.to_string())),
        }
    }

    fn insert_account(
        &self,
        id: AccountId,
        backend: BackendHandle,
        ledger: Arc<PositionLedger>,
        risk: RiskGate,
    ) {
        let name = backend.name().to_string();
        let entry = Arc::new(AccountEntry {
            id: id.clone(),
            backend,
            ledger,
            risk,
            serial: Mutex::new(()),
        });
        self.accounts.write().insert(id.clone(), entry);
        info!(account = %id, backend = %name, "account registered");
        self.audit.record(AuditRecord::new(
            id.as_str(),
            AuditAction::AccountRegistered,
            "ok",
            json!({ "backend": name }),
        ));
    }

    fn resolve(&self, id: &AccountId) -> Result<Arc<AccountEntry>> {
        self.accounts
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownAccount(id.to_string()))
    }

    /// Route one order intent through the full pipeline.
    pub async fn route(
        &self,
        account_id: &AccountId,
        intent: &OrderIntent,
    ) -> Result<ExecutionResult> {
        if let Err(err) = intent.validate() {
            self.audit_order(account_id, AuditAction::OrderRejected, &err.to_string(), intent);
            return Err(err);
        }

        let entry = match self.resolve(account_id) {
            Ok(entry) => entry,
            Err(err) => {
                self.audit_order(account_id, AuditAction::OrderRejected, &err.to_string(), intent);
                return Err(err);
            }
        };

        // Serialize all order work for this account from here on.
        let _guard = entry.serial.lock().await;

        // Latest traded price: marks the ledger for valuation, and is the
        // risk reference for market orders. Limit orders fall back to
        // their own price when the source has nothing.
        let market_price = self.prices.last_price(&intent.symbol).await.ok();
        if let Some(price) = market_price {
            entry.ledger.mark(&intent.symbol, price);
        }
        let reference_price = match intent.limit_price.or(market_price) {
            Some(price) => price,
            None => {
                let err =
                    Error::BackendUnavailable(format!("no reference price for {}", intent.symbol));
                self.audit_order(account_id, AuditAction::OrderFailed, &err.to_string(), intent);
                return Err(err);
            }
        };

        let snapshot = entry.ledger.snapshot();
        match entry.risk.validate(intent, &snapshot, reference_price, Utc::now()) {
            Verdict::Rejected { reason } => {
                warn!(
                    account = %account_id,
                    symbol = %intent.symbol,
                    %reason,
                    "order rejected by risk gate"
                );
                self.audit_order(
                    account_id,
                    AuditAction::OrderRejected,
                    &reason.to_string(),
                    intent,
                );
                return Err(match reason {
                    RejectReason::Halted { reason } => Error::Halted { reason },
                    other => Error::RiskRejected(other),
                });
            }
            Verdict::Approved { warnings } => {
                for warning in warnings {
                    warn!(account = %account_id, symbol = %intent.symbol, %warning, "order flagged");
                }
            }
        }

        // Submit under a deadline. Past it, the order may or may not have
        // reached the venue: surface "unknown", never "not executed".
        let submit = entry.backend.as_backend().submit(intent);
        let result = match tokio::time::timeout(self.submit_timeout, submit).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                self.audit_order(account_id, AuditAction::OrderFailed, &err.to_string(), intent);
                return Err(err);
            }
            Err(_elapsed) => {
                let err = Error::UnknownOutcome {
                    order_ref: intent.idempotency_key.clone(),
                };
                self.audit_order(account_id, AuditAction::OrderFailed, &err.to_string(), intent);
                return Err(err);
            }
        };

        // Live fills settle into the shadow ledger here; the paper
        // backend already settled its own ledger inside submit.
        if let BackendHandle::Live(_) = entry.backend {
            if result.is_fill() {
                if let Some(price) = result.fill_price {
                    if let Err(err) = entry.ledger.apply_fill(
                        &intent.symbol,
                        intent.side,
                        result.fill_quantity,
                        price,
                    ) {
                        // The venue owns the truth for live accounts; a
                        // shadow-ledger miss is reconciliation drift, not
                        // a failed order.
                        error!(
                            account = %entry.id,
                            order_id = %result.order_id,
                            %err,
                            "shadow ledger could not absorb fill; reconcile against venue"
                        );
                    }
                }
            }
        }

        info!(
            account = %account_id,
            order_id = %result.order_id,
            status = %result.status,
            "order routed"
        );
        self.audit.record(AuditRecord::new(
            account_id.as_str(),
            AuditAction::OrderPlaced,
            result.status.to_string(),
            json!({
                "order_id": result.order_id,
                "symbol": intent.symbol.as_str(),
                "side": intent.side.to_string(),
                "quantity": intent.quantity,
                "fill_price": result.fill_price,
            }),
        ));
        Ok(result)
    }

    /// Cancel an order. Cancels skip the risk gate and go straight to the
    /// backend; a successful cancel is where any cash reserved at submit
    /// time would be released - neither built-in backend reserves.
    pub async fn route_cancel(
        &self,
        account_id: &AccountId,
        order_id: &str,
    ) -> Result<ExecutionResult> {
        let entry = self.resolve(account_id)?;

        match entry.backend.as_backend().cancel(order_id).await {
            Ok(result) => {
                self.audit.record(AuditRecord::new(
                    account_id.as_str(),
                    AuditAction::OrderCancelled,
                    result.status.to_string(),
                    json!({ "order_id": order_id }),
                ));
                Ok(result)
            }
            Err(err) => {
                self.audit.record(AuditRecord::new(
                    account_id.as_str(),
                    AuditAction::CancelRejected,
                    err.to_string(),
                    json!({ "order_id": order_id }),
                ));
                Err(err)
            }
        }
    }

    // ── Public operation surface ─────────────────────────────────────

    /// Submit with a wire-shaped response: accepted, rejected, or
    /// unknown - never an error value.
    pub async fn submit(&self, account_id: &AccountId, intent: &OrderIntent) -> SubmitResponse {
        match self.route(account_id, intent).await {
            Ok(result) => SubmitResponse {
                accepted: true,
                order_id: Some(result.order_id),
                reason: None,
                outcome_unknown: false,
            },
            Err(err) => SubmitResponse {
                accepted: false,
                order_id: None,
                outcome_unknown: matches!(err, Error::UnknownOutcome { .. }),
                reason: Some(err.to_string()),
            },
        }
    }

    pub async fn cancel(&self, account_id: &AccountId, order_id: &str) -> CancelResponse {
        match self.route_cancel(account_id, order_id).await {
            Ok(_) => CancelResponse {
                accepted: true,
                reason: None,
            },
            Err(err) => CancelResponse {
                accepted: false,
                reason: Some(err.to_string()),
            },
        }
    }

    /// Open positions as reported by the account's backend.
    pub async fn get_positions(&self, account_id: &AccountId) -> Result<Vec<PositionReport>> {
        let entry = self.resolve(account_id)?;
        entry.backend.as_backend().open_positions().await
    }

    pub fn get_risk_status(&self, account_id: &AccountId) -> Result<RiskStatusReport> {
        let entry = self.resolve(account_id)?;
        Ok(entry.risk.status(&entry.ledger.snapshot()))
    }

    /// Engage the kill switch for an account.
    pub fn activate_halt(
        &self,
        account_id: &AccountId,
        reason: impl Into<String>,
        actor: &str,
    ) -> Result<()> {
        let entry = self.resolve(account_id)?;
        let reason = reason.into();
        entry.risk.activate_halt(reason.clone());
        self.audit.record(AuditRecord::new(
            actor,
            AuditAction::HaltActivated,
            "ok",
            json!({ "account": account_id.as_str(), "reason": reason }),
        ));
        Ok(())
    }

    /// Release the kill switch. Returns false if the account was not
    /// halted.
    pub fn deactivate_halt(&self, account_id: &AccountId, actor: &str) -> Result<bool> {
        let entry = self.resolve(account_id)?;
        let released = entry.risk.deactivate_halt();
        self.audit.record(AuditRecord::new(
            actor,
            AuditAction::HaltDeactivated,
            if released { "ok" } else { "was not halted" },
            json!({ "account": account_id.as_str() }),
        ));
        Ok(released)
    }

    /// Paper account summary; answers only for paper-backed accounts.
    pub fn paper_summary(&self, account_id: &AccountId) -> Result<PaperSummary> {
        let entry = self.resolve(account_id)?;
        match entry.backend.paper() {
            Some(paper) => Ok(paper.summary()),
            None => Err(Error::InvalidState(format!(
                "account '{}' is not paper-backed",
                account_id
            ))),
        }
    }

    /// Reset a paper account to its starting capital.
    pub async fn paper_reset(&self, account_id: &AccountId) -> Result<PaperSummary> {
        let entry = self.resolve(account_id)?;
        let paper = entry.backend.paper().ok_or_else(|| {
            Error::InvalidState(format!("account '{}' is not paper-backed", account_id))
        })?;

        // Take the serial lock so a reset cannot interleave with a fill.
        let _guard = entry.serial.lock().await;
        paper.reset();
        self.audit.record(AuditRecord::new(
            account_id.as_str(),
            AuditAction::PaperReset,
            "ok",
            json!({}),
        ));
        Ok(paper.summary())
    }

    fn audit_order(
        &self,
        account_id: &AccountId,
        action: AuditAction,
        outcome: &str,
        intent: &OrderIntent,
    ) {
        self.audit.record(AuditRecord::new(
            account_id.as_str(),
            action,
            outcome,
            json!({
                "symbol": intent.symbol.as_str(),
                "side": intent.side.to_string(),
                "quantity": intent.quantity,
                "idempotency_key": intent.idempotency_key,
            }),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::backend::Credentials;
    use crate::core::config::Config;
    use crate::core::{
        Candle, CandleInterval, ExecutionStatus, Holding, OrderRecord, Side, Symbol, VenueTag,
    };
    use crate::price::StaticPriceSource;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// What the mock venue does with a submit.
    #[derive(Clone, Copy)]
    enum VenueMode {
        Fill,
        Reject,
        Hang,
    }

    struct MockVenue {
        mode: VenueMode,
        submits: AtomicUsize,
    }

    impl MockVenue {
        fn new(mode: VenueMode) -> Arc<Self> {
            Arc::new(Self {
                mode,
                submits: AtomicUsize::new(0),
            })
        }

        fn submit_count(&self) -> usize {
            self.submits.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExecutionBackend for MockVenue {
        fn name(&self) -> &str {
            "mock"
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn connect(&self, _credentials: &Credentials) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }

        async fn submit(&self, intent: &OrderIntent) -> Result<ExecutionResult> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                VenueMode::Fill => Ok(ExecutionResult {
                    order_id: format!("MOCK-{}", self.submit_count()),
                    status: ExecutionStatus::Filled,
                    fill_price: intent.limit_price,
                    fill_quantity: intent.quantity,
                    message: "filled".into(),
                }),
                VenueMode::Reject => {
                    Err(Error::BackendRejected("unknown symbol".into()))
                }
                VenueMode::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("submit deadline must fire first")
                }
            }
        }

        async fn cancel(&self, order_id: &str) -> Result<ExecutionResult> {
            Ok(ExecutionResult {
                order_id: order_id.to_string(),
                status: ExecutionStatus::Cancelled,
                fill_price: None,
                fill_quantity: 0,
                message: "cancelled".into(),
            })
        }

        async fn open_positions(&self) -> Result<Vec<PositionReport>> {
            Ok(Vec::new())
        }

        async fn holdings(&self) -> Result<Vec<Holding>> {
            Ok(Vec::new())
        }

        async fn todays_orders(&self) -> Result<Vec<OrderRecord>> {
            Ok(Vec::new())
        }

        async fn last_price(&self, _symbol: &Symbol) -> Result<Decimal> {
            Err(Error::BackendUnavailable("mock has no prices".into()))
        }

        async fn candles(
            &self,
            _symbol: &Symbol,
            _interval: CandleInterval,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<Candle>> {
            Ok(Vec::new())
        }
    }

    struct Harness {
        router: OrderRouter,
        audit: Arc<MemoryAuditSink>,
        prices: Arc<StaticPriceSource>,
        config: Config,
    }

    fn harness() -> Harness {
        let audit = Arc::new(MemoryAuditSink::new());
        let prices = Arc::new(StaticPriceSource::new());
        let config = Config::default();
        let router = OrderRouter::new(
            Arc::clone(&audit) as Arc<dyn AuditSink>,
            Arc::clone(&prices) as Arc<dyn PriceSource>,
            &config,
        );
        Harness {
            router,
            audit,
            prices,
            config,
        }
    }

    fn account(name: &str) -> AccountId {
        AccountId::new(name)
    }

    fn limit_buy(symbol: &str, qty: u64, price: Decimal, key: &str) -> OrderIntent {
        OrderIntent::limit(symbol, VenueTag::Nse, Side::Buy, qty, price, key)
    }

    #[tokio::test]
    async fn notional_breach_never_reaches_the_backend() {
        let h = harness();
        let venue = MockVenue::new(VenueMode::Fill);
        let id = account("live-1");
        h.router
            .register_live_account(id.clone(), venue.clone(), &h.config);

        // 50 x 2500 = 125_000, over the 100_000 cap.
        let err = h
            .router
            .route(&id, &limit_buy("RELIANCE", 50, dec!(2500), "k1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RiskRejected(RejectReason::OrderTooLarge { .. })));
        assert_eq!(venue.submit_count(), 0);
        assert_eq!(h.audit.count_action(AuditAction::OrderRejected), 1);
    }

    #[tokio::test]
    async fn halted_account_rejects_all_orders() {
        let h = harness();
        let venue = MockVenue::new(VenueMode::Fill);
        let id = account("live-2");
        h.router
            .register_live_account(id.clone(), venue.clone(), &h.config);
        h.router.activate_halt(&id, "manual stop", "operator").unwrap();

        for key in ["a", "b", "c"] {
            let err = h
                .router
                .route(&id, &limit_buy("TCS", 1, dec!(100), key))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Halted { .. }));
        }
        assert_eq!(venue.submit_count(), 0);

        // Manual deactivation reopens the gate.
        assert!(h.router.deactivate_halt(&id, "operator").unwrap());
        h.router
            .route(&id, &limit_buy("TCS", 1, dec!(100), "d"))
            .await
            .unwrap();
        assert_eq!(venue.submit_count(), 1);
    }

    #[tokio::test]
    async fn paper_pipeline_end_to_end() {
        let h = harness();
        let id = account("paper-1");
        let paper = h.router.register_paper_account(id.clone(), &h.config);
        paper.connect(&Credentials::default()).await.unwrap();

        let result = h
            .router
            .route(&id, &limit_buy("RELIANCE", 5, dec!(2500), "k1"))
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Filled);

        let summary = h.router.paper_summary(&id).unwrap();
        assert_eq!(summary.current_capital, dec!(87_500));
        assert_eq!(summary.open_positions, 1);

        // The backend settled its own ledger; the router must not have
        // applied the fill a second time.
        let positions = h.router.get_positions(&id).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, 5);

        assert_eq!(h.audit.count_action(AuditAction::OrderPlaced), 1);
    }

    #[tokio::test]
    async fn live_fill_settles_shadow_ledger() {
        let h = harness();
        let venue = MockVenue::new(VenueMode::Fill);
        let id = account("live-3");
        let ledger = h
            .router
            .register_live_account(id.clone(), venue.clone(), &h.config);

        h.router
            .route(&id, &limit_buy("TCS", 3, dec!(3000), "k1"))
            .await
            .unwrap();

        let snapshot = ledger.snapshot();
        let position = snapshot.position(&Symbol::new("TCS")).unwrap();
        assert_eq!(position.quantity, 3);
        assert_eq!(position.avg_price, dec!(3000));
    }

    #[tokio::test]
    async fn venue_rejection_is_distinct_and_audited() {
        let h = harness();
        let venue = MockVenue::new(VenueMode::Reject);
        let id = account("live-4");
        h.router
            .register_live_account(id.clone(), venue.clone(), &h.config);

        let err = h
            .router
            .route(&id, &limit_buy("TCS", 1, dec!(3000), "k1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendRejected(_)));
        assert!(!err.is_retryable());
        assert_eq!(h.audit.count_action(AuditAction::OrderFailed), 1);
    }

    #[tokio::test]
    async fn submit_deadline_yields_unknown_outcome() {
        let mut config = Config::default();
        config.router.submit_timeout_ms = 20;
        let audit = Arc::new(MemoryAuditSink::new());
        let prices = Arc::new(StaticPriceSource::new());
        let router = OrderRouter::new(
            Arc::clone(&audit) as Arc<dyn AuditSink>,
            prices as Arc<dyn PriceSource>,
            &config,
        );

        let venue = MockVenue::new(VenueMode::Hang);
        let id = account("live-5");
        router.register_live_account(id.clone(), venue.clone(), &config);

        let err = router
            .route(&id, &limit_buy("TCS", 1, dec!(3000), "retry-me"))
            .await
            .unwrap_err();
        match err {
            Error::UnknownOutcome { ref order_ref } => assert_eq!(order_ref, "retry-me"),
            other => panic!("expected unknown outcome, got {:?}", other),
        }
        assert!(err.is_retryable());
        assert_eq!(audit.count_action(AuditAction::OrderFailed), 1);
    }

    #[tokio::test]
    async fn concurrent_orders_cannot_jointly_breach_concentration() {
        let h = harness();
        let id = account("paper-2");
        let paper = h.router.register_paper_account(id.clone(), &h.config);
        paper.connect(&Credentials::default()).await.unwrap();

        // Each order alone is 12% of the 100_000 portfolio; together they
        // would be 24%, over the 20% cap. Exactly one may pass.
        let intent_c1 = limit_buy("RELIANCE", 6, dec!(2000), "c1");
        let intent_c2 = limit_buy("RELIANCE", 6, dec!(2000), "c2");
        let first = h.router.route(&id, &intent_c1);
        let second = h.router.route(&id, &intent_c2);
        let (first, second) = tokio::join!(first, second);

        let approvals = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(approvals, 1);
        let rejection = if first.is_err() { first } else { second };
        assert!(matches!(
            rejection.unwrap_err(),
            Error::RiskRejected(RejectReason::ConcentrationExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_intent_and_unknown_account() {
        let h = harness();
        let venue = MockVenue::new(VenueMode::Fill);
        let id = account("live-6");
        h.router
            .register_live_account(id.clone(), venue.clone(), &h.config);

        let zero = OrderIntent::market("TCS", VenueTag::Nse, Side::Buy, 0, "z");
        let err = h.router.route(&id, &zero).await.unwrap_err();
        assert!(matches!(err, Error::InvalidIntent(_)));
        assert_eq!(venue.submit_count(), 0);

        let err = h
            .router
            .route(&account("ghost"), &limit_buy("TCS", 1, dec!(100), "k"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAccount(_)));
    }

    #[tokio::test]
    async fn market_order_without_price_source_fails_unavailable() {
        let h = harness();
        let venue = MockVenue::new(VenueMode::Fill);
        let id = account("live-7");
        h.router
            .register_live_account(id.clone(), venue.clone(), &h.config);

        let intent = OrderIntent::market("TCS", VenueTag::Nse, Side::Buy, 1, "m1");
        let err = h.router.route(&id, &intent).await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
        assert_eq!(venue.submit_count(), 0);

        // With a price the same order routes.
        h.prices.set("TCS", dec!(3000));
        h.router.route(&id, &intent).await.unwrap();
        assert_eq!(venue.submit_count(), 1);
    }

    #[tokio::test]
    async fn submit_wrapper_shapes_outcomes() {
        let h = harness();
        let id = account("paper-3");
        let paper = h.router.register_paper_account(id.clone(), &h.config);
        paper.connect(&Credentials::default()).await.unwrap();

        let response = h
            .router
            .submit(&id, &limit_buy("RELIANCE", 5, dec!(2500), "w1"))
            .await;
        assert!(response.accepted);
        assert!(response.order_id.is_some());

        h.router.activate_halt(&id, "stop", "operator").unwrap();
        let response = h
            .router
            .submit(&id, &limit_buy("RELIANCE", 1, dec!(2500), "w2"))
            .await;
        assert!(!response.accepted);
        assert!(!response.outcome_unknown);
        assert!(response.reason.unwrap().contains("halted"));
    }

    #[tokio::test]
    async fn cancel_goes_straight_to_backend() {
        let h = harness();
        let venue = MockVenue::new(VenueMode::Fill);
        let id = account("live-8");
        h.router
            .register_live_account(id.clone(), venue.clone(), &h.config);

        // Cancels bypass the risk gate: even a halted account may cancel.
        h.router.activate_halt(&id, "stop", "operator").unwrap();
        let response = h.router.cancel(&id, "MOCK-1").await;
        assert!(response.accepted);
        assert_eq!(h.audit.count_action(AuditAction::OrderCancelled), 1);
    }

    #[tokio::test]
    async fn paper_operations_require_paper_backing() {
        let h = harness();
        let venue = MockVenue::new(VenueMode::Fill);
        let id = account("live-9");
        h.router
            .register_live_account(id.clone(), venue, &h.config);

        assert!(matches!(
            h.router.paper_summary(&id),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            h.router.paper_reset(&id).await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn paper_reset_via_router() {
        let h = harness();
        let id = account("paper-4");
        let paper = h.router.register_paper_account(id.clone(), &h.config);
        paper.connect(&Credentials::default()).await.unwrap();

        h.router
            .route(&id, &limit_buy("RELIANCE", 5, dec!(2500), "k1"))
            .await
            .unwrap();
        let summary = h.router.paper_reset(&id).await.unwrap();
        assert_eq!(summary.current_capital, dec!(100_000));
        assert_eq!(summary.total_trades, 0);
        assert_eq!(h.audit.count_action(AuditAction::PaperReset), 1);
    }

    #[tokio::test]
    async fn risk_status_reflects_account_state() {
        let h = harness();
        let id = account("paper-5");
        let paper = h.router.register_paper_account(id.clone(), &h.config);
        paper.connect(&Credentials::default()).await.unwrap();

        h.router
            .route(&id, &limit_buy("RELIANCE", 5, dec!(2500), "k1"))
            .await
            .unwrap();

        let status = h.router.get_risk_status(&id).unwrap();
        assert!(!status.halted);
        assert_eq!(status.open_positions, 1);
        assert_eq!(status.trades_today, 1);
        assert_eq!(status.max_daily_loss, dec!(5000));

        h.router.activate_halt(&id, "maintenance", "operator").unwrap();
        let status = h.router.get_risk_status(&id).unwrap();
        assert!(status.halted);
        assert_eq!(status.halt_reason.as_deref(), Some("maintenance"));
    }

    #[tokio::test]
    async fn remove_account_forgets_it() {
        let h = harness();
        let id = account("paper-6");
        h.router.register_paper_account(id.clone(), &h.config);

        h.router.remove_account(&id).unwrap();
        assert!(matches!(
            h.router.remove_account(&id),
            Err(Error::UnknownAccount(_))
        ));
        let err = h
            .router
            .route(&id, &limit_buy("TCS", 1, dec!(100), "k"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAccount(_)));
    }
}
