//! Risk gate - pre-trade validation and the emergency-halt state machine.
//!
//! Every order passes through [`RiskGate::validate`] before a backend is
//! touched. Checks run in a fixed order and short-circuit on the first
//! failure, so a rejection always names the first limit it hit. The gate
//! owns only its halt state and limits; ledger state arrives as an
//! explicit snapshot per call.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::config::{RiskLimits, SessionHours};
use crate::core::{OrderIntent, RejectReason, Side};
use crate::ledger::LedgerSnapshot;

/// Halt state machine. `Halted -> Active` happens only through
/// [`RiskGate::deactivate_halt`]; there is no automatic recovery, so a
/// loss-making strategy can never silently re-enable itself.
#[derive(Debug, Clone)]
pub enum HaltState {
    Active,
    Halted {
        reason: String,
        since: DateTime<Utc>,
    },
}

impl HaltState {
    pub fn is_halted(&self) -> bool {
        matches!(self, HaltState::Halted { .. })
    }
}

/// Outcome of a validation. An order is either approved (possibly with
/// advisory warnings attached) or rejected with one reason - never
/// approved with an ignored violation.
#[derive(Debug, Clone)]
pub enum Verdict {
    Approved { warnings: Vec<String> },
    Rejected { reason: RejectReason },
}

impl Verdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, Verdict::Approved { .. })
    }
}

/// Current gate status, served to callers alongside a ledger snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RiskStatusReport {
    pub halted: bool,
    pub halt_reason: Option<String>,
    pub halted_since: Option<DateTime<Utc>>,
    pub max_order_notional: Decimal,
    pub max_daily_loss: Decimal,
    pub max_open_positions: usize,
    pub max_concentration_pct: Decimal,
    pub daily_pnl: Decimal,
    pub daily_loss_remaining: Decimal,
    pub trades_today: usize,
    pub open_positions: usize,
}

/// Pre-trade safety gate for one account.
pub struct RiskGate {
    limits: RiskLimits,
    session: SessionHours,
    halt: RwLock<HaltState>,
}

impl RiskGate {
    pub fn new(limits: RiskLimits, session: SessionHours) -> Self {
        Self {
            limits,
            session,
            halt: RwLock::new(HaltState::Active),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn is_halted(&self) -> bool {
        self.halt.read().is_halted()
    }

    /// Run the ordered pre-trade checks against a ledger snapshot.
    ///
    /// `reference_price` is the limit price for limit orders and the last
    /// traded price otherwise; `now` is passed in so the session check is
    /// deterministic for callers and tests alike.
    pub fn validate(
        &self,
        intent: &OrderIntent,
        snapshot: &LedgerSnapshot,
        reference_price: Decimal,
        now: DateTime<Utc>,
    ) -> Verdict {
        // 1. Halt check
        if let HaltState::Halted { reason, .. } = &*self.halt.read() {
            return Verdict::Rejected {
                reason: RejectReason::Halted {
                    reason: reason.clone(),
                },
            };
        }

        // 2. Single-order notional
        let notional = intent.notional(reference_price);
        if notional > self.limits.max_order_notional {
            return Verdict::Rejected {
                reason: RejectReason::OrderTooLarge {
                    notional,
                    limit: self.limits.max_order_notional,
                },
            };
        }

        // 3. Daily loss: realized plus mark-to-market losses. Crossing the
        // limit also trips the halt, so every later order short-circuits
        // at check 1 with the recorded reason.
        let daily_pnl = daily_pnl(snapshot);
        if daily_pnl <= -self.limits.max_daily_loss {
            let loss = -daily_pnl;
            self.halt_once(format!(
                "daily loss {} reached limit {}",
                loss, self.limits.max_daily_loss
            ));
            return Verdict::Rejected {
                reason: RejectReason::DailyLossBreached {
                    loss,
                    limit: self.limits.max_daily_loss,
                },
            };
        }

        // 4. Concurrent positions: only an opening order (buying a symbol
        // not currently held) can add one.
        let opens_position = intent.side == Side::Buy && !snapshot.holds(&intent.symbol);
        if opens_position && snapshot.open_positions() + 1 > self.limits.max_open_positions {
            return Verdict::Rejected {
                reason: RejectReason::TooManyPositions {
                    current: snapshot.open_positions(),
                    limit: self.limits.max_open_positions,
                },
            };
        }

        // 5. Concentration of the resulting position. Exactly at the limit
        // passes; one rupee over does not.
        if intent.side == Side::Buy {
            let portfolio = snapshot.portfolio_value();
            if portfolio > Decimal::ZERO {
                let existing = snapshot
                    .position(&intent.symbol)
                    .map(|p| p.notional())
                    .unwrap_or(Decimal::ZERO);
                let resulting = existing + notional;
                let cap = portfolio * self.limits.max_concentration_pct / Decimal::from(100);
                if resulting > cap {
                    return Verdict::Rejected {
                        reason: RejectReason::ConcentrationExceeded {
                            notional: resulting,
                            portfolio,
                            limit_pct: self.limits.max_concentration_pct,
                        },
                    };
                }
            }
        }

        // 6. Session hours: advisory unless configured to enforce.
        let mut warnings = Vec::new();
        if let Some(detail) = self.outside_session(now) {
            if self.session.enforce {
                return Verdict::Rejected {
                    reason: RejectReason::OutsideSessionHours { detail },
                };
            }
            warnings.push(format!("outside trading hours: {}", detail));
        }

        Verdict::Approved { warnings }
    }

    /// Manually engage the kill switch.
    pub fn activate_halt(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut halt = self.halt.write();
        if halt.is_halted() {
            return;
        }
        warn!(%reason, "kill switch ACTIVATED - all trading halted");
        *halt = HaltState::Halted {
            reason,
            since: Utc::now(),
        };
    }

    /// The only path back to trading. Returns false if the gate was not
    /// halted.
    pub fn deactivate_halt(&self) -> bool {
        let mut halt = self.halt.write();
        if !halt.is_halted() {
            return false;
        }
        info!("kill switch deactivated - trading resumed");
        *halt = HaltState::Active;
        true
    }

    pub fn status(&self, snapshot: &LedgerSnapshot) -> RiskStatusReport {
        let (halted, halt_reason, halted_since) = match &*self.halt.read() {
            HaltState::Active => (false, None, None),
            HaltState::Halted { reason, since } => (true, Some(reason.clone()), Some(*since)),
        };
        let daily_pnl = daily_pnl(snapshot);

        RiskStatusReport {
            halted,
            halt_reason,
            halted_since,
            max_order_notional: self.limits.max_order_notional,
            max_daily_loss: self.limits.max_daily_loss,
            max_open_positions: self.limits.max_open_positions,
            max_concentration_pct: self.limits.max_concentration_pct,
            daily_pnl,
            daily_loss_remaining: (self.limits.max_daily_loss + daily_pnl).max(Decimal::ZERO),
            trades_today: snapshot.trade_count,
            open_positions: snapshot.open_positions(),
        }
    }

    /// Automatic transition, recorded once: an already-halted gate keeps
    /// its original reason and timestamp.
    fn halt_once(&self, reason: String) {
        let mut halt = self.halt.write();
        if halt.is_halted() {
            return;
        }
        warn!(%reason, "kill switch AUTO-ACTIVATED");
        *halt = HaltState::Halted {
            reason,
            since: Utc::now(),
        };
    }

    /// None when inside the session window, else a description of why the
    /// current time is outside it.
    fn outside_session(&self, now: DateTime<Utc>) -> Option<String> {
        let local = now + Duration::minutes(self.session.utc_offset_minutes as i64);
        let weekday = local.weekday();
        if matches!(weekday, chrono::Weekday::Sat | chrono::Weekday::Sun) {
            return Some("market closed on weekends".into());
        }
        let time: NaiveTime = local.time();
        if time < self.session.open || time > self.session.close {
            return Some(format!(
                "session window {} - {}, current {}",
                self.session.open.format("%H:%M"),
                self.session.close.format("%H:%M"),
                time.format("%H:%M"),
            ));
        }
        None
    }
}

/// Realized P&L plus the loss-making side of unrealized P&L. Paper gains
/// on open positions never offset booked losses here.
fn daily_pnl(snapshot: &LedgerSnapshot) -> Decimal {
    let unrealized_losses: Decimal = snapshot
        .positions
        .iter()
        .map(|p| p.unrealized_pnl.min(Decimal::ZERO))
        .sum();
    snapshot.realized_pnl + unrealized_losses
}
