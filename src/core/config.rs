//! Configuration - type-safe, validated config

use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::error::{Error, Result};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pre-trade risk limits
    pub risk: RiskLimits,

    /// Trading session window
    pub session: SessionHours,

    /// Simulated (paper) backend settings
    pub paper: PaperConfig,

    /// Router settings
    pub router: RouterConfig,
}

/// The configured risk limits consulted on every order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Max single-order notional in account currency
    pub max_order_notional: Decimal,

    /// Max cumulative daily loss before the automatic halt
    pub max_daily_loss: Decimal,

    /// Max concurrent open positions
    pub max_open_positions: usize,

    /// Max single-position share of portfolio value (percent, 1-100)
    pub max_concentration_pct: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_order_notional: dec!(100_000),
            max_daily_loss: dec!(5_000),
            max_open_positions: 10,
            max_concentration_pct: dec!(20),
        }
    }
}

/// Permitted trading-hours window, expressed in the venue's local time.
///
/// The session check is advisory by default - a flagged order is warned
/// about, not blocked; set `enforce` to turn it into a hard rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionHours {
    pub open: NaiveTime,
    pub close: NaiveTime,

    /// Offset of the venue's local time from UTC, in minutes (IST = +330)
    pub utc_offset_minutes: i32,

    /// Hard-block orders outside the window instead of warning
    pub enforce: bool,
}

impl Default for SessionHours {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
            utc_offset_minutes: 330,
            enforce: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Starting virtual capital for a fresh paper ledger
    pub starting_capital: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_capital: dec!(100_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Deadline for a single backend submit call, in milliseconds.
    /// Past it the outcome is treated as unknown, never as unexecuted.
    pub submit_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            submit_timeout_ms: 10_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            risk: RiskLimits::default(),
            session: SessionHours::default(),
            paper: PaperConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

impl Config {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Sanity-check limit values before anything trades against them.
    pub fn validate(&self) -> Result<()> {
        if self.risk.max_order_notional <= Decimal::ZERO {
            return Err(Error::Config("max_order_notional must be positive".into()));
        }
        if self.risk.max_daily_loss <= Decimal::ZERO {
            return Err(Error::Config("max_daily_loss must be positive".into()));
        }
        if self.risk.max_open_positions == 0 {
            return Err(Error::Config("max_open_positions must be at least 1".into()));
        }
        if self.risk.max_concentration_pct <= Decimal::ZERO
            || self.risk.max_concentration_pct > dec!(100)
        {
            return Err(Error::Config(
                "max_concentration_pct must be within (0, 100]".into(),
            ));
        }
        if self.paper.starting_capital <= Decimal::ZERO {
            return Err(Error::Config("starting_capital must be positive".into()));
        }
        if self.session.open >= self.session.close {
            return Err(Error::Config("session open must precede close".into()));
        }
        Ok(())
    }
}
