//! Engine configuration.

use chrono::Duration;
use coursepay_core::DailyLimitPolicy;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Refund window length in hours (default: 168 = 7 days).
    pub refund_window_hours: i64,

    /// Platform fee rate in basis points (default: 3000 = 30%).
    pub fee_rate_bps: u32,

    /// Per-user daily cash spending cap in minor units (default: 1,000,000).
    pub daily_cash_cap: i64,

    /// Per-user daily cookie spending cap (default: 100,000).
    pub daily_cookie_cap: i64,

    /// Payment gateway capture timeout in seconds (default: 10).
    pub gateway_timeout_seconds: u64,

    /// Maximum holds released per sweep pass (default: 500).
    pub sweep_batch_size: usize,

    /// Interval between background sweep passes in seconds (default: 60).
    pub sweep_interval_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refund_window_hours: 168,
            fee_rate_bps: 3_000,
            daily_cash_cap: 1_000_000,
            daily_cookie_cap: 100_000,
            gateway_timeout_seconds: 10,
            sweep_batch_size: 500,
            sweep_interval_seconds: 60,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            refund_window_hours: env_parse("REFUND_WINDOW_HOURS", defaults.refund_window_hours),
            fee_rate_bps: env_parse("FEE_RATE_BPS", defaults.fee_rate_bps),
            daily_cash_cap: env_parse("DAILY_CASH_CAP", defaults.daily_cash_cap),
            daily_cookie_cap: env_parse("DAILY_COOKIE_CAP", defaults.daily_cookie_cap),
            gateway_timeout_seconds: env_parse(
                "GATEWAY_TIMEOUT_SECONDS",
                defaults.gateway_timeout_seconds,
            ),
            sweep_batch_size: env_parse("SWEEP_BATCH_SIZE", defaults.sweep_batch_size),
            sweep_interval_seconds: env_parse(
                "SWEEP_INTERVAL_SECONDS",
                defaults.sweep_interval_seconds,
            ),
        }
    }

    /// The refund window as a duration.
    #[must_use]
    pub fn refund_window(&self) -> Duration {
        Duration::hours(self.refund_window_hours)
    }

    /// The daily spending limit policy.
    #[must_use]
    pub const fn limit_policy(&self) -> DailyLimitPolicy {
        DailyLimitPolicy {
            cash_cap: self.daily_cash_cap,
            cookie_cap: self.daily_cookie_cap,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
