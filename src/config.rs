use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;

use crate::gateway::GatewayConfig;

/// Engine-wide settings.
///
/// Defaults match the production deployment; every value can be overridden
/// through `GIGPAY_*` environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Percentage of the booking price retained by the platform.
    pub platform_fee_percent: Decimal,
    /// Maximum allowed difference between the callback amount and the
    /// stored charge amount.
    pub amount_tolerance: Decimal,
    /// A pending charge older than this is treated as expired and a new
    /// payment session may be initiated.
    pub pending_charge_ttl_hours: i64,
    /// Where the gateway redirects the payer after the hosted page.
    pub return_url: String,
    /// Where the gateway POSTs its signed callback.
    pub callback_url: String,
    pub gateway: GatewayConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            platform_fee_percent: dec!(10),
            amount_tolerance: dec!(0.01),
            pending_charge_ttl_hours: 24,
            return_url: "https://app.gigpay.example/payments/return".to_string(),
            callback_url: "https://app.gigpay.example/payments/callback".to_string(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Settings {
    /// Loads settings from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(fee) = env_decimal("GIGPAY_PLATFORM_FEE_PERCENT") {
            settings.platform_fee_percent = fee;
        }
        if let Some(tolerance) = env_decimal("GIGPAY_AMOUNT_TOLERANCE") {
            settings.amount_tolerance = tolerance;
        }
        if let Ok(ttl) = env::var("GIGPAY_PENDING_CHARGE_TTL_HOURS")
            && let Ok(hours) = ttl.parse()
        {
            settings.pending_charge_ttl_hours = hours;
        }
        if let Ok(url) = env::var("GIGPAY_RETURN_URL") {
            settings.return_url = url;
        }
        if let Ok(url) = env::var("GIGPAY_CALLBACK_URL") {
            settings.callback_url = url;
        }
        if let Ok(secret) = env::var("GIGPAY_GATEWAY_SECRET") {
            settings.gateway.secret = secret;
        }
        if let Ok(url) = env::var("GIGPAY_GATEWAY_PAYMENT_URL") {
            settings.gateway.payment_page_url = url;
        }
        if let Ok(currency) = env::var("GIGPAY_CURRENCY") {
            settings.gateway.currency = currency;
        }

        settings
    }

    /// Platform fee owed for a given booking price.
    pub fn platform_fee(&self, total_price: Decimal) -> Decimal {
        total_price * self.platform_fee_percent / dec!(100)
    }
}

fn env_decimal(key: &str) -> Option<Decimal> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
