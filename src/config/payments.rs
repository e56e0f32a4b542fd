use rust_decimal::{Decimal, dec};
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Payment provider configuration.
///
/// A provider that is not configured rejects its webhooks with 401 and
/// cannot be chosen when initiating a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentsConfig {
    /// Largest difference between the amount a provider reports and the
    /// cycle total that is accepted without a warning.
    #[serde(default = "default_amount_tolerance")]
    pub amount_tolerance: Decimal,

    /// Public URL of the dashboard, used for checkout redirect targets.
    #[serde(default = "default_app_url")]
    pub app_url: String,

    #[serde(default)]
    pub stripe: Option<StripeConfig>,

    #[serde(default)]
    pub paystack: Option<PaystackConfig>,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: default_amount_tolerance(),
            app_url: default_app_url(),
            stripe: None,
            paystack: None,
        }
    }
}

impl PaymentsConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.amount_tolerance.is_sign_negative() {
            return Err(ConfigError::Validation(
                "payments.amount_tolerance cannot be negative".into(),
            ));
        }
        url::Url::parse(&self.app_url).map_err(|e| {
            ConfigError::Validation(format!("payments.app_url is not a valid URL: {e}"))
        })?;
        if let Some(stripe) = &self.stripe
            && stripe.webhook_secret.is_empty()
        {
            return Err(ConfigError::Validation(
                "payments.stripe.webhook_secret cannot be empty".into(),
            ));
        }
        if let Some(paystack) = &self.paystack
            && paystack.secret_key.is_empty()
        {
            return Err(ConfigError::Validation(
                "payments.paystack.secret_key cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Stripe Checkout and webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StripeConfig {
    /// Secret API key (`sk_...`) used to create Checkout Sessions.
    pub secret_key: String,

    /// Endpoint signing secret (`whsec_...`).
    pub webhook_secret: String,

    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,

    /// Maximum age of a signed webhook timestamp, in seconds.
    #[serde(default = "default_timestamp_tolerance")]
    pub timestamp_tolerance_secs: i64,

    #[serde(default = "default_stripe_currency")]
    pub currency: String,
}

/// Paystack transaction and webhook settings. Webhooks are signed with the
/// secret key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaystackConfig {
    pub secret_key: String,

    #[serde(default = "default_paystack_api_base")]
    pub api_base: String,

    #[serde(default = "default_paystack_currency")]
    pub currency: String,
}

fn default_amount_tolerance() -> Decimal {
    dec!(0.01)
}

fn default_app_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_timestamp_tolerance() -> i64 {
    300
}

fn default_stripe_currency() -> String {
    "usd".to_string()
}

fn default_paystack_api_base() -> String {
    "https://api.paystack.co".to_string()
}

fn default_paystack_currency() -> String {
    "NGN".to_string()
}
