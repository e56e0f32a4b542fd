//! Payment providers: checkout initiation and webhook reconciliation.

mod checkout;
mod error;
mod events;
mod reconciler;
pub mod signature;

use std::{fmt, str::FromStr};

pub use checkout::{
    CheckoutError, CheckoutRequest, CheckoutService, CheckoutSession, PaystackClient,
    StripeClient, to_minor_units,
};
pub use error::{PaymentError, WebhookError};
pub use events::{EventParseError, PaymentEvent, PaymentSucceeded};
pub use reconciler::{PaymentReconciler, ReconcileOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Stripe,
    Paystack,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Stripe => "stripe",
            Provider::Paystack => "paystack",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(Provider::Stripe),
            "paystack" => Ok(Provider::Paystack),
            other => Err(format!("unknown payment provider '{other}'")),
        }
    }
}
