//! Provider webhook payloads, reduced to what reconciliation needs.

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::Provider;

const STRIPE_CHECKOUT_COMPLETED: &str = "checkout.session.completed";
const PAYSTACK_CHARGE_SUCCESS: &str = "charge.success";

#[derive(Debug, thiserror::Error)]
#[error("Malformed {provider} webhook payload: {source}")]
pub struct EventParseError {
    pub provider: Provider,
    #[source]
    pub source: serde_json::Error,
}

/// A verified webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    Succeeded(PaymentSucceeded),
    /// Any event other than a completed payment.
    Other { event_type: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSucceeded {
    pub provider: Provider,
    /// Provider-side identifier (session id or transaction reference).
    pub reference: Option<String>,
    /// `None` when the metadata is missing or not a UUID.
    pub billing_cycle_id: Option<Uuid>,
    /// Amount paid in major currency units.
    pub amount: Option<Decimal>,
}

impl PaymentEvent {
    pub fn parse(provider: Provider, body: &[u8]) -> Result<Self, EventParseError> {
        match provider {
            Provider::Stripe => parse_stripe(body),
            Provider::Paystack => parse_paystack(body),
        }
        .map_err(|source| EventParseError { provider, source })
    }
}

#[derive(Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<StripeEventData>,
}

#[derive(Deserialize)]
struct StripeEventData {
    object: StripeCheckoutSession,
}

#[derive(Deserialize)]
struct StripeCheckoutSession {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

fn parse_stripe(body: &[u8]) -> Result<PaymentEvent, serde_json::Error> {
    let event: StripeEvent = serde_json::from_slice(body)?;
    let session = match event.data {
        Some(data) if event.event_type == STRIPE_CHECKOUT_COMPLETED => data.object,
        _ => {
            return Ok(PaymentEvent::Other {
                event_type: event.event_type,
            });
        }
    };
    // Delayed payment methods complete the session before the money arrives.
    if session.payment_status.as_deref() == Some("unpaid") {
        return Ok(PaymentEvent::Other {
            event_type: format!("{STRIPE_CHECKOUT_COMPLETED} (unpaid)"),
        });
    }

    Ok(PaymentEvent::Succeeded(PaymentSucceeded {
        provider: Provider::Stripe,
        reference: session.id,
        billing_cycle_id: cycle_id_from(&session.metadata),
        amount: session.amount_total.map(|cents| Decimal::new(cents, 2)),
    }))
}

#[derive(Deserialize)]
struct PaystackEvent {
    event: String,
    #[serde(default)]
    data: Option<PaystackCharge>,
}

#[derive(Deserialize)]
struct PaystackCharge {
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    status: Option<String>,
    /// An object, or the same object serialized as a string, depending on
    /// how the transaction was initialised.
    #[serde(default)]
    metadata: serde_json::Value,
}

fn parse_paystack(body: &[u8]) -> Result<PaymentEvent, serde_json::Error> {
    let event: PaystackEvent = serde_json::from_slice(body)?;
    let charge = match event.data {
        Some(data) if event.event == PAYSTACK_CHARGE_SUCCESS => data,
        _ => {
            return Ok(PaymentEvent::Other {
                event_type: event.event,
            });
        }
    };
    if charge.status.as_deref().is_some_and(|s| s != "success") {
        return Ok(PaymentEvent::Other {
            event_type: format!("{PAYSTACK_CHARGE_SUCCESS} ({})", charge.status.unwrap_or_default()),
        });
    }

    let metadata = match charge.metadata {
        serde_json::Value::Object(map) => map,
        serde_json::Value::String(s) => serde_json::from_str(&s).unwrap_or_default(),
        _ => serde_json::Map::new(),
    };

    Ok(PaymentEvent::Succeeded(PaymentSucceeded {
        provider: Provider::Paystack,
        reference: charge.reference,
        billing_cycle_id: cycle_id_from(&metadata),
        amount: charge.amount.map(|kobo| Decimal::new(kobo, 2)),
    }))
}

fn cycle_id_from(metadata: &serde_json::Map<String, serde_json::Value>) -> Option<Uuid> {
    metadata
        .get("billing_cycle_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}
