//! Webhook signature verification.
//!
//! Stripe signs `"{t}.{body}"` with HMAC-SHA256 and sends
//! `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`. Paystack signs the
//! raw body with HMAC-SHA512 keyed by the account secret and sends the hex
//! digest in `X-Paystack-Signature`. Digests are compared in constant time.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

use super::WebhookError;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";
pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Verify a `Stripe-Signature` header against `payload`.
///
/// Any `v1` entry may match; multiple entries appear while a secret is being
/// rolled. The timestamp must be within `tolerance_secs` of `now`.
pub fn verify_stripe(
    header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::InvalidSignature)?;
    if signatures.is_empty() {
        return Err(WebhookError::InvalidSignature);
    }
    if (now - timestamp).abs() > tolerance_secs {
        tracing::debug!(timestamp, now, "Stripe webhook timestamp outside tolerance");
        return Err(WebhookError::InvalidSignature);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let expected = mac.finalize().into_bytes();

    let matched = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| bool::from(bytes.as_slice().ct_eq(expected.as_slice())))
            .unwrap_or(false)
    });
    if matched {
        Ok(())
    } else {
        Err(WebhookError::InvalidSignature)
    }
}

/// Verify an `X-Paystack-Signature` header against `payload`.
pub fn verify_paystack(header: &str, payload: &[u8], secret: &str) -> Result<(), WebhookError> {
    let provided = hex::decode(header.trim()).map_err(|_| WebhookError::InvalidSignature)?;
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    if bool::from(provided.as_slice().ct_eq(expected.as_slice())) {
        Ok(())
    } else {
        Err(WebhookError::InvalidSignature)
    }
}

/// Produce a valid `Stripe-Signature` header. Test helper.
#[cfg(test)]
pub fn sign_stripe(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Produce a valid `X-Paystack-Signature` header. Test helper.
#[cfg(test)]
pub fn sign_paystack(payload: &[u8], secret: &str) -> String {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}
