//! Webhook reconciliation: verify, parse, locate the cycle, mark it paid.
//!
//! Only verification can fail the request. Everything after it is logged
//! and acknowledged, because providers retry non-2xx deliveries and a
//! payload that cannot be resolved now will not resolve on retry either.

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{
    PaymentEvent, Provider, WebhookError,
    events::PaymentSucceeded,
    signature::{self, PAYSTACK_SIGNATURE_HEADER, STRIPE_SIGNATURE_HEADER},
};
use crate::{
    config::PaymentsConfig,
    db::{DbError, DbPool},
    models::BillingStatus,
    observability::metrics,
};

/// What happened to a verified webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Not a payment-success event.
    Ignored { event_type: String },
    /// Malformed payload, or no cycle matches its metadata.
    Unresolvable { reason: String },
    /// Replay of an event for a cycle that is already paid.
    AlreadyPaid { cycle_id: Uuid },
    Paid { cycle_id: Uuid, amount_mismatch: bool },
    /// The store failed while applying the event.
    Failed { cycle_id: Uuid },
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Ignored { .. } => "ignored",
            ReconcileOutcome::Unresolvable { .. } => "unresolvable",
            ReconcileOutcome::AlreadyPaid { .. } => "duplicate",
            ReconcileOutcome::Paid { .. } => "paid",
            ReconcileOutcome::Failed { .. } => "error",
        }
    }
}

pub struct PaymentReconciler {
    db: Arc<DbPool>,
    config: PaymentsConfig,
}

impl PaymentReconciler {
    pub fn new(db: Arc<DbPool>, config: PaymentsConfig) -> Self {
        Self { db, config }
    }

    /// Check the provider's signature header over the raw body.
    pub fn verify(
        &self,
        provider: Provider,
        headers: &HeaderMap,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        let header_name = match provider {
            Provider::Stripe => STRIPE_SIGNATURE_HEADER,
            Provider::Paystack => PAYSTACK_SIGNATURE_HEADER,
        };
        let header = headers
            .get(header_name)
            .ok_or(WebhookError::MissingSignature)?
            .to_str()
            .map_err(|_| WebhookError::InvalidSignature)?;

        match provider {
            Provider::Stripe => {
                let stripe = self
                    .config
                    .stripe
                    .as_ref()
                    .ok_or(WebhookError::NotConfigured)?;
                signature::verify_stripe(
                    header,
                    body,
                    &stripe.webhook_secret,
                    stripe.timestamp_tolerance_secs,
                    now.timestamp(),
                )
            }
            Provider::Paystack => {
                let paystack = self
                    .config
                    .paystack
                    .as_ref()
                    .ok_or(WebhookError::NotConfigured)?;
                signature::verify_paystack(header, body, &paystack.secret_key)
            }
        }
    }

    pub async fn handle(
        &self,
        provider: Provider,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<ReconcileOutcome, WebhookError> {
        self.handle_at(provider, headers, body, Utc::now()).await
    }

    /// Verify then apply. An `Err` means the webhook must be rejected.
    #[tracing::instrument(skip_all, fields(provider = %provider))]
    pub async fn handle_at(
        &self,
        provider: Provider,
        headers: &HeaderMap,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, WebhookError> {
        if let Err(e) = self.verify(provider, headers, body, now) {
            tracing::warn!(error = %e, "Rejected webhook");
            metrics::record_webhook(provider.as_str(), "rejected");
            return Err(e);
        }

        let outcome = match PaymentEvent::parse(provider, body) {
            Ok(event) => self.apply(event, now).await,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable webhook payload");
                ReconcileOutcome::Unresolvable {
                    reason: e.to_string(),
                }
            }
        };
        metrics::record_webhook(provider.as_str(), outcome.label());
        Ok(outcome)
    }

    /// Apply a verified event. Never fails; store errors become `Failed`.
    pub async fn apply(&self, event: PaymentEvent, now: DateTime<Utc>) -> ReconcileOutcome {
        let payment = match event {
            PaymentEvent::Other { event_type } => {
                tracing::debug!(%event_type, "Ignoring webhook event");
                return ReconcileOutcome::Ignored { event_type };
            }
            PaymentEvent::Succeeded(payment) => payment,
        };

        let Some(cycle_id) = payment.billing_cycle_id else {
            tracing::warn!(
                reference = ?payment.reference,
                "Payment webhook without a billing cycle id"
            );
            return ReconcileOutcome::Unresolvable {
                reason: "missing billing_cycle_id".into(),
            };
        };

        match self.mark_paid(cycle_id, &payment, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    billing_cycle_id = %cycle_id,
                    "Failed to apply payment"
                );
                ReconcileOutcome::Failed { cycle_id }
            }
        }
    }

    async fn mark_paid(
        &self,
        cycle_id: Uuid,
        payment: &PaymentSucceeded,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, DbError> {
        let repo = self.db.billing_cycles();
        let Some(cycle) = repo.get_by_id(cycle_id).await? else {
            tracing::warn!(billing_cycle_id = %cycle_id, "Billing cycle not found for payment");
            return Ok(ReconcileOutcome::Unresolvable {
                reason: format!("billing cycle {cycle_id} not found"),
            });
        };

        if cycle.status == BillingStatus::Paid {
            tracing::info!(billing_cycle_id = %cycle_id, "Duplicate payment webhook");
            return Ok(ReconcileOutcome::AlreadyPaid { cycle_id });
        }

        let tolerance = self.config.amount_tolerance;
        let amount_mismatch = payment
            .amount
            .is_some_and(|paid| exceeds_tolerance(paid, cycle.total_amount, tolerance));
        if amount_mismatch {
            tracing::warn!(
                billing_cycle_id = %cycle_id,
                expected = %cycle.total_amount,
                paid = ?payment.amount,
                "Payment amount mismatch"
            );
        }

        // A concurrent delivery may have won the transition.
        if !repo.mark_paid(cycle_id, now).await? {
            return Ok(ReconcileOutcome::AlreadyPaid { cycle_id });
        }

        tracing::info!(
            billing_cycle_id = %cycle_id,
            organization_id = %cycle.organization_id,
            provider = %payment.provider,
            amount = ?payment.amount,
            "Billing cycle paid"
        );
        Ok(ReconcileOutcome::Paid {
            cycle_id,
            amount_mismatch,
        })
    }
}

fn exceeds_tolerance(paid: Decimal, expected: Decimal, tolerance: Decimal) -> bool {
    (paid - expected).abs() > tolerance
}

#[cfg(test)]
mod tests {
    use rust_decimal::dec;

    use super::*;

    #[test]
    fn test_tolerance_boundary() {
        assert!(!exceeds_tolerance(dec!(29.10), dec!(29.10), dec!(0.01)));
        assert!(!exceeds_tolerance(dec!(29.11), dec!(29.10), dec!(0.01)));
        assert!(!exceeds_tolerance(dec!(29.09), dec!(29.10), dec!(0.01)));
        assert!(exceeds_tolerance(dec!(29.12), dec!(29.10), dec!(0.01)));
        assert!(exceeds_tolerance(dec!(0), dec!(29.10), dec!(0.01)));
    }

    #[test]
    fn test_outcome_labels() {
        let id = Uuid::nil();
        assert_eq!(ReconcileOutcome::AlreadyPaid { cycle_id: id }.label(), "duplicate");
        assert_eq!(
            ReconcileOutcome::Paid {
                cycle_id: id,
                amount_mismatch: true
            }
            .label(),
            "paid"
        );
        assert_eq!(ReconcileOutcome::Failed { cycle_id: id }.label(), "error");
    }

    #[cfg(feature = "database-sqlite")]
    mod sqlite {
        use axum::http::HeaderValue;
        use serde_json::json;

        use super::*;
        use crate::{
            config::{PaystackConfig, StripeConfig},
            db::tests::harness,
            models::{BillingPeriod, CreateBillingCycle, Plan},
            payments::signature::{sign_paystack, sign_stripe},
        };

        const WHSEC: &str = "whsec_test";
        const PAYSTACK_KEY: &str = "sk_test_paystack";

        fn config() -> PaymentsConfig {
            PaymentsConfig {
                stripe: Some(StripeConfig {
                    secret_key: "sk_test".into(),
                    webhook_secret: WHSEC.into(),
                    api_base: "http://localhost".into(),
                    timestamp_tolerance_secs: 300,
                    currency: "usd".into(),
                }),
                paystack: Some(PaystackConfig {
                    secret_key: PAYSTACK_KEY.into(),
                    api_base: "http://localhost".into(),
                    currency: "NGN".into(),
                }),
                ..Default::default()
            }
        }

        async fn setup(amount: Decimal) -> (Arc<DbPool>, PaymentReconciler, Uuid) {
            let db = Arc::new(harness::sqlite_db().await);
            let org = harness::seed_org(&db, Plan::Starter).await;
            let cycle = db
                .billing_cycles()
                .create(CreateBillingCycle {
                    organization_id: org.id,
                    period: BillingPeriod::for_month(2025, 1).unwrap(),
                    total_requests: 10,
                    total_amount: amount,
                })
                .await
                .unwrap();
            let reconciler = PaymentReconciler::new(Arc::clone(&db), config());
            (db, reconciler, cycle.id)
        }

        fn stripe_body(cycle_id: Uuid, cents: i64) -> Vec<u8> {
            json!({
                "id": "evt_1",
                "type": "checkout.session.completed",
                "data": {"object": {
                    "id": "cs_1",
                    "amount_total": cents,
                    "payment_status": "paid",
                    "metadata": {"billing_cycle_id": cycle_id.to_string()}
                }}
            })
            .to_string()
            .into_bytes()
        }

        fn stripe_headers(body: &[u8], now: DateTime<Utc>) -> HeaderMap {
            let mut headers = HeaderMap::new();
            headers.insert(
                STRIPE_SIGNATURE_HEADER,
                HeaderValue::from_str(&sign_stripe(body, WHSEC, now.timestamp())).unwrap(),
            );
            headers
        }

        #[tokio::test]
        async fn test_replayed_webhook_pays_once() {
            let (db, reconciler, cycle_id) = setup(dec!(29.10)).await;
            let now = Utc::now();
            let body = stripe_body(cycle_id, 2910);
            let headers = stripe_headers(&body, now);

            let first = reconciler
                .handle_at(Provider::Stripe, &headers, &body, now)
                .await
                .unwrap();
            assert_eq!(
                first,
                ReconcileOutcome::Paid {
                    cycle_id,
                    amount_mismatch: false
                }
            );
            let paid_at = db
                .billing_cycles()
                .get_by_id(cycle_id)
                .await
                .unwrap()
                .unwrap()
                .paid_at;

            let later = now + chrono::Duration::seconds(30);
            let second = reconciler
                .handle_at(Provider::Stripe, &headers, &body, later)
                .await
                .unwrap();
            assert_eq!(second, ReconcileOutcome::AlreadyPaid { cycle_id });

            let cycle = db.billing_cycles().get_by_id(cycle_id).await.unwrap().unwrap();
            assert_eq!(cycle.status, BillingStatus::Paid);
            assert_eq!(cycle.paid_at, paid_at);
        }

        #[tokio::test]
        async fn test_bad_signature_is_rejected_and_nothing_changes() {
            let (db, reconciler, cycle_id) = setup(dec!(29.10)).await;
            let now = Utc::now();
            let body = stripe_body(cycle_id, 2910);
            let headers = stripe_headers(b"{\"other\":true}", now);

            let err = reconciler
                .handle_at(Provider::Stripe, &headers, &body, now)
                .await
                .unwrap_err();
            assert!(matches!(err, WebhookError::InvalidSignature));

            let err = reconciler
                .handle_at(Provider::Stripe, &HeaderMap::new(), &body, now)
                .await
                .unwrap_err();
            assert!(matches!(err, WebhookError::MissingSignature));

            let cycle = db.billing_cycles().get_by_id(cycle_id).await.unwrap().unwrap();
            assert_eq!(cycle.status, BillingStatus::Pending);
        }

        #[tokio::test]
        async fn test_amount_mismatch_still_pays() {
            let (db, reconciler, cycle_id) = setup(dec!(29.10)).await;
            let now = Utc::now();
            let body = stripe_body(cycle_id, 2000);
            let outcome = reconciler
                .handle_at(Provider::Stripe, &stripe_headers(&body, now), &body, now)
                .await
                .unwrap();
            assert_eq!(
                outcome,
                ReconcileOutcome::Paid {
                    cycle_id,
                    amount_mismatch: true
                }
            );
            let cycle = db.billing_cycles().get_by_id(cycle_id).await.unwrap().unwrap();
            assert_eq!(cycle.status, BillingStatus::Paid);
        }

        #[tokio::test]
        async fn test_unknown_cycle_is_acknowledged() {
            let (_db, reconciler, _) = setup(dec!(1)).await;
            let now = Utc::now();
            let body = stripe_body(Uuid::new_v4(), 100);
            let outcome = reconciler
                .handle_at(Provider::Stripe, &stripe_headers(&body, now), &body, now)
                .await
                .unwrap();
            assert!(matches!(outcome, ReconcileOutcome::Unresolvable { .. }));
        }

        #[tokio::test]
        async fn test_other_event_is_ignored() {
            let (db, reconciler, cycle_id) = setup(dec!(1)).await;
            let now = Utc::now();
            let body = json!({"type": "payment_intent.created", "data": {"object": {}}})
                .to_string()
                .into_bytes();
            let outcome = reconciler
                .handle_at(Provider::Stripe, &stripe_headers(&body, now), &body, now)
                .await
                .unwrap();
            assert!(matches!(outcome, ReconcileOutcome::Ignored { .. }));
            let cycle = db.billing_cycles().get_by_id(cycle_id).await.unwrap().unwrap();
            assert_eq!(cycle.status, BillingStatus::Pending);
        }

        #[tokio::test]
        async fn test_paystack_pays_overdue_cycle() {
            let (db, reconciler, cycle_id) = setup(dec!(5000)).await;
            db.billing_cycles().mark_overdue(cycle_id).await.unwrap();

            let body = json!({
                "event": "charge.success",
                "data": {
                    "reference": "INV_x_y",
                    "amount": 500000,
                    "status": "success",
                    "metadata": {"billing_cycle_id": cycle_id.to_string()}
                }
            })
            .to_string()
            .into_bytes();
            let mut headers = HeaderMap::new();
            headers.insert(
                PAYSTACK_SIGNATURE_HEADER,
                HeaderValue::from_str(&sign_paystack(&body, PAYSTACK_KEY)).unwrap(),
            );

            let outcome = reconciler
                .handle_at(Provider::Paystack, &headers, &body, Utc::now())
                .await
                .unwrap();
            assert_eq!(
                outcome,
                ReconcileOutcome::Paid {
                    cycle_id,
                    amount_mismatch: false
                }
            );
        }

        #[tokio::test]
        async fn test_unconfigured_provider_rejects() {
            let db = Arc::new(harness::sqlite_db().await);
            let reconciler = PaymentReconciler::new(db, PaymentsConfig::default());
            let mut headers = HeaderMap::new();
            headers.insert(PAYSTACK_SIGNATURE_HEADER, HeaderValue::from_static("00"));
            let err = reconciler
                .handle(Provider::Paystack, &headers, b"{}")
                .await
                .unwrap_err();
            assert!(matches!(err, WebhookError::NotConfigured));
        }
    }
}
