//! Starting a payment for a billing cycle with Stripe Checkout or a Paystack
//! transaction.

use std::sync::Arc;

use reqwest::Client;
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PaymentError, Provider};
use crate::{
    auth::TenantContext,
    config::{PaymentsConfig, PaystackConfig, StripeConfig},
    db::{DbError, DbPool},
    models::{BillingCycle, BillingStatus},
};

/// Convert a major-unit amount to the provider's minor units (cents, kobo).
pub fn to_minor_units(amount: Decimal) -> Result<i64, PaymentError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .filter(|minor| *minor >= 0)
        .ok_or(PaymentError::InvalidAmount(amount))
}

/// Everything a provider needs to bill one cycle.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub organization_id: Uuid,
    pub billing_cycle_id: Uuid,
    pub amount: Decimal,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Transaction reference: `INV_<org8>_<cycle8>`.
    pub fn reference(&self) -> String {
        let org = self.organization_id.simple().to_string();
        let cycle = self.billing_cycle_id.simple().to_string();
        format!("INV_{}_{}", &org[..8], &cycle[..8])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSession {
    pub provider: Provider,
    pub payment_url: String,
    pub reference: String,
}

#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    config: StripeConfig,
}

#[derive(Deserialize)]
struct StripeSessionResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorBody,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    message: String,
}

impl StripeClient {
    pub fn new(http: Client, config: StripeConfig) -> Self {
        Self { http, config }
    }

    /// Create a one-line-item Checkout Session in payment mode.
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let unit_amount = to_minor_units(request.amount)?;
        let cycle_id = request.billing_cycle_id.to_string();
        let form = [
            ("mode", "payment".to_string()),
            (
                "line_items[0][price_data][currency]",
                self.config.currency.clone(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                "API Usage".to_string(),
            ),
            (
                "line_items[0][price_data][product_data][description]",
                format!("Invoice #{cycle_id}"),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                unit_amount.to_string(),
            ),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("customer_email", request.customer_email.clone()),
            ("client_reference_id", cycle_id.clone()),
            ("metadata[billing_cycle_id]", cycle_id),
            (
                "metadata[organization_id]",
                request.organization_id.to_string(),
            ),
        ];

        let url = format!(
            "{}/v1/checkout/sessions",
            self.config.api_base.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<StripeErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            return Err(PaymentError::Api(message));
        }

        let session: StripeSessionResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        let payment_url = session
            .url
            .ok_or_else(|| PaymentError::InvalidResponse("session has no url".into()))?;

        tracing::debug!(session_id = %session.id, "Created Stripe checkout session");
        Ok(CheckoutSession {
            provider: Provider::Stripe,
            payment_url,
            reference: session.id,
        })
    }
}

#[derive(Clone)]
pub struct PaystackClient {
    http: Client,
    config: PaystackConfig,
}

#[derive(Serialize)]
struct PaystackInitialize<'a> {
    email: &'a str,
    amount: i64,
    currency: &'a str,
    reference: &'a str,
    callback_url: &'a str,
    metadata: PaystackMetadata,
}

#[derive(Serialize)]
struct PaystackMetadata {
    organization_id: String,
    billing_cycle_id: String,
}

#[derive(Deserialize)]
struct PaystackResponse {
    status: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<PaystackAuthorization>,
}

#[derive(Deserialize)]
struct PaystackAuthorization {
    authorization_url: String,
    reference: String,
}

impl PaystackClient {
    pub fn new(http: Client, config: PaystackConfig) -> Self {
        Self { http, config }
    }

    pub async fn initialize_transaction(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let reference = request.reference();
        let body = PaystackInitialize {
            email: &request.customer_email,
            amount: to_minor_units(request.amount)?,
            currency: &self.config.currency,
            reference: &reference,
            callback_url: &request.success_url,
            metadata: PaystackMetadata {
                organization_id: request.organization_id.to_string(),
                billing_cycle_id: request.billing_cycle_id.to_string(),
            },
        };

        let url = format!(
            "{}/transaction/initialize",
            self.config.api_base.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let parsed: PaystackResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(format!("HTTP {status}: {e}")))?;
        if !parsed.status {
            return Err(PaymentError::Api(parsed.message));
        }
        let data = parsed
            .data
            .ok_or_else(|| PaymentError::InvalidResponse("missing data".into()))?;

        tracing::debug!(reference = %data.reference, "Initialized Paystack transaction");
        Ok(CheckoutSession {
            provider: Provider::Paystack,
            payment_url: data.authorization_url,
            reference: data.reference,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Billing cycle not found")]
    CycleNotFound,

    #[error("You don't have permission to pay this invoice")]
    PermissionDenied,

    #[error("This invoice has already been paid")]
    AlreadyPaid,

    #[error("Payment provider '{0}' is not available")]
    ProviderUnavailable(Provider),

    #[error("Organization not found")]
    OrganizationNotFound,

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// The initiate-payment flow: ownership and status checks, then a provider
/// call.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    stripe: Option<StripeClient>,
    paystack: Option<PaystackClient>,
    app_url: String,
}

impl CheckoutService {
    pub fn new(db: Arc<DbPool>, http: Client, config: &PaymentsConfig) -> Self {
        Self {
            db,
            stripe: config
                .stripe
                .clone()
                .map(|c| StripeClient::new(http.clone(), c)),
            paystack: config
                .paystack
                .clone()
                .map(|c| PaystackClient::new(http, c)),
            app_url: config.app_url.trim_end_matches('/').to_string(),
        }
    }

    #[tracing::instrument(skip(self, ctx), fields(org_id = %ctx.organization_id))]
    pub async fn initiate(
        &self,
        ctx: &TenantContext,
        cycle_id: Uuid,
        provider: Provider,
    ) -> Result<(BillingCycle, CheckoutSession), CheckoutError> {
        let cycle = self
            .db
            .billing_cycles()
            .get_by_id(cycle_id)
            .await?
            .ok_or(CheckoutError::CycleNotFound)?;
        if cycle.organization_id != ctx.organization_id {
            return Err(CheckoutError::PermissionDenied);
        }
        if cycle.status == BillingStatus::Paid {
            return Err(CheckoutError::AlreadyPaid);
        }

        let org = self
            .db
            .organizations()
            .get_by_id(ctx.organization_id)
            .await?
            .ok_or(CheckoutError::OrganizationNotFound)?;

        let request = CheckoutRequest {
            organization_id: org.id,
            billing_cycle_id: cycle.id,
            amount: cycle.total_amount,
            customer_email: org.email,
            success_url: format!("{}/billing/success?cycle={}", self.app_url, cycle.id),
            cancel_url: format!("{}/billing/cancel?cycle={}", self.app_url, cycle.id),
        };

        let session = match provider {
            Provider::Stripe => {
                let client = self
                    .stripe
                    .as_ref()
                    .ok_or(CheckoutError::ProviderUnavailable(provider))?;
                client.create_checkout_session(&request).await?
            }
            Provider::Paystack => {
                let client = self
                    .paystack
                    .as_ref()
                    .ok_or(CheckoutError::ProviderUnavailable(provider))?;
                client.initialize_transaction(&request).await?
            }
        };

        tracing::info!(
            billing_cycle_id = %cycle.id,
            %provider,
            reference = %session.reference,
            "Payment initiated"
        );
        Ok((cycle, session))
    }
}
