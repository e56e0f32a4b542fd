//! Plan pricing.
//!
//! All arithmetic is done in [`Decimal`]; amounts are never converted to
//! floating point. Results keep the full scale of the configured rates
//! (`99 + 3 × 0.005 = 99.015`), so repeated computation over the same inputs
//! is bit-for-bit identical.

use rust_decimal::{Decimal, dec};
use serde::{Deserialize, Serialize};

use crate::models::Plan;

/// Pricing table for every plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    #[serde(default = "default_free")]
    pub free: FreePlanPricing,

    #[serde(default = "default_starter")]
    pub starter: PlanPricing,

    #[serde(default = "default_pro")]
    pub pro: PlanPricing,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            free: default_free(),
            starter: default_starter(),
            pro: default_pro(),
        }
    }
}

/// Free tier: an allowance of free requests, then a flat rate on the excess.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FreePlanPricing {
    pub included_requests: i64,
    pub per_request: Decimal,
}

/// Paid tiers: a base fee plus a rate applied to every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PlanPricing {
    pub base_fee: Decimal,
    pub per_request: Decimal,
}

impl PlanPricing {
    fn amount(&self, requests: i64) -> Decimal {
        self.base_fee + Decimal::from(requests) * self.per_request
    }
}

impl PricingConfig {
    /// Amount owed for `requests` admitted requests on `plan`.
    ///
    /// Negative request counts are treated as zero.
    pub fn amount_for(&self, plan: Plan, requests: i64) -> Decimal {
        let requests = requests.max(0);
        match plan {
            Plan::Free => {
                let billable = requests - self.free.included_requests;
                if billable <= 0 {
                    Decimal::ZERO
                } else {
                    Decimal::from(billable) * self.free.per_request
                }
            }
            Plan::Starter => self.starter.amount(requests),
            Plan::Pro => self.pro.amount(requests),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.free.included_requests < 0 {
            return Err("billing.pricing.free.included_requests cannot be negative".into());
        }
        let rates = [
            ("free.per_request", self.free.per_request),
            ("starter.base_fee", self.starter.base_fee),
            ("starter.per_request", self.starter.per_request),
            ("pro.base_fee", self.pro.base_fee),
            ("pro.per_request", self.pro.per_request),
        ];
        for (name, value) in rates {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(format!("billing.pricing.{name} cannot be negative"));
            }
        }
        Ok(())
    }
}

fn default_free() -> FreePlanPricing {
    FreePlanPricing {
        included_requests: 1000,
        per_request: dec!(0.01),
    }
}

fn default_starter() -> PlanPricing {
    PlanPricing {
        base_fee: dec!(29),
        per_request: dec!(0.01),
    }
}

fn default_pro() -> PlanPricing {
    PlanPricing {
        base_fee: dec!(99),
        per_request: dec!(0.005),
    }
}
