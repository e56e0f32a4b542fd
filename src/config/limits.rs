use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::models::Plan;

/// Per-tenant request quotas.
///
/// The effective limit for a tenant is, in order: the tenant's own
/// `rate_limit_per_minute` column, the plan override below, then
/// `requests_per_minute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Global default quota per window.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Window width in seconds. Windows are aligned to multiples of this
    /// value since the Unix epoch.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Optional per-plan quotas.
    #[serde(default)]
    pub plans: PlanLimits,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            window_secs: default_window_secs(),
            plans: PlanLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanLimits {
    #[serde(default)]
    pub free: Option<u32>,
    #[serde(default)]
    pub starter: Option<u32>,
    #[serde(default)]
    pub pro: Option<u32>,
}

impl LimitsConfig {
    /// Resolve the quota for a tenant.
    pub fn limit_for(&self, plan: Plan, tenant_override: Option<u32>) -> u32 {
        let plan_limit = match plan {
            Plan::Free => self.plans.free,
            Plan::Starter => self.plans.starter,
            Plan::Pro => self.plans.pro,
        };
        tenant_override
            .or(plan_limit)
            .unwrap_or(self.requests_per_minute)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.requests_per_minute == 0 {
            return Err(ConfigError::Validation(
                "limits.requests_per_minute must be greater than 0".into(),
            ));
        }
        if self.window_secs == 0 {
            return Err(ConfigError::Validation(
                "limits.window_secs must be greater than 0".into(),
            ));
        }
        let plans = [
            ("free", self.plans.free),
            ("starter", self.plans.starter),
            ("pro", self.plans.pro),
        ];
        for (name, limit) in plans {
            if limit == Some(0) {
                return Err(ConfigError::Validation(format!(
                    "limits.plans.{name} must be greater than 0"
                )));
            }
        }
        Ok(())
    }
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_window_secs() -> u64 {
    60
}
