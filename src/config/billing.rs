use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::pricing::PricingConfig;

/// Billing engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Per-plan pricing.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Days after `period_end` before a pending cycle becomes overdue.
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: u32,

    /// Days past the due date after which an overdue tenant is reported as a
    /// suspension candidate.
    #[serde(default = "default_suspension_threshold_days")]
    pub suspension_threshold_days: u32,

    /// Tenants loaded per page during cycle generation.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Background scheduler.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            pricing: PricingConfig::default(),
            grace_period_days: default_grace_period_days(),
            suspension_threshold_days: default_suspension_threshold_days(),
            page_size: default_page_size(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl BillingConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        self.pricing.validate().map_err(ConfigError::Validation)?;
        if self.page_size == 0 {
            return Err(ConfigError::Validation(
                "billing.page_size must be greater than 0".into(),
            ));
        }
        if self.scheduler.daily_sweep_hour > 23 {
            return Err(ConfigError::Validation(
                "billing.scheduler.daily_sweep_hour must be between 0 and 23".into(),
            ));
        }
        Ok(())
    }
}

/// When the billing sweeps run. All times are UTC.
///
/// Monthly generation (followed by the $0 auto-pay sweep) fires at 00:00 on
/// the 1st; the overdue sweep fires daily at `daily_sweep_hour`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_daily_sweep_hour")]
    pub daily_sweep_hour: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_sweep_hour: default_daily_sweep_hour(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_grace_period_days() -> u32 {
    7
}

fn default_suspension_threshold_days() -> u32 {
    30
}

fn default_page_size() -> u32 {
    100
}

fn default_daily_sweep_hour() -> u32 {
    2
}
