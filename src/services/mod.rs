mod api_keys;
pub mod billing;
pub mod quota;

use std::sync::Arc;

pub use api_keys::{ApiKeyError, ApiKeyService, ApiKeyView, CreatedApiKey};
pub use billing::{
    BillingError, BillingHistory, BillingService, CurrentBill, GenerationReport, OverdueReport,
    UsageReport,
};
pub use quota::{QuotaDecision, QuotaLimiter, QuotaOutcome};

use crate::{config::TollgateConfig, db::DbPool};

/// Container for the database-backed services.
#[derive(Clone)]
pub struct Services {
    pub api_keys: ApiKeyService,
    pub billing: BillingService,
}

impl Services {
    pub fn new(db: Arc<DbPool>, config: &TollgateConfig) -> Self {
        Self {
            api_keys: ApiKeyService::new(db.clone(), config.auth.api_key_prefix.clone()),
            billing: BillingService::new(db, config.billing.clone()),
        }
    }
}
