mod api_keys;
mod billing_cycles;
mod common;
mod organizations;
mod usage;
mod users;

pub use api_keys::SqliteApiKeyRepo;
pub use billing_cycles::SqliteBillingCycleRepo;
pub use organizations::SqliteOrganizationRepo;
pub use usage::SqliteUsageRepo;
pub use users::SqliteUserRepo;
