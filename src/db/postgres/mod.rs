mod api_keys;
mod billing_cycles;
mod common;
mod organizations;
mod usage;
mod users;

pub use api_keys::PostgresApiKeyRepo;
pub use billing_cycles::PostgresBillingCycleRepo;
pub use organizations::PostgresOrganizationRepo;
pub use usage::PostgresUsageRepo;
pub use users::PostgresUserRepo;
