pub mod billing;
mod error;
pub mod health;
pub mod keys;
pub mod messages;
pub mod webhooks;

#[cfg(all(test, feature = "database-sqlite"))]
mod tests;

pub use error::ApiError;

use crate::{AppState, services::Services};

/// Database-backed services, or 503 when running without a database.
fn services(state: &AppState) -> Result<&Services, ApiError> {
    state.services.as_ref().ok_or(ApiError::DatabaseRequired)
}
