mod error;
mod identity;
pub mod jwt;
mod last_used;

pub use error::AuthError;
pub use identity::{
    API_KEY_HEADER, IdentityResolver, Principal, TenantContext, api_key_header, bearer_token,
};
pub use jwt::JwtVerifier;
pub use last_used::{LAST_USED_QUEUE_CAPACITY, LastUsedUpdater};
