mod auth;
mod pipeline;
mod recovery;
mod request_id;
mod security_headers;

pub use auth::jwt_auth_middleware;
pub use pipeline::{
    QuotaExceeded, RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER, RATE_LIMIT_RESET_HEADER,
    api_key_auth_middleware, api_key_pipeline, insert_quota_headers,
};
pub use recovery::panic_response;
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use security_headers::security_headers_middleware;
