mod api_key;
mod api_key_gen;
mod billing;
mod organization;
mod usage;
mod user;

pub use api_key::*;
pub use api_key_gen::*;
pub use billing::*;
pub use organization::*;
pub use usage::*;
pub use user::*;
