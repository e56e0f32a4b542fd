use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Credential verification settings.
///
/// Dashboard routes accept `Authorization: Bearer <jwt>` signed with
/// `jwt_secret`; programmatic routes accept `X-API-Key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Shared HS256 secret for dashboard tokens. Dashboard routes reject
    /// every request while this is unset.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Allowed clock skew when checking `exp`, in seconds.
    #[serde(default = "default_leeway")]
    pub jwt_leeway_secs: u64,

    /// Prefix for newly generated API keys.
    #[serde(default = "default_key_prefix")]
    pub api_key_prefix: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_leeway_secs: default_leeway(),
            api_key_prefix: default_key_prefix(),
        }
    }
}

impl AuthConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(secret) = &self.jwt_secret
            && secret.is_empty()
        {
            return Err(ConfigError::Validation(
                "auth.jwt_secret cannot be empty; omit it to disable dashboard routes".into(),
            ));
        }
        if self.api_key_prefix.is_empty()
            || !self
                .api_key_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::Validation(
                "auth.api_key_prefix must be non-empty and contain only [A-Za-z0-9_]".into(),
            ));
        }
        Ok(())
    }
}

fn default_leeway() -> u64 {
    30
}

fn default_key_prefix() -> String {
    "sk_live_".to_string()
}
