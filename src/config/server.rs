use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use axum::http::{HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use super::ConfigError;

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request body size limit in bytes. Applies to webhooks as well.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Timeout in seconds for outbound calls to payment providers.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// How long to wait for in-flight background work on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub security_headers: SecurityHeadersConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            timeout_secs: default_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            cors: CorsConfig::default(),
            security_headers: SecurityHeadersConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.body_limit_bytes == 0 {
            return Err(ConfigError::Validation(
                "server.body_limit_bytes must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_timeout() -> u64 {
    30
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Cross-origin access for browser clients.
///
/// ```toml
/// [server.cors]
/// allowed_origins = ["https://dashboard.example.com"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `["*"]` allows any origin. An empty list allows none.
    #[serde(default = "default_cors_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_cors_methods")]
    pub allowed_methods: Vec<String>,

    #[serde(default = "default_cors_headers")]
    pub allowed_headers: Vec<String>,

    /// How long browsers may cache a preflight answer.
    #[serde(default = "default_cors_max_age")]
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: default_cors_origins(),
            allowed_methods: default_cors_methods(),
            allowed_headers: default_cors_headers(),
            max_age_secs: default_cors_max_age(),
        }
    }
}

impl CorsConfig {
    /// The CORS layer, or `None` when disabled. Entries that do not parse
    /// are skipped with a warning.
    pub fn layer(&self) -> Option<CorsLayer> {
        if !self.enabled {
            return None;
        }

        let origin = if self.allowed_origins.iter().any(|o| o == "*") {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(parse_all::<HeaderValue>(&self.allowed_origins, "origin"))
        };

        Some(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(AllowMethods::list(parse_all::<Method>(
                    &self.allowed_methods,
                    "method",
                )))
                .allow_headers(AllowHeaders::list(parse_all::<HeaderName>(
                    &self.allowed_headers,
                    "header",
                )))
                .max_age(Duration::from_secs(self.max_age_secs)),
        )
    }
}

fn parse_all<T: std::str::FromStr>(values: &[String], kind: &str) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| {
            let parsed = value.parse().ok();
            if parsed.is_none() {
                tracing::warn!(kind, value = %value, "Ignoring invalid CORS entry");
            }
            parsed
        })
        .collect()
}

/// Response headers added to every answer.
///
/// Each header can be switched off by setting it to an empty string.
/// `Strict-Transport-Security` is only sent when the request arrived over
/// HTTPS, as seen directly or through `X-Forwarded-Proto`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityHeadersConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_content_type_options")]
    pub content_type_options: String,

    #[serde(default = "default_frame_options")]
    pub frame_options: String,

    #[serde(default = "default_xss_protection")]
    pub xss_protection: String,

    #[serde(default = "default_csp")]
    pub content_security_policy: String,

    #[serde(default = "default_referrer_policy")]
    pub referrer_policy: String,

    #[serde(default = "default_permissions_policy")]
    pub permissions_policy: String,

    /// `max-age` for HSTS. Unset disables the header.
    #[serde(default)]
    pub hsts_max_age_secs: Option<u64>,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            content_type_options: default_content_type_options(),
            frame_options: default_frame_options(),
            xss_protection: default_xss_protection(),
            content_security_policy: default_csp(),
            referrer_policy: default_referrer_policy(),
            permissions_policy: default_permissions_policy(),
            hsts_max_age_secs: None,
        }
    }
}

impl SecurityHeadersConfig {
    /// Header name and value pairs to set, skipping disabled entries.
    pub fn headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        [
            ("x-content-type-options", &self.content_type_options),
            ("x-frame-options", &self.frame_options),
            ("x-xss-protection", &self.xss_protection),
            ("content-security-policy", &self.content_security_policy),
            ("referrer-policy", &self.referrer_policy),
            ("permissions-policy", &self.permissions_policy),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .filter_map(|(name, value)| {
            Some((
                HeaderName::from_static(name),
                HeaderValue::try_from(value.as_str()).ok()?,
            ))
        })
        .collect()
    }

    pub fn hsts(&self) -> Option<HeaderValue> {
        let max_age = self.hsts_max_age_secs?;
        HeaderValue::try_from(format!("max-age={max_age}; includeSubDomains")).ok()
    }
}

fn default_true() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_cors_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
        .map(String::from)
        .to_vec()
}

fn default_cors_headers() -> Vec<String> {
    ["Content-Type", "Authorization", "X-API-Key"]
        .map(String::from)
        .to_vec()
}

fn default_cors_max_age() -> u64 {
    86_400
}

fn default_content_type_options() -> String {
    "nosniff".into()
}

fn default_frame_options() -> String {
    "DENY".into()
}

fn default_xss_protection() -> String {
    "1; mode=block".into()
}

fn default_csp() -> String {
    "default-src 'self'".into()
}

fn default_referrer_policy() -> String {
    "strict-origin-when-cross-origin".into()
}

fn default_permissions_policy() -> String {
    "geolocation=(), microphone=(), camera=()".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_headers_skip_empty_values() {
        let config = SecurityHeadersConfig {
            xss_protection: String::new(),
            ..Default::default()
        };
        let names: Vec<_> = config
            .headers()
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect();
        assert!(names.contains(&"x-frame-options".to_string()));
        assert!(!names.contains(&"x-xss-protection".to_string()));
        assert!(config.hsts().is_none());
    }

    #[test]
    fn test_hsts_value() {
        let config = SecurityHeadersConfig {
            hsts_max_age_secs: Some(31_536_000),
            ..Default::default()
        };
        assert_eq!(
            config.hsts().unwrap(),
            "max-age=31536000; includeSubDomains"
        );
    }

    #[test]
    fn test_disabled_cors_has_no_layer() {
        let config = CorsConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(config.layer().is_none());
        assert!(CorsConfig::default().layer().is_some());
    }
}
