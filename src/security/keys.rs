//! Rate-limit key derivation.
//!
//! # Design Decisions
//! - Keys are namespaced (`ip:`, `key:`, `user:`, `service:`) so identities of
//!   different kinds never collide
//! - A missing header falls back to the client IP, then to `anonymous`

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const SERVICE_NAME_HEADER: &str = "x-service-name";

/// Who is calling, as far as admission control is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub ip: Option<IpAddr>,
    pub api_key: Option<String>,
    pub user_id: Option<String>,
    pub service_name: Option<String>,
}

impl RequestIdentity {
    pub fn from_ip(ip: IpAddr) -> Self {
        Self {
            ip: Some(ip),
            ..Default::default()
        }
    }

    /// Read identity headers. Empty header values are treated as absent.
    pub fn from_headers(headers: &HeaderMap, ip: Option<IpAddr>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            ip,
            api_key: header(API_KEY_HEADER),
            user_id: header(USER_ID_HEADER),
            service_name: header(SERVICE_NAME_HEADER),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    fn ip_key(&self) -> String {
        match self.ip {
            Some(ip) => format!("ip:{}", ip),
            None => "anonymous".to_string(),
        }
    }
}

/// Custom key function.
pub type KeyFn = Arc<dyn Fn(&RequestIdentity) -> String + Send + Sync>;

/// How a limiter turns an identity into a bucket key.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    #[default]
    Ip,
    ApiKey,
    UserId,
    ServiceName,
    #[serde(skip)]
    Custom(KeyFn),
}

impl KeyStrategy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&RequestIdentity) -> String + Send + Sync + 'static,
    {
        KeyStrategy::Custom(Arc::new(f))
    }

    pub fn key_for(&self, identity: &RequestIdentity) -> String {
        let scoped = |prefix: &str, value: &Option<String>| match value {
            Some(v) => format!("{}:{}", prefix, v),
            None => identity.ip_key(),
        };
        match self {
            KeyStrategy::Ip => identity.ip_key(),
            KeyStrategy::ApiKey => scoped("key", &identity.api_key),
            KeyStrategy::UserId => scoped("user", &identity.user_id),
            KeyStrategy::ServiceName => scoped("service", &identity.service_name),
            KeyStrategy::Custom(f) => f(identity),
        }
    }
}

impl fmt::Debug for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStrategy::Ip => f.write_str("Ip"),
            KeyStrategy::ApiKey => f.write_str("ApiKey"),
            KeyStrategy::UserId => f.write_str("UserId"),
            KeyStrategy::ServiceName => f.write_str("ServiceName"),
            KeyStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
