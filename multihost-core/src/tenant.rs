//! Tenant ("host") keys and the context every operation runs under.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use tracing::debug;
use uuid::Uuid;

use crate::errors::{HostError, HostResult};

/// Actor name recorded when no principal is attached to a request.
pub const SYSTEM_ACTOR: &str = "<system>";

/// Identifier type distinguishing one host from another.
///
/// Implemented for the four key shapes a host table is usually keyed by:
/// `String`, `Uuid`, `i32` and `i64`.
pub trait HostKey: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {
    /// Column type used when rendering DDL for this key.
    const SQL_TYPE: &'static str;

    /// True for values that can never name a host (empty strings, nil UUIDs).
    fn is_blank(&self) -> bool {
        false
    }
}

impl HostKey for String {
    const SQL_TYPE: &'static str = "VARCHAR(256)";

    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl HostKey for Uuid {
    const SQL_TYPE: &'static str = "UUID";

    fn is_blank(&self) -> bool {
        self.is_nil()
    }
}

impl HostKey for i32 {
    const SQL_TYPE: &'static str = "INTEGER";
}

impl HostKey for i64 {
    const SQL_TYPE: &'static str = "BIGINT";
}

/// Reject a blank key with a `BadRequest` naming the argument.
pub fn require_key<K: HostKey>(key: &K, arg: &str) -> HostResult<()> {
    if key.is_blank() {
        return Err(HostError::bad_request(format!("{arg} must not be empty")).into_anyhow());
    }
    Ok(())
}

/// Reject a blank string argument with a `BadRequest` naming the argument.
pub fn require_text(value: &str, arg: &str) -> HostResult<()> {
    if value.trim().is_empty() {
        return Err(HostError::bad_request(format!("{arg} must not be empty")).into_anyhow());
    }
    Ok(())
}

/// Context carried with every multi-host operation.
///
/// Built once per request (or unit of work) by the calling layer and
/// handed down explicitly; nothing here is read from global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext<K: HostKey> {
    /// The ambient tenant for this unit of work.
    pub host_id: K,
    /// The distinguished host that owns global rows.
    pub system_host_id: K,
    /// Authenticated principal, used as the audit actor.
    pub user_name: Option<String>,
}

impl<K: HostKey> TenantContext<K> {
    pub fn new(host_id: K, system_host_id: K) -> Self {
        Self {
            host_id,
            system_host_id,
            user_name: None,
        }
    }

    /// A context whose ambient tenant is the system host itself.
    pub fn system(system_host_id: K) -> Self {
        Self::new(system_host_id.clone(), system_host_id)
    }

    pub fn with_user(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    pub fn is_system_host(&self) -> bool {
        self.host_id == self.system_host_id
    }

    /// Name written into audit records for this context.
    pub fn actor(&self) -> &str {
        self.user_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(SYSTEM_ACTOR)
    }

    /// Effective host for an operation: the explicit key when given,
    /// otherwise the ambient tenant.
    pub fn effective_host(&self, explicit: Option<&K>) -> K {
        resolve_host_id(explicit, &self.host_id)
    }

    /// Both keys must name a host.
    pub fn validate(&self) -> HostResult<()> {
        require_key(&self.host_id, "host_id")?;
        require_key(&self.system_host_id, "system_host_id")
    }
}

/// Pick the explicit key when it is present and not blank, else the ambient one.
pub fn resolve_host_id<K: HostKey>(explicit: Option<&K>, ambient: &K) -> K {
    match explicit {
        Some(key) if !key.is_blank() => key.clone(),
        Some(key) => {
            debug!(explicit = %key, ambient = %ambient, "blank host id, using ambient host");
            ambient.clone()
        }
        None => ambient.clone(),
    }
}

/// What the calling layer knows about an inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    hostname: Option<String>,
    user_name: Option<String>,
}

impl RequestInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a raw `Host` header value; the port is dropped and the
    /// name lower-cased.
    pub fn with_hostname(mut self, host: impl AsRef<str>) -> Self {
        self.hostname = normalize_hostname(host.as_ref());
        self
    }

    pub fn with_user(mut self, user_name: impl Into<String>) -> Self {
        let user_name = user_name.into();
        self.user_name = if user_name.trim().is_empty() {
            None
        } else {
            Some(user_name)
        };
        self
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }
}

fn normalize_hostname(raw: &str) -> Option<String> {
    let raw = raw.trim().trim_end_matches('.');
    // bracketed IPv6 literal, keep the brackets and drop the port
    let name = if raw.starts_with('[') {
        match raw.find(']') {
            Some(end) => &raw[..=end],
            None => raw,
        }
    } else {
        raw.split(':').next().unwrap_or(raw)
    };

    if name.is_empty() {
        None
    } else {
        Some(name.to_lowercase())
    }
}
