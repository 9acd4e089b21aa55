//! Records stored per host.
//!
//! Every user-side record carries its own `host_id` and `is_global` so that
//! the visibility predicate can be evaluated on the row alone.

use chrono::{DateTime, Utc};
use multihost_core::{HostKey, TenantScoped};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host<K: HostKey> {
    /// Surrogate id, assigned by the backend on insert.
    pub id: i64,
    pub host_id: K,
    /// Unique, case-insensitive.
    pub name: String,
    pub is_system_host: bool,
}

impl<K: HostKey> Host<K> {
    pub fn new(host_id: K, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            host_id,
            name: name.into(),
            is_system_host: false,
        }
    }

    pub fn system(host_id: K, name: impl Into<String>) -> Self {
        Self {
            is_system_host: true,
            ..Self::new(host_id, name)
        }
    }
}

/// An inbound domain name mapped onto a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDomain {
    pub id: i64,
    /// Surrogate id of the owning [`Host`].
    pub host: i64,
    /// Unique across all hosts, case-insensitive.
    pub domain_name: String,
}

/// An application account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User<K: HostKey> {
    pub id: Uuid,
    pub host_id: K,
    pub is_global: bool,
    pub user_name: String,
    pub email: Option<String>,
    pub email_confirmed: bool,
    pub password_hash: Option<String>,
    pub security_stamp: String,
    pub created_at: DateTime<Utc>,
}

impl<K: HostKey> TenantScoped<K> for User<K> {
    fn host_id(&self) -> &K {
        &self.host_id
    }

    fn is_global(&self) -> bool {
        self.is_global
    }
}

/// Input for creating a user; `host_id: None` means "the ambient host".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser<K: HostKey> {
    pub user_name: String,
    pub email: Option<String>,
    pub host_id: Option<K>,
    pub is_global: bool,
}

impl<K: HostKey> NewUser<K> {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            email: None,
            host_id: None,
            is_global: false,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn in_host(mut self, host_id: K) -> Self {
        self.host_id = Some(host_id);
        self
    }

    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    pub(crate) fn into_user(self, host_id: K, password_hash: Option<String>) -> User<K> {
        User {
            id: Uuid::new_v4(),
            host_id,
            is_global: self.is_global,
            user_name: self.user_name,
            email: self.email,
            email_confirmed: false,
            password_hash,
            security_stamp: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A named permission grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role<K: HostKey> {
    pub id: Uuid,
    pub host_id: K,
    pub is_global: bool,
    pub name: String,
}

impl<K: HostKey> TenantScoped<K> for Role<K> {
    fn host_id(&self) -> &K {
        &self.host_id
    }

    fn is_global(&self) -> bool {
        self.is_global
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole<K: HostKey> {
    pub name: String,
    pub host_id: Option<K>,
    pub is_global: bool,
}

impl<K: HostKey> NewRole<K> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host_id: None,
            is_global: false,
        }
    }

    pub fn in_host(mut self, host_id: K) -> Self {
        self.host_id = Some(host_id);
        self
    }

    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    pub(crate) fn into_role(self, host_id: K) -> Role<K> {
        Role {
            id: Uuid::new_v4(),
            host_id,
            is_global: self.is_global,
            name: self.name,
        }
    }
}

/// An external login provider key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoginInfo {
    pub login_provider: String,
    pub provider_key: String,
}

impl LoginInfo {
    pub fn new(login_provider: impl Into<String>, provider_key: impl Into<String>) -> Self {
        Self {
            login_provider: login_provider.into(),
            provider_key: provider_key.into(),
        }
    }
}

/// Keyed by (login_provider, provider_key, user_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLogin<K: HostKey> {
    pub login_provider: String,
    pub provider_key: String,
    pub user_id: Uuid,
    pub host_id: K,
    pub is_global: bool,
}

impl<K: HostKey> UserLogin<K> {
    pub fn info(&self) -> LoginInfo {
        LoginInfo::new(self.login_provider.clone(), self.provider_key.clone())
    }

    pub fn is_for(&self, login: &LoginInfo) -> bool {
        self.login_provider == login.login_provider && self.provider_key == login.provider_key
    }
}

impl<K: HostKey> TenantScoped<K> for UserLogin<K> {
    fn host_id(&self) -> &K {
        &self.host_id
    }

    fn is_global(&self) -> bool {
        self.is_global
    }
}

/// Keyed by (user_id, role_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole<K: HostKey> {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub host_id: K,
    pub is_global: bool,
}

impl<K: HostKey> TenantScoped<K> for UserRole<K> {
    fn host_id(&self) -> &K {
        &self.host_id
    }

    fn is_global(&self) -> bool {
        self.is_global
    }
}

/// A type/value pair attached to a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaim<K: HostKey> {
    pub id: i64,
    pub user_id: Uuid,
    pub host_id: K,
    pub is_global: bool,
    pub claim_type: String,
    pub claim_value: String,
}

impl<K: HostKey> UserClaim<K> {
    pub fn claim(&self) -> Claim {
        Claim::new(self.claim_type.clone(), self.claim_value.clone())
    }

    pub fn is_for(&self, claim: &Claim) -> bool {
        self.claim_type == claim.claim_type && self.claim_value == claim.value
    }
}

impl<K: HostKey> TenantScoped<K> for UserClaim<K> {
    fn host_id(&self) -> &K {
        &self.host_id
    }

    fn is_global(&self) -> bool {
        self.is_global
    }
}
