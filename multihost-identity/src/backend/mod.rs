pub mod memory;

use async_trait::async_trait;
use multihost_core::{names_match, HostKey, HostResult, TenantScope};
use uuid::Uuid;

use crate::entities::{Host, HostDomain, LoginInfo, Role, User, UserClaim, UserLogin, UserRole};

/// Which users a query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFilter<K: HostKey> {
    pub scope: TenantScope<K>,
    pub user_name: Option<String>,
    pub email: Option<String>,
}

impl<K: HostKey> UserFilter<K> {
    pub fn new(scope: TenantScope<K>) -> Self {
        Self {
            scope,
            user_name: None,
            email: None,
        }
    }

    pub fn user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn matches(&self, user: &User<K>) -> bool {
        self.scope.admits(user)
            && self
                .user_name
                .as_deref()
                .map_or(true, |name| names_match(&user.user_name, name))
            && self.email.as_deref().map_or(true, |email| {
                user.email
                    .as_deref()
                    .is_some_and(|own| names_match(own, email))
            })
    }
}

/// Which roles a query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleFilter<K: HostKey> {
    pub scope: TenantScope<K>,
    pub name: Option<String>,
}

impl<K: HostKey> RoleFilter<K> {
    pub fn new(scope: TenantScope<K>) -> Self {
        Self { scope, name: None }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn matches(&self, role: &Role<K>) -> bool {
        self.scope.admits(role)
            && self
                .name
                .as_deref()
                .map_or(true, |name| names_match(&role.name, name))
    }
}

/// Which logins a query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginFilter<K: HostKey> {
    pub scope: TenantScope<K>,
    pub user_id: Option<Uuid>,
    pub login: Option<LoginInfo>,
}

impl<K: HostKey> LoginFilter<K> {
    pub fn new(scope: TenantScope<K>) -> Self {
        Self {
            scope,
            user_id: None,
            login: None,
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn login(mut self, login: LoginInfo) -> Self {
        self.login = Some(login);
        self
    }

    pub fn matches(&self, row: &UserLogin<K>) -> bool {
        self.scope.admits(row)
            && self.user_id.map_or(true, |id| row.user_id == id)
            && self.login.as_ref().map_or(true, |login| row.is_for(login))
    }
}

/// Storage primitives the stores are built on.
///
/// Implementations own the authoritative constraints: every insert or
/// update that would break a unique key fails with `Conflict`, and deletes
/// cascade to dependent rows. Tenant rules are not applied here beyond the
/// filters the caller passes in.
#[async_trait]
pub trait IdentityBackend<K: HostKey>: Send + Sync {
    // ---- hosts ----

    /// Assigns the surrogate id. Unique: host key, name, single system host.
    async fn insert_host(&self, host: Host<K>) -> HostResult<Host<K>>;
    async fn update_host(&self, host: Host<K>) -> HostResult<Host<K>>;
    /// Removes the host and its domains.
    async fn delete_host(&self, id: i64) -> HostResult<bool>;
    async fn host_by_id(&self, id: i64) -> HostResult<Option<Host<K>>>;
    async fn host_by_key(&self, host_id: &K) -> HostResult<Option<Host<K>>>;
    async fn host_by_name(&self, name: &str) -> HostResult<Option<Host<K>>>;
    async fn system_host(&self) -> HostResult<Option<Host<K>>>;
    async fn list_hosts(&self) -> HostResult<Vec<Host<K>>>;

    // ---- domains ----

    /// Unique: domain name across all hosts.
    async fn insert_domain(&self, domain: HostDomain) -> HostResult<HostDomain>;
    async fn delete_domain(&self, domain_name: &str) -> HostResult<bool>;
    async fn domain_by_name(&self, domain_name: &str) -> HostResult<Option<HostDomain>>;
    async fn domains_for_host(&self, host: i64) -> HostResult<Vec<HostDomain>>;

    // ---- users ----

    /// Unique: (host_id, user_name).
    async fn insert_user(&self, user: User<K>) -> HostResult<User<K>>;
    async fn update_user(&self, user: User<K>) -> HostResult<User<K>>;
    /// Removes the user with its logins, memberships and claims.
    async fn delete_user(&self, id: Uuid) -> HostResult<bool>;
    async fn user_by_id(&self, id: Uuid) -> HostResult<Option<User<K>>>;
    async fn find_users(&self, filter: &UserFilter<K>) -> HostResult<Vec<User<K>>>;

    // ---- roles ----

    /// Unique: (host_id, name).
    async fn insert_role(&self, role: Role<K>) -> HostResult<Role<K>>;
    async fn update_role(&self, role: Role<K>) -> HostResult<Role<K>>;
    /// Removes the role with its memberships.
    async fn delete_role(&self, id: Uuid) -> HostResult<bool>;
    async fn role_by_id(&self, id: Uuid) -> HostResult<Option<Role<K>>>;
    async fn find_roles(&self, filter: &RoleFilter<K>) -> HostResult<Vec<Role<K>>>;

    // ---- logins ----

    /// Unique: (login_provider, provider_key, user_id).
    async fn insert_login(&self, login: UserLogin<K>) -> HostResult<UserLogin<K>>;
    /// Rewrites the row with the same (login_provider, provider_key, user_id).
    async fn update_login(&self, login: UserLogin<K>) -> HostResult<UserLogin<K>>;
    async fn delete_login(&self, user_id: Uuid, login: &LoginInfo) -> HostResult<bool>;
    async fn find_logins(&self, filter: &LoginFilter<K>) -> HostResult<Vec<UserLogin<K>>>;

    // ---- role memberships ----

    /// Unique: (user_id, role_id).
    async fn insert_user_role(&self, user_role: UserRole<K>) -> HostResult<UserRole<K>>;
    /// Rewrites the row with the same (user_id, role_id).
    async fn update_user_role(&self, user_role: UserRole<K>) -> HostResult<UserRole<K>>;
    async fn delete_user_role(&self, user_id: Uuid, role_id: Uuid) -> HostResult<bool>;
    async fn find_user_roles(
        &self,
        user_id: Uuid,
        scope: &TenantScope<K>,
    ) -> HostResult<Vec<UserRole<K>>>;
    /// Every membership of the role, on any host.
    async fn find_role_members(&self, role_id: Uuid) -> HostResult<Vec<UserRole<K>>>;

    // ---- claims ----

    /// Assigns the surrogate id.
    async fn insert_claim(&self, claim: UserClaim<K>) -> HostResult<UserClaim<K>>;
    async fn update_claim(&self, claim: UserClaim<K>) -> HostResult<UserClaim<K>>;
    async fn delete_claim(&self, id: i64) -> HostResult<bool>;
    async fn find_claims(
        &self,
        user_id: Uuid,
        scope: &TenantScope<K>,
    ) -> HostResult<Vec<UserClaim<K>>>;
}
