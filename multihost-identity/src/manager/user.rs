use std::sync::Arc;

use multihost_core::{bail_host, require_text, HostError, HostKey, HostResult};
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::IdentityContext;
use crate::entities::{Claim, LoginInfo, NewUser, Role, User, UserClaim, UserLogin, UserRole};
use crate::password::PasswordHasher;
use crate::store::UserStore;

/// Account operations for one identity context.
///
/// Methods taking `host_id: Option<&K>` run against that host when given
/// and against the ambient tenant otherwise. The user must be visible from
/// that host for any per-user operation; `update` and `delete` check
/// against the ambient tenant.
pub struct UserManager<K: HostKey> {
    ctx: IdentityContext<K>,
    store: UserStore<K>,
    hasher: Arc<dyn PasswordHasher>,
}

impl<K: HostKey> UserManager<K> {
    pub(crate) fn new(ctx: IdentityContext<K>, hasher: Arc<dyn PasswordHasher>) -> Self {
        let store = ctx.users();
        Self { ctx, store, hasher }
    }

    pub fn store(&self) -> &UserStore<K> {
        &self.store
    }

    pub async fn create(&self, user: NewUser<K>) -> HostResult<User<K>> {
        require_text(&user.user_name, "user_name")?;
        self.store.create(user).await
    }

    pub async fn create_with_password(&self, user: NewUser<K>, password: &str) -> HostResult<User<K>> {
        require_text(&user.user_name, "user_name")?;
        require_text(password, "password")?;
        let hash = self.hasher.hash(password)?;
        self.store.create_with_hash(user, Some(hash)).await
    }

    /// `NotFound` unless the user is visible from the ambient tenant.
    pub async fn update(&self, user: User<K>) -> HostResult<User<K>> {
        self.require_user(user.id, None).await?;
        self.store.update(user).await
    }

    /// Returns `false` for a user the ambient tenant cannot see.
    pub async fn delete(&self, user_id: Uuid) -> HostResult<bool> {
        if self.find_by_id(user_id, None).await?.is_none() {
            debug!(%user_id, "user not visible, nothing to delete");
            return Ok(false);
        }
        self.store.delete(user_id).await
    }

    pub async fn find_by_id(&self, user_id: Uuid, host_id: Option<&K>) -> HostResult<Option<User<K>>> {
        let host_id = self.host(host_id);
        self.store.find_by_id(&host_id, user_id).await
    }

    pub async fn find_by_name(&self, user_name: &str, host_id: Option<&K>) -> HostResult<Option<User<K>>> {
        require_text(user_name, "user_name")?;
        let host_id = self.host(host_id);
        self.store.find_by_name(&host_id, user_name).await
    }

    pub async fn find_by_email(&self, email: &str, host_id: Option<&K>) -> HostResult<Option<User<K>>> {
        require_text(email, "email")?;
        let host_id = self.host(host_id);
        self.store.find_by_email(&host_id, email).await
    }

    pub async fn find_by_login(&self, login: &LoginInfo, host_id: Option<&K>) -> HostResult<Option<User<K>>> {
        require_text(&login.login_provider, "login_provider")?;
        require_text(&login.provider_key, "provider_key")?;
        let host_id = self.host(host_id);
        self.store.find_by_login(&host_id, login).await
    }

    pub async fn users(&self, host_id: Option<&K>) -> HostResult<Vec<User<K>>> {
        let host_id = self.host(host_id);
        self.store.list(&host_id).await
    }

    // ---- passwords ----

    /// `None` for an unknown user, a user without a password, or a wrong password.
    pub async fn find_by_credentials(
        &self,
        user_name: &str,
        password: &str,
        host_id: Option<&K>,
    ) -> HostResult<Option<User<K>>> {
        let Some(user) = self.find_by_name(user_name, host_id).await? else {
            debug!(user_name, "credential check for unknown user");
            return Ok(None);
        };
        if self.check_password(&user, password)? {
            Ok(Some(user))
        } else {
            debug!(user_id = %user.id, "credential check failed");
            Ok(None)
        }
    }

    pub fn check_password(&self, user: &User<K>, password: &str) -> HostResult<bool> {
        match &user.password_hash {
            Some(hash) => self.hasher.verify(password, hash),
            None => Ok(false),
        }
    }

    /// Replaces the hash and rotates the security stamp.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current: &str,
        new_password: &str,
        host_id: Option<&K>,
    ) -> HostResult<User<K>> {
        require_text(new_password, "new_password")?;
        let mut user = self.require_user(user_id, host_id).await?;
        if user.password_hash.is_some() && !self.check_password(&user, current)? {
            bail_host!(unprocessable, "incorrect password");
        }

        user.password_hash = Some(self.hasher.hash(new_password)?);
        user.security_stamp = Uuid::new_v4().to_string();
        let user = self.store.update(user).await?;
        info!(user_id = %user.id, "password changed");
        Ok(user)
    }

    // ---- logins ----

    pub async fn add_login(&self, user_id: Uuid, login: LoginInfo, host_id: Option<&K>) -> HostResult<UserLogin<K>> {
        let user = self.require_user(user_id, host_id).await?;
        self.store.add_login(&user, login).await
    }

    pub async fn remove_login(&self, user_id: Uuid, login: &LoginInfo, host_id: Option<&K>) -> HostResult<bool> {
        let user = self.require_user(user_id, host_id).await?;
        self.store.remove_login(&user, login).await
    }

    pub async fn logins(&self, user_id: Uuid, host_id: Option<&K>) -> HostResult<Vec<LoginInfo>> {
        let host_id = self.host(host_id);
        self.store.logins(&host_id, user_id).await
    }

    // ---- claims ----

    pub async fn add_claim(&self, user_id: Uuid, claim: Claim, host_id: Option<&K>) -> HostResult<UserClaim<K>> {
        let host = self.host(host_id);
        let user = self.require_user(user_id, Some(&host)).await?;
        self.store.add_claim(&host, &user, claim).await
    }

    pub async fn remove_claim(&self, user_id: Uuid, claim: &Claim, host_id: Option<&K>) -> HostResult<usize> {
        let host_id = self.host(host_id);
        self.store.remove_claim(&host_id, user_id, claim).await
    }

    pub async fn claims(&self, user_id: Uuid, host_id: Option<&K>) -> HostResult<Vec<Claim>> {
        let host_id = self.host(host_id);
        self.store.claims(&host_id, user_id).await
    }

    // ---- roles ----

    pub async fn add_to_role(&self, user_id: Uuid, role_name: &str, host_id: Option<&K>) -> HostResult<UserRole<K>> {
        require_text(role_name, "role_name")?;
        let host = self.host(host_id);
        let user = self.require_user(user_id, Some(&host)).await?;
        self.store.add_to_role(&host, &user, role_name).await
    }

    /// Stops at the first role that cannot be resolved.
    pub async fn add_to_roles(
        &self,
        user_id: Uuid,
        role_names: &[&str],
        host_id: Option<&K>,
    ) -> HostResult<Vec<UserRole<K>>> {
        let host = self.host(host_id);
        let user = self.require_user(user_id, Some(&host)).await?;
        let mut rows = Vec::with_capacity(role_names.len());
        for role_name in role_names {
            require_text(role_name, "role_name")?;
            rows.push(self.store.add_to_role(&host, &user, role_name).await?);
        }
        Ok(rows)
    }

    pub async fn remove_from_role(&self, user_id: Uuid, role_name: &str, host_id: Option<&K>) -> HostResult<bool> {
        require_text(role_name, "role_name")?;
        let host = self.host(host_id);
        self.require_user(user_id, Some(&host)).await?;
        self.store.remove_from_role(&host, user_id, role_name).await
    }

    /// Returns how many memberships were removed.
    pub async fn remove_from_roles(
        &self,
        user_id: Uuid,
        role_names: &[&str],
        host_id: Option<&K>,
    ) -> HostResult<usize> {
        let host = self.host(host_id);
        self.require_user(user_id, Some(&host)).await?;
        let mut removed = 0;
        for role_name in role_names {
            require_text(role_name, "role_name")?;
            if self.store.remove_from_role(&host, user_id, role_name).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn roles(&self, user_id: Uuid, host_id: Option<&K>) -> HostResult<Vec<String>> {
        let host_id = self.host(host_id);
        self.store.roles(&host_id, user_id).await
    }

    /// Roles on every host, for administrative views.
    pub async fn all_roles(&self, user_id: Uuid) -> HostResult<Vec<Role<K>>> {
        self.store.all_roles(user_id).await
    }

    pub async fn is_in_role(&self, user_id: Uuid, role_name: &str, host_id: Option<&K>) -> HostResult<bool> {
        require_text(role_name, "role_name")?;
        let host_id = self.host(host_id);
        self.store.is_in_role(&host_id, user_id, role_name).await
    }

    fn host(&self, host_id: Option<&K>) -> K {
        self.ctx.tenant().effective_host(host_id)
    }

    async fn require_user(&self, user_id: Uuid, host_id: Option<&K>) -> HostResult<User<K>> {
        self.find_by_id(user_id, host_id)
            .await?
            .ok_or_else(|| HostError::not_found(format!("user '{user_id}' not found")).into_anyhow())
    }
}
