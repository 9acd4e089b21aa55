use multihost_core::{
    bail_host, check_global, guard_create, guard_update, inherited_global, prefer_tenant_row,
    require_text, EntityKind, HostError, HostKey, HostResult, TenantScope,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::AuditAction;
use crate::backend::{LoginFilter, RoleFilter, UserFilter};
use crate::context::IdentityContext;
use crate::entities::{
    Claim, LoginInfo, NewUser, Role, User, UserClaim, UserLogin, UserRole,
};
use crate::store::{conflict_as_validation, membership_global};

/// Users with their logins, claims and role memberships.
///
/// Lookups see the host's own rows plus global rows. Join rows written
/// through a user take their host from the call and their globality from
/// the owner.
pub struct UserStore<K: HostKey> {
    ctx: IdentityContext<K>,
}

impl<K: HostKey> UserStore<K> {
    pub(crate) fn new(ctx: IdentityContext<K>) -> Self {
        Self { ctx }
    }

    pub async fn create(&self, user: NewUser<K>) -> HostResult<User<K>> {
        self.create_with_hash(user, None).await
    }

    /// Same as [`create`](Self::create), storing an already computed hash.
    pub async fn create_with_hash(
        &self,
        mut user: NewUser<K>,
        password_hash: Option<String>,
    ) -> HostResult<User<K>> {
        self.ctx.ensure_open()?;
        require_text(&user.user_name, "user_name")?;
        user.user_name = user.user_name.trim().to_string();

        let host_id = guard_create(
            EntityKind::User,
            user.host_id.clone(),
            user.is_global,
            self.ctx.tenant(),
        )?;
        let user = user.into_user(host_id, password_hash);
        self.check_unique_name(&user).await?;

        let user = self
            .ctx
            .backend()
            .insert_user(user)
            .await
            .map_err(conflict_as_validation)?;
        info!(user_id = %user.id, host_id = %user.host_id, user_name = %user.user_name, global = user.is_global, "user created");
        self.ctx.record(
            EntityKind::User,
            AuditAction::Created,
            user.id,
            Some(user.host_id.clone()),
        );
        Ok(user)
    }

    /// Rejects host reassignment and global users off the system host;
    /// the persisted row is left untouched on failure. A change of
    /// `is_global` is carried over to the user's logins, claims and
    /// memberships.
    pub async fn update(&self, mut user: User<K>) -> HostResult<User<K>> {
        self.ctx.ensure_open()?;
        require_text(&user.user_name, "user_name")?;
        user.user_name = user.user_name.trim().to_string();

        let existing = self.require_user(user.id).await?;
        guard_update(
            EntityKind::User,
            &existing.host_id,
            &user.host_id,
            user.is_global,
            &self.ctx.tenant().system_host_id,
        )?;
        self.check_unique_name(&user).await?;

        let user = self
            .ctx
            .backend()
            .update_user(user)
            .await
            .map_err(conflict_as_validation)?;
        if existing.is_global != user.is_global {
            self.restamp_dependents(&user).await?;
        }
        info!(user_id = %user.id, host_id = %user.host_id, "user updated");
        self.ctx.record(
            EntityKind::User,
            AuditAction::Updated,
            user.id,
            Some(user.host_id.clone()),
        );
        Ok(user)
    }

    /// Deletes the user with its logins, claims and memberships.
    pub async fn delete(&self, user_id: Uuid) -> HostResult<bool> {
        self.ctx.ensure_open()?;
        let Some(user) = self.ctx.backend().user_by_id(user_id).await? else {
            return Ok(false);
        };

        let deleted = self.ctx.backend().delete_user(user_id).await?;
        if deleted {
            info!(%user_id, host_id = %user.host_id, "user deleted");
            self.ctx
                .record(EntityKind::User, AuditAction::Deleted, user_id, Some(user.host_id));
        }
        Ok(deleted)
    }

    pub async fn find_by_id(&self, host_id: &K, user_id: Uuid) -> HostResult<Option<User<K>>> {
        self.ctx.ensure_open()?;
        let scope = TenantScope::tenant_or_global(host_id.clone());
        Ok(self
            .ctx
            .backend()
            .user_by_id(user_id)
            .await?
            .filter(|user| scope.admits(user)))
    }

    pub async fn find_by_name(&self, host_id: &K, user_name: &str) -> HostResult<Option<User<K>>> {
        self.ctx.ensure_open()?;
        let filter =
            UserFilter::new(TenantScope::tenant_or_global(host_id.clone())).user_name(user_name.trim());
        let users = self.ctx.backend().find_users(&filter).await?;
        debug!(%host_id, user_name, candidates = users.len(), "user lookup by name");
        Ok(prefer_tenant_row(host_id, users))
    }

    pub async fn find_by_email(&self, host_id: &K, email: &str) -> HostResult<Option<User<K>>> {
        self.ctx.ensure_open()?;
        let filter = UserFilter::new(TenantScope::tenant_or_global(host_id.clone())).email(email.trim());
        let users = self.ctx.backend().find_users(&filter).await?;
        debug!(%host_id, email, candidates = users.len(), "user lookup by email");
        Ok(prefer_tenant_row(host_id, users))
    }

    /// Resolves the login row under the tenant predicate, then its owner
    /// under the same predicate.
    pub async fn find_by_login(&self, host_id: &K, login: &LoginInfo) -> HostResult<Option<User<K>>> {
        self.ctx.ensure_open()?;
        let scope = TenantScope::tenant_or_global(host_id.clone());
        let filter = LoginFilter::new(scope.clone()).login(login.clone());
        let logins = self.ctx.backend().find_logins(&filter).await?;
        let Some(row) = prefer_tenant_row(host_id, logins) else {
            debug!(%host_id, provider = %login.login_provider, "no login row");
            return Ok(None);
        };
        Ok(self
            .ctx
            .backend()
            .user_by_id(row.user_id)
            .await?
            .filter(|user| scope.admits(user)))
    }

    /// Users visible to `host_id`.
    pub async fn list(&self, host_id: &K) -> HostResult<Vec<User<K>>> {
        self.ctx.ensure_open()?;
        let filter = UserFilter::new(TenantScope::tenant_or_global(host_id.clone()));
        self.ctx.backend().find_users(&filter).await
    }

    // ---- logins ----

    /// The login row inherits host and globality from `user`.
    pub async fn add_login(&self, user: &User<K>, login: LoginInfo) -> HostResult<UserLogin<K>> {
        self.ctx.ensure_open()?;
        require_text(&login.login_provider, "login_provider")?;
        require_text(&login.provider_key, "provider_key")?;
        check_global(
            EntityKind::UserLogin,
            &user.host_id,
            user.is_global,
            &self.ctx.tenant().system_host_id,
        )?;

        let filter = LoginFilter::new(TenantScope::tenant_only(user.host_id.clone())).login(login.clone());
        if !self.ctx.backend().find_logins(&filter).await?.is_empty() {
            bail_host!(
                unprocessable,
                "login '{}' is already linked to a user on host '{}'",
                login.login_provider,
                user.host_id
            );
        }

        let row = self
            .ctx
            .backend()
            .insert_login(UserLogin {
                login_provider: login.login_provider,
                provider_key: login.provider_key,
                user_id: user.id,
                host_id: user.host_id.clone(),
                is_global: user.is_global,
            })
            .await
            .map_err(conflict_as_validation)?;
        info!(user_id = %user.id, provider = %row.login_provider, "login added");
        self.ctx.record(
            EntityKind::UserLogin,
            AuditAction::Created,
            format!("{}:{}", row.login_provider, user.id),
            Some(row.host_id.clone()),
        );
        Ok(row)
    }

    pub async fn remove_login(&self, user: &User<K>, login: &LoginInfo) -> HostResult<bool> {
        self.ctx.ensure_open()?;
        let removed = self.ctx.backend().delete_login(user.id, login).await?;
        if removed {
            info!(user_id = %user.id, provider = %login.login_provider, "login removed");
            self.ctx.record(
                EntityKind::UserLogin,
                AuditAction::Deleted,
                format!("{}:{}", login.login_provider, user.id),
                Some(user.host_id.clone()),
            );
        }
        Ok(removed)
    }

    pub async fn logins(&self, host_id: &K, user_id: Uuid) -> HostResult<Vec<LoginInfo>> {
        self.ctx.ensure_open()?;
        let filter = LoginFilter::new(TenantScope::tenant_or_global(host_id.clone())).user(user_id);
        Ok(self
            .ctx
            .backend()
            .find_logins(&filter)
            .await?
            .iter()
            .map(UserLogin::info)
            .collect())
    }

    // ---- claims ----

    /// Written under `host_id`; global only when `user` is global and
    /// `host_id` is the system host. A claim added to a global user from a
    /// tenant is visible from that tenant only.
    pub async fn add_claim(&self, host_id: &K, user: &User<K>, claim: Claim) -> HostResult<UserClaim<K>> {
        self.ctx.ensure_open()?;
        require_text(&claim.claim_type, "claim_type")?;
        let system = &self.ctx.tenant().system_host_id;
        let is_global = inherited_global(user.is_global, host_id, system);

        let row = self
            .ctx
            .backend()
            .insert_claim(UserClaim {
                id: 0,
                user_id: user.id,
                host_id: host_id.clone(),
                is_global,
                claim_type: claim.claim_type,
                claim_value: claim.value,
            })
            .await?;
        info!(user_id = %user.id, %host_id, claim_type = %row.claim_type, "claim added");
        self.ctx.record(
            EntityKind::UserClaim,
            AuditAction::Created,
            row.id,
            Some(row.host_id.clone()),
        );
        Ok(row)
    }

    /// Removes matching claims owned by `host_id`; returns how many went.
    pub async fn remove_claim(&self, host_id: &K, user_id: Uuid, claim: &Claim) -> HostResult<usize> {
        self.ctx.ensure_open()?;
        let rows = self
            .ctx
            .backend()
            .find_claims(user_id, &TenantScope::tenant_only(host_id.clone()))
            .await?;

        let mut removed = 0;
        for row in rows.iter().filter(|row| row.is_for(claim)) {
            if self.ctx.backend().delete_claim(row.id).await? {
                removed += 1;
                self.ctx.record(
                    EntityKind::UserClaim,
                    AuditAction::Deleted,
                    row.id,
                    Some(row.host_id.clone()),
                );
            }
        }
        if removed > 0 {
            info!(%user_id, %host_id, claim_type = %claim.claim_type, removed, "claims removed");
        }
        Ok(removed)
    }

    pub async fn claims(&self, host_id: &K, user_id: Uuid) -> HostResult<Vec<Claim>> {
        self.ctx.ensure_open()?;
        Ok(self
            .ctx
            .backend()
            .find_claims(user_id, &TenantScope::tenant_or_global(host_id.clone()))
            .await?
            .iter()
            .map(UserClaim::claim)
            .collect())
    }

    // ---- role memberships ----

    /// Adds `user` to the role named `role_name` as seen from `host_id`.
    /// Adding an existing membership is a no-op.
    pub async fn add_to_role(&self, host_id: &K, user: &User<K>, role_name: &str) -> HostResult<UserRole<K>> {
        self.ctx.ensure_open()?;
        require_text(role_name, "role_name")?;
        let role = self.require_role(host_id, role_name).await?;

        let memberships = self
            .ctx
            .backend()
            .find_user_roles(user.id, &TenantScope::AllHosts)
            .await?;
        if let Some(existing) = memberships.into_iter().find(|ur| ur.role_id == role.id) {
            debug!(user_id = %user.id, role = %role.name, "already a member");
            return Ok(existing);
        }

        let system = &self.ctx.tenant().system_host_id;
        let row = self
            .ctx
            .backend()
            .insert_user_role(UserRole {
                user_id: user.id,
                role_id: role.id,
                host_id: host_id.clone(),
                is_global: membership_global(user.is_global, role.is_global, host_id, system),
            })
            .await?;
        info!(user_id = %user.id, role = %role.name, %host_id, "user added to role");
        self.ctx.record(
            EntityKind::UserRole,
            AuditAction::Created,
            format!("{}:{}", user.id, role.id),
            Some(row.host_id.clone()),
        );
        Ok(row)
    }

    /// Only a membership visible from `host_id` can be removed; anything
    /// else reports `false`.
    pub async fn remove_from_role(&self, host_id: &K, user_id: Uuid, role_name: &str) -> HostResult<bool> {
        self.ctx.ensure_open()?;
        require_text(role_name, "role_name")?;
        let role = self.require_role(host_id, role_name).await?;

        let held = self
            .ctx
            .backend()
            .find_user_roles(user_id, &TenantScope::tenant_or_global(host_id.clone()))
            .await?
            .iter()
            .any(|ur| ur.role_id == role.id);
        if !held {
            debug!(%user_id, role = %role.name, %host_id, "no visible membership to remove");
            return Ok(false);
        }

        let removed = self.ctx.backend().delete_user_role(user_id, role.id).await?;
        if removed {
            info!(%user_id, role = %role.name, %host_id, "user removed from role");
            self.ctx.record(
                EntityKind::UserRole,
                AuditAction::Deleted,
                format!("{}:{}", user_id, role.id),
                Some(host_id.clone()),
            );
        }
        Ok(removed)
    }

    /// Names of the roles the user holds as seen from `host_id`.
    pub async fn roles(&self, host_id: &K, user_id: Uuid) -> HostResult<Vec<String>> {
        self.ctx.ensure_open()?;
        let roles = self
            .roles_for(user_id, &TenantScope::tenant_or_global(host_id.clone()))
            .await?;
        let mut names: Vec<String> = roles.into_iter().map(|role| role.name).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Every role the user holds on any host.
    pub async fn all_roles(&self, user_id: Uuid) -> HostResult<Vec<Role<K>>> {
        self.ctx.ensure_open()?;
        self.roles_for(user_id, &TenantScope::AllHosts).await
    }

    pub async fn is_in_role(&self, host_id: &K, user_id: Uuid, role_name: &str) -> HostResult<bool> {
        self.ctx.ensure_open()?;
        let filter = RoleFilter::new(TenantScope::tenant_or_global(host_id.clone())).name(role_name.trim());
        let Some(role) = prefer_tenant_row(host_id, self.ctx.backend().find_roles(&filter).await?) else {
            return Ok(false);
        };

        let memberships = self
            .ctx
            .backend()
            .find_user_roles(user_id, &TenantScope::tenant_or_global(host_id.clone()))
            .await?;
        Ok(memberships.iter().any(|ur| ur.role_id == role.id))
    }

    async fn roles_for(&self, user_id: Uuid, scope: &TenantScope<K>) -> HostResult<Vec<Role<K>>> {
        let backend = self.ctx.backend();
        let mut roles = Vec::new();
        for membership in backend.find_user_roles(user_id, scope).await? {
            match backend.role_by_id(membership.role_id).await? {
                Some(role) if scope.admits(&role) => roles.push(role),
                _ => {}
            }
        }
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    /// Re-derives the globality of every join row owned by `user` from its
    /// current flag.
    async fn restamp_dependents(&self, user: &User<K>) -> HostResult<()> {
        let backend = self.ctx.backend();
        let system = &self.ctx.tenant().system_host_id;
        let mut changed = 0usize;

        let filter = LoginFilter::new(TenantScope::AllHosts).user(user.id);
        for mut login in backend.find_logins(&filter).await? {
            if login.is_global != user.is_global {
                login.is_global = user.is_global;
                backend.update_login(login).await?;
                changed += 1;
            }
        }

        for mut claim in backend.find_claims(user.id, &TenantScope::AllHosts).await? {
            let is_global = inherited_global(user.is_global, &claim.host_id, system);
            if claim.is_global != is_global {
                claim.is_global = is_global;
                backend.update_claim(claim).await?;
                changed += 1;
            }
        }

        for mut membership in backend.find_user_roles(user.id, &TenantScope::AllHosts).await? {
            let Some(role) = backend.role_by_id(membership.role_id).await? else {
                continue;
            };
            let is_global =
                membership_global(user.is_global, role.is_global, &membership.host_id, system);
            if membership.is_global != is_global {
                membership.is_global = is_global;
                backend.update_user_role(membership).await?;
                changed += 1;
            }
        }

        debug!(user_id = %user.id, global = user.is_global, changed, "user join rows restamped");
        Ok(())
    }

    async fn require_user(&self, user_id: Uuid) -> HostResult<User<K>> {
        self.ctx
            .backend()
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| HostError::not_found(format!("user '{user_id}' not found")).into_anyhow())
    }

    async fn require_role(&self, host_id: &K, role_name: &str) -> HostResult<Role<K>> {
        let role_name = role_name.trim();
        let filter = RoleFilter::new(TenantScope::tenant_or_global(host_id.clone())).name(role_name);
        prefer_tenant_row(host_id, self.ctx.backend().find_roles(&filter).await?).ok_or_else(|| {
            HostError::not_found(format!(
                "role '{role_name}' not found for host '{host_id}' or in global roles"
            ))
            .into_anyhow()
        })
    }

    async fn check_unique_name(&self, user: &User<K>) -> HostResult<()> {
        let filter =
            UserFilter::new(TenantScope::tenant_only(user.host_id.clone())).user_name(user.user_name.as_str());
        let taken = self
            .ctx
            .backend()
            .find_users(&filter)
            .await?
            .iter()
            .any(|other| other.id != user.id);
        if taken {
            return Err(HostError::unprocessable(format!(
                "user name '{}' is already taken for host '{}'",
                user.user_name, user.host_id
            ))
            .into_anyhow());
        }
        Ok(())
    }
}
