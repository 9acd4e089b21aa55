use multihost_core::{
    guard_create, guard_update, prefer_tenant_row, require_text, EntityKind, HostError, HostKey,
    HostResult, TenantScope,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::AuditAction;
use crate::backend::RoleFilter;
use crate::context::IdentityContext;
use crate::entities::{NewRole, Role};
use crate::store::{conflict_as_validation, membership_global};

pub struct RoleStore<K: HostKey> {
    ctx: IdentityContext<K>,
}

impl<K: HostKey> RoleStore<K> {
    pub(crate) fn new(ctx: IdentityContext<K>) -> Self {
        Self { ctx }
    }

    /// An unset host is filled with the ambient tenant; global roles must
    /// live on the system host.
    pub async fn create(&self, mut role: NewRole<K>) -> HostResult<Role<K>> {
        self.ctx.ensure_open()?;
        require_text(&role.name, "name")?;
        role.name = role.name.trim().to_string();

        let host_id = guard_create(
            EntityKind::Role,
            role.host_id.clone(),
            role.is_global,
            self.ctx.tenant(),
        )?;
        let role = role.into_role(host_id);
        self.check_unique_name(&role).await?;

        let role = self
            .ctx
            .backend()
            .insert_role(role)
            .await
            .map_err(conflict_as_validation)?;
        info!(role_id = %role.id, host_id = %role.host_id, name = %role.name, global = role.is_global, "role created");
        self.ctx.record(
            EntityKind::Role,
            AuditAction::Created,
            role.id,
            Some(role.host_id.clone()),
        );
        Ok(role)
    }

    /// The host a role was created under never changes. A change of
    /// `is_global` is carried over to the role's memberships.
    pub async fn update(&self, mut role: Role<K>) -> HostResult<Role<K>> {
        self.ctx.ensure_open()?;
        require_text(&role.name, "name")?;
        role.name = role.name.trim().to_string();

        let existing = self
            .ctx
            .backend()
            .role_by_id(role.id)
            .await?
            .ok_or_else(|| HostError::not_found(format!("role '{}' not found", role.id)).into_anyhow())?;
        guard_update(
            EntityKind::Role,
            &existing.host_id,
            &role.host_id,
            role.is_global,
            &self.ctx.tenant().system_host_id,
        )?;
        self.check_unique_name(&role).await?;

        let role = self
            .ctx
            .backend()
            .update_role(role)
            .await
            .map_err(conflict_as_validation)?;
        if existing.is_global != role.is_global {
            self.restamp_memberships(&role).await?;
        }
        info!(role_id = %role.id, host_id = %role.host_id, "role updated");
        self.ctx.record(
            EntityKind::Role,
            AuditAction::Updated,
            role.id,
            Some(role.host_id.clone()),
        );
        Ok(role)
    }

    /// Deletes the role and its memberships.
    pub async fn delete(&self, role_id: Uuid) -> HostResult<bool> {
        self.ctx.ensure_open()?;
        let Some(role) = self.ctx.backend().role_by_id(role_id).await? else {
            return Ok(false);
        };

        let deleted = self.ctx.backend().delete_role(role_id).await?;
        if deleted {
            info!(%role_id, host_id = %role.host_id, "role deleted");
            self.ctx
                .record(EntityKind::Role, AuditAction::Deleted, role_id, Some(role.host_id));
        }
        Ok(deleted)
    }

    pub async fn find_by_id(&self, host_id: &K, role_id: Uuid) -> HostResult<Option<Role<K>>> {
        self.ctx.ensure_open()?;
        let scope = TenantScope::tenant_or_global(host_id.clone());
        Ok(self
            .ctx
            .backend()
            .role_by_id(role_id)
            .await?
            .filter(|role| scope.admits(role)))
    }

    /// A tenant role shadows a global role of the same name.
    pub async fn find_by_name(&self, host_id: &K, name: &str) -> HostResult<Option<Role<K>>> {
        self.ctx.ensure_open()?;
        let filter = RoleFilter::new(TenantScope::tenant_or_global(host_id.clone())).name(name.trim());
        let roles = self.ctx.backend().find_roles(&filter).await?;
        debug!(%host_id, role_name = name, candidates = roles.len(), "role lookup");
        Ok(prefer_tenant_row(host_id, roles))
    }

    /// True only for a role owned by `host_id` itself.
    pub async fn exists(&self, host_id: &K, name: &str) -> HostResult<bool> {
        self.ctx.ensure_open()?;
        let filter = RoleFilter::new(TenantScope::tenant_only(host_id.clone())).name(name.trim());
        Ok(!self.ctx.backend().find_roles(&filter).await?.is_empty())
    }

    /// Roles visible to `host_id`.
    pub async fn list(&self, host_id: &K) -> HostResult<Vec<Role<K>>> {
        self.ctx.ensure_open()?;
        let filter = RoleFilter::new(TenantScope::tenant_or_global(host_id.clone()));
        self.ctx.backend().find_roles(&filter).await
    }

    /// Every role on every host.
    pub async fn list_all(&self) -> HostResult<Vec<Role<K>>> {
        self.ctx.ensure_open()?;
        self.ctx
            .backend()
            .find_roles(&RoleFilter::new(TenantScope::AllHosts))
            .await
    }

    async fn restamp_memberships(&self, role: &Role<K>) -> HostResult<()> {
        let backend = self.ctx.backend();
        let system = &self.ctx.tenant().system_host_id;
        let mut changed = 0usize;

        for mut membership in backend.find_role_members(role.id).await? {
            let Some(user) = backend.user_by_id(membership.user_id).await? else {
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

        debug!(role_id = %role.id, global = role.is_global, changed, "role memberships restamped");
        Ok(())
    }

    async fn check_unique_name(&self, role: &Role<K>) -> HostResult<()> {
        let filter =
            RoleFilter::new(TenantScope::tenant_only(role.host_id.clone())).name(role.name.trim());
        let taken = self
            .ctx
            .backend()
            .find_roles(&filter)
            .await?
            .iter()
            .any(|other| other.id != role.id);
        if taken {
            return Err(HostError::unprocessable(format!(
                "role name '{}' is already taken for host '{}'",
                role.name, role.host_id
            ))
            .into_anyhow());
        }
        Ok(())
    }
}
