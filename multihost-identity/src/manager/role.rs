use multihost_core::{require_text, HostError, HostKey, HostResult};
use tracing::debug;
use uuid::Uuid;

use crate::context::IdentityContext;
use crate::entities::{NewRole, Role};
use crate::store::RoleStore;

pub struct RoleManager<K: HostKey> {
    ctx: IdentityContext<K>,
    store: RoleStore<K>,
}

impl<K: HostKey> RoleManager<K> {
    pub(crate) fn new(ctx: IdentityContext<K>) -> Self {
        let store = ctx.roles();
        Self { ctx, store }
    }

    pub fn store(&self) -> &RoleStore<K> {
        &self.store
    }

    pub async fn create(&self, role: NewRole<K>) -> HostResult<Role<K>> {
        require_text(&role.name, "name")?;
        self.store.create(role).await
    }

    /// `NotFound` unless the role is visible from the ambient tenant.
    pub async fn update(&self, role: Role<K>) -> HostResult<Role<K>> {
        require_text(&role.name, "name")?;
        if self.find_by_id(role.id, None).await?.is_none() {
            return Err(HostError::not_found(format!("role '{}' not found", role.id)).into_anyhow());
        }
        self.store.update(role).await
    }

    /// Returns `false` for a role the ambient tenant cannot see.
    pub async fn delete(&self, role_id: Uuid) -> HostResult<bool> {
        if self.find_by_id(role_id, None).await?.is_none() {
            debug!(%role_id, "role not visible, nothing to delete");
            return Ok(false);
        }
        self.store.delete(role_id).await
    }

    pub async fn find_by_id(&self, role_id: Uuid, host_id: Option<&K>) -> HostResult<Option<Role<K>>> {
        let host_id = self.host(host_id);
        self.store.find_by_id(&host_id, role_id).await
    }

    pub async fn find_by_name(&self, name: &str, host_id: Option<&K>) -> HostResult<Option<Role<K>>> {
        require_text(name, "name")?;
        let host_id = self.host(host_id);
        self.store.find_by_name(&host_id, name).await
    }

    /// Whether the host itself owns a role called `name`; global roles do
    /// not count.
    pub async fn role_exists(&self, name: &str, host_id: Option<&K>) -> HostResult<bool> {
        require_text(name, "name")?;
        let host_id = self.host(host_id);
        self.store.exists(&host_id, name).await
    }

    pub async fn roles(&self, host_id: Option<&K>) -> HostResult<Vec<Role<K>>> {
        let host_id = self.host(host_id);
        self.store.list(&host_id).await
    }

    pub async fn all_roles(&self) -> HostResult<Vec<Role<K>>> {
        self.store.list_all().await
    }

    fn host(&self, host_id: Option<&K>) -> K {
        self.ctx.tenant().effective_host(host_id)
    }
}
