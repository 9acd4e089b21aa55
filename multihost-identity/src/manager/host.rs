use multihost_core::{require_key, require_text, HostKey, HostResult};

use crate::context::IdentityContext;
use crate::entities::{Host, HostDomain};
use crate::store::HostStore;

/// The host directory.
pub struct HostManager<K: HostKey> {
    store: HostStore<K>,
}

impl<K: HostKey> HostManager<K> {
    pub(crate) fn new(ctx: IdentityContext<K>) -> Self {
        Self { store: ctx.hosts() }
    }

    pub fn store(&self) -> &HostStore<K> {
        &self.store
    }

    pub async fn create(&self, host_id: K, name: &str) -> HostResult<Host<K>> {
        self.store.create(Host::new(host_id, name.trim())).await
    }

    /// There can be only one.
    pub async fn create_system(&self, host_id: K, name: &str) -> HostResult<Host<K>> {
        self.store.create(Host::system(host_id, name.trim())).await
    }

    pub async fn update(&self, host: Host<K>) -> HostResult<Host<K>> {
        self.store.update(host).await
    }

    pub async fn delete(&self, id: i64) -> HostResult<bool> {
        self.store.delete(id).await
    }

    pub async fn find_by_key(&self, host_id: &K) -> HostResult<Option<Host<K>>> {
        require_key(host_id, "host_id")?;
        self.store.find_by_key(host_id).await
    }

    pub async fn find_by_name(&self, name: &str) -> HostResult<Option<Host<K>>> {
        require_text(name, "name")?;
        self.store.find_by_name(name).await
    }

    pub async fn find_by_domain(&self, domain_name: &str) -> HostResult<Option<Host<K>>> {
        require_text(domain_name, "domain_name")?;
        self.store.find_by_domain(domain_name).await
    }

    pub async fn system_host(&self) -> HostResult<Option<Host<K>>> {
        self.store.system_host().await
    }

    pub async fn hosts(&self) -> HostResult<Vec<Host<K>>> {
        self.store.list().await
    }

    pub async fn domains(&self, host_id: &K) -> HostResult<Vec<String>> {
        require_key(host_id, "host_id")?;
        self.store.domains(host_id).await
    }

    pub async fn add_domain(&self, host_id: &K, domain_name: &str) -> HostResult<HostDomain> {
        require_key(host_id, "host_id")?;
        self.store.add_domain(host_id, domain_name).await
    }

    pub async fn remove_domain(&self, domain_name: &str) -> HostResult<bool> {
        self.store.remove_domain(domain_name).await
    }

    /// Tenant key for an inbound hostname; unmapped names give the system host.
    pub async fn resolve_tenant(&self, hostname: Option<&str>) -> HostResult<K> {
        self.store.resolve_tenant(hostname).await
    }
}
