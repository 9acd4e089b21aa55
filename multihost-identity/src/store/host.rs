use multihost_core::{
    bail_host, normalized_name, require_key, require_text, EntityKind, HostError, HostKey,
    HostResult, TenantScope,
};
use tracing::{debug, info, warn};

use crate::audit::AuditAction;
use crate::backend::{IdentityBackend, RoleFilter, UserFilter};
use crate::context::IdentityContext;
use crate::entities::{Host, HostDomain};

/// Map a request hostname onto a tenant key.
///
/// Unknown or missing hostnames resolve to the system host.
pub(crate) async fn resolve_host_key<K: HostKey>(
    backend: &dyn IdentityBackend<K>,
    system: &Host<K>,
    hostname: Option<&str>,
) -> HostResult<K> {
    let Some(hostname) = hostname.map(str::trim).filter(|h| !h.is_empty()) else {
        debug!(system_host_id = %system.host_id, "no hostname, using system host");
        return Ok(system.host_id.clone());
    };

    let Some(domain) = backend.domain_by_name(hostname).await? else {
        warn!(hostname, system_host_id = %system.host_id, "unmapped hostname, falling back to system host");
        return Ok(system.host_id.clone());
    };

    match backend.host_by_id(domain.host).await? {
        Some(host) => {
            debug!(hostname, host_id = %host.host_id, "resolved tenant from domain");
            Ok(host.host_id)
        }
        None => {
            warn!(hostname, host = domain.host, "domain points at a missing host, falling back to system host");
            Ok(system.host_id.clone())
        }
    }
}

/// Hosts and the domains that map onto them.
pub struct HostStore<K: HostKey> {
    ctx: IdentityContext<K>,
}

impl<K: HostKey> HostStore<K> {
    pub(crate) fn new(ctx: IdentityContext<K>) -> Self {
        Self { ctx }
    }

    pub async fn create(&self, host: Host<K>) -> HostResult<Host<K>> {
        self.ctx.ensure_open()?;
        require_key(&host.host_id, "host_id")?;
        require_text(&host.name, "name")?;

        let backend = self.ctx.backend();
        if backend.host_by_key(&host.host_id).await?.is_some() {
            bail_host!(conflict, "host key '{}' already exists", host.host_id);
        }
        if backend.host_by_name(&host.name).await?.is_some() {
            bail_host!(conflict, "host '{}' already exists", host.name);
        }
        if host.is_system_host {
            if let Some(system) = backend.system_host().await? {
                bail_host!(conflict, "host '{}' is already the system host", system.name);
            }
        }

        let host = backend.insert_host(host).await?;
        info!(id = host.id, host_id = %host.host_id, name = %host.name, system = host.is_system_host, "host created");
        self.ctx.record(
            EntityKind::Host,
            AuditAction::Created,
            host.id,
            Some(host.host_id.clone()),
        );
        Ok(host)
    }

    /// Renames a host or moves the system flag; the key is fixed once
    /// users or roles live under it.
    pub async fn update(&self, host: Host<K>) -> HostResult<Host<K>> {
        self.ctx.ensure_open()?;
        require_key(&host.host_id, "host_id")?;
        require_text(&host.name, "name")?;

        let existing = self
            .ctx
            .backend()
            .host_by_id(host.id)
            .await?
            .ok_or_else(|| HostError::not_found(format!("host {} not found", host.id)).into_anyhow())?;

        if existing.host_id != host.host_id && self.owns_rows(&existing.host_id).await? {
            warn!(id = host.id, existing = %existing.host_id, incoming = %host.host_id, "rejected host key change");
            return Err(HostError::unprocessable(format!(
                "host '{}' still owns users or roles and cannot change its key",
                existing.name
            ))
            .into_anyhow());
        }

        let host = self.ctx.backend().update_host(host).await?;
        info!(id = host.id, host_id = %host.host_id, "host updated");
        self.ctx.record(
            EntityKind::Host,
            AuditAction::Updated,
            host.id,
            Some(host.host_id.clone()),
        );
        Ok(host)
    }

    /// Removes the host and its domains. Returns `false` when no such host exists.
    pub async fn delete(&self, id: i64) -> HostResult<bool> {
        self.ctx.ensure_open()?;
        let Some(host) = self.ctx.backend().host_by_id(id).await? else {
            return Ok(false);
        };

        if host.is_system_host {
            warn!(id, "rejected deletion of the system host");
            bail_host!(unprocessable, "the system host cannot be deleted");
        }
        if self.owns_rows(&host.host_id).await? {
            warn!(id, host_id = %host.host_id, "rejected deletion of a referenced host");
            bail_host!(unprocessable, "host '{}' still owns users or roles", host.name);
        }

        let deleted = self.ctx.backend().delete_host(id).await?;
        if deleted {
            info!(id, host_id = %host.host_id, "host deleted");
            self.ctx
                .record(EntityKind::Host, AuditAction::Deleted, id, Some(host.host_id));
        }
        Ok(deleted)
    }

    pub async fn find_by_key(&self, host_id: &K) -> HostResult<Option<Host<K>>> {
        self.ctx.ensure_open()?;
        self.ctx.backend().host_by_key(host_id).await
    }

    pub async fn find_by_name(&self, name: &str) -> HostResult<Option<Host<K>>> {
        self.ctx.ensure_open()?;
        self.ctx.backend().host_by_name(name.trim()).await
    }

    pub async fn find_by_domain(&self, domain_name: &str) -> HostResult<Option<Host<K>>> {
        self.ctx.ensure_open()?;
        let backend = self.ctx.backend();
        match backend.domain_by_name(domain_name.trim()).await? {
            Some(domain) => backend.host_by_id(domain.host).await,
            None => Ok(None),
        }
    }

    pub async fn system_host(&self) -> HostResult<Option<Host<K>>> {
        self.ctx.ensure_open()?;
        self.ctx.backend().system_host().await
    }

    pub async fn list(&self) -> HostResult<Vec<Host<K>>> {
        self.ctx.ensure_open()?;
        self.ctx.backend().list_hosts().await
    }

    /// Domain names mapped onto the host with key `host_id`.
    pub async fn domains(&self, host_id: &K) -> HostResult<Vec<String>> {
        self.ctx.ensure_open()?;
        let host = self.require_host(host_id).await?;
        let mut names: Vec<String> = self
            .ctx
            .backend()
            .domains_for_host(host.id)
            .await?
            .into_iter()
            .map(|d| d.domain_name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Domain names are stored lower-cased; a name already mapped to any
    /// host is a `Conflict`.
    pub async fn add_domain(&self, host_id: &K, domain_name: &str) -> HostResult<HostDomain> {
        self.ctx.ensure_open()?;
        require_text(domain_name, "domain_name")?;
        let domain_name = normalized_name(domain_name);
        let host = self.require_host(host_id).await?;

        let backend = self.ctx.backend();
        if backend.domain_by_name(&domain_name).await?.is_some() {
            bail_host!(conflict, "domain '{}' already exists", domain_name);
        }

        let domain = backend
            .insert_domain(HostDomain {
                id: 0,
                host: host.id,
                domain_name,
            })
            .await?;
        info!(domain = %domain.domain_name, host_id = %host.host_id, "domain added");
        self.ctx.record(
            EntityKind::HostDomain,
            AuditAction::Created,
            &domain.domain_name,
            Some(host.host_id),
        );
        Ok(domain)
    }

    /// Removing an unknown domain is a no-op.
    pub async fn remove_domain(&self, domain_name: &str) -> HostResult<bool> {
        self.ctx.ensure_open()?;
        require_text(domain_name, "domain_name")?;
        let domain_name = domain_name.trim();

        let removed = self.ctx.backend().delete_domain(domain_name).await?;
        if removed {
            info!(domain = %domain_name, "domain removed");
            self.ctx
                .record(EntityKind::HostDomain, AuditAction::Deleted, domain_name, None);
        } else {
            debug!(domain = %domain_name, "domain not mapped, nothing to remove");
        }
        Ok(removed)
    }

    /// Tenant key for a request hostname, or the system host's key.
    pub async fn resolve_tenant(&self, hostname: Option<&str>) -> HostResult<K> {
        self.ctx.ensure_open()?;
        let backend = self.ctx.backend();
        let system = backend
            .system_host()
            .await?
            .ok_or_else(|| HostError::not_found("no system host is configured").into_anyhow())?;
        resolve_host_key(backend, &system, hostname).await
    }

    async fn require_host(&self, host_id: &K) -> HostResult<Host<K>> {
        self.ctx
            .backend()
            .host_by_key(host_id)
            .await?
            .ok_or_else(|| HostError::not_found(format!("host '{host_id}' not found")).into_anyhow())
    }

    async fn owns_rows(&self, host_id: &K) -> HostResult<bool> {
        let backend = self.ctx.backend();
        let scope = TenantScope::tenant_only(host_id.clone());
        if !backend.find_users(&UserFilter::new(scope.clone())).await?.is_empty() {
            return Ok(true);
        }
        Ok(!backend.find_roles(&RoleFilter::new(scope)).await?.is_empty())
    }
}
