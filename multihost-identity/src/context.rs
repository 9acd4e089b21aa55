use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use multihost_core::config::AUDIT_CAPACITY_KEY;
use multihost_core::{
    EntityKind, HostError, HostKey, HostResult, MultiHostConfigSnapshot, RequestInfo,
    TenantContext,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::audit::{AuditAction, AuditEvent, DEFAULT_AUDIT_CAPACITY};
use crate::backend::IdentityBackend;
use crate::manager::{HostManager, RoleManager, UserManager};
use crate::password::PasswordHasher;
use crate::schema::Schema;
use crate::store::host::resolve_host_key;
use crate::store::{HostStore, RoleStore, UserStore};

struct IdentityContextInner<K: HostKey> {
    backend: Arc<dyn IdentityBackend<K>>,
    tenant: TenantContext<K>,
    schema: Schema,
    events: broadcast::Sender<AuditEvent<K>>,
    closed: AtomicBool,
}

/// One unit of work against the identity tables.
///
/// Carries the tenant the work runs under, the table naming and the audit
/// channel. Stores and managers handed out by a context share it; once
/// [`close`](Self::close) is called every one of them fails with `Gone`.
pub struct IdentityContext<K: HostKey> {
    inner: Arc<IdentityContextInner<K>>,
}

impl<K: HostKey> Clone for IdentityContext<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: HostKey> IdentityContext<K> {
    pub fn new(backend: Arc<dyn IdentityBackend<K>>, tenant: TenantContext<K>) -> HostResult<Self> {
        Self::with_config(backend, tenant, &MultiHostConfigSnapshot::default())
    }

    pub fn with_config(
        backend: Arc<dyn IdentityBackend<K>>,
        tenant: TenantContext<K>,
        config: &MultiHostConfigSnapshot,
    ) -> HostResult<Self> {
        tenant.validate()?;

        let capacity = config
            .get_usize(AUDIT_CAPACITY_KEY)
            .unwrap_or(DEFAULT_AUDIT_CAPACITY)
            .max(1);
        let (events, _) = broadcast::channel(capacity);

        debug!(host_id = %tenant.host_id, system_host_id = %tenant.system_host_id, "identity context opened");

        Ok(Self {
            inner: Arc::new(IdentityContextInner {
                backend,
                tenant,
                schema: Schema::from_config(config),
                events,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Resolve the tenant from the request's hostname, falling back to the
    /// system host when the hostname is missing or unmapped.
    pub async fn for_request(
        backend: Arc<dyn IdentityBackend<K>>,
        request: &RequestInfo,
        config: &MultiHostConfigSnapshot,
    ) -> HostResult<Self> {
        let system = backend
            .system_host()
            .await?
            .ok_or_else(|| HostError::not_found("no system host is configured").into_anyhow())?;

        let host_id = resolve_host_key(backend.as_ref(), &system, request.hostname()).await?;

        let mut tenant = TenantContext::new(host_id, system.host_id);
        if let Some(user_name) = request.user_name() {
            tenant = tenant.with_user(user_name);
        }

        Self::with_config(backend, tenant, config)
    }

    pub fn tenant(&self) -> &TenantContext<K> {
        &self.inner.tenant
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn users(&self) -> UserStore<K> {
        UserStore::new(self.clone())
    }

    pub fn roles(&self) -> RoleStore<K> {
        RoleStore::new(self.clone())
    }

    pub fn hosts(&self) -> HostStore<K> {
        HostStore::new(self.clone())
    }

    pub fn user_manager(&self, hasher: Arc<dyn PasswordHasher>) -> UserManager<K> {
        UserManager::new(self.clone(), hasher)
    }

    pub fn role_manager(&self) -> RoleManager<K> {
        RoleManager::new(self.clone())
    }

    pub fn host_manager(&self) -> HostManager<K> {
        HostManager::new(self.clone())
    }

    /// Audit events for every write made through this context.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent<K>> {
        self.inner.events.subscribe()
    }

    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            info!(host_id = %self.inner.tenant.host_id, "identity context closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> HostResult<()> {
        if self.is_closed() {
            return Err(HostError::gone("identity context has been closed").into_anyhow());
        }
        Ok(())
    }

    pub(crate) fn backend(&self) -> &dyn IdentityBackend<K> {
        self.inner.backend.as_ref()
    }

    pub(crate) fn record(
        &self,
        entity: EntityKind,
        action: AuditAction,
        entity_id: impl ToString,
        host_id: Option<K>,
    ) {
        let event = AuditEvent {
            entity,
            action,
            entity_id: entity_id.to_string(),
            host_id,
            actor: self.inner.tenant.actor().to_string(),
            at: Utc::now(),
        };
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }
}
