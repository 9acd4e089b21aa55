//! Audit trail for writes made through an identity context.

use chrono::{DateTime, Utc};
use multihost_core::{EntityKind, HostKey};

/// Default number of events a slow subscriber may lag behind.
pub const DEFAULT_AUDIT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent<K: HostKey> {
    pub entity: EntityKind,
    pub action: AuditAction,
    /// Primary key of the row, rendered as text.
    pub entity_id: String,
    /// `None` for rows without a tenant key (host domains).
    pub host_id: Option<K>,
    /// Principal name, or `<system>` when the request had none.
    pub actor: String,
    pub at: DateTime<Utc>,
}
