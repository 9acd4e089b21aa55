//! Create and update guards for tenant-scoped rows.

use std::fmt;

use tracing::{debug, warn};

use crate::errors::{HostError, HostResult};
use crate::tenant::{HostKey, TenantContext};

/// The tenant-scoped entity families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Host,
    HostDomain,
    User,
    Role,
    UserLogin,
    UserRole,
    UserClaim,
}

impl EntityKind {
    /// Plural noun used in messages.
    pub fn plural(&self) -> &'static str {
        match self {
            EntityKind::Host => "hosts",
            EntityKind::HostDomain => "host domains",
            EntityKind::User => "users",
            EntityKind::Role => "roles",
            EntityKind::UserLogin => "user logins",
            EntityKind::UserRole => "user roles",
            EntityKind::UserClaim => "user claims",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Host => "Host",
            EntityKind::HostDomain => "HostDomain",
            EntityKind::User => "User",
            EntityKind::Role => "Role",
            EntityKind::UserLogin => "UserLogin",
            EntityKind::UserRole => "UserRole",
            EntityKind::UserClaim => "UserClaim",
        };
        f.write_str(name)
    }
}

pub fn global_outside_system_host(kind: EntityKind) -> String {
    format!("global {} must belong to the system host", kind.plural())
}

pub fn host_reassigned(kind: EntityKind) -> String {
    format!("{} cannot be reassigned to a different host", kind.plural())
}

/// Step 1: fill an unset host with the ambient tenant.
pub fn assign_host<K: HostKey>(requested: Option<K>, ctx: &TenantContext<K>) -> K {
    match requested {
        Some(host_id) if !host_id.is_blank() => host_id,
        _ => {
            debug!(host_id = %ctx.host_id, "host id unset, assigning ambient host");
            ctx.host_id.clone()
        }
    }
}

/// Global rows live on the system host.
pub fn check_global<K: HostKey>(
    kind: EntityKind,
    host_id: &K,
    is_global: bool,
    system_host_id: &K,
) -> HostResult<()> {
    if is_global && host_id != system_host_id {
        warn!(%kind, %host_id, %system_host_id, "rejected global row outside system host");
        return Err(HostError::unprocessable(global_outside_system_host(kind)).into_anyhow());
    }
    Ok(())
}

/// Resolve the host of a new row and validate its global flag.
pub fn guard_create<K: HostKey>(
    kind: EntityKind,
    requested: Option<K>,
    is_global: bool,
    ctx: &TenantContext<K>,
) -> HostResult<K> {
    let host_id = assign_host(requested, ctx);
    check_global(kind, &host_id, is_global, &ctx.system_host_id)?;
    Ok(host_id)
}

/// Validate an update against the persisted row. Every violation is
/// reported, not just the first.
pub fn guard_update<K: HostKey>(
    kind: EntityKind,
    existing_host: &K,
    incoming_host: &K,
    is_global: bool,
    system_host_id: &K,
) -> HostResult<()> {
    let mut errors = Vec::new();

    if existing_host != incoming_host {
        errors.push(host_reassigned(kind));
    }
    if is_global && incoming_host != system_host_id {
        errors.push(global_outside_system_host(kind));
    }

    if errors.is_empty() {
        return Ok(());
    }

    warn!(%kind, %existing_host, %incoming_host, is_global, "rejected update");
    Err(HostError::validation(errors).into_anyhow())
}

/// Globality of a join row written through a relationship: the owner must
/// be global and the row must land on the system host.
pub fn inherited_global<K: HostKey>(owner_is_global: bool, host_id: &K, system_host_id: &K) -> bool {
    owner_is_global && host_id == system_host_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn ctx() -> TenantContext<i64> {
        TenantContext::new(2, 0)
    }

    #[test]
    fn unset_host_takes_ambient_tenant() {
        assert_eq!(guard_create(EntityKind::User, None, false, &ctx()).unwrap(), 2);
        assert_eq!(guard_create(EntityKind::User, Some(5), false, &ctx()).unwrap(), 5);
    }

    #[test]
    fn global_row_needs_system_host() {
        let err = guard_create(EntityKind::Role, Some(1), true, &ctx()).unwrap_err();
        let host = HostError::from_anyhow(&err).unwrap();
        assert_eq!(host.kind, ErrorKind::Unprocessable);
        assert_eq!(host.errors, vec!["global roles must belong to the system host".to_string()]);

        assert_eq!(guard_create(EntityKind::Role, Some(0), true, &ctx()).unwrap(), 0);
    }

    #[test]
    fn update_reports_every_violation() {
        let err = guard_update(EntityKind::User, &2_i64, &3, true, &0).unwrap_err();
        let host = HostError::from_anyhow(&err).unwrap();
        assert_eq!(host.errors.len(), 2);

        assert!(guard_update(EntityKind::User, &2_i64, &2, false, &0).is_ok());
    }

    #[test]
    fn join_rows_are_global_only_on_system_host() {
        assert!(inherited_global(true, &0_i64, &0));
        assert!(!inherited_global(true, &1_i64, &0));
        assert!(!inherited_global(false, &0_i64, &0));
    }
}
