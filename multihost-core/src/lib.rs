//! multihost-core: tenant keys, the visibility predicate and the guard rules
//! shared by every multi-host identity store.

pub mod config;
pub mod errors;
pub mod guard;
pub mod scope;
pub mod tenant;

pub use config::{MultiHostConfig, MultiHostConfigSnapshot};
pub use errors::{ErrorKind, HostError, HostResult};
pub use guard::{
    assign_host, check_global, guard_create, guard_update, inherited_global, EntityKind,
};
pub use scope::{names_match, normalized_name, prefer_tenant_row, TenantScope, TenantScoped};
pub use tenant::{
    require_key, require_text, resolve_host_id, HostKey, RequestInfo, TenantContext, SYSTEM_ACTOR,
};
