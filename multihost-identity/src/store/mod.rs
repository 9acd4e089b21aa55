//! Tenant-aware adapters over an [`IdentityBackend`](crate::backend::IdentityBackend).
//!
//! Stores take the effective host explicitly; defaulting to the ambient
//! tenant happens one layer up, in the managers.

pub mod host;
pub mod role;
pub mod user;

pub use host::HostStore;
pub use role::RoleStore;
pub use user::UserStore;

use multihost_core::{inherited_global, ErrorKind, HostError, HostKey};

/// A unique-key violation raised by the backend surfaces as the same
/// validation failure the pre-flight check would have produced.
pub(crate) fn conflict_as_validation(err: anyhow::Error) -> anyhow::Error {
    match HostError::from_anyhow(&err) {
        Some(host) if host.is(ErrorKind::Conflict) => {
            HostError::unprocessable(host.message.clone()).into_anyhow()
        }
        _ => err,
    }
}

/// A membership is global only when both the user and the role are, and it
/// sits on the system host.
pub(crate) fn membership_global<K: HostKey>(
    user_global: bool,
    role_global: bool,
    host_id: &K,
    system_host_id: &K,
) -> bool {
    inherited_global(user_global && role_global, host_id, system_host_id)
}
