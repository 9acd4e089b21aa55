//! multihost-identity: users, roles, logins and claims partitioned by host.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use multihost_core::TenantContext;
//! use multihost_identity::{IdentityContext, MemoryBackend, NewRole};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let backend = Arc::new(MemoryBackend::<i64>::new());
//! let ctx = IdentityContext::new(backend, TenantContext::new(1, 0))?;
//!
//! let roles = ctx.role_manager();
//! roles.create(NewRole::new("Admin").in_host(0).global()).await?;
//! roles.create(NewRole::new("Admin")).await?;
//! assert_eq!(roles.roles(None).await?.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod backend;
pub mod context;
pub mod entities;
pub mod manager;
pub mod password;
pub mod schema;
pub mod store;

pub use audit::{AuditAction, AuditEvent};
pub use backend::memory::MemoryBackend;
pub use backend::{IdentityBackend, LoginFilter, RoleFilter, UserFilter};
pub use context::IdentityContext;
pub use entities::{
    Claim, Host, HostDomain, LoginInfo, NewRole, NewUser, Role, User, UserClaim, UserLogin,
    UserRole,
};
pub use manager::{HostManager, RoleManager, UserManager};
pub use password::{BcryptHasher, PasswordHasher};
pub use schema::Schema;
pub use store::{HostStore, RoleStore, UserStore};
