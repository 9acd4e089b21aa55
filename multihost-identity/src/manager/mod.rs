//! Caller-facing API. Every host argument is optional and defaults to the
//! context's ambient tenant.

pub mod host;
pub mod role;
pub mod user;

pub use host::HostManager;
pub use role::RoleManager;
pub use user::UserManager;
