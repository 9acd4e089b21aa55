use multihost_core::{HostError, HostResult};
use tracing::debug;

/// Password hashing used by [`UserManager`](crate::UserManager).
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> HostResult<String>;
    fn verify(&self, password: &str, hash: &str) -> HostResult<bool>;
}

/// bcrypt with a configurable cost.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    pub cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> HostResult<String> {
        bcrypt::hash(password, self.cost).map_err(|e| {
            HostError::general_error(format!("password hashing failed: {e}"))
                .with_source(e.into())
                .into_anyhow()
        })
    }

    fn verify(&self, password: &str, hash: &str) -> HostResult<bool> {
        match bcrypt::verify(password, hash) {
            Ok(ok) => Ok(ok),
            // a malformed stored hash never matches
            Err(e) => {
                debug!(error = %e, "stored password hash rejected");
                Ok(false)
            }
        }
    }
}
