//! # Configuration
//!
//! A string key/value store, layered however the application likes.
//!
//! ```rust
//! use multihost_core::MultiHostConfig;
//!
//! let mut config = MultiHostConfig::new();
//! config.set("schema.name", "Common");
//! config.set("tables.users", "Accounts");
//!
//! let snapshot = config.snapshot();
//! assert_eq!(snapshot.get("tables.users"), Some("Accounts"));
//! ```
//!
//! ## Environment overrides
//!
//! `load_env("MULTIHOST__")` maps `MULTIHOST__TABLES__USERS=Accounts`
//! onto `tables.users`.
//!
//! Recognised keys:
//! - `schema.name`
//! - `tables.users`, `tables.roles`, `tables.user_claims`,
//!   `tables.user_logins`, `tables.user_roles`, `tables.hosts`,
//!   `tables.host_domains`
//! - `audit.capacity`

use std::collections::HashMap;

pub const SCHEMA_NAME_KEY: &str = "schema.name";
pub const AUDIT_CAPACITY_KEY: &str = "audit.capacity";

#[derive(Debug, Default)]
pub struct MultiHostConfig {
    values: HashMap<String, String>,
}

impl MultiHostConfig {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Copy every `PREFIX...` environment variable in, lower-cased with
    /// `__` turned into `.`.
    pub fn load_env(&mut self, prefix: &str) {
        self.load_vars(prefix, std::env::vars());
    }

    /// Same as [`load_env`](Self::load_env) over an explicit variable list.
    pub fn load_vars<I>(&mut self, prefix: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                if !normalized.is_empty() {
                    self.set(normalized, value);
                }
            }
        }
    }

    pub fn snapshot(&self) -> MultiHostConfigSnapshot {
        MultiHostConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MultiHostConfigSnapshot {
    map: HashMap<String, String>,
}

impl MultiHostConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse::<bool>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_style_keys_are_normalized() {
        let mut config = MultiHostConfig::new();
        config.load_vars(
            "MULTIHOST__",
            vec![
                ("MULTIHOST__TABLES__USERS".to_string(), "Accounts".to_string()),
                ("MULTIHOST__AUDIT__CAPACITY".to_string(), "64".to_string()),
                ("OTHER__TABLES__ROLES".to_string(), "Ignored".to_string()),
            ],
        );

        let snapshot = config.snapshot();
        assert_eq!(snapshot.get("tables.users"), Some("Accounts"));
        assert_eq!(snapshot.get_usize(AUDIT_CAPACITY_KEY), Some(64));
        assert!(!config.has("tables.roles"));
    }
}
