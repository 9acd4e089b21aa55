//! Table naming and the DDL the relational backends are expected to carry.

use multihost_core::config::SCHEMA_NAME_KEY;
use multihost_core::{HostKey, MultiHostConfigSnapshot, TenantScope};

/// Schema name plus the seven table names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub name: Option<String>,
    pub users: String,
    pub roles: String,
    pub user_claims: String,
    pub user_logins: String,
    pub user_roles: String,
    pub hosts: String,
    pub host_domains: String,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            name: None,
            users: "Users".to_string(),
            roles: "Roles".to_string(),
            user_claims: "UserClaims".to_string(),
            user_logins: "UserLogins".to_string(),
            user_roles: "UserRoles".to_string(),
            hosts: "Hosts".to_string(),
            host_domains: "HostDomains".to_string(),
        }
    }
}

impl Schema {
    /// Defaults overridden by `schema.name` and `tables.*`.
    pub fn from_config(config: &MultiHostConfigSnapshot) -> Self {
        let defaults = Self::default();
        let table = |key: &str, default: String| {
            config
                .get(&format!("tables.{key}"))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .unwrap_or(default)
        };

        Self {
            name: config
                .get(SCHEMA_NAME_KEY)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            users: table("users", defaults.users),
            roles: table("roles", defaults.roles),
            user_claims: table("user_claims", defaults.user_claims),
            user_logins: table("user_logins", defaults.user_logins),
            user_roles: table("user_roles", defaults.user_roles),
            hosts: table("hosts", defaults.hosts),
            host_domains: table("host_domains", defaults.host_domains),
        }
    }

    pub fn qualified(&self, table: &str) -> String {
        match &self.name {
            Some(schema) => format!("{schema}.{table}"),
            None => table.to_string(),
        }
    }

    /// `CREATE TABLE` and `CREATE INDEX` statements for key type `K`.
    pub fn ddl<K: HostKey>(&self) -> Vec<String> {
        let key = K::SQL_TYPE;
        let hosts = self.qualified(&self.hosts);
        let host_domains = self.qualified(&self.host_domains);
        let users = self.qualified(&self.users);
        let roles = self.qualified(&self.roles);
        let user_logins = self.qualified(&self.user_logins);
        let user_roles = self.qualified(&self.user_roles);
        let user_claims = self.qualified(&self.user_claims);

        let mut statements = Vec::new();
        if let Some(schema) = &self.name {
            statements.push(format!("CREATE SCHEMA IF NOT EXISTS {schema}"));
        }

        statements.push(format!(
            "CREATE TABLE {hosts} (\
             Id BIGINT PRIMARY KEY, \
             HostId {key} NOT NULL UNIQUE, \
             Name VARCHAR(256) NOT NULL, \
             IsSystemHost BOOLEAN NOT NULL DEFAULT FALSE)"
        ));
        statements.push(format!(
            "CREATE UNIQUE INDEX IX_{}_Name ON {hosts} (LOWER(Name))",
            self.hosts
        ));
        statements.push(format!(
            "CREATE TABLE {host_domains} (\
             Id BIGINT PRIMARY KEY, \
             HostId BIGINT NOT NULL REFERENCES {hosts} (Id) ON DELETE CASCADE, \
             DomainName VARCHAR(256) NOT NULL)"
        ));
        statements.push(format!(
            "CREATE UNIQUE INDEX IX_{}_DomainName ON {host_domains} (LOWER(DomainName))",
            self.host_domains
        ));

        statements.push(format!(
            "CREATE TABLE {users} (\
             Id UUID PRIMARY KEY, \
             HostId {key} NOT NULL, \
             IsGlobal BOOLEAN NOT NULL DEFAULT FALSE, \
             UserName VARCHAR(256) NOT NULL, \
             Email VARCHAR(256) NULL, \
             EmailConfirmed BOOLEAN NOT NULL DEFAULT FALSE, \
             PasswordHash TEXT NULL, \
             SecurityStamp VARCHAR(64) NOT NULL, \
             CreatedAt TIMESTAMP NOT NULL)"
        ));
        statements.push(format!(
            "CREATE UNIQUE INDEX IX_{}_HostId_UserName ON {users} (HostId, LOWER(UserName))",
            self.users
        ));

        statements.push(format!(
            "CREATE TABLE {roles} (\
             Id UUID PRIMARY KEY, \
             HostId {key} NOT NULL, \
             IsGlobal BOOLEAN NOT NULL DEFAULT FALSE, \
             Name VARCHAR(256) NOT NULL)"
        ));
        statements.push(format!(
            "CREATE UNIQUE INDEX IX_{}_HostId_Name ON {roles} (HostId, LOWER(Name))",
            self.roles
        ));

        statements.push(format!(
            "CREATE TABLE {user_logins} (\
             LoginProvider VARCHAR(128) NOT NULL, \
             ProviderKey VARCHAR(128) NOT NULL, \
             UserId UUID NOT NULL REFERENCES {users} (Id) ON DELETE CASCADE, \
             HostId {key} NOT NULL, \
             IsGlobal BOOLEAN NOT NULL DEFAULT FALSE, \
             PRIMARY KEY (LoginProvider, ProviderKey, UserId))"
        ));
        statements.push(format!(
            "CREATE TABLE {user_roles} (\
             UserId UUID NOT NULL REFERENCES {users} (Id) ON DELETE CASCADE, \
             RoleId UUID NOT NULL REFERENCES {roles} (Id) ON DELETE CASCADE, \
             HostId {key} NOT NULL, \
             IsGlobal BOOLEAN NOT NULL DEFAULT FALSE, \
             PRIMARY KEY (UserId, RoleId))"
        ));
        statements.push(format!(
            "CREATE TABLE {user_claims} (\
             Id BIGINT PRIMARY KEY, \
             UserId UUID NOT NULL REFERENCES {users} (Id) ON DELETE CASCADE, \
             HostId {key} NOT NULL, \
             IsGlobal BOOLEAN NOT NULL DEFAULT FALSE, \
             ClaimType TEXT NULL, \
             ClaimValue TEXT NULL)"
        ));

        statements
    }

    /// SQL form of the visibility predicate; host keys are bound as `$1`.
    pub fn scope_clause<K: HostKey>(&self, scope: &TenantScope<K>) -> &'static str {
        match scope {
            TenantScope::TenantOrGlobal(_) => "(HostId = $1 OR IsGlobal = TRUE)",
            TenantScope::TenantOnly(_) => "HostId = $1",
            TenantScope::AllHosts => "1 = 1",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multihost_core::MultiHostConfig;

    #[test]
    fn config_overrides_table_names() {
        let mut config = MultiHostConfig::new();
        config.set("schema.name", "Identity");
        config.set("tables.users", "Accounts");

        let schema = Schema::from_config(&config.snapshot());
        assert_eq!(schema.qualified(&schema.users), "Identity.Accounts");
        assert_eq!(schema.roles, "Roles");
    }

    #[test]
    fn ddl_carries_tenant_indexes() {
        let ddl = Schema::default().ddl::<uuid::Uuid>();
        assert!(ddl
            .iter()
            .any(|s| s.contains("IX_Users_HostId_UserName") && s.contains("(HostId, LOWER(UserName))")));
        assert!(ddl
            .iter()
            .any(|s| s.contains("PRIMARY KEY (LoginProvider, ProviderKey, UserId)")));
        assert!(ddl.iter().any(|s| s.contains("PRIMARY KEY (UserId, RoleId)")));
        assert!(ddl.iter().any(|s| s.contains("HostId UUID NOT NULL")));
        assert!(ddl.iter().any(|s| s.contains("ON DELETE CASCADE") && s.contains("HostDomains")));
    }

    #[test]
    fn scope_clause_matches_predicate() {
        let schema = Schema::default();
        assert_eq!(
            schema.scope_clause(&TenantScope::tenant_or_global(1_i64)),
            "(HostId = $1 OR IsGlobal = TRUE)"
        );
        assert_eq!(schema.scope_clause(&TenantScope::<i64>::AllHosts), "1 = 1");
    }
}
