//! The visibility rule shared by every lookup.
//!
//! A row is visible to a tenant when it belongs to that tenant or is
//! flagged global. `IsGlobal` is the only cross-tenant signal: a system-host
//! row that is not flagged global is visible to the system host alone.

use crate::tenant::HostKey;

/// Anything partitioned by host.
pub trait TenantScoped<K: HostKey> {
    fn host_id(&self) -> &K;
    fn is_global(&self) -> bool;
}

/// Which rows a query may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope<K: HostKey> {
    /// `row.host_id == k || row.is_global`
    TenantOrGlobal(K),
    /// `row.host_id == k`
    TenantOnly(K),
    /// Every host; administrative listings only.
    AllHosts,
}

impl<K: HostKey> TenantScope<K> {
    pub fn tenant_or_global(host_id: K) -> Self {
        Self::TenantOrGlobal(host_id)
    }

    pub fn tenant_only(host_id: K) -> Self {
        Self::TenantOnly(host_id)
    }

    pub fn host_id(&self) -> Option<&K> {
        match self {
            Self::TenantOrGlobal(k) | Self::TenantOnly(k) => Some(k),
            Self::AllHosts => None,
        }
    }

    /// Evaluate the predicate against raw column values.
    pub fn admits_parts(&self, host_id: &K, is_global: bool) -> bool {
        match self {
            Self::TenantOrGlobal(k) => host_id == k || is_global,
            Self::TenantOnly(k) => host_id == k,
            Self::AllHosts => true,
        }
    }

    pub fn admits<E: TenantScoped<K>>(&self, row: &E) -> bool {
        self.admits_parts(row.host_id(), row.is_global())
    }

    /// Keep only the visible rows.
    pub fn filter<E, I>(&self, rows: I) -> Vec<E>
    where
        E: TenantScoped<K>,
        I: IntoIterator<Item = E>,
    {
        rows.into_iter().filter(|row| self.admits(row)).collect()
    }
}

/// Case-insensitive equality for user, role, host and domain names.
pub fn names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Lower-cased form used as the key of case-insensitive unique indexes.
pub fn normalized_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Among rows with the same name, prefer the one owned by `host_id`
/// over a global one.
pub fn prefer_tenant_row<K, E>(host_id: &K, rows: Vec<E>) -> Option<E>
where
    K: HostKey,
    E: TenantScoped<K>,
{
    let mut global = None;
    for row in rows {
        if row.host_id() == host_id {
            return Some(row);
        }
        if global.is_none() {
            global = Some(row);
        }
    }
    global
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        host: i64,
        global: bool,
    }

    impl TenantScoped<i64> for Row {
        fn host_id(&self) -> &i64 {
            &self.host
        }
        fn is_global(&self) -> bool {
            self.global
        }
    }

    #[test]
    fn tenant_or_global_admits_own_and_global_rows() {
        let scope = TenantScope::tenant_or_global(1_i64);
        assert!(scope.admits(&Row { host: 1, global: false }));
        assert!(scope.admits(&Row { host: 0, global: true }));
        assert!(!scope.admits(&Row { host: 2, global: false }));
        // system host rows are not implicitly global
        assert!(!scope.admits(&Row { host: 0, global: false }));
    }

    #[test]
    fn tenant_only_ignores_global_flag() {
        let scope = TenantScope::tenant_only(1_i64);
        assert!(!scope.admits(&Row { host: 0, global: true }));
        assert!(scope.admits(&Row { host: 1, global: false }));
        assert!(TenantScope::<i64>::AllHosts.admits(&Row { host: 9, global: false }));
    }

    #[test]
    fn tenant_row_shadows_global_row() {
        let rows = vec![Row { host: 0, global: true }, Row { host: 1, global: false }];
        let picked = prefer_tenant_row(&1, rows).unwrap();
        assert_eq!(picked.host, 1);

        let rows = vec![Row { host: 0, global: true }];
        assert_eq!(prefer_tenant_row(&1, rows).unwrap().host, 0);
    }

    #[test]
    fn names_compare_case_insensitively() {
        assert!(names_match("Admin", "ADMIN"));
        assert!(names_match("straße", "STRAßE"));
        assert!(!names_match("admin", "admins"));
    }
}
