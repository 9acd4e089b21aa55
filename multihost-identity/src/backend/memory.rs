use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use multihost_core::{names_match, HostError, HostKey, HostResult, TenantScope};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::backend::{IdentityBackend, LoginFilter, RoleFilter, UserFilter};
use crate::entities::{Host, HostDomain, LoginInfo, Role, User, UserClaim, UserLogin, UserRole};

struct Tables<K: HostKey> {
    hosts: BTreeMap<i64, Host<K>>,
    domains: BTreeMap<i64, HostDomain>,
    users: HashMap<Uuid, User<K>>,
    roles: HashMap<Uuid, Role<K>>,
    logins: Vec<UserLogin<K>>,
    user_roles: Vec<UserRole<K>>,
    claims: BTreeMap<i64, UserClaim<K>>,
    next_host: i64,
    next_domain: i64,
    next_claim: i64,
}

impl<K: HostKey> Default for Tables<K> {
    fn default() -> Self {
        Self {
            hosts: BTreeMap::new(),
            domains: BTreeMap::new(),
            users: HashMap::new(),
            roles: HashMap::new(),
            logins: Vec::new(),
            user_roles: Vec::new(),
            claims: BTreeMap::new(),
            next_host: 1,
            next_domain: 1,
            next_claim: 1,
        }
    }
}

impl<K: HostKey> Tables<K> {
    fn check_host(&self, host: &Host<K>) -> HostResult<()> {
        for other in self.hosts.values().filter(|h| h.id != host.id) {
            if other.host_id == host.host_id {
                return Err(conflict(format!("host key '{}' already exists", host.host_id)));
            }
            if names_match(&other.name, &host.name) {
                return Err(conflict(format!("host '{}' already exists", host.name)));
            }
            if host.is_system_host && other.is_system_host {
                return Err(conflict(format!(
                    "host '{}' is already the system host",
                    other.name
                )));
            }
        }
        Ok(())
    }

    fn check_user(&self, user: &User<K>) -> HostResult<()> {
        let taken = self.users.values().any(|other| {
            other.id != user.id
                && other.host_id == user.host_id
                && names_match(&other.user_name, &user.user_name)
        });
        if taken {
            return Err(conflict(format!(
                "user name '{}' already exists for host '{}'",
                user.user_name, user.host_id
            )));
        }
        Ok(())
    }

    fn check_role(&self, role: &Role<K>) -> HostResult<()> {
        let taken = self.roles.values().any(|other| {
            other.id != role.id
                && other.host_id == role.host_id
                && names_match(&other.name, &role.name)
        });
        if taken {
            return Err(conflict(format!(
                "role '{}' already exists for host '{}'",
                role.name, role.host_id
            )));
        }
        Ok(())
    }

    fn require_user(&self, user_id: Uuid) -> HostResult<()> {
        if !self.users.contains_key(&user_id) {
            return Err(HostError::not_found(format!("user '{user_id}' not found")).into_anyhow());
        }
        Ok(())
    }
}

fn conflict(message: String) -> anyhow::Error {
    HostError::conflict(message).into_anyhow()
}

/// In-memory backend for tests, tools and single-process deployments.
///
/// All tables sit behind one lock so that each constraint check and the
/// write it guards happen atomically.
pub struct MemoryBackend<K: HostKey> {
    tables: RwLock<Tables<K>>,
}

impl<K: HostKey> MemoryBackend<K> {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl<K: HostKey> Default for MemoryBackend<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: HostKey> IdentityBackend<K> for MemoryBackend<K> {
    async fn insert_host(&self, mut host: Host<K>) -> HostResult<Host<K>> {
        let mut tables = self.tables.write();
        host.id = 0;
        tables.check_host(&host)?;

        host.id = tables.next_host;
        tables.next_host += 1;
        tables.hosts.insert(host.id, host.clone());
        Ok(host)
    }

    async fn update_host(&self, host: Host<K>) -> HostResult<Host<K>> {
        let mut tables = self.tables.write();
        if !tables.hosts.contains_key(&host.id) {
            return Err(HostError::not_found(format!("host {} not found", host.id)).into_anyhow());
        }
        tables.check_host(&host)?;
        tables.hosts.insert(host.id, host.clone());
        Ok(host)
    }

    async fn delete_host(&self, id: i64) -> HostResult<bool> {
        let mut tables = self.tables.write();
        if tables.hosts.remove(&id).is_none() {
            return Ok(false);
        }
        tables.domains.retain(|_, d| d.host != id);
        Ok(true)
    }

    async fn host_by_id(&self, id: i64) -> HostResult<Option<Host<K>>> {
        Ok(self.tables.read().hosts.get(&id).cloned())
    }

    async fn host_by_key(&self, host_id: &K) -> HostResult<Option<Host<K>>> {
        let tables = self.tables.read();
        Ok(tables.hosts.values().find(|h| &h.host_id == host_id).cloned())
    }

    async fn host_by_name(&self, name: &str) -> HostResult<Option<Host<K>>> {
        let tables = self.tables.read();
        Ok(tables
            .hosts
            .values()
            .find(|h| names_match(&h.name, name))
            .cloned())
    }

    async fn system_host(&self) -> HostResult<Option<Host<K>>> {
        let tables = self.tables.read();
        Ok(tables.hosts.values().find(|h| h.is_system_host).cloned())
    }

    async fn list_hosts(&self) -> HostResult<Vec<Host<K>>> {
        Ok(self.tables.read().hosts.values().cloned().collect())
    }

    async fn insert_domain(&self, mut domain: HostDomain) -> HostResult<HostDomain> {
        let mut tables = self.tables.write();
        if !tables.hosts.contains_key(&domain.host) {
            return Err(
                HostError::not_found(format!("host {} not found", domain.host)).into_anyhow(),
            );
        }
        if tables
            .domains
            .values()
            .any(|d| names_match(&d.domain_name, &domain.domain_name))
        {
            return Err(conflict(format!(
                "domain '{}' already exists",
                domain.domain_name
            )));
        }

        domain.id = tables.next_domain;
        tables.next_domain += 1;
        tables.domains.insert(domain.id, domain.clone());
        Ok(domain)
    }

    async fn delete_domain(&self, domain_name: &str) -> HostResult<bool> {
        let mut tables = self.tables.write();
        let before = tables.domains.len();
        tables
            .domains
            .retain(|_, d| !names_match(&d.domain_name, domain_name));
        Ok(tables.domains.len() != before)
    }

    async fn domain_by_name(&self, domain_name: &str) -> HostResult<Option<HostDomain>> {
        let tables = self.tables.read();
        Ok(tables
            .domains
            .values()
            .find(|d| names_match(&d.domain_name, domain_name))
            .cloned())
    }

    async fn domains_for_host(&self, host: i64) -> HostResult<Vec<HostDomain>> {
        let tables = self.tables.read();
        Ok(tables
            .domains
            .values()
            .filter(|d| d.host == host)
            .cloned()
            .collect())
    }

    async fn insert_user(&self, user: User<K>) -> HostResult<User<K>> {
        let mut tables = self.tables.write();
        if tables.users.contains_key(&user.id) {
            return Err(conflict(format!("user '{}' already exists", user.id)));
        }
        tables.check_user(&user)?;
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, user: User<K>) -> HostResult<User<K>> {
        let mut tables = self.tables.write();
        tables.require_user(user.id)?;
        tables.check_user(&user)?;
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete_user(&self, id: Uuid) -> HostResult<bool> {
        let mut tables = self.tables.write();
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }
        tables.logins.retain(|l| l.user_id != id);
        tables.user_roles.retain(|ur| ur.user_id != id);
        tables.claims.retain(|_, c| c.user_id != id);
        Ok(true)
    }

    async fn user_by_id(&self, id: Uuid) -> HostResult<Option<User<K>>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_users(&self, filter: &UserFilter<K>) -> HostResult<Vec<User<K>>> {
        let tables = self.tables.read();
        let mut users: Vec<User<K>> = tables
            .users
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.user_name.cmp(&b.user_name).then(a.created_at.cmp(&b.created_at)));
        Ok(users)
    }

    async fn insert_role(&self, role: Role<K>) -> HostResult<Role<K>> {
        let mut tables = self.tables.write();
        if tables.roles.contains_key(&role.id) {
            return Err(conflict(format!("role '{}' already exists", role.id)));
        }
        tables.check_role(&role)?;
        tables.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn update_role(&self, role: Role<K>) -> HostResult<Role<K>> {
        let mut tables = self.tables.write();
        if !tables.roles.contains_key(&role.id) {
            return Err(HostError::not_found(format!("role '{}' not found", role.id)).into_anyhow());
        }
        tables.check_role(&role)?;
        tables.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn delete_role(&self, id: Uuid) -> HostResult<bool> {
        let mut tables = self.tables.write();
        if tables.roles.remove(&id).is_none() {
            return Ok(false);
        }
        tables.user_roles.retain(|ur| ur.role_id != id);
        Ok(true)
    }

    async fn role_by_id(&self, id: Uuid) -> HostResult<Option<Role<K>>> {
        Ok(self.tables.read().roles.get(&id).cloned())
    }

    async fn find_roles(&self, filter: &RoleFilter<K>) -> HostResult<Vec<Role<K>>> {
        let tables = self.tables.read();
        let mut roles: Vec<Role<K>> = tables
            .roles
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name).then(a.is_global.cmp(&b.is_global)));
        Ok(roles)
    }

    async fn insert_login(&self, login: UserLogin<K>) -> HostResult<UserLogin<K>> {
        let mut tables = self.tables.write();
        tables.require_user(login.user_id)?;
        let info = login.info();
        if tables
            .logins
            .iter()
            .any(|l| l.user_id == login.user_id && l.is_for(&info))
        {
            return Err(conflict(format!(
                "login '{}' is already linked to user '{}'",
                login.login_provider, login.user_id
            )));
        }
        tables.logins.push(login.clone());
        Ok(login)
    }

    async fn update_login(&self, login: UserLogin<K>) -> HostResult<UserLogin<K>> {
        let mut tables = self.tables.write();
        let info = login.info();
        let Some(row) = tables
            .logins
            .iter_mut()
            .find(|l| l.user_id == login.user_id && l.is_for(&info))
        else {
            return Err(HostError::not_found(format!(
                "login '{}' not found for user '{}'",
                login.login_provider, login.user_id
            ))
            .into_anyhow());
        };
        *row = login.clone();
        Ok(login)
    }

    async fn delete_login(&self, user_id: Uuid, login: &LoginInfo) -> HostResult<bool> {
        let mut tables = self.tables.write();
        let before = tables.logins.len();
        tables
            .logins
            .retain(|l| !(l.user_id == user_id && l.is_for(login)));
        Ok(tables.logins.len() != before)
    }

    async fn find_logins(&self, filter: &LoginFilter<K>) -> HostResult<Vec<UserLogin<K>>> {
        let tables = self.tables.read();
        Ok(tables
            .logins
            .iter()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect())
    }

    async fn insert_user_role(&self, user_role: UserRole<K>) -> HostResult<UserRole<K>> {
        let mut tables = self.tables.write();
        tables.require_user(user_role.user_id)?;
        if !tables.roles.contains_key(&user_role.role_id) {
            return Err(
                HostError::not_found(format!("role '{}' not found", user_role.role_id))
                    .into_anyhow(),
            );
        }
        if tables
            .user_roles
            .iter()
            .any(|ur| ur.user_id == user_role.user_id && ur.role_id == user_role.role_id)
        {
            return Err(conflict(format!(
                "user '{}' is already in role '{}'",
                user_role.user_id, user_role.role_id
            )));
        }
        tables.user_roles.push(user_role.clone());
        Ok(user_role)
    }

    async fn update_user_role(&self, user_role: UserRole<K>) -> HostResult<UserRole<K>> {
        let mut tables = self.tables.write();
        let Some(row) = tables
            .user_roles
            .iter_mut()
            .find(|ur| ur.user_id == user_role.user_id && ur.role_id == user_role.role_id)
        else {
            return Err(HostError::not_found(format!(
                "user '{}' is not in role '{}'",
                user_role.user_id, user_role.role_id
            ))
            .into_anyhow());
        };
        *row = user_role.clone();
        Ok(user_role)
    }

    async fn delete_user_role(&self, user_id: Uuid, role_id: Uuid) -> HostResult<bool> {
        let mut tables = self.tables.write();
        let before = tables.user_roles.len();
        tables
            .user_roles
            .retain(|ur| !(ur.user_id == user_id && ur.role_id == role_id));
        Ok(tables.user_roles.len() != before)
    }

    async fn find_user_roles(
        &self,
        user_id: Uuid,
        scope: &TenantScope<K>,
    ) -> HostResult<Vec<UserRole<K>>> {
        let tables = self.tables.read();
        Ok(tables
            .user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id && scope.admits(*ur))
            .cloned()
            .collect())
    }

    async fn find_role_members(&self, role_id: Uuid) -> HostResult<Vec<UserRole<K>>> {
        let tables = self.tables.read();
        Ok(tables
            .user_roles
            .iter()
            .filter(|ur| ur.role_id == role_id)
            .cloned()
            .collect())
    }

    async fn insert_claim(&self, mut claim: UserClaim<K>) -> HostResult<UserClaim<K>> {
        let mut tables = self.tables.write();
        tables.require_user(claim.user_id)?;
        claim.id = tables.next_claim;
        tables.next_claim += 1;
        tables.claims.insert(claim.id, claim.clone());
        Ok(claim)
    }

    async fn update_claim(&self, claim: UserClaim<K>) -> HostResult<UserClaim<K>> {
        let mut tables = self.tables.write();
        let Some(row) = tables.claims.get_mut(&claim.id) else {
            return Err(HostError::not_found(format!("claim {} not found", claim.id)).into_anyhow());
        };
        *row = claim.clone();
        Ok(claim)
    }

    async fn delete_claim(&self, id: i64) -> HostResult<bool> {
        Ok(self.tables.write().claims.remove(&id).is_some())
    }

    async fn find_claims(
        &self,
        user_id: Uuid,
        scope: &TenantScope<K>,
    ) -> HostResult<Vec<UserClaim<K>>> {
        let tables = self.tables.read();
        Ok(tables
            .claims
            .values()
            .filter(|c| c.user_id == user_id && scope.admits(*c))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multihost_core::{ErrorKind, HostError};

    fn user(host: i64, name: &str) -> User<i64> {
        crate::entities::NewUser::new(name).into_user(host, None)
    }

    #[tokio::test]
    async fn unique_index_is_enforced_per_host() {
        let backend = MemoryBackend::<i64>::new();
        backend.insert_user(user(1, "alice")).await.unwrap();
        backend.insert_user(user(2, "alice")).await.unwrap();

        let err = backend.insert_user(user(1, "ALICE")).await.unwrap_err();
        assert_eq!(HostError::kind_of(&err), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn deleting_a_user_cascades() {
        let backend = MemoryBackend::<i64>::new();
        let alice = backend.insert_user(user(1, "alice")).await.unwrap();
        backend
            .insert_login(UserLogin {
                login_provider: "github".into(),
                provider_key: "42".into(),
                user_id: alice.id,
                host_id: 1,
                is_global: false,
            })
            .await
            .unwrap();

        assert!(backend.delete_user(alice.id).await.unwrap());
        let logins = backend
            .find_logins(&LoginFilter::new(TenantScope::AllHosts))
            .await
            .unwrap();
        assert!(logins.is_empty());
    }

    #[tokio::test]
    async fn membership_rows_are_rewritten_in_place() {
        let backend = MemoryBackend::<i64>::new();
        let alice = backend.insert_user(user(0, "alice")).await.unwrap();
        let admin = backend
            .insert_role(crate::entities::NewRole::new("Admin").into_role(0))
            .await
            .unwrap();
        let mut row = backend
            .insert_user_role(UserRole {
                user_id: alice.id,
                role_id: admin.id,
                host_id: 0,
                is_global: true,
            })
            .await
            .unwrap();

        row.is_global = false;
        backend.update_user_role(row.clone()).await.unwrap();
        assert_eq!(backend.find_role_members(admin.id).await.unwrap(), vec![row.clone()]);

        row.role_id = Uuid::new_v4();
        let err = backend.update_user_role(row).await.unwrap_err();
        assert_eq!(HostError::kind_of(&err), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn deleting_a_host_removes_its_domains() {
        let backend = MemoryBackend::<i64>::new();
        let host = backend.insert_host(Host::new(1, "Tenant A")).await.unwrap();
        backend
            .insert_domain(HostDomain {
                id: 0,
                host: host.id,
                domain_name: "a.example.com".into(),
            })
            .await
            .unwrap();

        assert!(backend.delete_host(host.id).await.unwrap());
        assert!(backend.domain_by_name("a.example.com").await.unwrap().is_none());
    }
}
