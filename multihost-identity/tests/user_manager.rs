use std::sync::Arc;

use multihost_core::{EntityKind, ErrorKind, HostError, TenantContext};
use multihost_identity::{
    AuditAction, BcryptHasher, Claim, IdentityContext, LoginInfo, MemoryBackend, NewRole, NewUser,
    UserManager,
};

const SYSTEM: i64 = 0;

fn create_test_context(backend: &Arc<MemoryBackend<i64>>, host: i64) -> IdentityContext<i64> {
    IdentityContext::new(backend.clone(), TenantContext::new(host, SYSTEM)).unwrap()
}

fn manager(ctx: &IdentityContext<i64>) -> UserManager<i64> {
    ctx.user_manager(Arc::new(BcryptHasher::new(4)))
}

/// alice created with no host under ambient tenant 2 keeps host 2 even
/// after an attempted move to host 3.
#[tokio::test]
async fn test_unset_host_is_ambient_and_immutable() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = create_test_context(&backend, 2);
    let users = manager(&ctx);

    // Arrange
    let alice = users.create(NewUser::new("alice")).await.unwrap();
    assert_eq!(alice.host_id, 2);

    // Act
    let mut moved = alice.clone();
    moved.host_id = 3;
    let err = users.update(moved).await.unwrap_err();

    // Assert
    let host_err = HostError::from_anyhow(&err).unwrap();
    assert_eq!(host_err.kind, ErrorKind::Unprocessable);
    assert_eq!(
        host_err.errors,
        vec!["users cannot be reassigned to a different host".to_string()]
    );
    let persisted = users.find_by_id(alice.id, None).await.unwrap().unwrap();
    assert_eq!(persisted.host_id, 2);
}

#[tokio::test]
async fn test_update_reports_every_violation() {
    let backend = Arc::new(MemoryBackend::new());
    let users = manager(&create_test_context(&backend, 2));
    let alice = users.create(NewUser::new("alice")).await.unwrap();

    let mut bad = alice.clone();
    bad.host_id = 3;
    bad.is_global = true;
    let err = users.update(bad).await.unwrap_err();
    assert_eq!(HostError::from_anyhow(&err).unwrap().errors.len(), 2);

    let mut renamed = alice.clone();
    renamed.email = Some("alice@example.com".to_string());
    let updated = users.update(renamed).await.unwrap();
    assert_eq!(updated.email.as_deref(), Some("alice@example.com"));
    assert_eq!(
        users
            .find_by_email("ALICE@example.com", None)
            .await
            .unwrap()
            .map(|u| u.id),
        Some(alice.id)
    );
}

#[tokio::test]
async fn test_user_names_are_unique_per_host() {
    let backend = Arc::new(MemoryBackend::new());
    let users = manager(&create_test_context(&backend, 1));

    users.create(NewUser::new("bob")).await.unwrap();
    let err = users.create(NewUser::new("BOB")).await.unwrap_err();
    assert_eq!(HostError::kind_of(&err), ErrorKind::Unprocessable);

    let other = users.create(NewUser::new("bob").in_host(2)).await.unwrap();
    assert_eq!(other.host_id, 2);

    // renaming into an existing name is rejected too
    let carol = users.create(NewUser::new("carol")).await.unwrap();
    let mut clash = carol.clone();
    clash.user_name = "Bob".to_string();
    let err = users.update(clash).await.unwrap_err();
    assert_eq!(HostError::kind_of(&err), ErrorKind::Unprocessable);
}

#[tokio::test]
async fn test_blank_arguments_are_bad_requests() {
    let backend = Arc::new(MemoryBackend::new());
    let users = manager(&create_test_context(&backend, 1));

    let err = users.create(NewUser::new("  ")).await.unwrap_err();
    assert_eq!(HostError::kind_of(&err), ErrorKind::BadRequest);

    let err = users.find_by_name("", None).await.unwrap_err();
    assert_eq!(HostError::kind_of(&err), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_passwords_and_credentials() {
    let backend = Arc::new(MemoryBackend::new());
    let users = manager(&create_test_context(&backend, 1));

    let carol = users
        .create_with_password(NewUser::new("carol"), "s3cret")
        .await
        .unwrap();
    assert_ne!(carol.password_hash.as_deref(), Some("s3cret"));

    assert!(users
        .find_by_credentials("carol", "s3cret", None)
        .await
        .unwrap()
        .is_some());
    assert!(users
        .find_by_credentials("carol", "wrong", None)
        .await
        .unwrap()
        .is_none());
    assert!(users
        .find_by_credentials("nobody", "s3cret", None)
        .await
        .unwrap()
        .is_none());

    let err = users
        .change_password(carol.id, "wrong", "n3w", None)
        .await
        .unwrap_err();
    assert_eq!(HostError::kind_of(&err), ErrorKind::Unprocessable);

    let changed = users
        .change_password(carol.id, "s3cret", "n3w", None)
        .await
        .unwrap();
    assert_ne!(changed.security_stamp, carol.security_stamp);
    assert!(users
        .find_by_credentials("carol", "n3w", None)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_logins_inherit_owner_scope() {
    let backend = Arc::new(MemoryBackend::new());
    let users = manager(&create_test_context(&backend, 2));

    let alice = users.create(NewUser::new("alice")).await.unwrap();
    let root = users
        .create(NewUser::new("root").in_host(SYSTEM).global())
        .await
        .unwrap();

    let github = LoginInfo::new("github", "42");
    let row = users.add_login(alice.id, github.clone(), None).await.unwrap();
    assert_eq!(row.host_id, 2);
    assert!(!row.is_global);

    let google = LoginInfo::new("google", "root");
    let row = users
        .add_login(root.id, google.clone(), Some(&1))
        .await
        .unwrap();
    assert_eq!(row.host_id, SYSTEM);
    assert!(row.is_global);

    // alice's login is private to host 2, root's is visible everywhere
    assert_eq!(
        users.find_by_login(&github, None).await.unwrap().map(|u| u.id),
        Some(alice.id)
    );
    assert!(users.find_by_login(&github, Some(&1)).await.unwrap().is_none());
    assert_eq!(
        users
            .find_by_login(&google, Some(&9))
            .await
            .unwrap()
            .map(|u| u.id),
        Some(root.id)
    );

    assert_eq!(users.logins(alice.id, None).await.unwrap(), vec![github.clone()]);
    assert!(users.remove_login(alice.id, &github, None).await.unwrap());
    assert!(users.logins(alice.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_claims_are_global_only_on_the_system_host() {
    let backend = Arc::new(MemoryBackend::new());
    let users = manager(&create_test_context(&backend, 1));
    let root = users
        .create(NewUser::new("root").in_host(SYSTEM).global())
        .await
        .unwrap();

    let local = users
        .add_claim(root.id, Claim::new("dept", "tenant-one"), None)
        .await
        .unwrap();
    assert_eq!(local.host_id, 1);
    assert!(!local.is_global);

    let shared = users
        .add_claim(root.id, Claim::new("dept", "everywhere"), Some(&SYSTEM))
        .await
        .unwrap();
    assert!(shared.is_global);

    let seen_by_two = users.claims(root.id, Some(&2)).await.unwrap();
    assert_eq!(seen_by_two, vec![Claim::new("dept", "everywhere")]);

    let seen_by_one = users.claims(root.id, None).await.unwrap();
    assert_eq!(seen_by_one.len(), 2);

    let removed = users
        .remove_claim(root.id, &Claim::new("dept", "tenant-one"), None)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(users.claims(root.id, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_role_membership_resolves_tenant_or_global_roles() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = create_test_context(&backend, 2);
    let users = manager(&ctx);
    let roles = ctx.role_manager();

    roles
        .create(NewRole::new("Admin").in_host(SYSTEM).global())
        .await
        .unwrap();
    roles.create(NewRole::new("Editor")).await.unwrap();
    roles.create(NewRole::new("Hidden").in_host(5)).await.unwrap();
    let alice = users.create(NewUser::new("alice")).await.unwrap();

    // Act
    let row = users.add_to_role(alice.id, "admin", None).await.unwrap();

    // Assert
    assert_eq!(row.host_id, 2);
    assert!(!row.is_global);
    assert!(users.is_in_role(alice.id, "Admin", None).await.unwrap());

    // idempotent
    users.add_to_role(alice.id, "Admin", None).await.unwrap();
    assert_eq!(users.roles(alice.id, None).await.unwrap(), vec!["Admin".to_string()]);

    let err = users
        .add_to_role(alice.id, "Hidden", None)
        .await
        .unwrap_err();
    let host_err = HostError::from_anyhow(&err).unwrap();
    assert_eq!(host_err.kind, ErrorKind::NotFound);
    assert_eq!(
        host_err.message,
        "role 'Hidden' not found for host '2' or in global roles"
    );

    users
        .add_to_roles(alice.id, &["Editor"], None)
        .await
        .unwrap();
    assert_eq!(
        users.roles(alice.id, None).await.unwrap(),
        vec!["Admin".to_string(), "Editor".to_string()]
    );
    assert_eq!(users.all_roles(alice.id).await.unwrap().len(), 2);

    let removed = users
        .remove_from_roles(alice.id, &["Admin", "Editor"], None)
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(!users.is_in_role(alice.id, "Admin", None).await.unwrap());
    assert!(users.roles(alice.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deleting_a_user_removes_dependents() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = create_test_context(&backend, 1);
    let users = manager(&ctx);
    ctx.role_manager().create(NewRole::new("Editor")).await.unwrap();

    let alice = users.create(NewUser::new("alice")).await.unwrap();
    users.add_to_role(alice.id, "Editor", None).await.unwrap();
    users
        .add_claim(alice.id, Claim::new("dept", "eng"), None)
        .await
        .unwrap();

    assert!(users.delete(alice.id).await.unwrap());
    assert!(!users.delete(alice.id).await.unwrap());
    assert!(users.all_roles(alice.id).await.unwrap().is_empty());
    assert!(users.claims(alice.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_writes_are_audited_with_the_request_actor() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = IdentityContext::new(
        backend.clone(),
        TenantContext::new(1, SYSTEM).with_user("admin@example.com"),
    )
    .unwrap();
    let mut events = ctx.subscribe();
    let users = manager(&ctx);

    let alice = users.create(NewUser::new("alice")).await.unwrap();
    users.delete(alice.id).await.unwrap();

    let created = events.try_recv().unwrap();
    assert_eq!(created.entity, EntityKind::User);
    assert_eq!(created.action, AuditAction::Created);
    assert_eq!(created.entity_id, alice.id.to_string());
    assert_eq!(created.host_id, Some(1));
    assert_eq!(created.actor, "admin@example.com");

    let deleted = events.try_recv().unwrap();
    assert_eq!(deleted.action, AuditAction::Deleted);

    // anonymous contexts audit as the system actor
    let anonymous = create_test_context(&backend, 1);
    let mut events = anonymous.subscribe();
    manager(&anonymous)
        .create(NewUser::new("bob"))
        .await
        .unwrap();
    assert_eq!(events.try_recv().unwrap().actor, "<system>");
}
