use std::sync::Arc;

use multihost_core::{ErrorKind, HostError, TenantContext};
use multihost_identity::{BcryptHasher, IdentityContext, MemoryBackend, NewRole, NewUser};
use uuid::Uuid;

const SYSTEM: i64 = 0;

fn create_test_context(host: i64) -> IdentityContext<i64> {
    IdentityContext::new(Arc::new(MemoryBackend::new()), TenantContext::new(host, SYSTEM)).unwrap()
}

#[tokio::test]
async fn test_role_exists_ignores_global_roles() {
    let ctx = create_test_context(1);
    let roles = ctx.role_manager();
    roles
        .create(NewRole::new("Admin").in_host(SYSTEM).global())
        .await
        .unwrap();

    assert!(!roles.role_exists("Admin", None).await.unwrap());
    assert!(roles.role_exists("admin", Some(&SYSTEM)).await.unwrap());
    assert!(roles.find_by_name("Admin", None).await.unwrap().is_some());
}

#[tokio::test]
async fn test_role_names_are_unique_per_host() {
    let ctx = create_test_context(1);
    let roles = ctx.role_manager();

    roles.create(NewRole::new("Editor")).await.unwrap();
    let err = roles.create(NewRole::new(" editor ")).await.unwrap_err();
    let host_err = HostError::from_anyhow(&err).unwrap();
    assert_eq!(host_err.kind, ErrorKind::Unprocessable);
    assert_eq!(
        host_err.errors,
        vec!["role name 'editor' is already taken for host '1'".to_string()]
    );

    roles.create(NewRole::new("Editor").in_host(2)).await.unwrap();
    assert_eq!(roles.all_roles().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_role_update_guards() {
    let ctx = create_test_context(1);
    let roles = ctx.role_manager();
    let editor = roles.create(NewRole::new("Editor")).await.unwrap();
    roles.create(NewRole::new("Viewer")).await.unwrap();

    let mut moved = editor.clone();
    moved.host_id = 2;
    let err = roles.update(moved).await.unwrap_err();
    assert_eq!(
        HostError::from_anyhow(&err).unwrap().errors,
        vec!["roles cannot be reassigned to a different host".to_string()]
    );

    let mut promoted = editor.clone();
    promoted.is_global = true;
    let err = roles.update(promoted).await.unwrap_err();
    assert_eq!(HostError::kind_of(&err), ErrorKind::Unprocessable);

    let mut clash = editor.clone();
    clash.name = "VIEWER".to_string();
    let err = roles.update(clash).await.unwrap_err();
    assert_eq!(HostError::kind_of(&err), ErrorKind::Unprocessable);

    let mut renamed = editor.clone();
    renamed.name = "Author".to_string();
    assert_eq!(roles.update(renamed).await.unwrap().name, "Author");
    assert_eq!(
        roles.find_by_id(editor.id, None).await.unwrap().map(|r| r.name),
        Some("Author".to_string())
    );

    let mut ghost = editor.clone();
    ghost.id = Uuid::new_v4();
    let err = roles.update(ghost).await.unwrap_err();
    assert_eq!(HostError::kind_of(&err), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_deleting_a_role_drops_memberships() {
    let ctx = create_test_context(1);
    let roles = ctx.role_manager();
    let users = ctx.user_manager(Arc::new(BcryptHasher::new(4)));

    let editor = roles.create(NewRole::new("Editor")).await.unwrap();
    let alice = users.create(NewUser::new("alice")).await.unwrap();
    users.add_to_role(alice.id, "Editor", None).await.unwrap();

    assert!(roles.delete(editor.id).await.unwrap());
    assert!(!roles.delete(editor.id).await.unwrap());
    assert!(users.roles(alice.id, None).await.unwrap().is_empty());

    let err = users
        .remove_from_role(alice.id, "Editor", None)
        .await
        .unwrap_err();
    assert_eq!(HostError::kind_of(&err), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_blank_role_names_are_rejected() {
    let roles = create_test_context(1).role_manager();

    let err = roles.create(NewRole::new("")).await.unwrap_err();
    assert_eq!(HostError::kind_of(&err), ErrorKind::BadRequest);

    let err = roles.role_exists("  ", None).await.unwrap_err();
    assert_eq!(HostError::kind_of(&err), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_uuid_keyed_tenants() {
    let system = Uuid::from_u128(1);
    let tenant = Uuid::from_u128(2);
    let ctx = IdentityContext::new(
        Arc::new(MemoryBackend::<Uuid>::new()),
        TenantContext::new(tenant, system),
    )
    .unwrap();
    let roles = ctx.role_manager();

    roles
        .create(NewRole::new("Admin").in_host(system).global())
        .await
        .unwrap();
    let local = roles
        .create(NewRole::new("Admin").in_host(Uuid::nil()))
        .await
        .unwrap();

    assert_eq!(local.host_id, tenant);
    assert_eq!(roles.roles(None).await.unwrap().len(), 2);
}
