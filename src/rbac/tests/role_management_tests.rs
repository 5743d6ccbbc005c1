//! Integration tests for role lifecycle, memberships and role listings

use cretoai_rbac::{
    InMemoryAuthStore, Mutation, Permission, PermissionSet, Rbac, RbacConfig, RbacError, Resource,
    RoleChanges, RoleOptions, RoleRow,
};
use std::sync::Arc;

async fn setup() -> Rbac {
    let config = RbacConfig::default().with_default_superuser("cassandra", "cassandra");
    Rbac::new(config).await.unwrap()
}

async fn create_user(rbac: &Rbac, name: &str) {
    rbac.roles()
        .create_role(name, RoleOptions::new().with_login(true).with_password("12345"), "cassandra")
        .await
        .unwrap();
}

async fn create_role(rbac: &Rbac, name: &str) {
    rbac.roles()
        .create_role(name, RoleOptions::new(), "cassandra")
        .await
        .unwrap();
}

fn role_names(rows: &[RoleRow]) -> Vec<String> {
    rows.iter().map(|r| r.name.clone()).collect()
}

// ============================================================================
// Create / drop
// ============================================================================

#[tokio::test]
async fn test_create_drop_role() {
    let rbac = setup().await;
    create_role(&rbac, "role1").await;

    let rows = rbac.roles().list_roles(None, true, "cassandra").await.unwrap();
    assert_eq!(role_names(&rows), vec!["cassandra", "role1"]);

    rbac.roles().drop_role("role1", "cassandra").await.unwrap();
    let err = rbac.roles().get_role("role1").await.unwrap_err();
    assert_eq!(err, RbacError::NotFound("role1".to_string()));
}

#[tokio::test]
async fn test_create_existing_role() {
    let rbac = setup().await;
    create_role(&rbac, "role1").await;

    let err = rbac
        .roles()
        .create_role("role1", RoleOptions::new(), "cassandra")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "role1 already exists");

    let created = rbac
        .roles()
        .create_role_if_not_exists("role1", RoleOptions::new(), "cassandra")
        .await
        .unwrap();
    assert!(!created);
}

#[tokio::test]
async fn test_drop_missing_role() {
    let rbac = setup().await;

    let err = rbac.roles().drop_role("role1", "cassandra").await.unwrap_err();
    assert_eq!(err.to_string(), "role1 doesn't exist");

    assert!(!rbac.roles().drop_role_if_exists("role1", "cassandra").await.unwrap());
}

#[tokio::test]
async fn test_create_role_requires_create_permission() {
    let rbac = setup().await;
    create_user(&rbac, "mike").await;

    let err = rbac
        .roles()
        .create_role("role1", RoleOptions::new(), "mike")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RbacError::Unauthorized("mike has no CREATE permission on <all roles> or any of its parents".to_string())
    );

    rbac.roles()
        .grant_permission("mike", &Resource::AllRoles, Permission::Create, "cassandra")
        .await
        .unwrap();
    rbac.roles().create_role("role1", RoleOptions::new(), "mike").await.unwrap();

    let err = rbac
        .roles()
        .create_role("role2", RoleOptions::new().with_superuser(true), "mike")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RbacError::Unauthorized("Only superusers can create a role with superuser status".to_string())
    );
}

#[tokio::test]
async fn test_creator_permissions_on_role() {
    let rbac = setup().await;
    create_user(&rbac, "mike").await;
    create_user(&rbac, "john").await;
    rbac.roles()
        .grant_permission("mike", &Resource::AllRoles, Permission::Create, "cassandra")
        .await
        .unwrap();

    rbac.roles().create_role("role1", RoleOptions::new(), "mike").await.unwrap();

    let rows = rbac
        .engine()
        .list_permissions(&Default::default(), true, "cassandra")
        .await
        .unwrap()
        .into_iter()
        .filter(|row| row.role == "mike")
        .map(|row| (row.resource, row.permission))
        .collect::<Vec<_>>();
    assert_eq!(
        rows,
        vec![
            ("<all roles>".to_string(), "CREATE".to_string()),
            ("<role role1>".to_string(), "ALTER".to_string()),
            ("<role role1>".to_string(), "AUTHORIZE".to_string()),
            ("<role role1>".to_string(), "DROP".to_string()),
        ]
    );

    // The creator can use its new permissions without any explicit grant
    rbac.roles().grant_role("john", "role1", "mike").await.unwrap();
    rbac.roles()
        .alter_role("role1", RoleChanges::new().login(true), "mike")
        .await
        .unwrap();
    rbac.roles().drop_role("role1", "mike").await.unwrap();
}

#[tokio::test]
async fn test_drop_role_cascades() {
    let rbac = setup().await;
    create_user(&rbac, "mike").await;
    create_role(&rbac, "r1").await;

    rbac.roles()
        .grant_permission("mike", &Resource::role("r1"), Permission::Alter, "cassandra")
        .await
        .unwrap();
    rbac.roles()
        .grant_permission("r1", &Resource::table("ks", "cf"), Permission::Select, "cassandra")
        .await
        .unwrap();
    rbac.roles().grant_role("mike", "r1", "cassandra").await.unwrap();

    rbac.roles().drop_role("r1", "cassandra").await.unwrap();

    let filter = Default::default();
    let rows = rbac
        .engine()
        .list_permissions(&filter, true, "cassandra")
        .await
        .unwrap();
    assert!(rows.iter().all(|row| row.role != "r1" && row.resource != "<role r1>"));

    let mike = cretoai_rbac::PermissionFilter::new().of("mike");
    assert!(rbac.engine().list_permissions(&mike, true, "cassandra").await.unwrap().is_empty());

    let roles = rbac.roles().list_roles(Some("mike"), true, "cassandra").await.unwrap();
    assert_eq!(role_names(&roles), vec!["mike"]);
}

#[tokio::test]
async fn test_drop_role_restrictions() {
    let rbac = setup().await;
    create_user(&rbac, "mike").await;
    rbac.roles()
        .create_role("admin", RoleOptions::new().with_superuser(true), "cassandra")
        .await
        .unwrap();

    let err = rbac.roles().drop_role("admin", "mike").await.unwrap_err();
    assert!(err.is_unauthorized());

    rbac.roles()
        .grant_permission("mike", &Resource::AllRoles, Permission::Drop, "cassandra")
        .await
        .unwrap();

    let err = rbac.roles().drop_role("mike", "mike").await.unwrap_err();
    assert!(matches!(err, RbacError::InvalidInput(_)));

    let err = rbac.roles().drop_role("admin", "mike").await.unwrap_err();
    assert_eq!(
        err,
        RbacError::Unauthorized("Only superusers can drop a role with superuser status".to_string())
    );
}

#[tokio::test]
async fn test_drop_inherited_superuser_role() {
    let rbac = setup().await;
    create_user(&rbac, "mike").await;
    create_role(&rbac, "role1").await;
    rbac.roles()
        .create_role("su", RoleOptions::new().with_superuser(true), "cassandra")
        .await
        .unwrap();
    rbac.roles().grant_role("role1", "su", "cassandra").await.unwrap();
    rbac.roles()
        .grant_permission("mike", &Resource::AllRoles, Permission::Drop, "cassandra")
        .await
        .unwrap();

    let err = rbac.roles().drop_role("role1", "mike").await.unwrap_err();
    assert_eq!(
        err,
        RbacError::Unauthorized("Only superusers can drop a role with superuser status".to_string())
    );
    assert!(rbac.roles().get_role("role1").await.is_ok());

    rbac.roles().revoke_role("role1", "su", "cassandra").await.unwrap();
    rbac.roles().drop_role("role1", "mike").await.unwrap();
    assert!(rbac.roles().get_role("role1").await.is_err());
}

// ============================================================================
// Alter
// ============================================================================

#[tokio::test]
async fn test_alter_superuser_status() {
    let rbac = setup().await;
    create_user(&rbac, "mike").await;
    create_role(&rbac, "role1").await;
    create_role(&rbac, "role2").await;

    let own = "You aren't allowed to alter your own superuser status or that of a role granted to you";

    let err = rbac
        .roles()
        .alter_role("cassandra", RoleChanges::new().superuser(false), "cassandra")
        .await
        .unwrap_err();
    assert_eq!(err, RbacError::Unauthorized(own.to_string()));

    rbac.roles().grant_role("cassandra", "role1", "cassandra").await.unwrap();
    let err = rbac
        .roles()
        .alter_role("role1", RoleChanges::new().superuser(true), "cassandra")
        .await
        .unwrap_err();
    assert_eq!(err, RbacError::Unauthorized(own.to_string()));

    // ALTER on the role is not enough to change superuser status
    rbac.roles()
        .grant_permission("mike", &Resource::role("role2"), Permission::Alter, "cassandra")
        .await
        .unwrap();
    let err = rbac
        .roles()
        .alter_role("role2", RoleChanges::new().superuser(true), "mike")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RbacError::Unauthorized("Only superusers are allowed to alter superuser status".to_string())
    );

    rbac.roles()
        .alter_role("role2", RoleChanges::new().superuser(true), "cassandra")
        .await
        .unwrap();
    assert!(rbac.roles().get_role("role2").await.unwrap().is_superuser);
}

#[tokio::test]
async fn test_alter_held_superuser_status_with_all_on_roles() {
    let rbac = setup().await;
    create_user(&rbac, "mike").await;
    create_role(&rbac, "administrator").await;
    create_role(&rbac, "role1").await;
    rbac.roles()
        .grant_permission("administrator", &Resource::AllRoles, PermissionSet::All, "cassandra")
        .await
        .unwrap();
    rbac.roles().grant_role("mike", "administrator", "cassandra").await.unwrap();

    let own = "You aren't allowed to alter your own superuser status or that of a role granted to you";
    for name in ["mike", "administrator"] {
        let err = rbac
            .roles()
            .alter_role(name, RoleChanges::new().superuser(true), "mike")
            .await
            .unwrap_err();
        assert_eq!(err, RbacError::Unauthorized(own.to_string()));
    }

    // Outside the closure the superuser rule applies
    let err = rbac
        .roles()
        .alter_role("role1", RoleChanges::new().superuser(true), "mike")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RbacError::Unauthorized("Only superusers are allowed to alter superuser status".to_string())
    );
    assert!(!rbac.roles().get_role("administrator").await.unwrap().is_superuser);
}

#[tokio::test]
async fn test_alter_own_role() {
    let rbac = setup().await;
    create_user(&rbac, "mike").await;
    create_user(&rbac, "john").await;

    rbac.roles()
        .alter_role("mike", RoleChanges::new().password("54321"), "mike")
        .await
        .unwrap();
    let mike = rbac.roles().get_role("mike").await.unwrap();
    assert_eq!(mike.password.as_ref().map(|p| p.expose()), Some("54321"));

    let insufficient = "User mike does not have sufficient privileges to perform the requested operation";

    let err = rbac
        .roles()
        .alter_role("mike", RoleChanges::new().login(false), "mike")
        .await
        .unwrap_err();
    assert_eq!(err, RbacError::Unauthorized(insufficient.to_string()));

    let err = rbac
        .roles()
        .alter_role("john", RoleChanges::new().password("x"), "mike")
        .await
        .unwrap_err();
    assert_eq!(err, RbacError::Unauthorized(insufficient.to_string()));
}

#[tokio::test]
async fn test_alter_missing_role() {
    let rbac = setup().await;
    let err = rbac
        .roles()
        .alter_role("role1", RoleChanges::new().login(true), "cassandra")
        .await
        .unwrap_err();
    assert_eq!(err, RbacError::NotFound("role1".to_string()));
}

// ============================================================================
// Membership
// ============================================================================

#[tokio::test]
async fn test_circular_grants() {
    let rbac = setup().await;
    for role in ["role1", "role2", "role3"] {
        create_role(&rbac, role).await;
    }

    let err = rbac.roles().grant_role("role1", "role1", "cassandra").await.unwrap_err();
    assert_eq!(err, RbacError::InvalidGrant("role1 is a member of role1".to_string()));

    rbac.roles().grant_role("role2", "role1", "cassandra").await.unwrap();
    rbac.roles().grant_role("role3", "role2", "cassandra").await.unwrap();

    let err = rbac.roles().grant_role("role1", "role2", "cassandra").await.unwrap_err();
    assert_eq!(err, RbacError::InvalidGrant("role2 is a member of role1".to_string()));

    let err = rbac.roles().grant_role("role1", "role3", "cassandra").await.unwrap_err();
    assert_eq!(err, RbacError::InvalidGrant("role3 is a member of role1".to_string()));

    let err = rbac.roles().grant_role("role2", "role1", "cassandra").await.unwrap_err();
    assert_eq!(err, RbacError::InvalidGrant("role2 is a member of role1".to_string()));
}

#[tokio::test]
async fn test_grant_role_missing_roles() {
    let rbac = setup().await;
    create_user(&rbac, "mike").await;

    let err = rbac.roles().grant_role("mike", "role1", "cassandra").await.unwrap_err();
    assert_eq!(err, RbacError::NotFound("role1".to_string()));

    let err = rbac.roles().grant_role("john", "role1", "cassandra").await.unwrap_err();
    assert_eq!(err, RbacError::NotFound("role1".to_string()));

    let err = rbac.roles().revoke_role("john", "mike", "cassandra").await.unwrap_err();
    assert_eq!(err, RbacError::NotFound("john".to_string()));
}

#[tokio::test]
async fn test_grant_role_requires_authorize() {
    let rbac = setup().await;
    create_user(&rbac, "mike").await;
    create_user(&rbac, "john").await;
    create_role(&rbac, "role1").await;

    let err = rbac.roles().grant_role("john", "role1", "mike").await.unwrap_err();
    assert_eq!(
        err,
        RbacError::Unauthorized("mike has no AUTHORIZE permission on <role role1> or any of its parents".to_string())
    );

    rbac.roles()
        .grant_permission("mike", &Resource::role("role1"), Permission::Authorize, "cassandra")
        .await
        .unwrap();
    rbac.roles().grant_role("john", "role1", "mike").await.unwrap();
    rbac.roles().revoke_role("john", "role1", "mike").await.unwrap();
}

#[tokio::test]
async fn test_revoke_absent_membership_is_noop() {
    let store = Arc::new(InMemoryAuthStore::new());
    let config = RbacConfig::default().with_default_superuser("cassandra", "cassandra");
    let rbac = Rbac::with_store(config, store.clone()).await.unwrap();
    create_user(&rbac, "mike").await;
    create_role(&rbac, "role1").await;

    let before = store.len().await;
    rbac.roles().revoke_role("mike", "role1", "cassandra").await.unwrap();
    assert_eq!(store.len().await, before);

    rbac.roles().grant_role("mike", "role1", "cassandra").await.unwrap();
    rbac.roles().revoke_role("mike", "role1", "cassandra").await.unwrap();
    let ops: Vec<&str> = store.mutations().await.iter().map(Mutation::op).collect();
    assert_eq!(&ops[ops.len() - 2..], &["grant_role", "revoke_role"]);
}

// ============================================================================
// Inheritance
// ============================================================================

#[tokio::test]
async fn test_superuser_inherited_login_not() {
    let rbac = setup().await;
    create_user(&rbac, "mike").await;
    rbac.roles()
        .create_role("super_role", RoleOptions::new().with_superuser(true), "cassandra")
        .await
        .unwrap();
    rbac.roles()
        .create_role("nologin", RoleOptions::new().with_password("12345"), "cassandra")
        .await
        .unwrap();

    let table = Resource::table("ks", "cf");
    assert!(rbac.engine().authorize("mike", &table, Permission::Select).await.is_err());

    rbac.roles().grant_role("mike", "super_role", "cassandra").await.unwrap();
    rbac.engine().authorize("mike", &table, Permission::Select).await.unwrap();

    let rows = rbac.roles().list_roles(Some("mike"), false, "cassandra").await.unwrap();
    let mike = rows.iter().find(|r| r.name == "mike").unwrap();
    assert!(mike.is_superuser);
    assert!(mike.can_login);

    // nologin holds mike, who can log in; nologin still cannot
    rbac.roles().grant_role("nologin", "mike", "cassandra").await.unwrap();
    let err = rbac.roles().check_login("nologin").await.unwrap_err();
    assert_eq!(
        err,
        RbacError::AuthenticationFailed("nologin is not permitted to log in".to_string())
    );
    assert!(rbac.roles().check_login("mike").await.is_ok());
}

// ============================================================================
// Listings and login
// ============================================================================

#[tokio::test]
async fn test_list_roles_recursive_and_norecursive() {
    let rbac = setup().await;
    create_user(&rbac, "mike").await;
    create_user(&rbac, "john").await;
    create_role(&rbac, "role1").await;
    create_role(&rbac, "role2").await;
    rbac.roles().grant_role("role2", "role1", "cassandra").await.unwrap();
    rbac.roles().grant_role("mike", "role2", "cassandra").await.unwrap();

    let rows = rbac.roles().list_roles(Some("mike"), true, "cassandra").await.unwrap();
    assert_eq!(role_names(&rows), vec!["mike", "role1", "role2"]);

    let rows = rbac.roles().list_roles(Some("mike"), false, "cassandra").await.unwrap();
    assert_eq!(role_names(&rows), vec!["mike", "role2"]);

    // Without DESCRIBE, mike only sees his own roles
    let rows = rbac.roles().list_roles(None, true, "mike").await.unwrap();
    assert_eq!(role_names(&rows), vec!["mike", "role1", "role2"]);

    let rows = rbac.roles().list_roles(Some("role1"), true, "mike").await.unwrap();
    assert_eq!(role_names(&rows), vec!["role1"]);

    let err = rbac.roles().list_roles(Some("john"), true, "mike").await.unwrap_err();
    assert_eq!(
        err,
        RbacError::Unauthorized("You are not authorized to view roles granted to john".to_string())
    );

    rbac.roles()
        .grant_permission("mike", &Resource::AllRoles, Permission::Describe, "cassandra")
        .await
        .unwrap();
    assert!(rbac.roles().list_roles(Some("john"), true, "mike").await.is_ok());
    let rows = rbac.roles().list_roles(None, true, "mike").await.unwrap();
    assert_eq!(rows.len(), 5);
}

#[tokio::test]
async fn test_list_roles_reports_options() {
    let rbac = setup().await;
    rbac.roles()
        .create_role("role1", RoleOptions::new().with_option("tier", "gold"), "cassandra")
        .await
        .unwrap();

    let rows = rbac.roles().list_roles(Some("role1"), true, "cassandra").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].options.get("tier").map(String::as_str), Some("gold"));
    assert!(!rows[0].can_login);
    assert!(!rows[0].is_superuser);
}

#[tokio::test]
async fn test_list_users() {
    let rbac = setup().await;
    create_user(&rbac, "mike").await;
    create_role(&rbac, "role1").await;

    let users = rbac.roles().list_users("cassandra").await.unwrap();
    let users: Vec<(String, bool)> = users.into_iter().map(|u| (u.name, u.is_superuser)).collect();
    assert_eq!(
        users,
        vec![("cassandra".to_string(), true), ("mike".to_string(), false)]
    );
}

#[tokio::test]
async fn test_check_login() {
    let rbac = setup().await;
    rbac.roles()
        .create_role("nopass", RoleOptions::new().with_login(true), "cassandra")
        .await
        .unwrap();

    let incorrect = RbacError::AuthenticationFailed("Username and/or password are incorrect".to_string());
    assert_eq!(rbac.roles().check_login("nopass").await.unwrap_err(), incorrect);
    assert_eq!(rbac.roles().check_login("ghost").await.unwrap_err(), incorrect);

    let cassandra = rbac.roles().check_login("cassandra").await.unwrap();
    assert!(cassandra.is_superuser);
}

#[tokio::test]
async fn test_default_superuser_bootstrap() {
    let rbac = Rbac::new(RbacConfig::default()).await.unwrap();
    assert!(rbac.roles().get_role("cassandra").await.is_err());

    assert!(rbac.roles().setup_default_superuser("cassandra", "cassandra").await.unwrap());
    assert!(!rbac.roles().setup_default_superuser("other", "other").await.unwrap());

    let role = rbac.roles().get_role("cassandra").await.unwrap();
    assert!(role.is_superuser && role.can_login);
}
