//! Role and grant management
//!
//! Every write runs as one critical section: take the write locks (role
//! table first), validate, hand the mutation to the [`AuthStore`], then
//! apply it locally. A rejected request or a failed persistence step leaves
//! no trace.
//!
//! [`AuthStore`]: crate::store::AuthStore

use crate::cache::{PrincipalCache, ResolvedPrincipal};
use crate::catalog::{Catalog, RoleTable};
use crate::engine::is_permitted;
use crate::error::{RbacError, Result};
use crate::permissions::{Grant, PermissionStore};
use crate::resource::{Permission, PermissionSet, Resource, ResourceHierarchy};
use crate::store::Mutation;
use crate::types::{Role, RoleChanges, RoleOptions, RoleRow, UserRow};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const INCORRECT_CREDENTIALS: &str = "Username and/or password are incorrect";

/// Fail with the standard missing-permission error unless `actor` holds
/// `permission` on `resource` or an ancestor
fn check_permission(
    actor: &ResolvedPrincipal,
    store: &PermissionStore,
    resource: &Resource,
    permission: Permission,
) -> Result<()> {
    if is_permitted(actor, store, resource, permission) {
        Ok(())
    } else {
        warn!("{} denied {} on {}", actor.name, permission, resource);
        Err(RbacError::missing_permission(&actor.name, permission, resource))
    }
}

fn superuser_only(actor: &ResolvedPrincipal, message: &str) -> Result<()> {
    if actor.is_superuser {
        Ok(())
    } else {
        warn!("{} rejected: {}", actor.name, message);
        Err(RbacError::Unauthorized(message.to_string()))
    }
}

/// Orchestrates role lifecycle, memberships and permission grants
pub struct RoleManager {
    catalog: Arc<Catalog>,
    cache: Arc<PrincipalCache>,
}

impl RoleManager {
    pub fn new(catalog: Arc<Catalog>, cache: Arc<PrincipalCache>) -> Self {
        Self { catalog, cache }
    }

    // ------------------------------------------------------------------
    // Role lifecycle
    // ------------------------------------------------------------------

    /// Create a role. The requester receives the creator permissions on
    /// `<role name>`.
    pub async fn create_role(&self, name: &str, options: RoleOptions, requester: &str) -> Result<()> {
        self.create(name, options, requester, false).await.map(|_| ())
    }

    /// Like [`create_role`](Self::create_role), but an existing role is not
    /// an error. Returns whether the role was created.
    pub async fn create_role_if_not_exists(
        &self,
        name: &str,
        options: RoleOptions,
        requester: &str,
    ) -> Result<bool> {
        self.create(name, options, requester, true).await
    }

    async fn create(&self, name: &str, options: RoleOptions, requester: &str, if_not_exists: bool) -> Result<bool> {
        if name.is_empty() {
            return Err(RbacError::InvalidInput("Role name must not be empty".to_string()));
        }

        let mut roles = self.catalog.roles.write().await;
        let mut store = self.catalog.permissions.write().await;

        let actor = roles.resolve(requester)?;
        check_permission(&actor, &store, &Resource::AllRoles, Permission::Create)?;
        if options.superuser {
            superuser_only(&actor, "Only superusers can create a role with superuser status")?;
        }

        if roles.contains(name) {
            if if_not_exists {
                debug!("Role {} already exists, skipping create", name);
                return Ok(false);
            }
            return Err(RbacError::AlreadyExists(name.to_string()));
        }

        let role = Role::new(name, options);
        let resource = Resource::role(name);
        let grants: Vec<Grant> = ResourceHierarchy::creator_permissions(&resource)
            .into_iter()
            .map(|permission| Grant::new(requester, resource.clone(), permission))
            .collect();

        self.catalog
            .persist(&Mutation::CreateRole {
                role: role.clone(),
                grants: grants.clone(),
            })
            .await?;

        roles.insert(role)?;
        for grant in &grants {
            store.grant(&grant.grantee, &grant.resource, grant.permission);
        }

        info!("Created role {} (requested by {})", name, requester);
        Ok(true)
    }

    /// Change a role's password, login flag, superuser flag or options.
    ///
    /// A role may change its own password without ALTER. The superuser flag
    /// can only be changed by a superuser, and never on a role the requester
    /// holds.
    pub async fn alter_role(&self, name: &str, changes: RoleChanges, requester: &str) -> Result<()> {
        let mut roles = self.catalog.roles.write().await;
        let store = self.catalog.permissions.read().await;

        let actor = roles.resolve(requester)?;

        if changes.superuser.is_some() {
            // Holds whatever else the requester may do
            if actor.has_role(name) {
                warn!("{} attempted to alter superuser status of held role {}", requester, name);
                return Err(RbacError::Unauthorized(
                    "You aren't allowed to alter your own superuser status or that of a role granted to you"
                        .to_string(),
                ));
            }
            superuser_only(&actor, "Only superusers are allowed to alter superuser status")?;
        }

        let own_password = name == requester && changes.is_password_only();
        if !own_password && !is_permitted(&actor, &store, &Resource::role(name), Permission::Alter) {
            warn!("{} denied ALTER on role {}", requester, name);
            return Err(RbacError::insufficient_privileges(requester));
        }

        roles.require(name)?;
        if changes.is_empty() {
            return Ok(());
        }

        self.catalog
            .persist(&Mutation::AlterRole {
                name: name.to_string(),
                changes: changes.clone(),
            })
            .await?;

        roles.get_mut(name)?.apply(&changes);
        if changes.superuser.is_some() {
            self.cache.role_changed(name);
        }

        info!("Altered role {} (requested by {})", name, requester);
        Ok(())
    }

    /// Drop a role along with its memberships, the grants it holds and the
    /// grants on `<role name>`
    pub async fn drop_role(&self, name: &str, requester: &str) -> Result<()> {
        self.remove(name, requester, false).await.map(|_| ())
    }

    /// Like [`drop_role`](Self::drop_role), but a missing role is not an
    /// error. Returns whether the role was dropped.
    pub async fn drop_role_if_exists(&self, name: &str, requester: &str) -> Result<bool> {
        self.remove(name, requester, true).await
    }

    async fn remove(&self, name: &str, requester: &str, if_exists: bool) -> Result<bool> {
        let mut roles = self.catalog.roles.write().await;
        let mut store = self.catalog.permissions.write().await;

        let actor = roles.resolve(requester)?;
        check_permission(&actor, &store, &Resource::role(name), Permission::Drop)?;

        if name == requester {
            return Err(RbacError::InvalidInput(
                "Cannot DROP primary role for current login".to_string(),
            ));
        }

        if !roles.contains(name) {
            if if_exists {
                debug!("Role {} does not exist, skipping drop", name);
                return Ok(false);
            }
            return Err(RbacError::NotFound(name.to_string()));
        }
        // Superuser through membership counts too
        if roles.is_superuser(name)? {
            superuser_only(&actor, "Only superusers can drop a role with superuser status")?;
        }

        self.catalog
            .persist(&Mutation::DropRole {
                name: name.to_string(),
            })
            .await?;

        roles.remove(name)?;
        let revoked = store.revoke_all_by_or_of(name);
        self.cache.role_changed(name);
        self.cache.invalidate(name);

        info!(
            "Dropped role {} and {} grants (requested by {})",
            name, revoked, requester
        );
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Make `member` a member of `role`
    pub async fn grant_role(&self, member: &str, role: &str, requester: &str) -> Result<()> {
        let mut roles = self.catalog.roles.write().await;
        let store = self.catalog.permissions.read().await;

        Self::check_membership_change(&roles, &store, member, role, requester)?;
        roles.graph().check_edge(member, role)?;

        self.catalog
            .persist(&Mutation::GrantRole {
                member: member.to_string(),
                role: role.to_string(),
            })
            .await?;

        roles.graph_mut().add_edge(member, role)?;
        self.cache.role_changed(member);

        info!("Granted {} to {} (requested by {})", role, member, requester);
        Ok(())
    }

    /// Remove `member` from `role`. Revoking a membership that does not
    /// exist changes nothing.
    pub async fn revoke_role(&self, member: &str, role: &str, requester: &str) -> Result<()> {
        let mut roles = self.catalog.roles.write().await;
        let store = self.catalog.permissions.read().await;

        Self::check_membership_change(&roles, &store, member, role, requester)?;
        if !roles.graph().has_edge(member, role) {
            debug!("{} is not a member of {}, nothing to revoke", member, role);
            return Ok(());
        }

        self.catalog
            .persist(&Mutation::RevokeRole {
                member: member.to_string(),
                role: role.to_string(),
            })
            .await?;

        roles.graph_mut().remove_edge(member, role)?;
        self.cache.role_changed(member);

        info!("Revoked {} from {} (requested by {})", role, member, requester);
        Ok(())
    }

    fn check_membership_change(
        roles: &RoleTable,
        store: &PermissionStore,
        member: &str,
        role: &str,
        requester: &str,
    ) -> Result<()> {
        roles.require(role)?;
        roles.require(member)?;
        let actor = roles.resolve(requester)?;
        check_permission(&actor, store, &Resource::role(role), Permission::Authorize)
    }

    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    /// Grant permissions on `resource` to `grantee`.
    ///
    /// The requester needs AUTHORIZE on the resource and must itself hold
    /// every permission it hands out.
    pub async fn grant_permission(
        &self,
        grantee: &str,
        resource: &Resource,
        permissions: impl Into<PermissionSet>,
        requester: &str,
    ) -> Result<()> {
        let permissions = permissions.into().resolve(resource)?;

        let roles = self.catalog.roles.read().await;
        let mut store = self.catalog.permissions.write().await;

        Self::check_grant_target(&roles, grantee, resource)?;
        let actor = roles.resolve(requester)?;
        check_permission(&actor, &store, resource, Permission::Authorize)?;
        for permission in &permissions {
            check_permission(&actor, &store, resource, *permission)?;
        }

        self.catalog
            .persist(&Mutation::GrantPermissions {
                grantee: grantee.to_string(),
                resource: resource.clone(),
                permissions: permissions.clone(),
            })
            .await?;

        for permission in &permissions {
            store.grant(grantee, resource, *permission);
        }

        info!(
            "Granted {:?} on {} to {} (requested by {})",
            permissions, resource, grantee, requester
        );
        Ok(())
    }

    /// Revoke permissions on `resource` from `grantee`. Permissions the
    /// grantee does not hold are ignored.
    pub async fn revoke_permission(
        &self,
        grantee: &str,
        resource: &Resource,
        permissions: impl Into<PermissionSet>,
        requester: &str,
    ) -> Result<()> {
        let permissions = permissions.into().resolve(resource)?;

        let roles = self.catalog.roles.read().await;
        let mut store = self.catalog.permissions.write().await;

        Self::check_grant_target(&roles, grantee, resource)?;
        let actor = roles.resolve(requester)?;
        check_permission(&actor, &store, resource, Permission::Authorize)?;

        let held: BTreeSet<Permission> = permissions
            .into_iter()
            .filter(|permission| store.has(grantee, resource, *permission))
            .collect();
        if held.is_empty() {
            debug!("{} holds none of the revoked permissions on {}", grantee, resource);
            return Ok(());
        }

        self.catalog
            .persist(&Mutation::RevokePermissions {
                grantee: grantee.to_string(),
                resource: resource.clone(),
                permissions: held.clone(),
            })
            .await?;

        for permission in &held {
            store.revoke(grantee, resource, *permission);
        }

        info!(
            "Revoked {:?} on {} from {} (requested by {})",
            held, resource, grantee, requester
        );
        Ok(())
    }

    fn check_grant_target(roles: &RoleTable, grantee: &str, resource: &Resource) -> Result<()> {
        roles.require(grantee)?;
        if let Some(target) = resource.role_name() {
            roles.require(target)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Listings and login
    // ------------------------------------------------------------------

    /// List roles, sorted by name.
    ///
    /// Without `of`, lists every role for requesters with DESCRIBE on
    /// `<all roles>`, otherwise the requester's own roles. With `of`, lists
    /// the roles granted to that role.
    pub async fn list_roles(&self, of: Option<&str>, recursive: bool, requester: &str) -> Result<Vec<RoleRow>> {
        let roles = self.catalog.roles.read().await;
        let store = self.catalog.permissions.read().await;

        let actor = roles.resolve(requester)?;
        let names = match of {
            None => {
                if is_permitted(&actor, &store, &Resource::AllRoles, Permission::Describe) {
                    roles.names()
                } else {
                    roles.graph().members_of(requester, recursive)?
                }
            }
            Some(role) => {
                roles.require(role)?;
                if !actor.has_role(role)
                    && !is_permitted(&actor, &store, &Resource::role(role), Permission::Describe)
                {
                    warn!("{} denied listing roles of {}", requester, role);
                    return Err(RbacError::Unauthorized(format!(
                        "You are not authorized to view roles granted to {}",
                        role
                    )));
                }
                roles.graph().members_of(role, recursive)?
            }
        };

        names
            .into_iter()
            .filter_map(|name| roles.get(&name).cloned())
            .map(|role| {
                Ok(RoleRow {
                    is_superuser: roles.is_superuser(&role.name)?,
                    name: role.name,
                    can_login: role.can_login,
                    options: role.options,
                })
            })
            .collect()
    }

    /// List roles that can log in, with their effective superuser status
    pub async fn list_users(&self, requester: &str) -> Result<Vec<UserRow>> {
        Ok(self
            .list_roles(None, true, requester)
            .await?
            .into_iter()
            .filter(|row| row.can_login)
            .map(|row| UserRow {
                name: row.name,
                is_superuser: row.is_superuser,
            })
            .collect())
    }

    /// Check that `name` may be used to log in. Only the role's own login
    /// flag counts; nothing is inherited.
    pub async fn check_login(&self, name: &str) -> Result<Role> {
        let roles = self.catalog.roles.read().await;

        let role = roles
            .get(name)
            .ok_or_else(|| RbacError::AuthenticationFailed(INCORRECT_CREDENTIALS.to_string()))?;
        if !role.can_login {
            return Err(RbacError::AuthenticationFailed(format!(
                "{} is not permitted to log in",
                name
            )));
        }
        if role.password.is_none() {
            return Err(RbacError::AuthenticationFailed(INCORRECT_CREDENTIALS.to_string()));
        }
        Ok(role.clone())
    }

    /// Current record of a role
    pub async fn get_role(&self, name: &str) -> Result<Role> {
        let roles = self.catalog.roles.read().await;
        roles.require(name).cloned()
    }

    // ------------------------------------------------------------------
    // Object lifecycle
    // ------------------------------------------------------------------

    /// Grant the creator permissions of a newly created keyspace, table or
    /// function to its creator
    pub async fn on_resource_created(&self, resource: &Resource, creator: &str) -> Result<()> {
        if resource.is_root() {
            return Err(RbacError::InvalidInput(format!("{} cannot be created", resource)));
        }

        let roles = self.catalog.roles.read().await;
        let mut store = self.catalog.permissions.write().await;
        roles.require(creator)?;

        let permissions = ResourceHierarchy::creator_permissions(resource);
        self.catalog
            .persist(&Mutation::GrantPermissions {
                grantee: creator.to_string(),
                resource: resource.clone(),
                permissions: permissions.clone(),
            })
            .await?;

        for permission in &permissions {
            store.grant(creator, resource, *permission);
        }

        debug!("Granted creator permissions on {} to {}", resource, creator);
        Ok(())
    }

    /// Remove every grant on a dropped resource and on anything that goes
    /// away with it. Returns the number of grants removed.
    pub async fn on_resource_dropped(&self, resource: &Resource) -> Result<usize> {
        if resource.is_root() {
            return Err(RbacError::InvalidInput(format!("{} cannot be dropped", resource)));
        }

        let mut store = self.catalog.permissions.write().await;
        self.catalog
            .persist(&Mutation::DropResource {
                resource: resource.clone(),
            })
            .await?;

        let revoked = store.revoke_all_on(resource);
        debug!("Dropped {} grants on {}", revoked, resource);
        Ok(revoked)
    }

    /// Create the initial superuser when no roles exist yet. Returns whether
    /// the role was created.
    pub async fn setup_default_superuser(&self, name: &str, password: &str) -> Result<bool> {
        let mut roles = self.catalog.roles.write().await;
        if !roles.is_empty() {
            debug!("Roles already present, skipping default superuser setup");
            return Ok(false);
        }

        let role = Role::new(
            name,
            RoleOptions::new()
                .with_password(password)
                .with_login(true)
                .with_superuser(true),
        );
        self.catalog
            .persist(&Mutation::CreateRole {
                role: role.clone(),
                grants: Vec::new(),
            })
            .await?;
        roles.insert(role)?;

        info!("Created default superuser {}", name);
        Ok(true)
    }
}
