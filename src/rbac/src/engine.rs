//! Authorization engine
//!
//! Answers permission checks and permission listings.
//!
//! # Architecture
//!
//! ```text
//! principal → PrincipalCache ──miss──→ RoleTable (closure + superuser)
//!                  ↓
//!          effective role set × resource chain → PermissionStore
//!                  ↓
//!            Ok(()) / Unauthorized
//! ```

use crate::cache::{PrincipalCache, ResolvedPrincipal};
use crate::catalog::Catalog;
use crate::error::{RbacError, Result};
use crate::permissions::{PermissionFilter, PermissionStore};
use crate::resource::{Permission, Resource};
use crate::types::PermissionRow;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Whether `principal` holds `permission` on `resource` or any ancestor.
/// Superusers hold everything.
pub(crate) fn is_permitted(
    principal: &ResolvedPrincipal,
    store: &PermissionStore,
    resource: &Resource,
    permission: Permission,
) -> bool {
    if principal.is_superuser {
        return true;
    }
    resource.chain().any(|level| {
        principal
            .roles
            .iter()
            .any(|role| store.has(role, &level, permission))
    })
}

/// Permission checks and listings over the shared catalog
pub struct AuthorizationEngine {
    catalog: Arc<Catalog>,
    cache: Arc<PrincipalCache>,
}

impl AuthorizationEngine {
    pub fn new(catalog: Arc<Catalog>, cache: Arc<PrincipalCache>) -> Self {
        Self { catalog, cache }
    }

    /// Effective role set and superuser status of `principal`, served from
    /// the cache while the entry is fresh
    pub async fn resolve(&self, principal: &str) -> Result<ResolvedPrincipal> {
        if let Some(cached) = self.cache.get(principal) {
            return Ok(cached);
        }

        let resolved = {
            let roles = self.catalog.roles.read().await;
            roles.resolve(principal)?
        };
        self.cache.put(resolved.clone());
        Ok(resolved)
    }

    /// Check whether `principal` may perform `permission` on `resource`
    pub async fn authorize(&self, principal: &str, resource: &Resource, permission: Permission) -> Result<()> {
        let resolved = match self.resolve(principal).await {
            Ok(resolved) => resolved,
            Err(RbacError::NotFound(_)) => {
                debug!("{} is not a known role, {} on {} denied", principal, permission, resource);
                return Err(RbacError::missing_permission(principal, permission, resource));
            }
            Err(err) => return Err(err),
        };
        if resolved.is_superuser {
            debug!("{} is a superuser, {} on {} allowed", principal, permission, resource);
            return Ok(());
        }

        let store = self.catalog.permissions.read().await;
        if is_permitted(&resolved, &store, resource, permission) {
            debug!("{} allowed {} on {}", principal, permission, resource);
            Ok(())
        } else {
            debug!(
                "{} denied {} on {} (roles: {:?})",
                principal, permission, resource, resolved.roles
            );
            Err(RbacError::missing_permission(principal, permission, resource))
        }
    }

    /// List stored grants matching `filter`.
    ///
    /// With a grantee filter and `recursive` set, grants held by every role
    /// in the grantee's closure are included. Requesters may always list
    /// roles in their own closure; listing anything else needs superuser
    /// status or DESCRIBE on `<all roles>`.
    pub async fn list_permissions(
        &self,
        filter: &PermissionFilter,
        recursive: bool,
        requester: &str,
    ) -> Result<Vec<PermissionRow>> {
        let actor = self.resolve(requester).await?;
        let roles = self.catalog.roles.read().await;
        let store = self.catalog.permissions.read().await;

        let may_describe = is_permitted(&actor, &store, &Resource::AllRoles, Permission::Describe);

        let grants = match &filter.grantee {
            None => {
                if !may_describe {
                    return Err(RbacError::Unauthorized(
                        "You are not authorized to view everyone's permissions".to_string(),
                    ));
                }
                store.list(filter)
            }
            Some(grantee) => {
                roles.require(grantee)?;
                if !may_describe && !actor.has_role(grantee) {
                    return Err(RbacError::Unauthorized(format!(
                        "You are not authorized to view {}'s permissions",
                        grantee
                    )));
                }
                let grantees: BTreeSet<String> = if recursive {
                    roles.graph().members_of(grantee, true)?
                } else {
                    BTreeSet::from([grantee.clone()])
                };
                store.list_for(grantees.iter().map(String::as_str), filter)
            }
        };

        let mut rows: Vec<PermissionRow> = grants
            .into_iter()
            .map(|g| PermissionRow::new(g.grantee, g.resource.to_string(), g.permission.to_string()))
            .collect();
        rows.sort();
        Ok(rows)
    }
}
