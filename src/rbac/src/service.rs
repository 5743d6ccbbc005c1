//! Engine facade wiring the catalog, cache, engine and manager together

use crate::cache::{Clock, PrincipalCache, SystemClock};
use crate::catalog::Catalog;
use crate::config::RbacConfig;
use crate::engine::AuthorizationEngine;
use crate::error::Result;
use crate::manager::RoleManager;
use crate::store::{AuthStore, InMemoryAuthStore};
use std::sync::Arc;
use tracing::info;

/// RBAC service
///
/// Owns one catalog and one principal cache. Instances are fully
/// independent, so tests can run several side by side with different
/// settings.
pub struct Rbac {
    config: RbacConfig,
    cache: Arc<PrincipalCache>,
    engine: AuthorizationEngine,
    manager: RoleManager,
}

impl Rbac {
    /// Create a service backed by an in-memory store
    pub async fn new(config: RbacConfig) -> Result<Self> {
        Self::with_store(config, Arc::new(InMemoryAuthStore::new())).await
    }

    /// Create a service persisting through `store`
    pub async fn with_store(config: RbacConfig, store: Arc<dyn AuthStore>) -> Result<Self> {
        Self::with_clock(config, store, Arc::new(SystemClock)).await
    }

    /// Create a service whose cache expiry follows `clock`
    pub async fn with_clock(config: RbacConfig, store: Arc<dyn AuthStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        let catalog = Arc::new(Catalog::new(store));
        let cache = Arc::new(PrincipalCache::with_clock(config.cache.clone(), clock));
        let engine = AuthorizationEngine::new(catalog.clone(), cache.clone());
        let manager = RoleManager::new(catalog, cache.clone());

        if let Some(superuser) = &config.default_superuser {
            manager
                .setup_default_superuser(&superuser.name, &superuser.password)
                .await?;
        }

        info!(
            "RBAC service initialized (cache ttl: {:?}, capacity: {})",
            config.cache.ttl, config.cache.capacity
        );

        Ok(Self {
            config,
            cache,
            engine,
            manager,
        })
    }

    pub fn config(&self) -> &RbacConfig {
        &self.config
    }

    /// Role, membership and grant management
    pub fn roles(&self) -> &RoleManager {
        &self.manager
    }

    /// Authorization checks and permission listings
    pub fn engine(&self) -> &AuthorizationEngine {
        &self.engine
    }

    pub fn cache(&self) -> &PrincipalCache {
        &self.cache
    }
}
