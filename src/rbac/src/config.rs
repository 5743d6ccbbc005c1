//! Engine configuration
//!
//! Environment variables read by [`RbacConfig::from_env`]:
//! - `RBAC_ROLES_VALIDITY_MS` - principal cache TTL in milliseconds (default: 0, disabled)
//! - `RBAC_ROLES_CACHE_MAX_ENTRIES` - principal cache capacity (default: 10000)
//! - `RBAC_ROLES_EAGER_INVALIDATION` - drop cache entries on role changes (default: false)
//! - `RBAC_DEFAULT_SUPERUSER` - `name:password` of the superuser created on an empty role table

use crate::cache::CacheConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Credentials of the superuser created when no roles exist
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultSuperuser {
    pub name: String,
    pub password: String,
}

impl DefaultSuperuser {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }

    /// Parse `name:password`
    fn parse(value: &str) -> Option<Self> {
        let (name, password) = value.split_once(':')?;
        if name.is_empty() {
            return None;
        }
        Some(Self::new(name, password))
    }
}

impl fmt::Debug for DefaultSuperuser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultSuperuser")
            .field("name", &self.name)
            .field("password", &"***")
            .finish()
    }
}

/// RBAC engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacConfig {
    /// Principal cache settings
    pub cache: CacheConfig,

    /// Superuser bootstrapped into an empty role table
    pub default_superuser: Option<DefaultSuperuser>,
}

impl RbacConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CacheConfig::default();

        let validity_ms: u64 = lookup("RBAC_ROLES_VALIDITY_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.ttl.as_millis() as u64);

        let capacity: usize = lookup("RBAC_ROLES_CACHE_MAX_ENTRIES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.capacity);

        let eager_invalidation: bool = lookup("RBAC_ROLES_EAGER_INVALIDATION")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.eager_invalidation);

        let default_superuser = lookup("RBAC_DEFAULT_SUPERUSER").and_then(|s| DefaultSuperuser::parse(&s));

        Self {
            cache: CacheConfig {
                ttl: Duration::from_millis(validity_ms),
                capacity,
                eager_invalidation,
            },
            default_superuser,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }

    pub fn with_default_superuser(mut self, name: impl Into<String>, password: impl Into<String>) -> Self {
        self.default_superuser = Some(DefaultSuperuser::new(name, password));
        self
    }
}
