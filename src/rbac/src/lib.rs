//! # CretoAI RBAC Engine
//!
//! Role-based access control over hierarchical resources.
//!
//! ## Features
//!
//! - **Role membership graph** kept acyclic on every grant
//! - **Resource hierarchy** for roles, keyspaces/tables and functions, with
//!   per-kind legal permissions and `ALL` expansion
//! - **Inheritance** of grants and superuser status through membership;
//!   login eligibility is never inherited
//! - **Creator permissions** granted automatically on create, cascading
//!   cleanup on drop
//! - **Principal cache** with a configurable TTL (disabled by default)
//! - **Persistence seam**: writes are applied only after the store commits
//!
//! ## Example
//!
//! ```rust
//! use cretoai_rbac::{Permission, Rbac, RbacConfig, Resource, RoleOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RbacConfig::default().with_default_superuser("cassandra", "cassandra");
//!     let rbac = Rbac::new(config).await?;
//!
//!     let options = RoleOptions::new().with_login(true).with_password("12345");
//!     rbac.roles().create_role("mike", options, "cassandra").await?;
//!
//!     let table = Resource::table("ks", "cf");
//!     rbac.roles()
//!         .grant_permission("mike", &table, Permission::Select, "cassandra")
//!         .await?;
//!
//!     rbac.engine().authorize("mike", &table, Permission::Select).await?;
//!     assert!(rbac.engine().authorize("mike", &table, Permission::Modify).await.is_err());
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod manager;
pub mod permissions;
pub mod resource;
pub mod service;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheStats, Clock, ManualClock, PrincipalCache, ResolvedPrincipal, SystemClock};
pub use config::{DefaultSuperuser, RbacConfig};
pub use engine::AuthorizationEngine;
pub use error::{RbacError, Result};
pub use graph::{GraphError, RoleGraph};
pub use manager::RoleManager;
pub use permissions::{Grant, PermissionFilter, PermissionStore};
pub use resource::{FunctionKind, Permission, PermissionSet, Resource, ResourceHierarchy, ResourceKind};
pub use service::Rbac;
pub use store::{AuthStore, InMemoryAuthStore, Mutation};
pub use types::{Credential, PermissionRow, Role, RoleChanges, RoleOptions, RoleRow, UserRow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
