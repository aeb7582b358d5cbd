//! `engine` crate: versioned deployment and rollback of function units.
//!
//! Services are cheap to construct and share one [`db::Store`].  Each
//! public operation runs in its own store transaction.

pub mod semver;
pub mod error;
pub mod audit;
pub mod models;
pub mod version;
pub mod permission;
pub mod process;
pub mod deployment;
pub mod rollback;

mod transaction;

pub use semver::{ChangeType, SemanticVersion};
pub use error::{EngineError, ValidationError};
pub use audit::{AuditEntry, AuditSink, MemoryAuditSink, Severity};
pub use models::{DeploymentOutcome, RollbackImpact, RollbackOutcome, VersionToDelete};
pub use version::VersionService;
pub use permission::PermissionService;
pub use process::ProcessService;
pub use deployment::{DeploymentConfig, DeploymentService};
pub use rollback::RollbackService;

pub use db::{FunctionUnitAccess, FunctionUnitVersion, ProcessInstance, ProcessStatus, Variables};
