//! Results returned by the deployment and rollback services.
//!
//! The persisted records themselves (`FunctionUnitVersion`,
//! `FunctionUnitAccess`, `ProcessInstance`) live in the `db` crate and are
//! re-exported from the crate root.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use db::FunctionUnitVersion;

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// A completed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOutcome {
    pub version_id: Uuid,
    pub function_unit_name: String,
    /// The newly active version.
    pub version: String,
    /// `"{name}_v{version}"`.
    pub process_definition_key: String,
    /// Version that was active before this deployment.
    pub previous_version: Option<String>,
    /// Rules inherited from the previous version; `None` when there was no
    /// previous version and copying was skipped.
    pub permissions_copied: Option<usize>,
    pub process_definition_id: String,
    pub deployment_id: String,
}

// ---------------------------------------------------------------------------
// Rollback
// ---------------------------------------------------------------------------

/// A version a rollback would delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionToDelete {
    pub id: Uuid,
    pub version: String,
    pub process_instance_count: u64,
}

/// Dry-run summary of a rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackImpact {
    pub target_version: FunctionUnitVersion,
    /// Every version strictly newer than the target, newest first.
    pub versions_to_delete: Vec<VersionToDelete>,
    pub total_process_instances: u64,
    pub can_proceed: bool,
    pub warning: String,
}

impl RollbackImpact {
    pub fn version_ids_to_delete(&self) -> Vec<Uuid> {
        self.versions_to_delete.iter().map(|v| v.id).collect()
    }
}

/// A completed rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub target_version_id: Uuid,
    pub target_version: String,
    /// Deleted version strings, newest first.
    pub deleted_versions: Vec<String>,
    pub deleted_process_instances: u64,
}
