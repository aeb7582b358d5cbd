//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models: they carry no domain behaviour beyond
//! their constructors.  Versioning rules live in the `engine` crate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

/// Process variables attached to an instance at start time.
pub type Variables = BTreeMap<String, serde_json::Value>;

/// Build the external engine's identifier for a deployed version.
///
/// The `_v` separator is part of the key format shared with the engine.
pub fn process_definition_key(name: &str, version: &str) -> String {
    format!("{name}_v{version}")
}

// ---------------------------------------------------------------------------
// function_unit_versions
// ---------------------------------------------------------------------------

/// One deployed version of a named function unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FunctionUnitVersion {
    pub id: Uuid,
    /// Function-unit name, shared by every version.
    pub name: String,
    /// Semantic version string (`MAJOR.MINOR.PATCH`).
    pub version: String,
    pub is_active: bool,
    pub deployed_at: DateTime<Utc>,
    /// Always `"{name}_v{version}"`.
    pub process_definition_key: String,
    /// The version that was active when this one was deployed.
    pub previous_version_id: Option<Uuid>,
    /// Free-form deployment metadata (description, deployer, …).
    pub metadata: serde_json::Value,
    /// Engine-side identifiers, recorded once the engine accepted the BPMN.
    pub process_definition_id: Option<String>,
    pub deployment_id: Option<String>,
}

impl FunctionUnitVersion {
    /// New, inactive version row.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        previous_version_id: Option<Uuid>,
        metadata: serde_json::Value,
    ) -> Self {
        let name = name.into();
        let version = version.into();
        Self {
            id: Uuid::new_v4(),
            process_definition_key: process_definition_key(&name, &version),
            name,
            version,
            is_active: false,
            deployed_at: Utc::now(),
            previous_version_id,
            metadata,
            process_definition_id: None,
            deployment_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// function_unit_access
// ---------------------------------------------------------------------------

/// A single access rule owned by exactly one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FunctionUnitAccess {
    pub id: Uuid,
    pub function_unit_version_id: Uuid,
    /// Principal kind, e.g. `user` or `role`.
    pub access_type: String,
    /// e.g. `role`, `virtual_group`, `user`.
    pub target_type: String,
    pub target_id: String,
}

impl FunctionUnitAccess {
    pub fn new(
        function_unit_version_id: Uuid,
        access_type: impl Into<String>,
        target_type: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            function_unit_version_id,
            access_type: access_type.into(),
            target_type: target_type.into(),
            target_id: target_id.into(),
        }
    }

    /// Same rule, new identity, owned by `version_id`.
    pub fn copy_to(&self, version_id: Uuid) -> Self {
        Self::new(version_id, &self.access_type, &self.target_type, &self.target_id)
    }
}

// ---------------------------------------------------------------------------
// process_instances
// ---------------------------------------------------------------------------

/// Lifecycle of a process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    Suspended,
    Completed,
    Terminated,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running    => write!(f, "running"),
            Self::Suspended  => write!(f, "suspended"),
            Self::Completed  => write!(f, "completed"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

impl std::str::FromStr for ProcessStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running"    => Ok(Self::Running),
            "suspended"  => Ok(Self::Suspended),
            "completed"  => Ok(Self::Completed),
            "terminated" => Ok(Self::Terminated),
            other        => Err(format!("unknown process status: {other}")),
        }
    }
}

/// One execution of a function unit's process definition.
///
/// `function_unit_version_id` and `process_definition_key` are fixed at
/// creation; no repository operation rewrites them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: Uuid,
    pub process_definition_key: String,
    pub function_unit_version_id: Uuid,
    pub start_user_id: String,
    pub start_user_name: String,
    pub status: ProcessStatus,
    pub variables: Variables,
    pub started_at: DateTime<Utc>,
}

impl ProcessInstance {
    /// New `running` instance bound to `version`.
    pub fn start(
        version: &FunctionUnitVersion,
        variables: Variables,
        start_user_id: impl Into<String>,
        start_user_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            process_definition_key: process_definition_key(&version.name, &version.version),
            function_unit_version_id: version.id,
            start_user_id: start_user_id.into(),
            start_user_name: start_user_name.into(),
            status: ProcessStatus::Running,
            variables,
            started_at: Utc::now(),
        }
    }
}

impl<'r> FromRow<'r, PgRow> for ProcessInstance {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
        let sqlx::types::Json(variables) = row.try_get("variables")?;

        Ok(Self {
            id: row.try_get("id")?,
            process_definition_key: row.try_get("process_definition_key")?,
            function_unit_version_id: row.try_get("function_unit_version_id")?,
            start_user_id: row.try_get("start_user_id")?,
            start_user_name: row.try_get("start_user_name")?,
            status,
            variables,
            started_at: row.try_get("started_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_version_is_inactive_and_derives_key() {
        let v = FunctionUnitVersion::new("purchase-approval", "1.2.3", None, serde_json::json!({}));
        assert!(!v.is_active);
        assert_eq!(v.process_definition_key, "purchase-approval_v1.2.3");
    }

    #[test]
    fn copied_rule_gets_new_identity_and_owner() {
        let source = Uuid::new_v4();
        let target = Uuid::new_v4();
        let rule = FunctionUnitAccess::new(source, "role", "role", "finance-approver");
        let copy = rule.copy_to(target);

        assert_ne!(copy.id, rule.id);
        assert_eq!(copy.function_unit_version_id, target);
        assert_eq!(copy.target_id, "finance-approver");
    }

    #[test]
    fn started_instance_is_bound_to_version() {
        let v = FunctionUnitVersion::new("leave-management", "2.0.0", None, serde_json::json!({}));
        let inst = ProcessInstance::start(&v, Variables::new(), "u1", "Alice");
        assert_eq!(inst.function_unit_version_id, v.id);
        assert_eq!(inst.process_definition_key, "leave-management_v2.0.0");
        assert_eq!(inst.status, ProcessStatus::Running);
        assert_eq!(inst.status.to_string(), "running");
    }
}
