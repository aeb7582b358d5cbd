//! Storage ports: one trait per aggregate, composed into a transaction.
//!
//! Services never talk to a pool directly: they open a [`StoreTx`] through
//! [`Store::begin`], issue their reads and writes against it, and finish
//! with [`StoreTx::commit`] or [`StoreTx::rollback`].  Dropping a
//! transaction without committing discards every write made through it.
//!
//! Implementations: [`crate::postgres::PgStore`] and
//! [`crate::memory::MemoryStore`].

pub mod versions;
pub mod access;
pub mod process_instances;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    DbError,
    models::{FunctionUnitAccess, FunctionUnitVersion, ProcessInstance},
};

/// `function_unit_versions` operations.
#[async_trait]
pub trait VersionRepository: Send {
    async fn find_version(&mut self, id: Uuid) -> Result<Option<FunctionUnitVersion>, DbError>;

    /// The active row for `name`, if any.  When the table is inconsistent
    /// and holds several active rows, any one of them is returned.
    async fn find_active_version(
        &mut self,
        name: &str,
    ) -> Result<Option<FunctionUnitVersion>, DbError>;

    /// Every version of `name`.  Callers must not rely on the order.
    async fn list_versions(&mut self, name: &str) -> Result<Vec<FunctionUnitVersion>, DbError>;

    async fn version_exists(&mut self, name: &str, version: &str) -> Result<bool, DbError>;

    /// Fails with [`DbError::DuplicateVersion`] when `(name, version)` is taken.
    async fn insert_version(&mut self, version: &FunctionUnitVersion) -> Result<(), DbError>;

    async fn set_version_active(&mut self, id: Uuid, active: bool) -> Result<(), DbError>;

    async fn record_deployment(
        &mut self,
        id: Uuid,
        process_definition_id: &str,
        deployment_id: &str,
    ) -> Result<(), DbError>;

    /// Lock every version row of `name` until the transaction ends.
    async fn lock_versions(&mut self, name: &str) -> Result<(), DbError>;

    /// Fails with [`DbError::Constraint`] while access rules or process
    /// instances still reference the row, and [`DbError::NotFound`] if
    /// nothing was deleted.
    async fn delete_version(&mut self, id: Uuid) -> Result<(), DbError>;
}

/// `function_unit_access` operations.
#[async_trait]
pub trait AccessRepository: Send {
    async fn list_access(&mut self, version_id: Uuid) -> Result<Vec<FunctionUnitAccess>, DbError>;

    async fn insert_access(&mut self, rule: &FunctionUnitAccess) -> Result<(), DbError>;

    /// Returns the number of deleted rules.
    async fn delete_access_by_version(&mut self, version_id: Uuid) -> Result<u64, DbError>;
}

/// `process_instances` operations.  Instances are insert-only: the bound
/// version never changes.
#[async_trait]
pub trait ProcessInstanceRepository: Send {
    async fn insert_process_instance(&mut self, instance: &ProcessInstance) -> Result<(), DbError>;

    async fn list_process_instances(
        &mut self,
        version_id: Uuid,
    ) -> Result<Vec<ProcessInstance>, DbError>;

    async fn count_process_instances(&mut self, version_id: Uuid) -> Result<u64, DbError>;

    /// Returns the number of deleted instances.
    async fn delete_process_instances(&mut self, version_id: Uuid) -> Result<u64, DbError>;
}

/// One unit of work across all three aggregates.
#[async_trait]
pub trait StoreTx: VersionRepository + AccessRepository + ProcessInstanceRepository {
    async fn commit(self: Box<Self>) -> Result<(), DbError>;

    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}

/// Transaction factory shared by every service.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DbError>;
}
