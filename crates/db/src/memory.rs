//! In-memory [`Store`] for tests and local runs.
//!
//! Semantics mirror the Postgres store closely enough for the services to
//! behave identically:
//! - reads made before a transaction's first write see the latest committed
//!   state (read committed);
//! - the first write, or [`VersionRepository::lock_versions`], takes the
//!   store-wide writer lock and continues on a fresh copy of the committed
//!   state;
//! - commit publishes that copy atomically, rollback or drop discards it;
//! - the `(name, version)` uniqueness, single active row and foreign-key
//!   rules are checked on write.
//!
//! Faults can be injected per operation with [`MemoryStore::inject_fault`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use uuid::Uuid;

use crate::{
    DbError,
    models::{FunctionUnitAccess, FunctionUnitVersion, ProcessInstance},
    repository::{AccessRepository, ProcessInstanceRepository, Store, StoreTx, VersionRepository},
};

/// Storage operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreFault {
    InsertVersion,
    InsertAccess,
    SetVersionActive,
    DeleteProcessInstances,
    DeleteVersion,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    versions: Vec<FunctionUnitVersion>,
    access: Vec<FunctionUnitAccess>,
    instances: Vec<ProcessInstance>,
}

impl MemoryState {
    fn version(&self, id: Uuid) -> Option<&FunctionUnitVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    fn version_mut(&mut self, id: Uuid) -> Result<&mut FunctionUnitVersion, DbError> {
        self.versions
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(DbError::NotFound)
    }
}

#[derive(Debug, Default)]
struct Shared {
    committed: RwLock<MemoryState>,
    writer: Arc<tokio::sync::Mutex<()>>,
    faults: Mutex<HashSet<StoreFault>>,
}

impl Shared {
    fn snapshot(&self) -> MemoryState {
        self.committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check(&self, fault: StoreFault) -> Result<(), DbError> {
        let faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        if faults.contains(&fault) {
            return Err(DbError::Injected(format!("{fault:?}")));
        }
        Ok(())
    }
}

/// Cheap to clone; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `fault`'s operation fail.
    pub fn inject_fault(&self, fault: StoreFault) {
        self.shared
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(fault);
    }

    pub fn clear_faults(&self) {
        self.shared
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Write a version straight into the committed state, bypassing every
    /// constraint.  Lets tests set up states the services never produce
    /// (e.g. several active rows).
    pub fn seed_version(&self, version: FunctionUnitVersion) {
        self.with_committed(|state| state.versions.push(version));
    }

    pub fn seed_access(&self, rule: FunctionUnitAccess) {
        self.with_committed(|state| state.access.push(rule));
    }

    pub fn seed_process_instance(&self, instance: ProcessInstance) {
        self.with_committed(|state| state.instances.push(instance));
    }

    /// Number of committed access rules across all versions.
    pub fn access_rule_count(&self) -> usize {
        self.shared.snapshot().access.len()
    }

    /// Number of committed process instances across all versions.
    pub fn process_instance_count(&self) -> usize {
        self.shared.snapshot().instances.len()
    }

    fn with_committed(&self, f: impl FnOnce(&mut MemoryState)) {
        let mut state = self
            .shared
            .committed
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DbError> {
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.shared),
            write: None,
        }))
    }
}

struct WriteSet {
    _guard: OwnedMutexGuard<()>,
    state: MemoryState,
}

/// An open in-memory transaction.
pub struct MemoryTx {
    shared: Arc<Shared>,
    write: Option<WriteSet>,
}

impl MemoryTx {
    fn read<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> T {
        match &self.write {
            Some(write) => f(&write.state),
            None => {
                let committed = self
                    .shared
                    .committed
                    .read()
                    .unwrap_or_else(PoisonError::into_inner);
                f(&*committed)
            }
        }
    }

    async fn working(&mut self) -> &mut MemoryState {
        let write = match self.write.take() {
            Some(write) => write,
            None => {
                let guard = Arc::clone(&self.shared.writer).lock_owned().await;
                WriteSet {
                    _guard: guard,
                    state: self.shared.snapshot(),
                }
            }
        };
        &mut self.write.insert(write).state
    }
}

#[async_trait]
impl VersionRepository for MemoryTx {
    async fn find_version(&mut self, id: Uuid) -> Result<Option<FunctionUnitVersion>, DbError> {
        Ok(self.read(|s| s.version(id).cloned()))
    }

    async fn find_active_version(
        &mut self,
        name: &str,
    ) -> Result<Option<FunctionUnitVersion>, DbError> {
        Ok(self.read(|s| {
            s.versions
                .iter()
                .filter(|v| v.name == name && v.is_active)
                .max_by_key(|v| v.deployed_at)
                .cloned()
        }))
    }

    async fn list_versions(&mut self, name: &str) -> Result<Vec<FunctionUnitVersion>, DbError> {
        Ok(self.read(|s| s.versions.iter().filter(|v| v.name == name).cloned().collect()))
    }

    async fn version_exists(&mut self, name: &str, version: &str) -> Result<bool, DbError> {
        Ok(self.read(|s| s.versions.iter().any(|v| v.name == name && v.version == version)))
    }

    async fn insert_version(&mut self, version: &FunctionUnitVersion) -> Result<(), DbError> {
        self.shared.check(StoreFault::InsertVersion)?;
        let state = self.working().await;

        if state
            .versions
            .iter()
            .any(|v| v.name == version.name && v.version == version.version)
        {
            return Err(DbError::DuplicateVersion {
                name: version.name.clone(),
                version: version.version.clone(),
            });
        }
        if state.version(version.id).is_some() {
            return Err(DbError::Constraint(format!("duplicate version id {}", version.id)));
        }

        state.versions.push(version.clone());
        Ok(())
    }

    async fn set_version_active(&mut self, id: Uuid, active: bool) -> Result<(), DbError> {
        self.shared.check(StoreFault::SetVersionActive)?;
        let state = self.working().await;

        if active {
            let name = state.version(id).ok_or(DbError::NotFound)?.name.clone();
            if state
                .versions
                .iter()
                .any(|v| v.name == name && v.is_active && v.id != id)
            {
                return Err(DbError::Constraint(format!(
                    "a second active version for function unit '{name}'"
                )));
            }
        }

        state.version_mut(id)?.is_active = active;
        Ok(())
    }

    async fn record_deployment(
        &mut self,
        id: Uuid,
        process_definition_id: &str,
        deployment_id: &str,
    ) -> Result<(), DbError> {
        let row = self.working().await.version_mut(id)?;
        row.process_definition_id = Some(process_definition_id.to_owned());
        row.deployment_id = Some(deployment_id.to_owned());
        Ok(())
    }

    async fn lock_versions(&mut self, name: &str) -> Result<(), DbError> {
        debug!("locking versions of '{}'", name);
        self.working().await;
        Ok(())
    }

    async fn delete_version(&mut self, id: Uuid) -> Result<(), DbError> {
        self.shared.check(StoreFault::DeleteVersion)?;
        let state = self.working().await;

        if state.access.iter().any(|a| a.function_unit_version_id == id)
            || state.instances.iter().any(|i| i.function_unit_version_id == id)
        {
            return Err(DbError::Constraint(format!("version {id} still has dependent rows")));
        }

        let before = state.versions.len();
        state.versions.retain(|v| v.id != id);
        if state.versions.len() == before {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl AccessRepository for MemoryTx {
    async fn list_access(&mut self, version_id: Uuid) -> Result<Vec<FunctionUnitAccess>, DbError> {
        Ok(self.read(|s| {
            s.access
                .iter()
                .filter(|a| a.function_unit_version_id == version_id)
                .cloned()
                .collect()
        }))
    }

    async fn insert_access(&mut self, rule: &FunctionUnitAccess) -> Result<(), DbError> {
        self.shared.check(StoreFault::InsertAccess)?;
        let state = self.working().await;

        if state.version(rule.function_unit_version_id).is_none() {
            return Err(DbError::Constraint(format!(
                "access rule references missing version {}",
                rule.function_unit_version_id
            )));
        }

        state.access.push(rule.clone());
        Ok(())
    }

    async fn delete_access_by_version(&mut self, version_id: Uuid) -> Result<u64, DbError> {
        let state = self.working().await;
        let before = state.access.len();
        state.access.retain(|a| a.function_unit_version_id != version_id);
        Ok((before - state.access.len()) as u64)
    }
}

#[async_trait]
impl ProcessInstanceRepository for MemoryTx {
    async fn insert_process_instance(&mut self, instance: &ProcessInstance) -> Result<(), DbError> {
        let state = self.working().await;

        if state.version(instance.function_unit_version_id).is_none() {
            return Err(DbError::Constraint(format!(
                "process instance references missing version {}",
                instance.function_unit_version_id
            )));
        }

        state.instances.push(instance.clone());
        Ok(())
    }

    async fn list_process_instances(
        &mut self,
        version_id: Uuid,
    ) -> Result<Vec<ProcessInstance>, DbError> {
        Ok(self.read(|s| {
            s.instances
                .iter()
                .filter(|i| i.function_unit_version_id == version_id)
                .cloned()
                .collect()
        }))
    }

    async fn count_process_instances(&mut self, version_id: Uuid) -> Result<u64, DbError> {
        Ok(self.read(|s| {
            s.instances
                .iter()
                .filter(|i| i.function_unit_version_id == version_id)
                .count() as u64
        }))
    }

    async fn delete_process_instances(&mut self, version_id: Uuid) -> Result<u64, DbError> {
        self.shared.check(StoreFault::DeleteProcessInstances)?;
        let state = self.working().await;
        let before = state.instances.len();
        state.instances.retain(|i| i.function_unit_version_id != version_id);
        Ok((before - state.instances.len()) as u64)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        let MemoryTx { shared, write } = *self;
        shared.check(StoreFault::Commit)?;
        if let Some(write) = write {
            *shared
                .committed
                .write()
                .unwrap_or_else(PoisonError::into_inner) = write.state;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Variables;
    use serde_json::json;

    fn version(name: &str, v: &str) -> FunctionUnitVersion {
        FunctionUnitVersion::new(name, v, None, json!({}))
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible_and_discarded() {
        let store = MemoryStore::new();
        let row = version("expense-approval", "1.0.0");

        let mut tx = store.begin().await.unwrap();
        tx.insert_version(&row).await.unwrap();

        let mut reader = store.begin().await.unwrap();
        assert!(reader.find_version(row.id).await.unwrap().is_none());

        tx.rollback().await.unwrap();
        assert!(reader.find_version(row.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let store = MemoryStore::new();
        let row = version("expense-approval", "1.0.0");

        let mut tx = store.begin().await.unwrap();
        tx.insert_version(&row).await.unwrap();
        tx.commit().await.unwrap();

        let mut reader = store.begin().await.unwrap();
        assert_eq!(reader.find_version(row.id).await.unwrap(), Some(row));
    }

    #[tokio::test]
    async fn duplicate_name_and_version_is_rejected() {
        let store = MemoryStore::new();
        store.seed_version(version("expense-approval", "1.0.1"));

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert_version(&version("expense-approval", "1.0.1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateVersion { version: ref v, .. } if v == "1.0.1"));
    }

    #[tokio::test]
    async fn second_active_row_is_rejected() {
        let store = MemoryStore::new();
        let mut active = version("leave-management", "1.0.0");
        active.is_active = true;
        let other = version("leave-management", "1.1.0");
        store.seed_version(active);
        store.seed_version(other.clone());

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.set_version_active(other.id, true).await,
            Err(DbError::Constraint(_))
        ));
    }

    #[tokio::test]
    async fn version_with_dependents_cannot_be_deleted() {
        let store = MemoryStore::new();
        let row = version("leave-management", "1.0.0");
        store.seed_version(row.clone());
        store.seed_process_instance(ProcessInstance::start(&row, Variables::new(), "u1", "Alice"));

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(tx.delete_version(row.id).await, Err(DbError::Constraint(_))));

        assert_eq!(tx.delete_process_instances(row.id).await.unwrap(), 1);
        tx.delete_version(row.id).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.process_instance_count(), 0);
    }

    #[tokio::test]
    async fn injected_fault_fails_the_operation() {
        let store = MemoryStore::new();
        store.inject_fault(StoreFault::InsertVersion);

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.insert_version(&version("a", "1.0.0")).await,
            Err(DbError::Injected(_))
        ));

        store.clear_faults();
        tx.insert_version(&version("a", "1.0.0")).await.unwrap();
    }
}
