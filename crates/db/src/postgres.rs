//! [`Store`] backed by a Postgres pool.
//!
//! Every [`PgTx`] wraps one `sqlx::Transaction`; the port methods delegate
//! to the query functions in [`crate::repository`].

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    DbError, DbPool,
    models::{FunctionUnitAccess, FunctionUnitVersion, ProcessInstance},
    repository::{
        access, process_instances, versions, AccessRepository, ProcessInstanceRepository, Store,
        StoreTx, VersionRepository,
    },
};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DbError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

/// An open Postgres transaction.  Dropping it rolls back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl VersionRepository for PgTx {
    async fn find_version(&mut self, id: Uuid) -> Result<Option<FunctionUnitVersion>, DbError> {
        versions::find_version(&mut self.tx, id).await
    }

    async fn find_active_version(
        &mut self,
        name: &str,
    ) -> Result<Option<FunctionUnitVersion>, DbError> {
        versions::find_active_version(&mut self.tx, name).await
    }

    async fn list_versions(&mut self, name: &str) -> Result<Vec<FunctionUnitVersion>, DbError> {
        versions::list_versions(&mut self.tx, name).await
    }

    async fn version_exists(&mut self, name: &str, version: &str) -> Result<bool, DbError> {
        versions::version_exists(&mut self.tx, name, version).await
    }

    async fn insert_version(&mut self, version: &FunctionUnitVersion) -> Result<(), DbError> {
        versions::insert_version(&mut self.tx, version).await
    }

    async fn set_version_active(&mut self, id: Uuid, active: bool) -> Result<(), DbError> {
        versions::set_version_active(&mut self.tx, id, active).await
    }

    async fn record_deployment(
        &mut self,
        id: Uuid,
        process_definition_id: &str,
        deployment_id: &str,
    ) -> Result<(), DbError> {
        versions::record_deployment(&mut self.tx, id, process_definition_id, deployment_id).await
    }

    async fn lock_versions(&mut self, name: &str) -> Result<(), DbError> {
        versions::lock_versions(&mut self.tx, name).await
    }

    async fn delete_version(&mut self, id: Uuid) -> Result<(), DbError> {
        versions::delete_version(&mut self.tx, id).await
    }
}

#[async_trait]
impl AccessRepository for PgTx {
    async fn list_access(&mut self, version_id: Uuid) -> Result<Vec<FunctionUnitAccess>, DbError> {
        access::list_access(&mut self.tx, version_id).await
    }

    async fn insert_access(&mut self, rule: &FunctionUnitAccess) -> Result<(), DbError> {
        access::insert_access(&mut self.tx, rule).await
    }

    async fn delete_access_by_version(&mut self, version_id: Uuid) -> Result<u64, DbError> {
        access::delete_access_by_version(&mut self.tx, version_id).await
    }
}

#[async_trait]
impl ProcessInstanceRepository for PgTx {
    async fn insert_process_instance(&mut self, instance: &ProcessInstance) -> Result<(), DbError> {
        process_instances::insert_process_instance(&mut self.tx, instance).await
    }

    async fn list_process_instances(
        &mut self,
        version_id: Uuid,
    ) -> Result<Vec<ProcessInstance>, DbError> {
        process_instances::list_process_instances(&mut self.tx, version_id).await
    }

    async fn count_process_instances(&mut self, version_id: Uuid) -> Result<u64, DbError> {
        process_instances::count_process_instances(&mut self.tx, version_id).await
    }

    async fn delete_process_instances(&mut self, version_id: Uuid) -> Result<u64, DbError> {
        process_instances::delete_process_instances(&mut self.tx, version_id).await
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
