//! Process instances and their version binding.
//!
//! An instance is bound to the version that is active when it starts.  The
//! binding is stored with the instance and never re-resolved, so later
//! deployments or rollbacks of the same function unit do not move it.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use db::models::process_definition_key;
use db::{FunctionUnitVersion, ProcessInstance, Store, StoreTx, Variables};

use crate::transaction::finish;
use crate::version::VersionService;
use crate::EngineError;

#[derive(Clone)]
pub struct ProcessService {
    store: Arc<dyn Store>,
    versions: VersionService,
}

impl ProcessService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { versions: VersionService::new(Arc::clone(&store)), store }
    }

    /// Start a `running` instance of the currently active version of `name`.
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if `name` has no active version.
    #[instrument(skip(self, variables), fields(function_unit = %name))]
    pub async fn create_process_instance(
        &self,
        name: &str,
        variables: Variables,
        user_id: &str,
        user_name: &str,
    ) -> Result<ProcessInstance, EngineError> {
        let mut tx = self.store.begin().await?;
        let result = self.create_in(tx.as_mut(), name, variables, user_id, user_name).await;
        finish(tx, result).await
    }

    /// `"{name}_v{version}"` of `version` itself, whatever is active now.
    pub fn get_process_definition_key(&self, version: &FunctionUnitVersion) -> String {
        process_definition_key(&version.name, &version.version)
    }

    /// # Errors
    /// [`EngineError::NotFound`] for an unknown version id.
    pub async fn get_process_instances_by_version(
        &self,
        version_id: Uuid,
    ) -> Result<Vec<ProcessInstance>, EngineError> {
        let mut tx = self.store.begin().await?;
        let result = self.instances_in(tx.as_mut(), version_id).await;
        finish(tx, result).await
    }

    /// # Errors
    /// [`EngineError::NotFound`] for an unknown version id.
    pub async fn count_process_instances_by_version(
        &self,
        version_id: Uuid,
    ) -> Result<u64, EngineError> {
        let mut tx = self.store.begin().await?;
        let result = match self.versions.version_in(tx.as_mut(), version_id).await {
            Ok(version) => self.count_in(tx.as_mut(), version.id).await,
            Err(e) => Err(e),
        };
        finish(tx, result).await
    }

    async fn create_in(
        &self,
        tx: &mut dyn StoreTx,
        name: &str,
        variables: Variables,
        user_id: &str,
        user_name: &str,
    ) -> Result<ProcessInstance, EngineError> {
        let version = self.versions.active_version_in(tx, name).await?;
        let instance = ProcessInstance::start(&version, variables, user_id, user_name);
        tx.insert_process_instance(&instance).await?;

        info!(
            "started process instance {} of {} for user {}",
            instance.id, instance.process_definition_key, user_id
        );
        Ok(instance)
    }

    async fn instances_in(
        &self,
        tx: &mut dyn StoreTx,
        version_id: Uuid,
    ) -> Result<Vec<ProcessInstance>, EngineError> {
        let version = self.versions.version_in(tx, version_id).await?;
        Ok(tx.list_process_instances(version.id).await?)
    }

    /// Unchecked: callers pass ids they just read in the same transaction.
    pub(crate) async fn count_in(
        &self,
        tx: &mut dyn StoreTx,
        version_id: Uuid,
    ) -> Result<u64, EngineError> {
        Ok(tx.count_process_instances(version_id).await?)
    }

    pub(crate) async fn delete_in(
        &self,
        tx: &mut dyn StoreTx,
        version_id: Uuid,
    ) -> Result<u64, EngineError> {
        Ok(tx.delete_process_instances(version_id).await?)
    }
}
