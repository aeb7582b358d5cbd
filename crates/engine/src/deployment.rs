//! Function-unit deployment.
//!
//! `DeploymentService` runs one deployment as a single store transaction:
//! 1. Generates the next version and rejects it if it already exists.
//! 2. Inserts the new version row (inactive), linked to its predecessor.
//! 3. Deploys the BPMN to the workflow engine under `"{name}_v{version}"`.
//! 4. Copies the predecessor's access rules, if there is a predecessor.
//! 5. Activates the new version and commits.
//!
//! A failure in steps 3–5 rolls the transaction back, removes the engine
//! deployment if one was created, and surfaces as
//! [`EngineError::Transaction`] naming the failing stage.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use db::models::process_definition_key;
use db::{DbError, FunctionUnitVersion, Store, StoreTx};
use flowable::{ProcessDeployment, WorkflowEngineClient};

use crate::audit::{transaction_failure, AuditSink};
use crate::error::{stage, ValidationError};
use crate::models::DeploymentOutcome;
use crate::permission::PermissionService;
use crate::semver::{ChangeType, SemanticVersion};
use crate::transaction::discard;
use crate::version::VersionService;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for deployments.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    /// Upper bound for one workflow-engine call.  A call that takes longer
    /// counts as "engine unavailable".
    pub engine_timeout: Duration,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            engine_timeout: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// DeploymentService
// ---------------------------------------------------------------------------

/// Version row written in the first half of a deployment.
struct PreparedVersion {
    row: FunctionUnitVersion,
    previous: Option<FunctionUnitVersion>,
}

pub struct DeploymentService {
    store: Arc<dyn Store>,
    versions: VersionService,
    permissions: PermissionService,
    client: Arc<dyn WorkflowEngineClient>,
    audit: Option<Arc<dyn AuditSink>>,
    config: DeploymentConfig,
}

impl DeploymentService {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn WorkflowEngineClient>,
        config: DeploymentConfig,
    ) -> Self {
        Self {
            versions: VersionService::new(Arc::clone(&store)),
            permissions: PermissionService::new(Arc::clone(&store)),
            store,
            client,
            audit: None,
            config,
        }
    }

    /// Also report transaction failures to `sink`.
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Deploy a new version of `name` and make it the active one.
    ///
    /// # Errors
    /// - [`EngineError::Validation`] for an invalid `change_type` or a
    ///   version that already exists (also when a concurrent deployment
    ///   took the same number first).
    /// - [`EngineError::Transaction`] when the engine call, the permission
    ///   copy, the activation or the commit fails.
    #[instrument(skip(self, bpmn_content, metadata), fields(function_unit = %name))]
    pub async fn deploy_function_unit(
        &self,
        name: &str,
        bpmn_content: &str,
        change_type: &str,
        metadata: serde_json::Value,
    ) -> Result<DeploymentOutcome, EngineError> {
        let change: ChangeType = change_type.parse()?;

        let mut tx = self.store.begin().await?;

        let prepared = match self.prepare(tx.as_mut(), name, change, metadata).await {
            Ok(prepared) => prepared,
            Err(e) => {
                discard(tx).await;
                return Err(e);
            }
        };
        let PreparedVersion { row, previous } = prepared;

        let deployment = match self.deploy_bpmn_to_flowable(name, &row.version, bpmn_content).await {
            Ok(deployment) => deployment,
            Err(e) => {
                discard(tx).await;
                return Err(self.fail(stage::BPMN_DEPLOYMENT, e));
            }
        };

        let permissions_copied = match self
            .complete(tx.as_mut(), &row, previous.as_ref(), &deployment)
            .await
        {
            Ok(copied) => copied,
            Err((failed_stage, e)) => {
                discard(tx).await;
                self.compensate(&deployment).await;
                return Err(self.fail(failed_stage, e));
            }
        };

        if let Err(e) = tx.commit().await {
            self.compensate(&deployment).await;
            return Err(match e {
                DbError::DuplicateVersion { name, version } => already_exists(&name, &version),
                other => self.fail(stage::COMMIT, other.into()),
            });
        }

        info!(
            "deployed {} {} (previous: {})",
            name,
            row.version,
            previous.as_ref().map_or("none", |p| p.version.as_str())
        );

        Ok(DeploymentOutcome {
            version_id: row.id,
            function_unit_name: row.name,
            process_definition_key: row.process_definition_key,
            version: row.version,
            previous_version: previous.map(|p| p.version),
            permissions_copied,
            process_definition_id: deployment.process_definition_id,
            deployment_id: deployment.deployment_id,
        })
    }

    /// Deploy `bpmn` to the workflow engine as version `version` of `name`.
    ///
    /// # Errors
    /// [`EngineError::EngineUnavailable`] if the engine returns no
    /// deployment or does not answer within the configured timeout.
    pub async fn deploy_bpmn_to_flowable(
        &self,
        name: &str,
        version: &str,
        bpmn: &str,
    ) -> Result<ProcessDeployment, EngineError> {
        let version = SemanticVersion::parse(version)?;
        let key = process_definition_key(name, &version.to_string());
        let display_name = format!("{name} v{version}");

        let call = self.client.deploy_process(&key, bpmn, &display_name);
        match tokio::time::timeout(self.config.engine_timeout, call).await {
            Ok(Ok(Some(deployment))) => {
                info!(
                    "deployed {} to the workflow engine (deployment {})",
                    key, deployment.deployment_id
                );
                Ok(deployment)
            }
            Ok(Ok(None)) => Err(EngineError::EngineUnavailable(format!(
                "no deployment returned for {key}"
            ))),
            Ok(Err(e)) => Err(EngineError::Client(e)),
            Err(_) => Err(EngineError::EngineUnavailable(format!(
                "no answer for {key} within {:?}",
                self.config.engine_timeout
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Internal steps
    // -----------------------------------------------------------------------

    /// Version generation, duplicate check and insert of the inactive row.
    async fn prepare(
        &self,
        tx: &mut dyn StoreTx,
        name: &str,
        change: ChangeType,
        metadata: serde_json::Value,
    ) -> Result<PreparedVersion, EngineError> {
        let next = self.versions.next_version_in(tx, name, change).await?;

        if tx.version_exists(name, &next).await? {
            return Err(already_exists(name, &next));
        }

        let previous = tx.find_active_version(name).await?;

        let row = FunctionUnitVersion::new(name, &next, previous.as_ref().map(|p| p.id), metadata);
        tx.insert_version(&row).await.map_err(|e| match e {
            DbError::DuplicateVersion { name, version } => already_exists(&name, &version),
            other => EngineError::Database(other),
        })?;

        Ok(PreparedVersion { row, previous })
    }

    /// Steps after the engine accepted the BPMN: record the engine ids,
    /// inherit permissions, activate.  Returns the number of copied rules.
    async fn complete(
        &self,
        tx: &mut dyn StoreTx,
        row: &FunctionUnitVersion,
        previous: Option<&FunctionUnitVersion>,
        deployment: &ProcessDeployment,
    ) -> Result<Option<usize>, (&'static str, EngineError)> {
        tx.record_deployment(row.id, &deployment.process_definition_id, &deployment.deployment_id)
            .await
            .map_err(|e| (stage::BPMN_DEPLOYMENT, EngineError::from(e)))?;

        let copied = match previous {
            Some(previous) => Some(
                self.permissions
                    .copy_in(tx, previous.id, row.id)
                    .await
                    .map_err(|e| (stage::PERMISSION_COPY, e))?,
            ),
            None => None,
        };

        self.versions
            .activate_in(tx, row.id)
            .await
            .map_err(|e| (stage::VERSION_ACTIVATION, e))?;

        Ok(copied)
    }

    /// Best-effort removal of an engine deployment whose transaction failed.
    async fn compensate(&self, deployment: &ProcessDeployment) {
        let call = self
            .client
            .delete_process_definition(&deployment.deployment_id, true);

        match tokio::time::timeout(self.config.engine_timeout, call).await {
            Ok(Ok(true)) => info!(
                "removed engine deployment {} after failed transaction",
                deployment.deployment_id
            ),
            Ok(Ok(false)) => warn!(
                "engine deployment {} was already gone",
                deployment.deployment_id
            ),
            Ok(Err(e)) => warn!(
                "could not remove engine deployment {}: {}",
                deployment.deployment_id, e
            ),
            Err(_) => warn!(
                "removing engine deployment {} timed out",
                deployment.deployment_id
            ),
        }
    }

    fn fail(&self, stage: &'static str, cause: EngineError) -> EngineError {
        transaction_failure(self.audit.as_deref(), stage, cause)
    }
}

fn already_exists(name: &str, version: &str) -> EngineError {
    ValidationError::VersionAlreadyExists {
        name: name.to_owned(),
        version: version.to_owned(),
    }
    .into()
}
