//! Rolling a function unit back to an earlier version.
//!
//! Rollback is destructive: every version strictly newer than the target is
//! deleted together with its process instances and access rules, then the
//! target is activated.  Everything happens in one store transaction.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use db::{FunctionUnitVersion, Store, StoreTx};

use crate::audit::{transaction_failure, AuditSink};
use crate::error::{stage, ValidationError};
use crate::models::{RollbackImpact, RollbackOutcome, VersionToDelete};
use crate::process::ProcessService;
use crate::semver::SemanticVersion;
use crate::transaction::{discard, finish};
use crate::version::VersionService;
use crate::EngineError;

pub struct RollbackService {
    store: Arc<dyn Store>,
    versions: VersionService,
    processes: ProcessService,
    audit: Option<Arc<dyn AuditSink>>,
}

impl RollbackService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            versions: VersionService::new(Arc::clone(&store)),
            processes: ProcessService::new(Arc::clone(&store)),
            store,
            audit: None,
        }
    }

    /// Also report transaction failures to `sink`.
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// What rolling back to `target_version_id` would delete.  Read-only.
    ///
    /// # Errors
    /// - [`EngineError::NotFound`] for an unknown id.
    /// - [`ValidationError::AlreadyActive`] if the target is the active
    ///   version.
    pub async fn calculate_rollback_impact(
        &self,
        target_version_id: Uuid,
    ) -> Result<RollbackImpact, EngineError> {
        let mut tx = self.store.begin().await?;
        let result = self.plan_in(tx.as_mut(), target_version_id, false).await;
        finish(tx, result).await
    }

    /// Delete every version newer than `target_version_id` and activate it.
    ///
    /// # Errors
    /// The same precondition errors as [`Self::calculate_rollback_impact`];
    /// any failure while deleting, activating or committing surfaces as
    /// [`EngineError::Transaction`] with nothing changed.
    #[instrument(skip(self))]
    pub async fn rollback_to_version(
        &self,
        target_version_id: Uuid,
    ) -> Result<RollbackOutcome, EngineError> {
        let mut tx = self.store.begin().await?;

        let impact = match self.plan_in(tx.as_mut(), target_version_id, true).await {
            Ok(impact) => impact,
            Err(e) => {
                discard(tx).await;
                return Err(e);
            }
        };
        warn!("{}", impact.warning);

        let deleted_process_instances = match self.execute_in(tx.as_mut(), &impact).await {
            Ok(deleted) => deleted,
            Err(e) => {
                discard(tx).await;
                return Err(self.fail(e));
            }
        };

        if let Err(e) = tx.commit().await {
            return Err(self.fail(e.into()));
        }

        let target = impact.target_version;
        info!(
            "rolled '{}' back to {}; deleted {} version(s)",
            target.name,
            target.version,
            impact.versions_to_delete.len()
        );

        Ok(RollbackOutcome {
            target_version_id: target.id,
            target_version: target.version,
            deleted_versions: impact.versions_to_delete.into_iter().map(|v| v.version).collect(),
            deleted_process_instances,
        })
    }

    /// Preconditions plus the list of newer versions.  With `lock` the
    /// unit's version rows stay locked until the transaction ends, so the
    /// plan cannot go stale before it is executed.
    async fn plan_in(
        &self,
        tx: &mut dyn StoreTx,
        target_version_id: Uuid,
        lock: bool,
    ) -> Result<RollbackImpact, EngineError> {
        let mut target = self.versions.version_in(tx, target_version_id).await?;
        if lock {
            // A concurrent rollback or activation may have committed while
            // this transaction waited for the lock.
            tx.lock_versions(&target.name).await?;
            target = self.versions.version_in(tx, target_version_id).await?;
        }

        if target.is_active {
            return Err(ValidationError::AlreadyActive {
                name: target.name,
                version: target.version,
            }
            .into());
        }

        let target_semver = SemanticVersion::parse(&target.version)?;
        let newer: Vec<FunctionUnitVersion> = self
            .versions
            .sorted_history_in(tx, &target.name)
            .await?
            .into_iter()
            .filter(|(semver, _)| *semver > target_semver)
            .map(|(_, version)| version)
            .collect();

        let mut versions_to_delete = Vec::with_capacity(newer.len());
        for version in newer {
            let process_instance_count = self.processes.count_in(tx, version.id).await?;
            versions_to_delete.push(VersionToDelete {
                id: version.id,
                version: version.version,
                process_instance_count,
            });
        }

        let total_process_instances = versions_to_delete
            .iter()
            .map(|v| v.process_instance_count)
            .sum();
        let warning = format!(
            "Rolling back '{}' to {} will delete {} newer version(s) and {} process instance(s)",
            target.name,
            target.version,
            versions_to_delete.len(),
            total_process_instances
        );

        Ok(RollbackImpact {
            target_version: target,
            versions_to_delete,
            total_process_instances,
            can_proceed: true,
            warning,
        })
    }

    /// Returns the number of deleted process instances.
    async fn execute_in(
        &self,
        tx: &mut dyn StoreTx,
        impact: &RollbackImpact,
    ) -> Result<u64, EngineError> {
        let mut deleted_instances = 0;

        // Dependents first: instances and access rules reference the row.
        for doomed in &impact.versions_to_delete {
            deleted_instances += self.processes.delete_in(tx, doomed.id).await?;
            let rules = tx.delete_access_by_version(doomed.id).await?;
            tx.delete_version(doomed.id).await?;
            info!(
                "deleted version {} with {} access rule(s)",
                doomed.version, rules
            );
        }

        self.versions.activate_in(tx, impact.target_version.id).await?;
        Ok(deleted_instances)
    }

    fn fail(&self, cause: EngineError) -> EngineError {
        transaction_failure(self.audit.as_deref(), stage::ROLLBACK, cause)
    }
}
