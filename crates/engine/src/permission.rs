//! Per-version access rules.
//!
//! Rules belong to exactly one version.  Inheriting rules from an earlier
//! version copies them into new rows; nothing is ever shared.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use db::{FunctionUnitAccess, Store, StoreTx};

use crate::transaction::finish;
use crate::version::VersionService;
use crate::EngineError;

#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn Store>,
    versions: VersionService,
}

impl PermissionService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { versions: VersionService::new(Arc::clone(&store)), store }
    }

    /// Copy every rule of `source_version_id` onto `target_version_id`.
    ///
    /// Returns the number of copied rules, which may be zero.
    #[instrument(skip(self))]
    pub async fn copy_permissions(
        &self,
        source_version_id: Uuid,
        target_version_id: Uuid,
    ) -> Result<usize, EngineError> {
        let mut tx = self.store.begin().await?;
        let result = self.copy_in(tx.as_mut(), source_version_id, target_version_id).await;
        finish(tx, result).await
    }

    pub async fn get_permissions(
        &self,
        version_id: Uuid,
    ) -> Result<Vec<FunctionUnitAccess>, EngineError> {
        let mut tx = self.store.begin().await?;
        let result = self.permissions_in(tx.as_mut(), version_id).await;
        finish(tx, result).await
    }

    /// Replace the rules of the active version `version_id` with `rules`.
    ///
    /// The stored rules get fresh ids and are owned by `version_id`
    /// whatever version the input rules referenced.
    ///
    /// # Errors
    /// [`EngineError::State`] if `version_id` is not the active version;
    /// nothing is written in that case.
    #[instrument(skip(self, rules), fields(rules = rules.len()))]
    pub async fn update_permissions(
        &self,
        version_id: Uuid,
        rules: Vec<FunctionUnitAccess>,
    ) -> Result<Vec<FunctionUnitAccess>, EngineError> {
        let mut tx = self.store.begin().await?;
        let result = self.replace_in(tx.as_mut(), version_id, rules).await;
        finish(tx, result).await
    }

    pub(crate) async fn copy_in(
        &self,
        tx: &mut dyn StoreTx,
        source_version_id: Uuid,
        target_version_id: Uuid,
    ) -> Result<usize, EngineError> {
        let source = self.versions.version_in(tx, source_version_id).await?;
        let target = self.versions.version_in(tx, target_version_id).await?;

        let rules = tx.list_access(source.id).await?;
        for rule in &rules {
            tx.insert_access(&rule.copy_to(target.id)).await?;
        }

        info!(
            "copied {} access rules from {} {} to {}",
            rules.len(), source.name, source.version, target.version
        );
        Ok(rules.len())
    }

    async fn permissions_in(
        &self,
        tx: &mut dyn StoreTx,
        version_id: Uuid,
    ) -> Result<Vec<FunctionUnitAccess>, EngineError> {
        let version = self.versions.version_in(tx, version_id).await?;
        Ok(tx.list_access(version.id).await?)
    }

    async fn replace_in(
        &self,
        tx: &mut dyn StoreTx,
        version_id: Uuid,
        rules: Vec<FunctionUnitAccess>,
    ) -> Result<Vec<FunctionUnitAccess>, EngineError> {
        // The active flag is only stable while the unit's versions are locked.
        let unlocked = self.versions.version_in(tx, version_id).await?;
        tx.lock_versions(&unlocked.name).await?;
        let version = self.versions.version_in(tx, version_id).await?;
        if !version.is_active {
            return Err(EngineError::State(format!(
                "cannot update permissions of an inactive version ({} {})",
                version.name, version.version
            )));
        }

        let removed = tx.delete_access_by_version(version.id).await?;

        let mut stored = Vec::with_capacity(rules.len());
        for rule in &rules {
            let owned = rule.copy_to(version.id);
            tx.insert_access(&owned).await?;
            stored.push(owned);
        }

        info!(
            "replaced {} access rules of {} {} with {}",
            removed, version.name, version.version, stored.len()
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::{FunctionUnitVersion, MemoryStore};
    use serde_json::json;

    fn seed(store: &MemoryStore, version: &str, active: bool) -> FunctionUnitVersion {
        let mut row = FunctionUnitVersion::new("expense-approval", version, None, json!({}));
        row.is_active = active;
        store.seed_version(row.clone());
        row
    }

    fn rule(version: &FunctionUnitVersion, target_id: &str) -> FunctionUnitAccess {
        FunctionUnitAccess::new(version.id, "role", "role", target_id)
    }

    #[tokio::test]
    async fn copy_creates_new_rows_owned_by_target() {
        let store = MemoryStore::new();
        let permissions = PermissionService::new(Arc::new(store.clone()));
        let v1 = seed(&store, "1.0.0", true);
        let v2 = seed(&store, "1.1.0", false);
        store.seed_access(rule(&v1, "finance"));
        store.seed_access(rule(&v1, "managers"));

        assert_eq!(permissions.copy_permissions(v1.id, v2.id).await.unwrap(), 2);

        let source = permissions.get_permissions(v1.id).await.unwrap();
        let copied = permissions.get_permissions(v2.id).await.unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(copied.len(), 2);
        assert!(copied.iter().all(|r| r.function_unit_version_id == v2.id));
        assert!(copied.iter().all(|c| source.iter().all(|s| s.id != c.id)));
    }

    #[tokio::test]
    async fn copy_of_empty_rule_set_returns_zero() {
        let store = MemoryStore::new();
        let permissions = PermissionService::new(Arc::new(store.clone()));
        let v1 = seed(&store, "1.0.0", true);
        let v2 = seed(&store, "1.1.0", false);

        assert_eq!(permissions.copy_permissions(v1.id, v2.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn copy_with_unknown_version_is_not_found() {
        let store = MemoryStore::new();
        let permissions = PermissionService::new(Arc::new(store.clone()));
        let v1 = seed(&store, "1.0.0", true);

        assert!(matches!(
            permissions.copy_permissions(v1.id, Uuid::new_v4()).await,
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            permissions.copy_permissions(Uuid::new_v4(), v1.id).await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn update_replaces_rules_of_active_version() {
        let store = MemoryStore::new();
        let permissions = PermissionService::new(Arc::new(store.clone()));
        let active = seed(&store, "1.0.0", true);
        let other = seed(&store, "0.9.0", false);
        store.seed_access(rule(&active, "old-role"));

        // Input rules pointing at another version are rewritten to the target.
        let stored = permissions
            .update_permissions(active.id, vec![rule(&other, "approvers"), rule(&other, "auditors")])
            .await
            .unwrap();

        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.function_unit_version_id == active.id));
        let targets: Vec<_> = permissions
            .get_permissions(active.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.target_id)
            .collect();
        assert!(targets.contains(&"approvers".to_string()));
        assert!(!targets.contains(&"old-role".to_string()));
        assert!(permissions.get_permissions(other.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_of_inactive_version_is_a_state_error_without_writes() {
        let store = MemoryStore::new();
        let permissions = PermissionService::new(Arc::new(store.clone()));
        seed(&store, "2.0.0", true);
        let inactive = seed(&store, "1.0.0", false);
        store.seed_access(rule(&inactive, "kept"));

        let err = permissions
            .update_permissions(inactive.id, vec![rule(&inactive, "new")])
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::State(ref m) if m.contains("inactive version")));
        let rules = permissions.get_permissions(inactive.id).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].target_id, "kept");
    }

    #[tokio::test]
    async fn rules_are_isolated_per_version() {
        let store = MemoryStore::new();
        let permissions = PermissionService::new(Arc::new(store.clone()));
        let versions: Vec<_> = ["1.0.0", "1.1.0", "1.2.0"]
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let row = seed(&store, v, i == 2);
                for n in 0..=i {
                    store.seed_access(rule(&row, &format!("role-{n}")));
                }
                row
            })
            .collect();

        for (i, version) in versions.iter().enumerate() {
            let rules = permissions.get_permissions(version.id).await.unwrap();
            assert_eq!(rules.len(), i + 1);
            assert!(rules.iter().all(|r| r.function_unit_version_id == version.id));
        }
    }
}
