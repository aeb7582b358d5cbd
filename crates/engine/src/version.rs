//! Version bookkeeping for function units.
//!
//! `VersionService` owns the single-active-version invariant: after
//! [`VersionService::activate_version`] returns, exactly one version of the
//! function unit is active and it is the requested one.

use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use db::{FunctionUnitVersion, Store, StoreTx};

use crate::semver::{ChangeType, SemanticVersion};
use crate::transaction::finish;
use crate::EngineError;

#[derive(Clone)]
pub struct VersionService {
    store: Arc<dyn Store>,
}

impl VersionService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Fetch a version by id.
    pub async fn get_version(&self, id: Uuid) -> Result<FunctionUnitVersion, EngineError> {
        let mut tx = self.store.begin().await?;
        let result = self.version_in(tx.as_mut(), id).await;
        finish(tx, result).await
    }

    /// The unique active version of `name`.
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if no version of `name` is active.
    pub async fn get_active_version(&self, name: &str) -> Result<FunctionUnitVersion, EngineError> {
        let mut tx = self.store.begin().await?;
        let result = self.active_version_in(tx.as_mut(), name).await;
        finish(tx, result).await
    }

    /// Lookup for callers that do not name a version: the active one.
    pub async fn get_function_unit(&self, name: &str) -> Result<FunctionUnitVersion, EngineError> {
        self.get_active_version(name).await
    }

    /// All versions of `name`, highest semantic version first.
    pub async fn get_version_history(
        &self,
        name: &str,
    ) -> Result<Vec<FunctionUnitVersion>, EngineError> {
        let mut tx = self.store.begin().await?;
        let result = self.history_in(tx.as_mut(), name).await;
        finish(tx, result).await
    }

    pub async fn version_exists(&self, name: &str, version: &str) -> Result<bool, EngineError> {
        let mut tx = self.store.begin().await?;
        let result = tx.version_exists(name, version).await.map_err(EngineError::from);
        finish(tx, result).await
    }

    /// The version the next deployment of `name` will get.
    ///
    /// `change_type` must be exactly `major`, `minor` or `patch`; it is
    /// checked before any lookup.  The first version of a unit is always
    /// `1.0.0`.
    pub async fn generate_next_version(
        &self,
        name: &str,
        change_type: &str,
    ) -> Result<String, EngineError> {
        let change: ChangeType = change_type.parse()?;
        let mut tx = self.store.begin().await?;
        let result = self.next_version_in(tx.as_mut(), name, change).await;
        finish(tx, result).await
    }

    /// Make `id` the only active version of its function unit.
    ///
    /// Every active row of the unit is deactivated first, so a store that
    /// was left with several active rows is repaired.  Activating the
    /// already-active version runs the same cycle.
    #[instrument(skip(self))]
    pub async fn activate_version(&self, id: Uuid) -> Result<FunctionUnitVersion, EngineError> {
        let mut tx = self.store.begin().await?;
        let result = self.activate_in(tx.as_mut(), id).await;
        finish(tx, result).await
    }

    // -----------------------------------------------------------------------
    // Transaction-scoped building blocks, shared with the other services.
    // -----------------------------------------------------------------------

    pub(crate) async fn version_in(
        &self,
        tx: &mut dyn StoreTx,
        id: Uuid,
    ) -> Result<FunctionUnitVersion, EngineError> {
        tx.find_version(id)
            .await?
            .ok_or_else(|| EngineError::version_not_found(id))
    }

    pub(crate) async fn active_version_in(
        &self,
        tx: &mut dyn StoreTx,
        name: &str,
    ) -> Result<FunctionUnitVersion, EngineError> {
        tx.find_active_version(name)
            .await?
            .ok_or_else(|| EngineError::no_active_version(name))
    }

    /// History paired with parsed versions, highest first.
    pub(crate) async fn sorted_history_in(
        &self,
        tx: &mut dyn StoreTx,
        name: &str,
    ) -> Result<Vec<(SemanticVersion, FunctionUnitVersion)>, EngineError> {
        let mut history = tx
            .list_versions(name)
            .await?
            .into_iter()
            .map(|v| Ok((SemanticVersion::parse(&v.version)?, v)))
            .collect::<Result<Vec<_>, EngineError>>()?;

        history.sort_by(|(a, _), (b, _)| b.cmp(a));
        Ok(history)
    }

    pub(crate) async fn history_in(
        &self,
        tx: &mut dyn StoreTx,
        name: &str,
    ) -> Result<Vec<FunctionUnitVersion>, EngineError> {
        let history = self.sorted_history_in(tx, name).await?;
        Ok(history.into_iter().map(|(_, v)| v).collect())
    }

    pub(crate) async fn next_version_in(
        &self,
        tx: &mut dyn StoreTx,
        name: &str,
        change: ChangeType,
    ) -> Result<String, EngineError> {
        let history = self.sorted_history_in(tx, name).await?;

        let next = match history.first() {
            None => SemanticVersion::INITIAL,
            Some((highest, _)) => highest.increment(change)?,
        };

        debug!("next {} version of '{}' is {}", change, name, next);
        Ok(next.to_string())
    }

    pub(crate) async fn activate_in(
        &self,
        tx: &mut dyn StoreTx,
        id: Uuid,
    ) -> Result<FunctionUnitVersion, EngineError> {
        let target = self.version_in(tx, id).await?;

        tx.lock_versions(&target.name).await?;

        for active in tx
            .list_versions(&target.name)
            .await?
            .into_iter()
            .filter(|v| v.is_active)
        {
            debug!("deactivating {} {}", active.name, active.version);
            tx.set_version_active(active.id, false).await?;
        }

        tx.set_version_active(target.id, true).await?;

        info!("activated version {} of '{}'", target.version, target.name);
        Ok(FunctionUnitVersion { is_active: true, ..target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::MemoryStore;
    use serde_json::json;

    use crate::error::ValidationError;

    fn service() -> (MemoryStore, VersionService) {
        let store = MemoryStore::new();
        (store.clone(), VersionService::new(Arc::new(store)))
    }

    fn seed(store: &MemoryStore, name: &str, version: &str, active: bool) -> FunctionUnitVersion {
        let mut row = FunctionUnitVersion::new(name, version, None, json!({}));
        row.is_active = active;
        store.seed_version(row.clone());
        row
    }

    #[tokio::test]
    async fn first_version_is_1_0_0_for_every_change_type() {
        let (_, versions) = service();
        for change in ["major", "minor", "patch"] {
            assert_eq!(versions.generate_next_version("fresh", change).await.unwrap(), "1.0.0");
        }
    }

    #[tokio::test]
    async fn next_version_increments_the_highest_not_the_latest() {
        let (store, versions) = service();
        seed(&store, "expense-approval", "1.10.0", false);
        seed(&store, "expense-approval", "1.9.0", true);
        seed(&store, "expense-approval", "1.2.7", false);

        assert_eq!(versions.generate_next_version("expense-approval", "patch").await.unwrap(), "1.10.1");
        assert_eq!(versions.generate_next_version("expense-approval", "minor").await.unwrap(), "1.11.0");
        assert_eq!(versions.generate_next_version("expense-approval", "major").await.unwrap(), "2.0.0");
    }

    #[tokio::test]
    async fn invalid_change_type_fails_before_lookup() {
        let (store, versions) = service();
        // An unparsable stored version would fail the lookup; the change
        // type must be rejected first.
        seed(&store, "broken", "not-a-version", true);

        for change in ["", "Major", "hotfix"] {
            let err = versions.generate_next_version("broken", change).await.unwrap_err();
            assert!(matches!(err, EngineError::Validation(ValidationError::InvalidChangeType(_))));
        }
    }

    #[tokio::test]
    async fn history_is_semantically_descending() {
        let (store, versions) = service();
        for v in ["1.2.0", "1.10.0", "0.9.9", "2.0.0", "1.9.1"] {
            seed(&store, "leave-management", v, false);
        }
        seed(&store, "other-unit", "9.0.0", false);

        let history: Vec<String> = versions
            .get_version_history("leave-management")
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(history, vec!["2.0.0", "1.10.0", "1.9.1", "1.2.0", "0.9.9"]);
    }

    #[tokio::test]
    async fn active_version_lookup_and_alias() {
        let (store, versions) = service();
        seed(&store, "leave-management", "1.0.0", false);
        let active = seed(&store, "leave-management", "1.1.0", true);

        assert_eq!(versions.get_active_version("leave-management").await.unwrap().id, active.id);
        assert_eq!(versions.get_function_unit("leave-management").await.unwrap().id, active.id);
        assert!(matches!(
            versions.get_active_version("unknown").await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn version_exists_matches_exact_pair() {
        let (store, versions) = service();
        seed(&store, "leave-management", "1.0.0", true);
        assert!(versions.version_exists("leave-management", "1.0.0").await.unwrap());
        assert!(!versions.version_exists("leave-management", "1.0.1").await.unwrap());
        assert!(!versions.version_exists("other", "1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn activation_repairs_multiple_active_rows() {
        let (store, versions) = service();
        seed(&store, "purchase-approval", "1.0.0", true);
        seed(&store, "purchase-approval", "1.1.0", true);
        let target = seed(&store, "purchase-approval", "1.2.0", false);

        versions.activate_version(target.id).await.unwrap();

        let active: Vec<_> = versions
            .get_version_history("purchase-approval")
            .await
            .unwrap()
            .into_iter()
            .filter(|v| v.is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, target.id);
    }

    #[tokio::test]
    async fn activation_from_zero_active_rows_and_reactivation() {
        let (store, versions) = service();
        let target = seed(&store, "purchase-approval", "1.0.0", false);
        seed(&store, "purchase-approval", "2.0.0", false);

        let activated = versions.activate_version(target.id).await.unwrap();
        assert!(activated.is_active);

        // Already active: still exactly one active row afterwards.
        versions.activate_version(target.id).await.unwrap();
        let history = versions.get_version_history("purchase-approval").await.unwrap();
        assert_eq!(history.iter().filter(|v| v.is_active).count(), 1);
        assert_eq!(versions.get_active_version("purchase-approval").await.unwrap().id, target.id);
    }

    #[tokio::test]
    async fn next_version_past_u64_max_is_a_validation_error() {
        let (store, versions) = service();
        seed(&store, "u", "1.0.18446744073709551615", true);

        let err = versions.generate_next_version("u", "patch").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::VersionOverflow { ref version, .. })
                if version == "1.0.18446744073709551615"
        ));
        assert_eq!(versions.generate_next_version("u", "minor").await.unwrap(), "1.1.0");
    }

    #[tokio::test]
    async fn activating_unknown_id_is_not_found() {
        let (_, versions) = service();
        assert!(matches!(
            versions.activate_version(Uuid::new_v4()).await,
            Err(EngineError::NotFound { .. })
        ));
    }
}
