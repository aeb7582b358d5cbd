//! The `WorkflowEngineClient` trait is what the deployment engine needs from
//! the external workflow engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ClientError;

/// Identifiers the engine assigns to an accepted deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDeployment {
    pub process_definition_id: String,
    pub deployment_id: String,
}

/// Stateless client, safe to share across tasks.
#[async_trait]
pub trait WorkflowEngineClient: Send + Sync {
    /// Cheap health check.
    async fn is_available(&self) -> bool;

    /// Deploy `bpmn_xml` under the process-definition `key`.
    ///
    /// `Ok(None)` means the engine produced no deployment.
    async fn deploy_process(
        &self,
        key: &str,
        bpmn_xml: &str,
        display_name: &str,
    ) -> Result<Option<ProcessDeployment>, ClientError>;

    /// Remove a deployment; with `cascade` its running instances go too.
    /// Returns `false` when the engine did not know the deployment.
    async fn delete_process_definition(
        &self,
        deployment_id: &str,
        cascade: bool,
    ) -> Result<bool, ClientError>;
}
