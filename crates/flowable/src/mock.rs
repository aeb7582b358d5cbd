//! `MockEngineClient`: a test double for `WorkflowEngineClient`.
//!
//! Useful in unit and integration tests where a running Flowable instance is
//! either unavailable or irrelevant.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{ClientError, ProcessDeployment, WorkflowEngineClient};

/// Behaviour injected into `MockEngineClient` at construction time.
pub enum MockBehaviour {
    /// Accept every deployment.
    Accept,
    /// Answer without a deployment (`Ok(None)`).
    ReturnNothing,
    /// Fail with a `ClientError`.
    Fail(String),
    /// Sleep before accepting; pairs with a caller-side timeout.
    Stall(Duration),
}

/// One recorded `deploy_process` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployCall {
    pub key: String,
    pub display_name: String,
    pub bpmn_xml: String,
}

/// A mock engine that records every call it receives and answers with a
/// programmer-specified result.
pub struct MockEngineClient {
    /// What `deploy_process` will do.
    pub behaviour: MockBehaviour,
    /// Answer of `is_available`.
    pub available: bool,
    /// All `deploy_process` calls, in call order.
    pub deploy_calls: Arc<Mutex<Vec<DeployCall>>>,
    /// All `delete_process_definition` calls as `(deployment_id, cascade)`.
    pub delete_calls: Arc<Mutex<Vec<(String, bool)>>>,
}

impl MockEngineClient {
    fn with(behaviour: MockBehaviour, available: bool) -> Self {
        Self {
            behaviour,
            available,
            deploy_calls: Arc::new(Mutex::new(Vec::new())),
            delete_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that accepts every deployment.
    pub fn accepting() -> Self {
        Self::with(MockBehaviour::Accept, true)
    }

    /// Create a mock whose deployments yield no result.
    pub fn returning_nothing() -> Self {
        Self::with(MockBehaviour::ReturnNothing, false)
    }

    /// Create a mock whose deployments fail with a client error.
    pub fn failing(msg: impl Into<String>) -> Self {
        Self::with(MockBehaviour::Fail(msg.into()), false)
    }

    /// Create a mock that takes `delay` to accept a deployment.
    pub fn stalling(delay: Duration) -> Self {
        Self::with(MockBehaviour::Stall(delay), true)
    }

    /// Number of `deploy_process` calls received.
    pub fn deploy_count(&self) -> usize {
        self.deploy_calls.lock().unwrap().len()
    }

    pub fn deployed_keys(&self) -> Vec<String> {
        self.deploy_calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.key.clone())
            .collect()
    }

    /// Deployment ids passed to `delete_process_definition`.
    pub fn deleted_deployments(&self) -> Vec<String> {
        self.delete_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn accept(&self, key: &str, n: usize) -> ProcessDeployment {
        ProcessDeployment {
            process_definition_id: format!("{key}:1:{n}"),
            deployment_id: format!("deployment-{n}"),
        }
    }
}

#[async_trait]
impl WorkflowEngineClient for MockEngineClient {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn deploy_process(
        &self,
        key: &str,
        bpmn_xml: &str,
        display_name: &str,
    ) -> Result<Option<ProcessDeployment>, ClientError> {
        let n = {
            let mut calls = self.deploy_calls.lock().unwrap();
            calls.push(DeployCall {
                key: key.to_owned(),
                display_name: display_name.to_owned(),
                bpmn_xml: bpmn_xml.to_owned(),
            });
            calls.len()
        };

        match &self.behaviour {
            MockBehaviour::Accept => {
                // A real engine call suspends; let concurrent callers interleave.
                tokio::task::yield_now().await;
                Ok(Some(self.accept(key, n)))
            }
            MockBehaviour::ReturnNothing => Ok(None),
            MockBehaviour::Fail(msg) => Err(ClientError::Mock(msg.clone())),
            MockBehaviour::Stall(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Some(self.accept(key, n)))
            }
        }
    }

    async fn delete_process_definition(
        &self,
        deployment_id: &str,
        cascade: bool,
    ) -> Result<bool, ClientError> {
        self.delete_calls
            .lock()
            .unwrap()
            .push((deployment_id.to_owned(), cascade));
        Ok(true)
    }
}
