//! HTTP client for the Flowable REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{ClientError, ProcessDeployment, WorkflowEngineClient};

/// Connection settings for a Flowable REST endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowableConfig {
    /// e.g. `http://localhost:8080/flowable-rest`
    pub base_url: String,

    pub username: String,

    pub password: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for FlowableConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/flowable-rest".to_string(),
            username: "rest-admin".to_string(),
            password: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
struct DeploymentResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ProcessDefinitionResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DataResponse<T> {
    data: Vec<T>,
}

pub struct FlowableRestClient {
    http: reqwest::Client,
    config: FlowableConfig,
}

impl FlowableRestClient {
    pub fn new(config: FlowableConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/service/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(self.url(path))
            .basic_auth(&self.config.username, Some(&self.config.password))
    }

    async fn api_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ClientError::Api { status, body }
    }

    /// First process definition produced by `deployment_id`.
    async fn process_definition_of(
        &self,
        deployment_id: &str,
    ) -> Result<Option<String>, ClientError> {
        let response = self
            .get("repository/process-definitions")
            .query(&[("deploymentId", deployment_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let definitions: DataResponse<ProcessDefinitionResponse> = response.json().await?;
        Ok(definitions.data.into_iter().next().map(|d| d.id))
    }

    /// Best-effort removal of a deployment that is not handed to the caller.
    async fn discard_deployment(&self, deployment_id: &str) {
        match self.delete_process_definition(deployment_id, true).await {
            Ok(_) => debug!("Removed unusable Flowable deployment {}", deployment_id),
            Err(e) => warn!(
                "Could not remove unusable Flowable deployment {}: {}",
                deployment_id, e
            ),
        }
    }
}

#[async_trait]
impl WorkflowEngineClient for FlowableRestClient {
    async fn is_available(&self) -> bool {
        match self.get("management/engine").send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Flowable health check failed: {}", e);
                false
            }
        }
    }

    async fn deploy_process(
        &self,
        key: &str,
        bpmn_xml: &str,
        display_name: &str,
    ) -> Result<Option<ProcessDeployment>, ClientError> {
        let resource = multipart::Part::bytes(bpmn_xml.as_bytes().to_vec())
            .file_name(format!("{key}.bpmn20.xml"))
            .mime_str("text/xml")?;

        let form = multipart::Form::new()
            .text("deploymentKey", key.to_owned())
            .text("deploymentName", display_name.to_owned())
            .part("file", resource);

        let response = self
            .http
            .post(self.url("repository/deployments"))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Flowable rejected deployment of '{}' ({}): {}", key, status, body);
            return Ok(None);
        }

        let deployment: DeploymentResponse = response.json().await?;

        let process_definition_id = match self.process_definition_of(&deployment.id).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(
                    "Flowable deployment {} of '{}' produced no process definition",
                    deployment.id, key
                );
                self.discard_deployment(&deployment.id).await;
                return Ok(None);
            }
            Err(e) => {
                self.discard_deployment(&deployment.id).await;
                return Err(e);
            }
        };

        info!(
            "Deployed '{}' to Flowable (deployment={}, definition={})",
            key, deployment.id, process_definition_id
        );

        Ok(Some(ProcessDeployment {
            process_definition_id,
            deployment_id: deployment.id,
        }))
    }

    async fn delete_process_definition(
        &self,
        deployment_id: &str,
        cascade: bool,
    ) -> Result<bool, ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("repository/deployments/{deployment_id}")))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .query(&[("cascade", cascade)])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::api_error(response).await),
        }
    }
}
