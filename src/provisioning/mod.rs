//! Certificate/routing provisioner API client
//!
//! The provisioner is an external collaborator that issues the certificate
//! and registers edge routing for an activated domain. Its failures are
//! classified as retryable or terminal; the orchestrator decides what that
//! means for the binding's state.

use crate::config::ProvisioningConfig;
use crate::domain::StringUuid;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of a provisioning (or teardown) call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningOutcome {
    /// The downstream side effect completed
    Completed,
    /// Transient downstream failure; the same call may succeed later
    Retryable(String),
    /// The provisioner rejected the domain; retrying cannot help
    Terminal(String),
}

impl ProvisioningOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ProvisioningOutcome::Completed)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Issue a certificate and register routing for the domain.
    /// Network-level failures are folded into `Retryable`.
    async fn provision(&self, tenant_id: StringUuid, domain_name: &str) -> ProvisioningOutcome;

    /// Tear down certificate and routing for a previously provisioned domain
    async fn teardown(&self, tenant_id: StringUuid, domain_name: &str) -> ProvisioningOutcome;
}

#[derive(Debug, Serialize)]
struct ProvisionRequest<'a> {
    tenant_id: StringUuid,
    domain_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProvisionerError {
    message: String,
}

/// HTTP client for the provisioner API
#[derive(Clone)]
pub struct HttpProvisioningClient {
    base_url: String,
    http_client: Client,
    api_token: Option<String>,
}

impl HttpProvisioningClient {
    pub fn new(config: &ProvisioningConfig) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build provisioner HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client,
            api_token: config.api_token.clone(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn classify(response: reqwest::Response) -> ProvisioningOutcome {
        let status = response.status();
        if status.is_success() {
            return ProvisioningOutcome::Completed;
        }

        let message = match response.text().await {
            Ok(body) => serde_json::from_str::<ProvisionerError>(&body)
                .map(|e| e.message)
                .unwrap_or(body),
            Err(e) => format!("unreadable response body: {}", e),
        };
        let message = format!("provisioner returned {}: {}", status, message);

        // Overload and server-side faults are worth retrying; any other
        // client error is a verdict on the request itself.
        if status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
        {
            ProvisioningOutcome::Retryable(message)
        } else {
            ProvisioningOutcome::Terminal(message)
        }
    }
}

#[async_trait]
impl ProvisioningClient for HttpProvisioningClient {
    async fn provision(&self, tenant_id: StringUuid, domain_name: &str) -> ProvisioningOutcome {
        let url = format!("{}/v1/domains", self.base_url);
        let request = self.authorize(self.http_client.post(&url)).json(&ProvisionRequest {
            tenant_id,
            domain_name,
        });

        info!(%tenant_id, domain = %domain_name, "requesting provisioning");
        match request.send().await {
            Ok(response) => Self::classify(response).await,
            Err(e) => {
                warn!(%tenant_id, domain = %domain_name, error = %e, "provisioner unreachable");
                ProvisioningOutcome::Retryable(format!("provisioner unreachable: {}", e))
            }
        }
    }

    async fn teardown(&self, tenant_id: StringUuid, domain_name: &str) -> ProvisioningOutcome {
        let url = format!("{}/v1/domains/{}", self.base_url, domain_name);
        let request = self
            .authorize(self.http_client.delete(&url))
            .query(&[("tenant_id", tenant_id.to_string())]);

        info!(%tenant_id, domain = %domain_name, "requesting teardown");
        match request.send().await {
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                // Nothing to tear down is success for teardown
                ProvisioningOutcome::Completed
            }
            Ok(response) => Self::classify(response).await,
            Err(e) => {
                warn!(%tenant_id, domain = %domain_name, error = %e, "provisioner unreachable");
                ProvisioningOutcome::Retryable(format!("provisioner unreachable: {}", e))
            }
        }
    }
}
