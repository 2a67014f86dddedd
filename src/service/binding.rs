//! Domain binding orchestration
//!
//! Owns the binding lifecycle: token issuance, DNS-driven verification,
//! the provisioning side effect, and teardown on removal. Verification for
//! one tenant is serialized behind a per-tenant async lock, with the
//! conditional repository writes as the cross-process backstop, so two
//! racing verify calls can never both invoke provisioning.

use crate::config::DnsConfig;
use crate::dns::DnsVerifier;
use crate::domain::{
    is_valid_domain_name, normalize_domain_name, BindingStatus, BindingStatusResponse,
    DnsInstructions, DnsStatus, DomainBinding, RequestBindingInput, RequestBindingResponse,
    StringUuid,
};
use crate::error::{AppError, Result};
use crate::provisioning::{ProvisioningClient, ProvisioningOutcome};
use crate::repository::DomainBindingRepository;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// Service for managing custom domain bindings
pub struct BindingService<R, D, P>
where
    R: DomainBindingRepository,
    D: DnsVerifier,
    P: ProvisioningClient,
{
    repo: Arc<R>,
    dns: Arc<D>,
    provisioner: Arc<P>,
    dns_config: DnsConfig,
    /// Per-tenant verification locks; entries are few (one per tenant with
    /// an in-flight binding) and never need eviction correctness-wise.
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl<R, D, P> BindingService<R, D, P>
where
    R: DomainBindingRepository,
    D: DnsVerifier,
    P: ProvisioningClient,
{
    pub fn new(repo: Arc<R>, dns: Arc<D>, provisioner: Arc<P>, dns_config: DnsConfig) -> Self {
        Self {
            repo,
            dns,
            provisioner,
            dns_config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Request a binding for a vanity domain. The caller has already passed
    /// the plan-entitlement gate; this only enforces domain validity and
    /// uniqueness. Re-requesting the same domain re-issues the token.
    pub async fn request_binding(
        &self,
        tenant_id: StringUuid,
        input: RequestBindingInput,
    ) -> Result<RequestBindingResponse> {
        input.validate()?;

        let domain_name = normalize_domain_name(&input.domain_name);
        if !is_valid_domain_name(&domain_name) {
            return Err(AppError::Validation(format!(
                "{} is not a valid domain name",
                domain_name
            )));
        }

        if let Some(existing) = self.repo.find_by_tenant(tenant_id).await? {
            if existing.domain_name == domain_name {
                // Idempotent retry of the bind request: mint a fresh token
                return self.reissue_for(existing).await;
            }
            return Err(AppError::Conflict(format!(
                "Tenant already has {} bound; remove it before binding {}",
                existing.domain_name, domain_name
            )));
        }

        let (token, expires_at) = self.issue_token();
        // Uniqueness across tenants is enforced by the store; a racing
        // claim surfaces here as Conflict.
        let binding = self
            .repo
            .create(tenant_id, &domain_name, &token, expires_at)
            .await?;

        info!(%tenant_id, domain = %domain_name, expires_at = %expires_at, "domain binding requested");
        Ok(self.binding_requested_response(&binding, token))
    }

    /// Re-issue the verification token, returning the binding to pending
    /// from any state and invalidating the previous token.
    pub async fn reissue_token(&self, tenant_id: StringUuid) -> Result<RequestBindingResponse> {
        let binding = self
            .repo
            .find_by_tenant(tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No domain binding configured".to_string()))?;

        self.reissue_for(binding).await
    }

    /// Read-mostly status query. Pending bindings are verified live so a
    /// polling dashboard sees propagation progress; active bindings return
    /// the cached summary without touching DNS.
    pub async fn get_status(&self, tenant_id: StringUuid) -> Result<BindingStatusResponse> {
        let binding = match self.repo.find_by_tenant(tenant_id).await? {
            Some(binding) => binding,
            None => return Ok(BindingStatusResponse::none()),
        };

        match binding.status {
            BindingStatus::Pending => self.verify(tenant_id).await,
            _ => Ok(self.summary(&binding)),
        }
    }

    /// One verification attempt: the single entry point used by the status
    /// poll, the explicit "check now" action and the background sweep.
    /// Idempotent on non-pending bindings.
    pub async fn verify(&self, tenant_id: StringUuid) -> Result<BindingStatusResponse> {
        let lock = self.lock_for(tenant_id);
        let _guard = lock.lock().await;

        // Read under the lock: a concurrent attempt may have advanced the state
        let binding = self
            .repo
            .find_by_tenant(tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No domain binding configured".to_string()))?;

        match binding.status {
            BindingStatus::Pending => self.verify_pending(binding).await,
            // Active and failed bindings advance only by external
            // intervention (token re-issuance or removal)
            _ => Ok(self.summary(&binding)),
        }
    }

    /// Remove the binding, tearing down provisioning if it was active, and
    /// release the domain name claim.
    pub async fn remove_binding(&self, tenant_id: StringUuid) -> Result<()> {
        let lock = self.lock_for(tenant_id);
        let _guard = lock.lock().await;

        let binding = self
            .repo
            .find_by_tenant(tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No domain binding configured".to_string()))?;

        if binding.status == BindingStatus::Active {
            match self
                .provisioner
                .teardown(tenant_id, &binding.domain_name)
                .await
            {
                ProvisioningOutcome::Completed => {
                    info!(%tenant_id, domain = %binding.domain_name, "provisioning torn down");
                }
                ProvisioningOutcome::Retryable(msg) | ProvisioningOutcome::Terminal(msg) => {
                    // The uniqueness claim must still be released; the
                    // provisioner reconciles orphans from its own inventory
                    warn!(%tenant_id, domain = %binding.domain_name, error = %msg,
                        "teardown failed, removing binding anyway");
                }
            }
        }

        self.repo.delete(binding.id).await?;
        info!(%tenant_id, domain = %binding.domain_name, "domain binding removed");
        Ok(())
    }

    // ========================================================================
    // State machine internals
    // ========================================================================

    async fn verify_pending(&self, binding: DomainBinding) -> Result<BindingStatusResponse> {
        let tenant_id = binding.tenant_id;
        let now = Utc::now();

        // Expiry is evaluated before any DNS evidence: fail closed
        if binding.is_token_expired(now) {
            return self.fail_expired(&binding).await;
        }

        let token = binding.verification_token.clone().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "pending binding {} has no verification token",
                binding.id
            ))
        })?;

        let dns = self.dns.check(&binding.domain_name, &token).await;

        // The lookups took time; a token that expired mid-flight must not
        // activate even if both checks passed
        if binding.is_token_expired(Utc::now()) {
            return self.fail_expired(&binding).await;
        }

        if !dns.fully_verified() {
            let diagnostic = dns
                .error_summary()
                .map(|summary| AppError::DnsLookup(summary).to_string());
            let updated = self
                .repo
                .record_check(binding.id, diagnostic.as_deref())
                .await?;
            info!(
                %tenant_id,
                domain = %binding.domain_name,
                txt_verified = dns.txt_verified,
                routing_verified = dns.routing_verified,
                "verification incomplete, binding stays pending"
            );
            let mut response = self.summary(&updated);
            response.dns = Some(dns);
            return Ok(response);
        }

        // Both records verified within the token window: provision first,
        // commit active only on success
        match self
            .provisioner
            .provision(tenant_id, &binding.domain_name)
            .await
        {
            ProvisioningOutcome::Completed => {
                let won = self.repo.try_activate(binding.id).await?;
                if !won {
                    // A concurrent attempt (another process) committed first;
                    // observe the fresh state instead of re-applying
                    info!(%tenant_id, domain = %binding.domain_name,
                        "binding already activated by a concurrent attempt");
                } else {
                    info!(%tenant_id, domain = %binding.domain_name, "domain binding activated");
                }
                let mut response = self.current_summary(tenant_id).await?;
                response.dns = Some(dns);
                Ok(response)
            }
            ProvisioningOutcome::Retryable(message) => {
                self.record_provisioning_failure(
                    &binding,
                    dns,
                    AppError::Provisioning {
                        message,
                        terminal: false,
                    },
                )
                .await
            }
            ProvisioningOutcome::Terminal(message) => {
                self.record_provisioning_failure(
                    &binding,
                    dns,
                    AppError::Provisioning {
                        message,
                        terminal: true,
                    },
                )
                .await
            }
        }
    }

    /// Write back a provisioning failure: retryable errors hold the binding
    /// pending for another attempt, terminal errors fail it.
    async fn record_provisioning_failure(
        &self,
        binding: &DomainBinding,
        dns: DnsStatus,
        error: AppError,
    ) -> Result<BindingStatusResponse> {
        if error.is_retryable() {
            let diagnostic = format!("{}; will retry on the next verification", error);
            warn!(tenant_id = %binding.tenant_id, domain = %binding.domain_name, error = %error,
                "retryable provisioning failure, binding stays pending");
            let updated = self.repo.record_check(binding.id, Some(&diagnostic)).await?;
            let mut response = self.summary(&updated);
            response.dns = Some(dns);
            Ok(response)
        } else {
            let diagnostic = error.to_string();
            warn!(tenant_id = %binding.tenant_id, domain = %binding.domain_name, error = %error,
                "terminal provisioning failure, binding failed");
            let won = self.repo.mark_failed(binding.id, &diagnostic).await?;
            if !won {
                // Another process advanced the binding first; report its state
                let mut response = self.current_summary(binding.tenant_id).await?;
                response.dns = Some(dns);
                return Ok(response);
            }
            let mut response = self.summary(binding);
            response.status = BindingStatus::Failed;
            response.last_error = Some(diagnostic);
            response.dns_instructions = None;
            response.verification_expiry = None;
            response.dns = Some(dns);
            Ok(response)
        }
    }

    async fn fail_expired(&self, binding: &DomainBinding) -> Result<BindingStatusResponse> {
        let error = AppError::TokenExpired(match binding.verification_expiry {
            Some(expiry) => format!("expired at {}", expiry.to_rfc3339()),
            None => "no expiry recorded".to_string(),
        });
        let diagnostic = format!("{}; request a new token", error);
        warn!(tenant_id = %binding.tenant_id, domain = %binding.domain_name,
            "verification token expired, binding failed");
        let won = self.repo.mark_failed(binding.id, &diagnostic).await?;
        if !won {
            // Another process advanced the binding first (re-issued token or
            // activation); report its state instead of a stale failure
            return self.current_summary(binding.tenant_id).await;
        }

        let mut response = self.summary(binding);
        response.status = BindingStatus::Failed;
        response.last_error = Some(diagnostic);
        response.dns_instructions = None;
        response.verification_expiry = None;
        Ok(response)
    }

    async fn reissue_for(&self, binding: DomainBinding) -> Result<RequestBindingResponse> {
        let (token, expires_at) = self.issue_token();
        let updated = self
            .repo
            .reissue_token(binding.id, &token, expires_at)
            .await?;

        info!(
            tenant_id = %binding.tenant_id,
            domain = %binding.domain_name,
            expires_at = %expires_at,
            "verification token re-issued"
        );
        Ok(self.binding_requested_response(&updated, token))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Mint an ownership-proof token: 256 bits of entropy, hex-encoded so
    /// it is safe to publish as a TXT value.
    fn issue_token(&self) -> (String, DateTime<Utc>) {
        let mut token_bytes = [0u8; 32];
        rand::thread_rng().fill(&mut token_bytes);
        let expires_at = Utc::now() + Duration::hours(self.dns_config.token_ttl_hours);
        (hex::encode(token_bytes), expires_at)
    }

    fn instructions(&self, domain_name: &str, token: &str) -> DnsInstructions {
        DnsInstructions {
            txt_name: format!("{}.{}", self.dns_config.verification_label, domain_name),
            txt_value: token.to_string(),
            cname_target: self.dns_config.edge_host.clone(),
            a_values: self.dns_config.ingress_ips.clone(),
        }
    }

    fn binding_requested_response(
        &self,
        binding: &DomainBinding,
        token: String,
    ) -> RequestBindingResponse {
        let expiry = binding.verification_expiry.unwrap_or_else(Utc::now);
        RequestBindingResponse {
            domain_name: binding.domain_name.clone(),
            status: binding.status,
            dns_instructions: self.instructions(&binding.domain_name, &token),
            verification_token: token,
            verification_expiry: expiry,
        }
    }

    /// Re-read the binding and summarize whatever state it holds now. Used
    /// after losing a conditional write to another process.
    async fn current_summary(&self, tenant_id: StringUuid) -> Result<BindingStatusResponse> {
        let binding = self
            .repo
            .find_by_tenant(tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No domain binding configured".to_string()))?;
        Ok(self.summary(&binding))
    }

    fn summary(&self, binding: &DomainBinding) -> BindingStatusResponse {
        let dns_instructions = match (&binding.status, &binding.verification_token) {
            (BindingStatus::Pending, Some(token)) => {
                Some(self.instructions(&binding.domain_name, token))
            }
            _ => None,
        };

        BindingStatusResponse {
            status: binding.status,
            domain_name: Some(binding.domain_name.clone()),
            dns: None,
            dns_instructions,
            provisioned_at: binding.provisioned_at,
            last_checked_at: binding.last_checked_at,
            verification_expiry: match binding.status {
                BindingStatus::Pending => binding.verification_expiry,
                _ => None,
            },
            last_error: binding.last_error.clone(),
        }
    }

    fn lock_for(&self, tenant_id: StringUuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(tenant_id.0).or_default().clone()
    }
}
