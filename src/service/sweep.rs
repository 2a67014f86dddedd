//! Background verification sweep
//!
//! Re-checks pending bindings on an interval so tenants who fix their DNS
//! records after closing the dashboard still get activated. Each binding
//! goes through the same verification entry point as the interactive
//! endpoints, so the sweep inherits their concurrency guarantees.

use crate::config::SweepConfig;
use crate::dns::DnsVerifier;
use crate::provisioning::ProvisioningClient;
use crate::repository::DomainBindingRepository;
use crate::service::BindingService;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct VerificationSweep<R, D, P>
where
    R: DomainBindingRepository,
    D: DnsVerifier,
    P: ProvisioningClient,
{
    service: Arc<BindingService<R, D, P>>,
    repo: Arc<R>,
    config: SweepConfig,
}

impl<R, D, P> VerificationSweep<R, D, P>
where
    R: DomainBindingRepository,
    D: DnsVerifier,
    P: ProvisioningClient,
{
    pub fn new(service: Arc<BindingService<R, D, P>>, repo: Arc<R>, config: SweepConfig) -> Self {
        Self {
            service,
            repo,
            config,
        }
    }

    /// Run the sweep loop forever. Intended to be spawned as a task.
    pub async fn run(self) {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup is quiet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let checked = self.sweep_once().await;
            debug!(checked, "verification sweep finished");
        }
    }

    /// One pass over pending bindings that have not been checked recently.
    /// Returns the number of bindings examined.
    pub async fn sweep_once(&self) -> usize {
        let checked_before = Utc::now() - Duration::seconds(self.config.min_recheck_secs);

        let bindings = match self
            .repo
            .list_pending(checked_before, self.config.batch_size)
            .await
        {
            Ok(bindings) => bindings,
            Err(e) => {
                warn!(error = %e, "sweep could not list pending bindings");
                return 0;
            }
        };

        let total = bindings.len();
        for binding in bindings {
            if let Err(e) = self.service.verify(binding.tenant_id).await {
                // One sour binding must not starve the rest of the batch
                warn!(
                    tenant_id = %binding.tenant_id,
                    domain = %binding.domain_name,
                    error = %e,
                    "sweep verification attempt failed"
                );
            }
        }
        total
    }
}
