//! Application state traits for dependency injection
//!
//! Handlers are generic over a state trait so the same code serves the
//! production `AppState` and lightweight test states built on mocks.

use crate::config::Config;
use crate::dns::DnsVerifier;
use crate::provisioning::ProvisioningClient;
use crate::repository::DomainBindingRepository;
use crate::service::BindingService;

/// Trait for application state that provides the domain binding service.
pub trait HasDomainBindings: Clone + Send + Sync + 'static {
    /// The binding repository type
    type BindingRepo: DomainBindingRepository;
    /// The DNS verifier type
    type Dns: DnsVerifier;
    /// The provisioner client type
    type Provisioner: ProvisioningClient;

    /// Get the application configuration
    fn config(&self) -> &Config;

    /// Get the binding service
    fn binding_service(
        &self,
    ) -> &BindingService<Self::BindingRepo, Self::Dns, Self::Provisioner>;

    /// Check whether the backing store is reachable
    fn check_ready(&self) -> impl std::future::Future<Output = bool> + Send;
}
