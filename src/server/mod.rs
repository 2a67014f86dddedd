//! Server initialization and routing

use crate::api;
use crate::config::Config;
use crate::dns::HickoryDnsVerifier;
use crate::provisioning::HttpProvisioningClient;
use crate::repository::binding::DomainBindingRepositoryImpl;
use crate::service::{BindingService, VerificationSweep};
use crate::state::HasDomainBindings;
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: MySqlPool,
    pub binding_service: Arc<
        BindingService<DomainBindingRepositoryImpl, HickoryDnsVerifier, HttpProvisioningClient>,
    >,
}

impl HasDomainBindings for AppState {
    type BindingRepo = DomainBindingRepositoryImpl;
    type Dns = HickoryDnsVerifier;
    type Provisioner = HttpProvisioningClient;

    fn config(&self) -> &Config {
        &self.config
    }

    fn binding_service(
        &self,
    ) -> &BindingService<Self::BindingRepo, Self::Dns, Self::Provisioner> {
        &self.binding_service
    }

    async fn check_ready(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.db_pool).await.is_ok()
    }
}

/// Run the server
pub async fn run(config: Config) -> Result<()> {
    crate::migration::run_migrations(&config).await?;

    let db_pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    info!("Connected to database");

    let binding_repo = Arc::new(DomainBindingRepositoryImpl::new(db_pool.clone()));
    let dns_verifier = Arc::new(HickoryDnsVerifier::new(&config.dns));
    let provisioner = Arc::new(HttpProvisioningClient::new(&config.provisioning)?);

    let binding_service = Arc::new(BindingService::new(
        Arc::clone(&binding_repo),
        dns_verifier,
        provisioner,
        config.dns.clone(),
    ));

    if config.sweep.interval_secs > 0 {
        let sweep = VerificationSweep::new(
            Arc::clone(&binding_service),
            binding_repo,
            config.sweep.clone(),
        );
        tokio::spawn(sweep.run());
        info!(
            interval_secs = config.sweep.interval_secs,
            "background verification sweep enabled"
        );
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        db_pool,
        binding_service,
    };

    let app = build_router(state);

    let http_addr = config.http_addr();
    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the HTTP router with generic state type
///
/// Generic over the state so the same routes can be mounted on the
/// production `AppState` or a test state built on mocks.
pub fn build_router<S: HasDomainBindings>(state: S) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/health", get(api::health::health))
        .route("/ready", get(api::health::ready::<S>))
        // Domain binding endpoints
        .route(
            "/api/v1/tenants/{tenant_id}/domain",
            post(api::binding::request::<S>)
                .get(api::binding::status::<S>)
                .delete(api::binding::remove::<S>),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/domain/verify",
            post(api::binding::verify::<S>),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/domain/token",
            post(api::binding::reissue::<S>),
        )
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors)
        .with_state(state)
}
