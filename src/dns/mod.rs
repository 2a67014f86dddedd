//! DNS verification for custom domains
//!
//! Two independent checks per pass: an ownership TXT record at the
//! verification subdomain, and a routing record (CNAME to the platform edge
//! host or A record matching a published ingress IP). Resolver failures are
//! folded into the per-check result so a broken TXT lookup never hides the
//! routing record's state, and vice versa.

use crate::config::DnsConfig;
use crate::domain::{DnsStatus, RoutingKind};
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff before the single retry of a resolver-level failure
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DnsVerifier: Send + Sync {
    /// Run both checks against live DNS. Never fails outright: resolver
    /// errors are reported inside the returned status.
    async fn check(&self, domain_name: &str, expected_token: &str) -> DnsStatus;
}

/// `DnsVerifier` backed by hickory's Tokio resolver
pub struct HickoryDnsVerifier {
    resolver: TokioAsyncResolver,
    verification_label: String,
    edge_host: String,
    ingress_ips: Vec<Ipv4Addr>,
}

impl HickoryDnsVerifier {
    pub fn new(config: &DnsConfig) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(config.lookup_timeout_secs);
        // The retry-with-backoff policy lives here, not in the resolver
        opts.attempts = 1;

        let ingress_ips = config
            .ingress_ips
            .iter()
            .filter_map(|ip| match ip.parse::<Ipv4Addr>() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    warn!(ip = %ip, "Ignoring unparseable ingress IP in config");
                    None
                }
            })
            .collect();

        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), opts),
            verification_label: config.verification_label.clone(),
            edge_host: normalize_host(&config.edge_host),
            ingress_ips,
        }
    }

    /// Ownership check: any TXT value at the verification subdomain must
    /// equal the expected token. Multiple TXT records at the same name are
    /// tolerated.
    async fn check_ownership(&self, domain_name: &str, expected_token: &str) -> CheckReport {
        let mut report = CheckReport::default();
        let txt_name = format!("{}.{}", self.verification_label, domain_name);

        match self.lookup_txt_with_retry(&txt_name).await {
            Ok(values) => {
                if txt_matches(&values, expected_token) {
                    debug!(name = %txt_name, "ownership TXT record matched");
                    report.verified = true;
                } else if values.is_empty() {
                    report
                        .details
                        .push(format!("no TXT record found at {}", txt_name));
                } else {
                    report.details.push(format!(
                        "TXT record at {} does not match the verification token",
                        txt_name
                    ));
                }
            }
            Err(e) if is_no_records(&e) => {
                report
                    .details
                    .push(format!("no TXT record found at {}", txt_name));
            }
            Err(e) => {
                report
                    .errors
                    .push(format!("TXT lookup for {} failed: {}", txt_name, e));
            }
        }

        report
    }

    /// Routing check: a CNAME to the edge host or an A record equal to one
    /// of the published ingress IPs. Either satisfies routing.
    async fn check_routing(&self, domain_name: &str) -> CheckReport {
        let mut report = CheckReport::default();

        match self.lookup_cname_with_retry(domain_name).await {
            Ok(targets) => {
                for target in &targets {
                    if cname_matches(target, &self.edge_host) {
                        debug!(domain = %domain_name, target = %target, "routing CNAME matched");
                        report.verified = true;
                        report.routing_kind = Some(RoutingKind::Cname);
                        return report;
                    }
                }
                if !targets.is_empty() {
                    report.details.push(format!(
                        "CNAME for {} points at {}, expected {}",
                        domain_name,
                        targets.join(", "),
                        self.edge_host
                    ));
                }
            }
            Err(e) if is_no_records(&e) => {
                report
                    .details
                    .push(format!("no CNAME record found for {}", domain_name));
            }
            Err(e) => {
                report
                    .errors
                    .push(format!("CNAME lookup for {} failed: {}", domain_name, e));
            }
        }

        if self.ingress_ips.is_empty() {
            return report;
        }

        match self.lookup_ipv4_with_retry(domain_name).await {
            Ok(addrs) => {
                for addr in &addrs {
                    if self.ingress_ips.contains(addr) {
                        debug!(domain = %domain_name, ip = %addr, "routing A record matched");
                        report.verified = true;
                        report.routing_kind = Some(RoutingKind::A);
                        return report;
                    }
                }
                if !addrs.is_empty() {
                    report.details.push(format!(
                        "A record for {} resolves to {}, not a platform ingress IP",
                        domain_name,
                        addrs
                            .iter()
                            .map(|a| a.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
            }
            Err(e) if is_no_records(&e) => {
                report
                    .details
                    .push(format!("no A record found for {}", domain_name));
            }
            Err(e) => {
                report
                    .errors
                    .push(format!("A lookup for {} failed: {}", domain_name, e));
            }
        }

        report
    }

    async fn lookup_txt_with_retry(&self, name: &str) -> Result<Vec<String>, ResolveError> {
        let mut retried = false;
        loop {
            match self.lookup_txt(name).await {
                Err(e) if !retried && is_retryable(&e) => {
                    debug!(name = %name, error = %e, "retrying TXT lookup after backoff");
                    retried = true;
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                other => return other,
            }
        }
    }

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, ResolveError> {
        let lookup = self.resolver.txt_lookup(name.to_string()).await?;
        Ok(lookup
            .iter()
            .map(|txt| {
                // Multi-segment TXT values are concatenated per RFC 7208 §3.3
                txt.txt_data()
                    .iter()
                    .map(|segment| String::from_utf8_lossy(segment).into_owned())
                    .collect::<Vec<_>>()
                    .concat()
            })
            .collect())
    }

    async fn lookup_cname_with_retry(&self, name: &str) -> Result<Vec<String>, ResolveError> {
        let mut retried = false;
        loop {
            match self.lookup_cname(name).await {
                Err(e) if !retried && is_retryable(&e) => {
                    debug!(name = %name, error = %e, "retrying CNAME lookup after backoff");
                    retried = true;
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                other => return other,
            }
        }
    }

    async fn lookup_cname(&self, name: &str) -> Result<Vec<String>, ResolveError> {
        let lookup = self
            .resolver
            .lookup(name.to_string(), RecordType::CNAME)
            .await?;
        Ok(lookup
            .record_iter()
            .filter_map(|record| record.data().and_then(|d| d.as_cname()))
            .map(|cname| cname.to_string())
            .collect())
    }

    async fn lookup_ipv4_with_retry(&self, name: &str) -> Result<Vec<Ipv4Addr>, ResolveError> {
        let mut retried = false;
        loop {
            match self.lookup_ipv4(name).await {
                Err(e) if !retried && is_retryable(&e) => {
                    debug!(name = %name, error = %e, "retrying A lookup after backoff");
                    retried = true;
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                other => return other,
            }
        }
    }

    async fn lookup_ipv4(&self, name: &str) -> Result<Vec<Ipv4Addr>, ResolveError> {
        let lookup = self.resolver.ipv4_lookup(name.to_string()).await?;
        Ok(lookup.iter().map(|a| a.0).collect())
    }
}

#[async_trait]
impl DnsVerifier for HickoryDnsVerifier {
    async fn check(&self, domain_name: &str, expected_token: &str) -> DnsStatus {
        // The checks are independent: neither blocks or aborts the other
        let (ownership, routing) = tokio::join!(
            self.check_ownership(domain_name, expected_token),
            self.check_routing(domain_name)
        );

        let mut details = ownership.details;
        details.extend(routing.details);
        let mut errors = ownership.errors;
        errors.extend(routing.errors);

        DnsStatus {
            txt_verified: ownership.verified,
            routing_verified: routing.verified,
            routing_kind: routing.routing_kind,
            details,
            errors,
        }
    }
}

/// Accumulated outcome of a single check
#[derive(Debug, Default)]
struct CheckReport {
    verified: bool,
    routing_kind: Option<RoutingKind>,
    details: Vec<String>,
    errors: Vec<String>,
}

/// A definitive negative answer (NXDOMAIN / NODATA) is not a failure
fn is_no_records(error: &ResolveError) -> bool {
    matches!(error.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

/// Resolver-level failures worth one retry; definitive answers are not
fn is_retryable(error: &ResolveError) -> bool {
    !is_no_records(error)
}

/// Any one of the TXT values may match the token
fn txt_matches(values: &[String], expected_token: &str) -> bool {
    values.iter().any(|v| v.trim() == expected_token)
}

/// CNAME targets may carry an FQDN trailing dot and arbitrary case
fn cname_matches(target: &str, edge_host: &str) -> bool {
    normalize_host(target) == edge_host
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_lowercase()
}
