//! Configuration management for the domains service

use anyhow::{Context, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Database configuration
    pub database: DatabaseConfig,
    /// DNS verification configuration
    pub dns: DnsConfig,
    /// Certificate/routing provisioner configuration
    pub provisioning: ProvisioningConfig,
    /// Background verification sweep configuration
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// DNS verification settings
#[derive(Debug, Clone)]
pub struct DnsConfig {
    /// Subdomain label the tenant publishes the ownership TXT record under
    /// (e.g. `_waveorder-verify` -> `_waveorder-verify.shop.example.com`)
    pub verification_label: String,
    /// CNAME target that satisfies the routing check (the platform edge host)
    pub edge_host: String,
    /// Published ingress IPs; an A record matching any of them satisfies routing
    pub ingress_ips: Vec<String>,
    /// Per-lookup timeout in seconds
    pub lookup_timeout_secs: u64,
    /// Verification token lifetime in hours (24-72)
    pub token_ttl_hours: i64,
}

/// Downstream certificate/routing provisioner API
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    /// Base URL of the provisioner API (e.g. http://provisioner:9100)
    pub base_url: String,
    /// Bearer token for the provisioner API, if required
    pub api_token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Periodic sweep over pending bindings
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Sweep interval in seconds; 0 disables the sweep
    pub interval_secs: u64,
    /// Skip bindings checked more recently than this many seconds ago
    pub min_recheck_secs: i64,
    /// Maximum bindings verified per sweep pass
    pub batch_size: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 0,
            min_recheck_secs: 60,
            batch_size: 50,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
            },
            dns: DnsConfig {
                verification_label: env::var("DNS_VERIFICATION_LABEL")
                    .unwrap_or_else(|_| "_waveorder-verify".to_string()),
                edge_host: env::var("EDGE_CNAME_HOST")
                    .unwrap_or_else(|_| "edge.waveorder.app".to_string()),
                ingress_ips: env::var("INGRESS_IPS")
                    .map(|s| {
                        s.split(',')
                            .map(|ip| ip.trim().to_string())
                            .filter(|ip| !ip.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                lookup_timeout_secs: env::var("DNS_LOOKUP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                // Clamped so an operator typo cannot issue near-immortal tokens
                token_ttl_hours: env::var("VERIFICATION_TOKEN_TTL_HOURS")
                    .unwrap_or_else(|_| "48".to_string())
                    .parse()
                    .unwrap_or(48)
                    .clamp(24, 72),
            },
            provisioning: ProvisioningConfig {
                base_url: env::var("PROVISIONER_URL").context("PROVISIONER_URL is required")?,
                api_token: env::var("PROVISIONER_API_TOKEN").ok(),
                timeout_secs: env::var("PROVISIONER_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            sweep: SweepConfig {
                interval_secs: env::var("SWEEP_INTERVAL_SECS")
                    .unwrap_or_else(|_| "0".to_string())
                    .parse()
                    .unwrap_or(0),
                min_recheck_secs: env::var("SWEEP_MIN_RECHECK_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
                batch_size: env::var("SWEEP_BATCH_SIZE")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()
                    .unwrap_or(50),
            },
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_config() -> Config {
        Config {
            http_host: "127.0.0.1".to_string(),
            http_port: 8080,
            database: DatabaseConfig {
                url: "mysql://localhost/test".to_string(),
                max_connections: 10,
                min_connections: 2,
            },
            dns: DnsConfig {
                verification_label: "_waveorder-verify".to_string(),
                edge_host: "edge.waveorder.app".to_string(),
                ingress_ips: vec!["203.0.113.10".to_string(), "203.0.113.11".to_string()],
                lookup_timeout_secs: 3,
                token_ttl_hours: 48,
            },
            provisioning: ProvisioningConfig {
                base_url: "http://provisioner:9100".to_string(),
                api_token: None,
                timeout_secs: 30,
            },
            sweep: SweepConfig::default(),
        }
    }

    #[test]
    fn test_config_http_addr() {
        let config = test_config();
        assert_eq!(config.http_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_config_clone() {
        let config1 = test_config();
        let config2 = config1.clone();

        assert_eq!(config1.http_host, config2.http_host);
        assert_eq!(config1.database.url, config2.database.url);
        assert_eq!(config1.dns.edge_host, config2.dns.edge_host);
    }

    #[test]
    fn test_config_debug() {
        let config = test_config();
        let debug_str = format!("{:?}", config);

        assert!(debug_str.contains("Config"));
        assert!(debug_str.contains("_waveorder-verify"));
        assert!(debug_str.contains("edge.waveorder.app"));
    }

    #[test]
    fn test_dns_config_ingress_ips() {
        let config = test_config();
        assert_eq!(config.dns.ingress_ips.len(), 2);
        assert!(config.dns.ingress_ips.contains(&"203.0.113.10".to_string()));
    }

    #[test]
    fn test_sweep_config_default_disabled() {
        let sweep = SweepConfig::default();
        assert_eq!(sweep.interval_secs, 0);
        assert_eq!(sweep.min_recheck_secs, 60);
        assert_eq!(sweep.batch_size, 50);
    }

    #[test]
    fn test_provisioning_config_debug() {
        let config = test_config();
        let debug_str = format!("{:?}", config.provisioning);

        assert!(debug_str.contains("ProvisioningConfig"));
        assert!(debug_str.contains("provisioner:9100"));
    }
}
