//! Domain binding types: the association between a tenant and a vanity domain

use super::common::StringUuid;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::LazyLock;
use validator::Validate;

/// RFC-1035-shaped hostname: dot-separated labels, no leading/trailing
/// hyphen per label, at least two labels. Case is normalized before matching.
static DOMAIN_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$")
        .unwrap_or_else(|e| panic!("invalid domain name regex: {e}"))
});

/// Binding status lifecycle: `None` (no domain configured) is never persisted;
/// a missing row reports as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BindingStatus {
    #[default]
    None,
    Pending,
    Active,
    Failed,
}

impl std::str::FromStr for BindingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown binding status: {}", s)),
        }
    }
}

impl std::fmt::Display for BindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for BindingStatus {
    fn decode(value: sqlx::mysql::MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = sqlx::Decode::<'r, sqlx::MySql>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl sqlx::Type<sqlx::MySql> for BindingStatus {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::MySql> for BindingStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let s = self.to_string();
        <&str as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&s.as_str(), buf)
    }
}

/// Domain binding entity (one per tenant)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DomainBinding {
    pub id: StringUuid,
    pub tenant_id: StringUuid,
    pub domain_name: String,
    pub status: BindingStatus,
    pub verification_token: Option<String>,
    pub verification_expiry: Option<DateTime<Utc>>,
    pub provisioned_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DomainBinding {
    /// Check whether the current verification token has expired at `now`.
    /// A missing expiry counts as expired: a pending binding without a
    /// deadline must never activate.
    pub fn is_token_expired(&self, now: DateTime<Utc>) -> bool {
        match self.verification_expiry {
            Some(expiry) => now > expiry,
            None => true,
        }
    }

    /// Pending and still within the token window at `now`
    pub fn is_verifiable(&self, now: DateTime<Utc>) -> bool {
        self.status == BindingStatus::Pending && !self.is_token_expired(now)
    }
}

impl Default for DomainBinding {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: StringUuid::new_v4(),
            tenant_id: StringUuid::new_v4(),
            domain_name: String::new(),
            status: BindingStatus::Pending,
            verification_token: None,
            verification_expiry: Some(now + Duration::hours(48)),
            provisioned_at: None,
            last_checked_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Which routing record satisfied the routing check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingKind {
    A,
    Cname,
}

/// Result of one DNS verification pass: the ownership (TXT) and routing
/// (A/CNAME) checks are reported independently so the tenant can see which
/// record is still missing while DNS propagates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsStatus {
    pub txt_verified: bool,
    pub routing_verified: bool,
    pub routing_kind: Option<RoutingKind>,
    /// Per-check diagnostics (record values seen, names queried)
    pub details: Vec<String>,
    /// Resolver-level failures; a missing record is not an error
    pub errors: Vec<String>,
}

impl DnsStatus {
    pub fn fully_verified(&self) -> bool {
        self.txt_verified && self.routing_verified
    }

    pub fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }
}

/// DNS records the tenant must publish, rendered for the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsInstructions {
    /// Name of the ownership TXT record (e.g. `_waveorder-verify.shop.example.com`)
    pub txt_name: String,
    /// Required TXT value (the verification token)
    pub txt_value: String,
    /// CNAME target that satisfies routing
    pub cname_target: String,
    /// Alternative: A record values that satisfy routing
    pub a_values: Vec<String>,
}

/// Input for requesting a domain binding
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RequestBindingInput {
    /// The vanity domain to attach (e.g. `shop.example.com`)
    #[validate(length(min = 4, max = 253))]
    pub domain_name: String,
}

/// Lowercase and strip the FQDN trailing dot before validation or storage
pub fn normalize_domain_name(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_lowercase()
}

/// Validate a normalized domain name shape
pub fn is_valid_domain_name(domain: &str) -> bool {
    domain.len() <= 253 && DOMAIN_NAME_RE.is_match(domain)
}

/// API response for a newly requested (or re-keyed) binding
#[derive(Debug, Clone, Serialize)]
pub struct RequestBindingResponse {
    pub domain_name: String,
    pub status: BindingStatus,
    pub verification_token: String,
    pub verification_expiry: DateTime<Utc>,
    pub dns_instructions: DnsInstructions,
}

/// API response for binding status queries and verification attempts
#[derive(Debug, Clone, Serialize)]
pub struct BindingStatusResponse {
    pub status: BindingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_instructions: Option<DnsInstructions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_expiry: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl BindingStatusResponse {
    /// Response for a tenant with no domain configured
    pub fn none() -> Self {
        Self {
            status: BindingStatus::None,
            domain_name: None,
            dns: None,
            dns_instructions: None,
            provisioned_at: None,
            last_checked_at: None,
            verification_expiry: None,
            last_error: None,
        }
    }
}
