//! Custom domain binding API handlers

use crate::api::{MessageResponse, SuccessResponse};
use crate::domain::{RequestBindingInput, StringUuid};
use crate::error::Result;
use crate::state::HasDomainBindings;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

/// Attach a vanity domain to a tenant, minting the verification token
/// and returning the DNS records the tenant must publish.
///
/// POST /api/v1/tenants/{tenant_id}/domain
pub async fn request<S: HasDomainBindings>(
    State(state): State<S>,
    Path(tenant_id): Path<Uuid>,
    Json(input): Json<RequestBindingInput>,
) -> Result<impl IntoResponse> {
    let response = state
        .binding_service()
        .request_binding(StringUuid(tenant_id), input)
        .await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(response))))
}

/// Current binding status for a tenant. Pending bindings are re-checked
/// against live DNS on every call, so propagation progress shows up here.
///
/// GET /api/v1/tenants/{tenant_id}/domain
pub async fn status<S: HasDomainBindings>(
    State(state): State<S>,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let response = state
        .binding_service()
        .get_status(StringUuid(tenant_id))
        .await?;
    Ok(Json(SuccessResponse::new(response)))
}

/// Explicit "check my DNS now" action.
///
/// POST /api/v1/tenants/{tenant_id}/domain/verify
pub async fn verify<S: HasDomainBindings>(
    State(state): State<S>,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let response = state
        .binding_service()
        .verify(StringUuid(tenant_id))
        .await?;
    Ok(Json(SuccessResponse::new(response)))
}

/// Re-issue the verification token, invalidating the previous one and
/// returning the binding to pending.
///
/// POST /api/v1/tenants/{tenant_id}/domain/token
pub async fn reissue<S: HasDomainBindings>(
    State(state): State<S>,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let response = state
        .binding_service()
        .reissue_token(StringUuid(tenant_id))
        .await?;
    Ok(Json(SuccessResponse::new(response)))
}

/// Detach the tenant's domain, tearing down provisioning if active.
///
/// DELETE /api/v1/tenants/{tenant_id}/domain
pub async fn remove<S: HasDomainBindings>(
    State(state): State<S>,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state
        .binding_service()
        .remove_binding(StringUuid(tenant_id))
        .await?;
    Ok(Json(MessageResponse::new("Domain binding removed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BindingStatus, BindingStatusResponse, DnsInstructions};

    #[test]
    fn test_request_binding_input_deserialization() {
        let json = r#"{"domain_name":"shop.example.com"}"#;
        let input: RequestBindingInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.domain_name, "shop.example.com");
    }

    #[test]
    fn test_request_binding_input_rejects_missing_field() {
        let result = serde_json::from_str::<RequestBindingInput>("{}");
        assert!(result.is_err());
    }

    #[test]
    fn test_status_response_serialization_none() {
        let response = SuccessResponse::new(BindingStatusResponse::none());
        let json = serde_json::to_string(&response).unwrap();

        assert!(json.contains(r#""status":"none""#));
        // Absent fields stay out of the payload entirely
        assert!(!json.contains("domain_name"));
        assert!(!json.contains("last_error"));
    }

    #[test]
    fn test_status_response_serialization_pending() {
        let response = BindingStatusResponse {
            status: BindingStatus::Pending,
            domain_name: Some("shop.example.com".to_string()),
            dns_instructions: Some(DnsInstructions {
                txt_name: "_waveorder-verify.shop.example.com".to_string(),
                txt_value: "abc123".to_string(),
                cname_target: "edge.waveorder.app".to_string(),
                a_values: vec!["203.0.113.10".to_string()],
            }),
            ..BindingStatusResponse::none()
        };

        let json = serde_json::to_string(&SuccessResponse::new(response)).unwrap();
        assert!(json.contains(r#""status":"pending""#));
        assert!(json.contains("_waveorder-verify.shop.example.com"));
        assert!(json.contains("edge.waveorder.app"));
    }

    #[test]
    fn test_message_response_shape() {
        let json = serde_json::to_string(&MessageResponse::new("Domain binding removed")).unwrap();
        assert_eq!(json, r#"{"message":"Domain binding removed"}"#);
    }
}
