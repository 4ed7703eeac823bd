use crate::{
    api::{ApiState, handlers::client_address},
    codes::{ValidationOutcome, ValidationRequest},
    identity::IdentityInput,
};
use axum::{
    Json,
    extract::Extension,
    http::{Extensions, HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValidateAccessRequest {
    code: String,
    last_name: Option<String>,
    first_name: Option<String>,
    /// `YYYY-MM-DD`
    birth_date: Option<String>,
    /// Caller label, traced only. Attempts are counted per client address.
    client_identifier: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidateAccessResponse {
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_ref: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout_minutes: Option<u64>,
}

impl From<&ValidationOutcome> for ValidateAccessResponse {
    fn from(outcome: &ValidationOutcome) -> Self {
        let deny_reason = outcome.public_reason().map(str::to_string);
        match outcome {
            ValidationOutcome::Granted(grant) => Self {
                granted: true,
                owner_id: Some(grant.owner_id),
                document_ref: grant.document_ref,
                deny_reason,
                remaining_attempts: None,
                lockout_minutes: None,
            },
            ValidationOutcome::Denied {
                remaining_attempts,
                ..
            } => Self {
                granted: false,
                owner_id: None,
                document_ref: None,
                deny_reason,
                remaining_attempts: Some(*remaining_attempts),
                lockout_minutes: None,
            },
            ValidationOutcome::RateLimited { lockout_minutes } => Self {
                granted: false,
                owner_id: None,
                document_ref: None,
                deny_reason,
                remaining_attempts: Some(0),
                lockout_minutes: Some(*lockout_minutes),
            },
        }
    }
}

#[utoipa::path(
    post,
    path= "/v1/access/validate",
    request_body = ValidateAccessRequest,
    responses (
        (status = 200, description = "Access granted", body = ValidateAccessResponse, content_type = "application/json"),
        (status = 400, description = "Missing payload"),
        (status = 403, description = "Invalid or expired code", body = ValidateAccessResponse),
        (status = 429, description = "Too many failed attempts", body = ValidateAccessResponse),
        (status = 500, description = "Store failure"),
    ),
    tag= "access"
)]
#[instrument(skip(state, headers, extensions, payload))]
pub async fn validate_access(
    state: Extension<Arc<ApiState>>,
    headers: HeaderMap,
    extensions: Extensions,
    payload: Option<Json<ValidateAccessRequest>>,
) -> Response {
    let request: ValidateAccessRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if let Some(label) = request.client_identifier.as_deref() {
        debug!(client_label = label, "Validation request");
    }
    let client_identifier = client_address(&headers, &extensions).unwrap_or_default();

    let validation = ValidationRequest {
        code: request.code,
        identity: IdentityInput {
            last_name: request.last_name,
            first_name: request.first_name,
            birth_date: request.birth_date,
        },
        client_identifier,
    };

    let outcome = match state.manager.validate(&validation).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Error validating access code: {:#}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error validating access code".to_string(),
            )
                .into_response();
        }
    };

    let body = Json(ValidateAccessResponse::from(&outcome));
    match outcome {
        ValidationOutcome::Granted(_) => (StatusCode::OK, body).into_response(),
        ValidationOutcome::Denied { .. } => {
            debug!("Access denied");
            (StatusCode::FORBIDDEN, body).into_response()
        }
        ValidationOutcome::RateLimited { lockout_minutes } => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&lockout_minutes.saturating_mul(60).to_string()) {
                headers.insert(RETRY_AFTER, value);
            }
            (StatusCode::TOO_MANY_REQUESTS, headers, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{AccessGrant, CodeScope, DenyReason};

    #[test]
    fn granted_response_carries_owner_and_document() {
        let owner = Uuid::new_v4();
        let document = Uuid::new_v4();
        let outcome = ValidationOutcome::Granted(AccessGrant {
            code_id: Uuid::new_v4(),
            owner_id: owner,
            scope: CodeScope::Institution,
            document_ref: Some(document),
        });
        let response = ValidateAccessResponse::from(&outcome);
        assert!(response.granted);
        assert_eq!(response.owner_id, Some(owner));
        assert_eq!(response.document_ref, Some(document));
        assert!(response.deny_reason.is_none());
    }

    #[test]
    fn denied_response_hides_precise_reason() {
        for reason in [
            DenyReason::NotFound,
            DenyReason::Expired,
            DenyReason::IdentityMismatch,
        ] {
            let outcome = ValidationOutcome::Denied {
                reason,
                remaining_attempts: 3,
            };
            let json = serde_json::to_value(ValidateAccessResponse::from(&outcome))
                .expect("serialize response");
            assert_eq!(
                json,
                serde_json::json!({
                    "granted": false,
                    "denyReason": "invalid_or_expired",
                    "remainingAttempts": 3
                })
            );
        }
    }

    #[test]
    fn rate_limited_response_reports_lockout() {
        let response = ValidateAccessResponse::from(&ValidationOutcome::RateLimited {
            lockout_minutes: 30,
        });
        assert_eq!(response.deny_reason.as_deref(), Some("rate_limited"));
        assert_eq!(response.lockout_minutes, Some(30));
        assert_eq!(response.remaining_attempts, Some(0));
    }
}
