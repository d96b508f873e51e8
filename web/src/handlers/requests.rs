//! Adoption and redemption request endpoints.
//!
//! The request kind is part of every path because the two request tables
//! number their rows independently: `adoption/7` and `redemption/7` are
//! different requests.

use crate::error::AppError;
use crate::extractors::{ApiJson, ApiPath, ApiQuery, CorrelationId};
use crate::state::AppState;
use crate::WebResult;
use animal_control_core::{
    ApplicantDetails, Attachments, ClaimCommand, ClaimReceipt, DispositionRequest, EntityStore,
    HardwareTag, OwnerId, RequestDetails, RequestFilter, RequestId, RequestKind, RequestListing,
    RequestStatus, StrayId,
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::Deserialize;

/// Body of `POST /api/requests/{kind}`.
///
/// `applicant` belongs to adoptions; `proof` and `contact_phone` belong to
/// redemptions.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitBody {
    /// Stray the request is about
    pub stray_id: StrayId,
    /// Adopter or owner
    pub requester_id: OwnerId,
    /// Adoption questionnaire
    #[serde(default)]
    pub applicant: Option<ApplicantDetails>,
    /// Redemption proof of ownership
    #[serde(default)]
    pub proof: Option<Attachments>,
    /// Redemption contact phone
    #[serde(default)]
    pub contact_phone: Option<String>,
}

impl SubmitBody {
    fn details(&self, kind: RequestKind) -> WebResult<RequestDetails> {
        match kind {
            RequestKind::Adoption => {
                if self.proof.is_some() || self.contact_phone.is_some() {
                    return Err(AppError::bad_request(
                        "proof and contact_phone only apply to redemption requests",
                    ));
                }
                Ok(RequestDetails::Adoption {
                    applicant: self.applicant.clone().unwrap_or_default(),
                })
            }
            RequestKind::Redemption => {
                if self.applicant.is_some() {
                    return Err(AppError::bad_request(
                        "applicant only applies to adoption requests",
                    ));
                }
                Ok(RequestDetails::Redemption {
                    proof: self.proof.clone().unwrap_or_default(),
                    contact_phone: self.contact_phone.clone(),
                })
            }
        }
    }
}

/// Query of `GET /api/requests/{kind}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    /// Only requests by this requester
    pub requester_id: Option<String>,
    /// Only requests in this status
    pub status: Option<String>,
}

impl ListParams {
    fn filter(&self, kind: RequestKind) -> WebResult<RequestFilter> {
        let requester_id = self
            .requester_id
            .as_deref()
            .map(|raw| {
                raw.parse::<i64>()
                    .map(OwnerId::new)
                    .map_err(|_| AppError::bad_request(format!("invalid requester_id: {raw}")))
            })
            .transpose()?;
        let status = self
            .status
            .as_deref()
            .map(RequestStatus::parse)
            .transpose()?;
        Ok(RequestFilter {
            kind,
            requester_id,
            status,
        })
    }
}

/// Body of `PUT /api/requests/{kind}/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusBody {
    /// Target status: `approved` or `rejected`
    pub status: String,
}

/// Body of `POST /api/requests/{kind}/{id}/claim`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClaimBody {
    /// Tag read or typed by staff; the stray's own tag is used when absent
    #[serde(default)]
    pub hardware_tag: Option<String>,
    /// The tag was typed in by hand
    #[serde(default)]
    pub manual_entry: bool,
}

fn kind(raw: &str) -> WebResult<RequestKind> {
    Ok(RequestKind::parse(raw)?)
}

/// Submit a request.
///
/// ```text
/// POST /api/requests/redemption
/// { "stray_id": 4, "requester_id": 2, "proof": {"kind": "path", "value": "proof/1.jpg"} }
/// ```
///
/// Responds `201` with the stored request.
pub async fn submit<S: EntityStore + 'static>(
    State(state): State<AppState<S>>,
    correlation_id: CorrelationId,
    ApiPath(raw_kind): ApiPath<String>,
    ApiJson(body): ApiJson<SubmitBody>,
) -> WebResult<(StatusCode, Json<DispositionRequest>)> {
    let kind = kind(&raw_kind)?;
    let details = body.details(kind)?;
    let request = state
        .requests
        .submit(body.stray_id, body.requester_id, details)
        .await?;

    tracing::debug!(
        correlation_id = %correlation_id.0,
        kind = %kind,
        request_id = %request.id,
        "Request submitted"
    );
    Ok((StatusCode::CREATED, Json(request)))
}

/// List requests of a kind, newest first.
///
/// ```text
/// GET /api/requests/adoption?requester_id=2&status=pending
/// ```
pub async fn list<S: EntityStore + 'static>(
    State(state): State<AppState<S>>,
    ApiPath(raw_kind): ApiPath<String>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> WebResult<Json<Vec<RequestListing>>> {
    let filter = params.filter(kind(&raw_kind)?)?;
    Ok(Json(state.requests.list(filter).await?))
}

/// Fetch one request.
pub async fn get<S: EntityStore + 'static>(
    State(state): State<AppState<S>>,
    ApiPath((raw_kind, id)): ApiPath<(String, i64)>,
) -> WebResult<Json<DispositionRequest>> {
    let request = state
        .requests
        .get(kind(&raw_kind)?, RequestId::new(id))
        .await?;
    Ok(Json(request))
}

/// Approve or reject a request.
///
/// Approving an adoption also marks the stray adopted, transfers any
/// existing pet row for its tag, rejects the competing adoptions and drops
/// the stray's redemptions.
pub async fn set_status<S: EntityStore + 'static>(
    State(state): State<AppState<S>>,
    correlation_id: CorrelationId,
    ApiPath((raw_kind, id)): ApiPath<(String, i64)>,
    ApiJson(body): ApiJson<StatusBody>,
) -> WebResult<Json<DispositionRequest>> {
    let kind = kind(&raw_kind)?;
    let status = RequestStatus::parse(&body.status)?;
    let request = state
        .requests
        .set_status(kind, RequestId::new(id), status)
        .await?;

    tracing::info!(
        correlation_id = %correlation_id.0,
        kind = %kind,
        request_id = id,
        status = %request.status,
        "Request reviewed"
    );
    Ok(Json(request))
}

/// Hand an animal over on an approved request.
///
/// ```text
/// POST /api/requests/redemption/9/claim
/// { "hardware_tag": "985112003456789", "manual_entry": true }
/// ```
///
/// A blank `hardware_tag` is treated as absent.
pub async fn claim<S: EntityStore + 'static>(
    State(state): State<AppState<S>>,
    correlation_id: CorrelationId,
    ApiPath((raw_kind, id)): ApiPath<(String, i64)>,
    ApiJson(body): ApiJson<ClaimBody>,
) -> WebResult<Json<ClaimReceipt>> {
    let kind = kind(&raw_kind)?;
    let hardware_tag = body
        .hardware_tag
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(HardwareTag::parse)
        .transpose()?;

    let receipt = state
        .claims
        .claim(ClaimCommand {
            kind,
            request_id: RequestId::new(id),
            hardware_tag,
            manual_entry: body.manual_entry,
        })
        .await?;

    tracing::info!(
        correlation_id = %correlation_id.0,
        kind = %kind,
        request_id = id,
        pet_id = %receipt.pet_id,
        "Claim completed"
    );
    Ok(Json(receipt))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_body_rejects_foreign_fields() {
        let body: SubmitBody = serde_json::from_value(serde_json::json!({
            "stray_id": 1,
            "requester_id": 2,
            "contact_phone": "555-0101",
        }))
        .unwrap();
        assert!(body.details(RequestKind::Adoption).is_err());
        assert_eq!(
            body.details(RequestKind::Redemption).unwrap().kind(),
            RequestKind::Redemption
        );
    }

    #[test]
    fn test_list_params_parse() {
        let params = ListParams {
            requester_id: Some("7".into()),
            status: Some("approved".into()),
        };
        let filter = params.filter(RequestKind::Adoption).unwrap();
        assert_eq!(filter.requester_id, Some(OwnerId::new(7)));
        assert_eq!(filter.status, Some(RequestStatus::Approved));

        let bad = ListParams {
            status: Some("lost".into()),
            ..ListParams::default()
        };
        assert_eq!(
            bad.filter(RequestKind::Adoption).unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
