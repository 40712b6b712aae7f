use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use tripgate_core::domain::approval::{ApprovalStatus, Decision, RequestApproval};
use tripgate_core::domain::organization::{OrganizationId, UserId};
use tripgate_core::domain::request::{
    NewTravelRequest, RequestId, TravelRequest, TravelRequestPatch,
};
use tripgate_core::pagination::{Page, PageQuery};
use tripgate_db::repositories::{
    OrganizationRepository, RequestFilter, RequestRepository, SqlOrganizationRepository,
    SqlRequestApprovalRepository, SqlRequestRepository,
};

use super::context::Member;
use super::error::OrApiError;
use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    /// Defaults to the caller.
    pub requester_id: Option<UserId>,
    pub country: Option<String>,
    pub state: String,
    pub city: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub purpose: Option<String>,
    pub hotel: Option<String>,
    pub room: Option<String>,
    pub rate: Option<Decimal>,
    pub meal: Option<String>,
    pub transport: Option<String>,
    pub other_requests: Option<String>,
}

impl CreateRequestBody {
    fn into_new_request(
        self,
        organization_id: OrganizationId,
        requester_id: UserId,
    ) -> NewTravelRequest {
        NewTravelRequest {
            organization_id,
            requester_id,
            country: self.country,
            state: self.state,
            city: self.city,
            start: self.start,
            end: self.end,
            purpose: self.purpose,
            hotel: self.hotel,
            room: self.room,
            rate: self.rate,
            meal: self.meal,
            transport: self.transport,
            other_requests: self.other_requests,
        }
    }
}

/// A decision (`status`) and trip detail changes; either may be absent.
#[derive(Debug, Deserialize)]
pub struct UpdateRequestBody {
    pub status: Option<String>,
    #[serde(flatten)]
    pub details: TravelRequestPatch,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestListQuery {
    pub requester: Option<i64>,
    pub approver: Option<i64>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: TravelRequest,
    pub approvals: Vec<RequestApproval>,
}

/// Stores a pending request and builds its approval chain from the requester's groups.
pub async fn create(
    State(state): State<AppState>,
    member: Member,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<RequestDetail>), ApiError> {
    let correlation_id = member.correlation_id.as_str();
    let requester_id = body.requester_id.unwrap_or(member.user_id);
    if requester_id != member.user_id {
        let requester_is_member = SqlOrganizationRepository::new(state.db_pool.clone())
            .is_member(member.organization_id, requester_id)
            .await
            .or_api(correlation_id)?;
        if !requester_is_member {
            return Err(ApiError::forbidden(
                format!(
                    "user {requester_id} is not a member of organization {}",
                    member.organization_id
                ),
                correlation_id,
            ));
        }
    }

    let new_request = body.into_new_request(member.organization_id, requester_id);
    let (request, report) = state
        .workflow
        .create_request(new_request, correlation_id)
        .await
        .or_api(correlation_id)?;
    let approvals = SqlRequestApprovalRepository::new(state.db_pool)
        .list_for_request(request.id)
        .await
        .or_api(correlation_id)?;

    info!(
        event_name = "api.request.created",
        correlation_id,
        request_id = request.id.0,
        skipped_slots = report.skipped().count(),
        "travel request accepted"
    );
    Ok((StatusCode::CREATED, Json(RequestDetail { request, approvals })))
}

pub async fn list(
    State(state): State<AppState>,
    member: Member,
    Query(query): Query<RequestListQuery>,
) -> Result<Json<Page<TravelRequest>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ApprovalStatus>)
        .transpose()
        .or_api(&member.correlation_id)?;
    let filter = RequestFilter {
        requester: query.requester.map(UserId),
        approver: query.approver.map(UserId),
        status,
    };
    let page = state.page(PageQuery { page: query.page, size: query.size });

    let (requests, total) = SqlRequestRepository::new(state.db_pool)
        .list(member.organization_id, filter, page)
        .await
        .or_api(&member.correlation_id)?;

    Ok(Json(Page::new(page, total, requests, "/v1/requests")))
}

pub async fn fetch(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
) -> Result<Json<RequestDetail>, ApiError> {
    Ok(Json(detail(&state, &member, RequestId(id)).await?))
}

/// Records the caller's decision when `status` is present and applies detail changes. Both
/// commit together or not at all.
pub async fn update(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
    Json(body): Json<UpdateRequestBody>,
) -> Result<Json<RequestDetail>, ApiError> {
    let correlation_id = member.correlation_id.as_str();
    let request_id = RequestId(id);

    let decision = body
        .status
        .as_deref()
        .map(|status| status.parse::<ApprovalStatus>().and_then(Decision::try_from))
        .transpose()
        .or_api(correlation_id)?;
    state
        .workflow
        .update_request(
            member.organization_id,
            request_id,
            member.user_id,
            decision,
            &body.details,
            correlation_id,
        )
        .await
        .or_api(correlation_id)?;

    Ok(Json(detail(&state, &member, request_id).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    SqlRequestRepository::new(state.db_pool)
        .soft_delete(member.organization_id, RequestId(id))
        .await
        .or_api(&member.correlation_id)?;

    info!(
        event_name = "request.deleted",
        correlation_id = %member.correlation_id,
        request_id = id,
        "travel request soft-deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn approvals(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
) -> Result<Json<Vec<RequestApproval>>, ApiError> {
    Ok(Json(detail(&state, &member, RequestId(id)).await?.approvals))
}

async fn detail(
    state: &AppState,
    member: &Member,
    request_id: RequestId,
) -> Result<RequestDetail, ApiError> {
    let correlation_id = member.correlation_id.as_str();
    let request = SqlRequestRepository::new(state.db_pool.clone())
        .find(member.organization_id, request_id)
        .await
        .or_api(correlation_id)?
        .ok_or_else(|| {
            ApiError::not_found(format!("request {request_id} does not exist"), correlation_id)
        })?;
    let approvals = SqlRequestApprovalRepository::new(state.db_pool.clone())
        .list_for_request(request_id)
        .await
        .or_api(correlation_id)?;

    Ok(RequestDetail { request, approvals })
}
