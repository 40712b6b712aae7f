use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use tripgate_core::domain::organization::{
    MemberRole, NewOrganization, Organization, OrganizationId, OrganizationMember, UserId,
};
use tripgate_core::pagination::{Page, PageQuery};
use tripgate_db::repositories::{OrganizationRepository, SqlOrganizationRepository};

use super::context::Caller;
use super::error::OrApiError;
use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct AddMemberBody {
    pub user_id: UserId,
    pub role: Option<MemberRole>,
}

/// The caller becomes the organization's first manager.
pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<NewOrganization>,
) -> Result<(StatusCode, Json<Organization>), ApiError> {
    let organization = SqlOrganizationRepository::new(state.db_pool)
        .create(body, caller.user_id)
        .await
        .or_api(&caller.correlation_id)?;

    info!(
        event_name = "organization.created",
        correlation_id = %caller.correlation_id,
        organization_id = organization.id.0,
        created_by = caller.user_id.0,
        "organization created"
    );
    Ok((StatusCode::CREATED, Json(organization)))
}

/// Organizations the caller belongs to.
pub async fn list_mine(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Organization>>, ApiError> {
    let page = state.page(query);
    let (organizations, total) = SqlOrganizationRepository::new(state.db_pool)
        .list_for_user(caller.user_id, page)
        .await
        .or_api(&caller.correlation_id)?;

    Ok(Json(Page::new(page, total, organizations, "/v1/organizations")))
}

pub async fn fetch(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<Organization>, ApiError> {
    let organization_id = OrganizationId(id);
    caller.require_member(&state, organization_id).await?;

    SqlOrganizationRepository::new(state.db_pool)
        .find_by_id(organization_id)
        .await
        .or_api(&caller.correlation_id)?
        .map(Json)
        .ok_or_else(|| {
            ApiError::not_found(format!("organization {id} does not exist"), &caller.correlation_id)
        })
}

pub async fn list_members(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<OrganizationMember>>, ApiError> {
    let organization_id = OrganizationId(id);
    caller.require_member(&state, organization_id).await?;

    let page = state.page(query);
    let (members, total) = SqlOrganizationRepository::new(state.db_pool)
        .list_members(organization_id, page)
        .await
        .or_api(&caller.correlation_id)?;

    Ok(Json(Page::new(page, total, members, &format!("/v1/organizations/{id}/members"))))
}

/// Members default to the `Staff` role.
pub async fn add_member(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(body): Json<AddMemberBody>,
) -> Result<(StatusCode, Json<OrganizationMember>), ApiError> {
    let organization_id = OrganizationId(id);
    caller.require_member(&state, organization_id).await?;

    let member = SqlOrganizationRepository::new(state.db_pool)
        .add_member(organization_id, body.user_id, body.role.unwrap_or(MemberRole::Staff))
        .await
        .or_api(&caller.correlation_id)?;

    info!(
        event_name = "organization.member.added",
        correlation_id = %caller.correlation_id,
        organization_id = id,
        user_id = member.user_id.0,
        role = member.role.as_str(),
        "organization member added"
    );
    Ok((StatusCode::CREATED, Json(member)))
}
