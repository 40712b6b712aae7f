use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use tripgate_core::domain::organization::{
    InviteBatch, InviteStatus, OrganizationId, OrganizationInvite,
};
use tripgate_core::pagination::{Page, PageQuery};
use tripgate_db::repositories::{InviteRepository, SqlInviteRepository};

use super::context::{Caller, Correlation};
use super::error::OrApiError;
use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct InviteBody {
    pub emails: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InviteListQuery {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerBody {
    pub status: String,
}

/// Invites each address to the organization. Addresses of current members are reported back
/// instead of invited. Delivery of the invite is left to the caller.
pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(body): Json<InviteBody>,
) -> Result<(StatusCode, Json<InviteBatch>), ApiError> {
    let organization_id = OrganizationId(id);
    caller.require_member(&state, organization_id).await?;

    let batch = SqlInviteRepository::new(state.db_pool)
        .invite(organization_id, caller.user_id, &body.emails)
        .await
        .or_api(&caller.correlation_id)?;

    info!(
        event_name = "organization.invites.created",
        correlation_id = %caller.correlation_id,
        organization_id = id,
        invited = batch.invites.len(),
        already_members = batch.already_members.len(),
        "organization invites created"
    );
    Ok((StatusCode::CREATED, Json(batch)))
}

pub async fn list_for_organization(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Query(query): Query<InviteListQuery>,
) -> Result<Json<Page<OrganizationInvite>>, ApiError> {
    let organization_id = OrganizationId(id);
    caller.require_member(&state, organization_id).await?;

    let page = state.page(PageQuery { page: query.page, size: query.size });
    let (invites, total) = SqlInviteRepository::new(state.db_pool)
        .list_for_organization(organization_id, query.search.as_deref(), page)
        .await
        .or_api(&caller.correlation_id)?;

    Ok(Json(Page::new(page, total, invites, &format!("/v1/organizations/{id}/invites"))))
}

/// Pending invites addressed to the caller.
pub async fn list_mine(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<OrganizationInvite>>, ApiError> {
    let page = state.page(query);
    let (invites, total) = SqlInviteRepository::new(state.db_pool)
        .list_pending_for_user(caller.user_id, page)
        .await
        .or_api(&caller.correlation_id)?;

    Ok(Json(Page::new(page, total, invites, "/v1/invites")))
}

/// Holding the token is enough to read an invite.
pub async fn fetch(
    State(state): State<AppState>,
    Correlation(correlation_id): Correlation,
    Path(token): Path<String>,
) -> Result<Json<OrganizationInvite>, ApiError> {
    SqlInviteRepository::new(state.db_pool)
        .find_by_token(&token)
        .await
        .or_api(&correlation_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("invite does not exist", &correlation_id))
}

/// Accepts or rejects an invite addressed to the caller.
pub async fn respond(
    State(state): State<AppState>,
    caller: Caller,
    Path(token): Path<String>,
    Json(body): Json<AnswerBody>,
) -> Result<Json<OrganizationInvite>, ApiError> {
    let answer = body.status.parse::<InviteStatus>().or_api(&caller.correlation_id)?;
    let invite = SqlInviteRepository::new(state.db_pool)
        .respond(&token, caller.user_id, answer)
        .await
        .or_api(&caller.correlation_id)?;

    info!(
        event_name = "organization.invite.answered",
        correlation_id = %caller.correlation_id,
        organization_id = invite.organization_id.0,
        user_id = caller.user_id.0,
        status = invite.status.as_str(),
        "organization invite answered"
    );
    Ok(Json(invite))
}
