use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tripgate_core::domain::group::{
    ApproverAssignment, Group, GroupApprover, GroupId, GroupMember, GroupPatch, NewGroup,
};
use tripgate_core::domain::organization::UserId;
use tripgate_core::pagination::{Page, PageQuery};
use tripgate_db::repositories::{GroupRepository, RepositoryError, SqlGroupRepository};

use super::context::Member;
use super::error::OrApiError;
use super::{ApiError, AppState};

/// Approvers may be given as bare ids (next free position) or with explicit positions.
#[derive(Debug, Default, Deserialize)]
pub struct ApproversBody {
    #[serde(default)]
    pub approver_ids: Vec<UserId>,
    #[serde(default)]
    pub approvers: Vec<ApproverAssignment>,
}

impl ApproversBody {
    fn assignments(&self) -> Vec<ApproverAssignment> {
        let bare = self
            .approver_ids
            .iter()
            .map(|approver_id| ApproverAssignment { approver_id: *approver_id, position: None });
        self.approvers.iter().copied().chain(bare).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct MembersBody {
    pub member_ids: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveApproversBody {
    pub approver_ids: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupBody {
    pub name: String,
    pub description: Option<String>,
    pub parent_group_id: Option<GroupId>,
    pub approval_levels: Option<i64>,
    #[serde(flatten)]
    pub approvers: ApproversBody,
    #[serde(default)]
    pub member_ids: Vec<UserId>,
}

#[derive(Debug, Serialize)]
pub struct CreatedGroup {
    #[serde(flatten)]
    pub group: Group,
    pub approvers: Vec<GroupApprover>,
    pub members: Vec<GroupMember>,
}

#[derive(Debug, Serialize)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: Group,
    pub open_requests: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Removed {
    pub removed: u64,
}

/// Creates the group, then its approvers and members. A failed placement soft-deletes the
/// new group so the name stays free.
pub async fn create(
    State(state): State<AppState>,
    member: Member,
    Json(body): Json<CreateGroupBody>,
) -> Result<(StatusCode, Json<CreatedGroup>), ApiError> {
    let correlation_id = member.correlation_id.as_str();
    let groups = SqlGroupRepository::new(state.db_pool);
    let group = groups
        .create(
            NewGroup {
                organization_id: member.organization_id,
                name: body.name,
                description: body.description,
                parent_group_id: body.parent_group_id,
                approval_levels: body.approval_levels,
            },
            member.user_id,
        )
        .await
        .or_api(correlation_id)?;

    let assignments = body.approvers.assignments();
    let placed = async {
        let approvers = if assignments.is_empty() {
            Vec::new()
        } else {
            groups.add_approvers(group.id, &assignments).await?
        };
        let members = if body.member_ids.is_empty() {
            Vec::new()
        } else {
            groups.add_members(group.id, &body.member_ids).await?
        };
        Ok::<_, RepositoryError>((approvers, members))
    }
    .await;

    let (approvers, members) = match placed {
        Ok(placed) => placed,
        Err(error) => {
            warn!(
                event_name = "group.create.rolled_back",
                correlation_id,
                group_id = group.id.0,
                error = %error,
                "group hierarchy rejected; removing the new group"
            );
            groups.soft_delete(member.organization_id, group.id).await.or_api(correlation_id)?;
            return Err(ApiError::new(error, correlation_id));
        }
    };

    info!(
        event_name = "group.created",
        correlation_id,
        group_id = group.id.0,
        approvers = approvers.len(),
        members = members.len(),
        "group created"
    );
    Ok((StatusCode::CREATED, Json(CreatedGroup { group, approvers, members })))
}

pub async fn list(
    State(state): State<AppState>,
    member: Member,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Group>>, ApiError> {
    let page = state.page(query);
    let (groups, total) = SqlGroupRepository::new(state.db_pool)
        .list(member.organization_id, page)
        .await
        .or_api(&member.correlation_id)?;

    Ok(Json(Page::new(page, total, groups, "/v1/groups")))
}

pub async fn fetch(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
) -> Result<Json<GroupDetail>, ApiError> {
    let groups = SqlGroupRepository::new(state.db_pool);
    let group = find_group(&groups, &member, id).await?;
    let open_requests =
        groups.open_requests_count(group.id).await.or_api(&member.correlation_id)?;

    Ok(Json(GroupDetail { group, open_requests }))
}

pub async fn update(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
    Json(patch): Json<GroupPatch>,
) -> Result<Json<Group>, ApiError> {
    let group = SqlGroupRepository::new(state.db_pool)
        .update(member.organization_id, GroupId(id), patch)
        .await
        .or_api(&member.correlation_id)?;
    Ok(Json(group))
}

pub async fn delete(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    SqlGroupRepository::new(state.db_pool)
        .soft_delete(member.organization_id, GroupId(id))
        .await
        .or_api(&member.correlation_id)?;

    info!(
        event_name = "group.deleted",
        correlation_id = %member.correlation_id,
        group_id = id,
        "group soft-deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Only rows actually inserted are returned; unknown users and existing members are skipped.
pub async fn add_members(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
    Json(body): Json<MembersBody>,
) -> Result<(StatusCode, Json<Vec<GroupMember>>), ApiError> {
    let groups = SqlGroupRepository::new(state.db_pool);
    let group = find_group(&groups, &member, id).await?;
    let added =
        groups.add_members(group.id, &body.member_ids).await.or_api(&member.correlation_id)?;
    Ok((StatusCode::CREATED, Json(added)))
}

pub async fn remove_members(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
    Json(body): Json<MembersBody>,
) -> Result<Json<Removed>, ApiError> {
    let groups = SqlGroupRepository::new(state.db_pool);
    let group = find_group(&groups, &member, id).await?;
    let removed =
        groups.remove_members(group.id, &body.member_ids).await.or_api(&member.correlation_id)?;
    Ok(Json(Removed { removed }))
}

pub async fn list_members(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<GroupMember>>, ApiError> {
    let page = state.page(query);
    let groups = SqlGroupRepository::new(state.db_pool);
    let group = find_group(&groups, &member, id).await?;
    let (members, total) =
        groups.list_members(group.id, page).await.or_api(&member.correlation_id)?;

    Ok(Json(Page::new(page, total, members, &format!("/v1/groups/{id}/members"))))
}

pub async fn add_approvers(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
    Json(body): Json<ApproversBody>,
) -> Result<(StatusCode, Json<Vec<GroupApprover>>), ApiError> {
    let groups = SqlGroupRepository::new(state.db_pool);
    let group = find_group(&groups, &member, id).await?;
    let added = groups
        .add_approvers(group.id, &body.assignments())
        .await
        .or_api(&member.correlation_id)?;

    info!(
        event_name = "group.approvers.added",
        correlation_id = %member.correlation_id,
        group_id = id,
        added = added.len(),
        "group approvers added"
    );
    Ok((StatusCode::CREATED, Json(added)))
}

pub async fn remove_approvers(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
    Json(body): Json<RemoveApproversBody>,
) -> Result<Json<Removed>, ApiError> {
    let groups = SqlGroupRepository::new(state.db_pool);
    let group = find_group(&groups, &member, id).await?;
    let removed = groups
        .remove_approvers(group.id, &body.approver_ids)
        .await
        .or_api(&member.correlation_id)?;
    Ok(Json(Removed { removed }))
}

pub async fn list_approvers(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<GroupApprover>>, ApiError> {
    let page = state.page(query);
    let groups = SqlGroupRepository::new(state.db_pool);
    let group = find_group(&groups, &member, id).await?;
    let (approvers, total) =
        groups.list_approvers(group.id, page).await.or_api(&member.correlation_id)?;

    Ok(Json(Page::new(page, total, approvers, &format!("/v1/groups/{id}/approvers"))))
}

async fn find_group(
    groups: &SqlGroupRepository,
    member: &Member,
    id: i64,
) -> Result<Group, ApiError> {
    groups
        .find(member.organization_id, GroupId(id))
        .await
        .or_api(&member.correlation_id)?
        .ok_or_else(|| {
            ApiError::not_found(format!("group {id} does not exist"), &member.correlation_id)
        })
}
