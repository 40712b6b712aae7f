use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use tripgate_core::domain::comment::{Comment, CommentEntity, CommentId, NewComment};
use tripgate_core::pagination::{Page, PageQuery};
use tripgate_db::repositories::{CommentQuery, CommentRepository, SqlCommentRepository};

use super::context::Member;
use super::error::OrApiError;
use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateCommentBody {
    pub table_name: CommentEntity,
    pub record_id: i64,
    pub parent_id: Option<CommentId>,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentListQuery {
    pub table_name: CommentEntity,
    pub record_id: i64,
    pub parent_id: Option<i64>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EditCommentBody {
    pub content: String,
}

pub async fn create(
    State(state): State<AppState>,
    member: Member,
    Json(body): Json<CreateCommentBody>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = SqlCommentRepository::new(state.db_pool)
        .create(
            member.user_id,
            NewComment {
                organization_id: member.organization_id,
                table_name: body.table_name,
                record_id: body.record_id,
                parent_id: body.parent_id,
                content: body.content,
            },
        )
        .await
        .or_api(&member.correlation_id)?;

    info!(
        event_name = "comment.created",
        correlation_id = %member.correlation_id,
        comment_id = comment.id.0,
        table_name = comment.table_name.as_str(),
        record_id = comment.record_id,
        "comment posted"
    );
    Ok((StatusCode::CREATED, Json(comment)))
}

/// One thread, newest first. Without `parent_id` every comment on the record is listed.
pub async fn list(
    State(state): State<AppState>,
    member: Member,
    Query(query): Query<CommentListQuery>,
) -> Result<Json<Page<Comment>>, ApiError> {
    let page = state.page(PageQuery { page: query.page, size: query.size });
    let thread = CommentQuery {
        organization_id: member.organization_id,
        table_name: query.table_name,
        record_id: query.record_id,
        parent_id: query.parent_id.map(CommentId),
    };

    let (comments, total) = SqlCommentRepository::new(state.db_pool)
        .list(thread, page)
        .await
        .or_api(&member.correlation_id)?;

    Ok(Json(Page::new(page, total, comments, "/v1/comments")))
}

pub async fn fetch(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
) -> Result<Json<Comment>, ApiError> {
    SqlCommentRepository::new(state.db_pool)
        .find(member.organization_id, CommentId(id))
        .await
        .or_api(&member.correlation_id)?
        .map(Json)
        .ok_or_else(|| {
            ApiError::not_found(format!("comment {id} does not exist"), &member.correlation_id)
        })
}

/// Only the author may edit; the comment is marked as edited.
pub async fn update(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
    Json(body): Json<EditCommentBody>,
) -> Result<Json<Comment>, ApiError> {
    let comment = SqlCommentRepository::new(state.db_pool)
        .update_content(member.organization_id, CommentId(id), member.user_id, &body.content)
        .await
        .or_api(&member.correlation_id)?;
    Ok(Json(comment))
}

pub async fn delete(
    State(state): State<AppState>,
    member: Member,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    SqlCommentRepository::new(state.db_pool)
        .delete(member.organization_id, CommentId(id), member.user_id)
        .await
        .or_api(&member.correlation_id)?;

    info!(
        event_name = "comment.deleted",
        correlation_id = %member.correlation_id,
        comment_id = id,
        "comment deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}
