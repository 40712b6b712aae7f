use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use tripgate_core::domain::organization::{NewUser, User, UserId};
use tripgate_db::repositories::{SqlUserRepository, UserRepository};

use super::context::Correlation;
use super::error::OrApiError;
use super::{ApiError, AppState};

pub async fn create(
    State(state): State<AppState>,
    Correlation(correlation_id): Correlation,
    Json(body): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user =
        SqlUserRepository::new(state.db_pool).create(body).await.or_api(&correlation_id)?;

    info!(
        event_name = "user.created",
        correlation_id = %correlation_id,
        user_id = user.id.0,
        "user created"
    );
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn fetch(
    State(state): State<AppState>,
    Correlation(correlation_id): Correlation,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    SqlUserRepository::new(state.db_pool)
        .find_by_id(UserId(id))
        .await
        .or_api(&correlation_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("user {id} does not exist"), &correlation_id))
}
