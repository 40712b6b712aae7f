use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tripgate_core::analytics::{
    DateWindow, DepartmentSpend, OrganizationSummary, PlaceStat, RequesterStat, TravellerStat,
};
use tripgate_db::repositories::SqlAnalyticsRepository;

use super::context::Member;
use super::error::OrApiError;
use super::{ApiError, AppState};

/// Inclusive window on request creation dates; either bound may be left open.
#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

pub async fn summary(
    State(state): State<AppState>,
    member: Member,
    Query(query): Query<WindowQuery>,
) -> Result<Json<OrganizationSummary>, ApiError> {
    let window = DateWindow::new(query.start, query.end).or_api(&member.correlation_id)?;
    let summary = SqlAnalyticsRepository::new(state.db_pool)
        .summary(member.organization_id, &window)
        .await
        .or_api(&member.correlation_id)?;
    Ok(Json(summary))
}

pub async fn departments(
    State(state): State<AppState>,
    member: Member,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<DepartmentSpend>>, ApiError> {
    let window = DateWindow::new(query.start, query.end).or_api(&member.correlation_id)?;
    let spend = SqlAnalyticsRepository::new(state.db_pool)
        .department_spend(member.organization_id, &window)
        .await
        .or_api(&member.correlation_id)?;
    Ok(Json(spend))
}

pub async fn top_travellers(
    State(state): State<AppState>,
    member: Member,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<TravellerStat>>, ApiError> {
    let window = DateWindow::new(query.start, query.end).or_api(&member.correlation_id)?;
    let ranked = SqlAnalyticsRepository::new(state.db_pool)
        .top_travellers(member.organization_id, &window)
        .await
        .or_api(&member.correlation_id)?;
    Ok(Json(ranked))
}

pub async fn top_requesters(
    State(state): State<AppState>,
    member: Member,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<RequesterStat>>, ApiError> {
    let window = DateWindow::new(query.start, query.end).or_api(&member.correlation_id)?;
    let ranked = SqlAnalyticsRepository::new(state.db_pool)
        .top_requesters(member.organization_id, &window)
        .await
        .or_api(&member.correlation_id)?;
    Ok(Json(ranked))
}

pub async fn top_hotels(
    State(state): State<AppState>,
    member: Member,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<PlaceStat>>, ApiError> {
    let window = DateWindow::new(query.start, query.end).or_api(&member.correlation_id)?;
    let ranked = SqlAnalyticsRepository::new(state.db_pool)
        .top_hotels(member.organization_id, &window)
        .await
        .or_api(&member.correlation_id)?;
    Ok(Json(ranked))
}

pub async fn top_destinations(
    State(state): State<AppState>,
    member: Member,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<PlaceStat>>, ApiError> {
    let window = DateWindow::new(query.start, query.end).or_api(&member.correlation_id)?;
    let ranked = SqlAnalyticsRepository::new(state.db_pool)
        .top_destinations(member.organization_id, &window)
        .await
        .or_api(&member.correlation_id)?;
    Ok(Json(ranked))
}

/// The caller's group mates and their approved travel.
pub async fn coworkers(
    State(state): State<AppState>,
    member: Member,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<TravellerStat>>, ApiError> {
    let window = DateWindow::new(query.start, query.end).or_api(&member.correlation_id)?;
    let ranked = SqlAnalyticsRepository::new(state.db_pool)
        .coworkers(member.organization_id, member.user_id, &window)
        .await
        .or_api(&member.correlation_id)?;
    Ok(Json(ranked))
}
