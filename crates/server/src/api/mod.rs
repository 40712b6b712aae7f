//! JSON API under `/v1`.
//!
//! Organization-scoped routes resolve a [`context::Member`]: the caller from `x-actor-id`, the
//! organization from `x-organization-id`, and a membership check (403 otherwise). Every error
//! body is `{error, correlation_id}`.

mod analytics;
mod comments;
mod context;
mod error;
mod groups;
mod hotels;
mod invites;
mod organizations;
mod requests;
mod users;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tripgate_core::config::PaginationConfig;
use tripgate_core::pagination::{PageQuery, PageRequest};
use tripgate_db::{ApprovalWorkflow, DbPool};

pub use error::ApiError;

use crate::health;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub workflow: ApprovalWorkflow,
    pub pagination: PaginationConfig,
}

impl AppState {
    pub fn page(&self, query: PageQuery) -> PageRequest {
        PageRequest::normalize(query, &self.pagination)
    }
}

/// Health check plus the `/v1` API, traced per request.
pub fn app(state: AppState) -> Router {
    health::router(state.db_pool.clone()).merge(router(state)).layer(TraceLayer::new_for_http())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/users", post(users::create))
        .route("/v1/users/{id}", get(users::fetch))
        .route("/v1/organizations", get(organizations::list_mine).post(organizations::create))
        .route("/v1/organizations/{id}", get(organizations::fetch))
        .route(
            "/v1/organizations/{id}/members",
            get(organizations::list_members).post(organizations::add_member),
        )
        .route(
            "/v1/organizations/{id}/invites",
            get(invites::list_for_organization).post(invites::create),
        )
        .route("/v1/invites", get(invites::list_mine))
        .route("/v1/invites/{token}", get(invites::fetch).put(invites::respond))
        .route("/v1/groups", get(groups::list).post(groups::create))
        .route("/v1/groups/{id}", get(groups::fetch).put(groups::update).delete(groups::delete))
        .route("/v1/groups/{id}/members", get(groups::list_members))
        .route("/v1/groups/{id}/members/add", post(groups::add_members))
        .route("/v1/groups/{id}/members/remove", post(groups::remove_members))
        .route("/v1/groups/{id}/approvers", get(groups::list_approvers))
        .route("/v1/groups/{id}/approvers/add", post(groups::add_approvers))
        .route("/v1/groups/{id}/approvers/remove", post(groups::remove_approvers))
        .route("/v1/requests", get(requests::list).post(requests::create))
        .route(
            "/v1/requests/{id}",
            get(requests::fetch).put(requests::update).delete(requests::delete),
        )
        .route("/v1/requests/{id}/approvals", get(requests::approvals))
        .route("/v1/comments", get(comments::list).post(comments::create))
        .route(
            "/v1/comments/{id}",
            get(comments::fetch).put(comments::update).delete(comments::delete),
        )
        .route("/v1/analytics/summary", get(analytics::summary))
        .route("/v1/analytics/departments", get(analytics::departments))
        .route("/v1/analytics/top-travellers", get(analytics::top_travellers))
        .route("/v1/analytics/top-requesters", get(analytics::top_requesters))
        .route("/v1/analytics/top-hotels", get(analytics::top_hotels))
        .route("/v1/analytics/top-destinations", get(analytics::top_destinations))
        .route("/v1/analytics/coworkers", get(analytics::coworkers))
        .route("/v1/hotels", get(hotels::list).post(hotels::create))
        .with_state(state)
}
