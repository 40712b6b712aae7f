//! Caller identity and organization scope, read from request headers.
//!
//! Authentication is out of scope; the caller's user id arrives in `x-actor-id`. The
//! organization comes from `x-organization-id`, falling back to an `organization_id` query
//! parameter.

use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::Deserialize;
use tripgate_core::domain::organization::{OrganizationId, UserId};
use tripgate_db::repositories::{OrganizationRepository, SqlOrganizationRepository};
use uuid::Uuid;

use super::{error::OrApiError, ApiError, AppState};

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Correlation id for logs and error bodies: the caller's `x-correlation-id`, or a fresh one.
#[derive(Clone, Debug)]
pub struct Correlation(pub String);

impl<S> FromRequestParts<S> for Correlation
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(correlation_id(parts)))
    }
}

/// An identified caller, not yet tied to an organization.
#[derive(Clone, Debug)]
pub struct Caller {
    pub user_id: UserId,
    pub correlation_id: String,
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(parts);
        let user_id = header_id(parts, ACTOR_HEADER, &correlation_id)?.ok_or_else(|| {
            ApiError::bad_request("x-actor-id header is required", &correlation_id)
        })?;
        Ok(Self { user_id: UserId(user_id), correlation_id })
    }
}

impl Caller {
    /// Fails with 403 unless the caller belongs to `organization_id`.
    pub async fn require_member(
        &self,
        state: &AppState,
        organization_id: OrganizationId,
    ) -> Result<(), ApiError> {
        let member = SqlOrganizationRepository::new(state.db_pool.clone())
            .is_member(organization_id, self.user_id)
            .await
            .or_api(&self.correlation_id)?;
        if member {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                format!("user {} is not a member of organization {organization_id}", self.user_id),
                &self.correlation_id,
            ))
        }
    }
}

/// A caller acting inside an organization they belong to.
#[derive(Clone, Debug)]
pub struct Member {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub correlation_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct OrganizationQuery {
    organization_id: Option<i64>,
}

impl FromRequestParts<AppState> for Member {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let caller = Caller::from_request_parts(parts, state).await?;
        let correlation_id = caller.correlation_id.clone();

        let from_header = header_id(parts, ORGANIZATION_HEADER, &correlation_id)?;
        let organization_id = match from_header {
            Some(id) => id,
            None => Query::<OrganizationQuery>::try_from_uri(&parts.uri)
                .map_err(|rejection| {
                    ApiError::bad_request(rejection.body_text(), &correlation_id)
                })?
                .0
                .organization_id
                .ok_or_else(|| {
                    ApiError::bad_request(
                        "x-organization-id header or organization_id query parameter is required",
                        &correlation_id,
                    )
                })?,
        };
        let organization_id = OrganizationId(organization_id);

        caller.require_member(state, organization_id).await?;
        Ok(Self { user_id: caller.user_id, organization_id, correlation_id })
    }
}

fn correlation_id(parts: &Parts) -> String {
    parts
        .headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4()))
}

fn header_id(parts: &Parts, name: &str, correlation_id: &str) -> Result<Option<i64>, ApiError> {
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(Some)
        .ok_or_else(|| {
            ApiError::bad_request(format!("{name} must be an integer id"), correlation_id)
        })
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::{correlation_id, header_id, ACTOR_HEADER, CORRELATION_HEADER};

    #[test]
    fn correlation_id_is_taken_from_the_header_or_generated() {
        let request = Request::builder().header(CORRELATION_HEADER, "abc-1").body(());
        let (parts, ()) = request.expect("request").into_parts();
        assert_eq!(correlation_id(&parts), "abc-1");

        let (parts, ()) = Request::builder().body(()).expect("request").into_parts();
        assert!(correlation_id(&parts).starts_with("req-"));
    }

    #[test]
    fn header_ids_must_be_integers() {
        let request = Request::builder().header(ACTOR_HEADER, " 42 ").body(());
        let (parts, ()) = request.expect("request").into_parts();
        assert_eq!(header_id(&parts, ACTOR_HEADER, "c").expect("parsed"), Some(42));

        let request = Request::builder().header(ACTOR_HEADER, "ada").body(());
        let (parts, ()) = request.expect("request").into_parts();
        assert!(header_id(&parts, ACTOR_HEADER, "c").is_err());

        let (parts, ()) = Request::builder().body(()).expect("request").into_parts();
        assert_eq!(header_id(&parts, ACTOR_HEADER, "c").expect("absent"), None);
    }
}
