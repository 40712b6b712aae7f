use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::error::ErrorKind;
use thiserror::Error;

use tripgate_core::domain::approval::ApprovalStatus;
use tripgate_core::domain::comment::{Comment, CommentId, NewComment};
use tripgate_core::domain::group::{
    ApproverAssignment, Group, GroupApprover, GroupId, GroupMember, GroupPatch, NewGroup,
};
use tripgate_core::domain::hotel::{ApprovedHotel, HotelFilter, NewApprovedHotel};
use tripgate_core::domain::organization::{
    InviteBatch, InviteStatus, MemberRole, NewOrganization, NewUser, Organization, OrganizationId,
    OrganizationInvite, OrganizationMember, User, UserId,
};
use tripgate_core::domain::request::{RequestId, TravelRequest, TravelRequestPatch};
use tripgate_core::errors::{ApplicationError, DomainError};
use tripgate_core::pagination::PageRequest;

pub mod analytics;
pub mod audit;
pub mod comment;
pub mod group;
pub mod hotel;
pub mod invite;
pub mod organization;
pub mod request;
pub mod request_approval;
pub mod user;

pub use analytics::SqlAnalyticsRepository;
pub use audit::SqlAuditRepository;
pub use comment::{CommentQuery, SqlCommentRepository};
pub use group::SqlGroupRepository;
pub use hotel::SqlHotelRepository;
pub use invite::SqlInviteRepository;
pub use organization::SqlOrganizationRepository;
pub use request::SqlRequestRepository;
pub use request_approval::SqlRequestApprovalRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotAuthorized(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(message) => Self::NotFound(message),
            RepositoryError::Conflict(message) => Self::Conflict(message),
            RepositoryError::NotAuthorized(message) => Self::Forbidden(message),
            RepositoryError::Domain(error) => Self::Domain(error),
            RepositoryError::Database(error) => Self::Persistence(error.to_string()),
            RepositoryError::Decode(message) => Self::Persistence(message),
        }
    }
}

/// Integrity failures that callers treat as data outcomes rather than faults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegrityViolation {
    Unique,
    ForeignKey,
}

pub fn integrity_violation(error: &sqlx::Error) -> Option<IntegrityViolation> {
    match error.as_database_error()?.kind() {
        ErrorKind::UniqueViolation => Some(IntegrityViolation::Unique),
        ErrorKind::ForeignKeyViolation => Some(IntegrityViolation::ForeignKey),
        _ => None,
    }
}

/// Filters for the request listing. `approver` keeps requests where that user holds a slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub requester: Option<UserId>,
    pub approver: Option<UserId>,
    pub status: Option<ApprovalStatus>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
}

#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn create(
        &self,
        organization: NewOrganization,
        creator: UserId,
    ) -> Result<Organization, RepositoryError>;
    async fn find_by_id(&self, id: OrganizationId) -> Result<Option<Organization>, RepositoryError>;
    async fn add_member(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        role: MemberRole,
    ) -> Result<OrganizationMember, RepositoryError>;
    async fn is_member(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<bool, RepositoryError>;
    async fn list_members(
        &self,
        organization_id: OrganizationId,
        page: PageRequest,
    ) -> Result<(Vec<OrganizationMember>, i64), RepositoryError>;
    /// Organizations the user is a live member of.
    async fn list_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<(Vec<Organization>, i64), RepositoryError>;
}

#[async_trait]
pub trait InviteRepository: Send + Sync {
    async fn invite(
        &self,
        organization_id: OrganizationId,
        inviter: UserId,
        emails: &[String],
    ) -> Result<InviteBatch, RepositoryError>;
    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<(Vec<OrganizationInvite>, i64), RepositoryError>;
    /// Pending invites addressed to the user's email.
    async fn list_pending_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<(Vec<OrganizationInvite>, i64), RepositoryError>;
    async fn find_by_token(&self, token: &str) -> Result<Option<OrganizationInvite>, RepositoryError>;
    /// Accepting adds the user to the organization in the same transaction.
    async fn respond(
        &self,
        token: &str,
        user_id: UserId,
        answer: InviteStatus,
    ) -> Result<OrganizationInvite, RepositoryError>;
}

#[async_trait]
pub trait HotelRepository: Send + Sync {
    async fn create(
        &self,
        hotel: NewApprovedHotel,
        created_by: UserId,
    ) -> Result<ApprovedHotel, RepositoryError>;
    async fn list(
        &self,
        organization_id: OrganizationId,
        filter: HotelFilter,
        page: PageRequest,
    ) -> Result<(Vec<ApprovedHotel>, i64), RepositoryError>;
}

#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn create(&self, group: NewGroup, created_by: UserId) -> Result<Group, RepositoryError>;
    async fn find(
        &self,
        organization_id: OrganizationId,
        id: GroupId,
    ) -> Result<Option<Group>, RepositoryError>;
    async fn list(
        &self,
        organization_id: OrganizationId,
        page: PageRequest,
    ) -> Result<(Vec<Group>, i64), RepositoryError>;
    async fn update(
        &self,
        organization_id: OrganizationId,
        id: GroupId,
        patch: GroupPatch,
    ) -> Result<Group, RepositoryError>;
    async fn soft_delete(
        &self,
        organization_id: OrganizationId,
        id: GroupId,
    ) -> Result<(), RepositoryError>;
    async fn add_members(
        &self,
        group_id: GroupId,
        member_ids: &[UserId],
    ) -> Result<Vec<GroupMember>, RepositoryError>;
    async fn remove_members(
        &self,
        group_id: GroupId,
        member_ids: &[UserId],
    ) -> Result<u64, RepositoryError>;
    async fn list_members(
        &self,
        group_id: GroupId,
        page: PageRequest,
    ) -> Result<(Vec<GroupMember>, i64), RepositoryError>;
    async fn add_approvers(
        &self,
        group_id: GroupId,
        assignments: &[ApproverAssignment],
    ) -> Result<Vec<GroupApprover>, RepositoryError>;
    async fn remove_approvers(
        &self,
        group_id: GroupId,
        approver_ids: &[UserId],
    ) -> Result<u64, RepositoryError>;
    async fn list_approvers(
        &self,
        group_id: GroupId,
        page: PageRequest,
    ) -> Result<(Vec<GroupApprover>, i64), RepositoryError>;
    async fn approvers_for_member(
        &self,
        organization_id: OrganizationId,
        member_id: UserId,
    ) -> Result<Vec<GroupApprover>, RepositoryError>;
    async fn open_requests_count(&self, group_id: GroupId) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find(
        &self,
        organization_id: OrganizationId,
        id: RequestId,
    ) -> Result<Option<TravelRequest>, RepositoryError>;
    async fn list(
        &self,
        organization_id: OrganizationId,
        filter: RequestFilter,
        page: PageRequest,
    ) -> Result<(Vec<TravelRequest>, i64), RepositoryError>;
    async fn update_details(
        &self,
        organization_id: OrganizationId,
        id: RequestId,
        patch: &TravelRequestPatch,
    ) -> Result<TravelRequest, RepositoryError>;
    async fn soft_delete(
        &self,
        organization_id: OrganizationId,
        id: RequestId,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, author: UserId, comment: NewComment) -> Result<Comment, RepositoryError>;
    async fn find(
        &self,
        organization_id: OrganizationId,
        id: CommentId,
    ) -> Result<Option<Comment>, RepositoryError>;
    async fn list(
        &self,
        query: CommentQuery,
        page: PageRequest,
    ) -> Result<(Vec<Comment>, i64), RepositoryError>;
    async fn update_content(
        &self,
        organization_id: OrganizationId,
        id: CommentId,
        author: UserId,
        content: &str,
    ) -> Result<Comment, RepositoryError>;
    async fn delete(
        &self,
        organization_id: OrganizationId,
        id: CommentId,
        author: UserId,
    ) -> Result<(), RepositoryError>;
}

pub(crate) fn decode_err(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{value}`: {error}")))
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|error| RepositoryError::Decode(format!("invalid date `{value}`: {error}")))
}

pub(crate) fn parse_decimal(value: Option<String>) -> Result<Option<Decimal>, RepositoryError> {
    value
        .map(|raw| {
            Decimal::from_str(&raw)
                .map_err(|error| RepositoryError::Decode(format!("invalid decimal `{raw}`: {error}")))
        })
        .transpose()
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use crate::{connect_with_settings, migrations, DbPool};

    pub async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    pub async fn insert_user(pool: &DbPool, id: i64) {
        sqlx::query(
            "INSERT INTO users (id, first_name, last_name, email, date_created) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(format!("User{id}"))
        .bind("Test")
        .bind(format!("user{id}@example.com"))
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .expect("insert user");
    }

    pub async fn insert_organization(pool: &DbPool, id: i64, members: &[i64]) {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO organizations (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(format!("Org {id}"))
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .expect("insert organization");

        for member in members {
            sqlx::query(
                "INSERT INTO organization_users (organization_id, user_id, role, created_at)
                 VALUES (?, ?, 'Staff', ?)",
            )
            .bind(id)
            .bind(member)
            .bind(&now)
            .execute(pool)
            .await
            .expect("insert organization member");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_date, parse_decimal, parse_timestamp, RepositoryError};
    use tripgate_core::errors::ApplicationError;

    #[test]
    fn decoders_reject_malformed_values() {
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_date("2026/01/01").is_err());
        assert!(parse_decimal(Some("abc".to_string())).is_err());
        assert_eq!(parse_decimal(None).expect("none"), None);
    }

    #[test]
    fn repository_errors_map_to_application_errors() {
        let mapped = ApplicationError::from(RepositoryError::NotAuthorized("not yours".to_string()));
        assert_eq!(mapped, ApplicationError::Forbidden("not yours".to_string()));

        let mapped = ApplicationError::from(RepositoryError::Decode("bad row".to_string()));
        assert!(matches!(mapped, ApplicationError::Persistence(_)));
    }
}
