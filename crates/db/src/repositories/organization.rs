use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tripgate_core::domain::organization::{
    MemberRole, NewOrganization, Organization, OrganizationId, OrganizationMember, UserId,
};
use tripgate_core::errors::DomainError;
use tripgate_core::pagination::PageRequest;

use super::{decode_err, integrity_violation, parse_timestamp, IntegrityViolation};
use super::{OrganizationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrganizationRepository {
    pool: DbPool,
}

impl SqlOrganizationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_organization(row: &SqliteRow) -> Result<Organization, RepositoryError> {
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;
    let created_by: Option<i64> = row.try_get("created_by").map_err(decode_err)?;

    Ok(Organization {
        id: OrganizationId(row.try_get("id").map_err(decode_err)?),
        name: row.try_get("name").map_err(decode_err)?,
        slug: row.try_get("slug").map_err(decode_err)?,
        created_by: created_by.map(UserId),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_member(row: &SqliteRow) -> Result<OrganizationMember, RepositoryError> {
    let role: String = row.try_get("role").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    Ok(OrganizationMember {
        organization_id: OrganizationId(row.try_get("organization_id").map_err(decode_err)?),
        user_id: UserId(row.try_get("user_id").map_err(decode_err)?),
        role: role.parse::<MemberRole>()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl OrganizationRepository for SqlOrganizationRepository {
    async fn create(
        &self,
        organization: NewOrganization,
        creator: UserId,
    ) -> Result<Organization, RepositoryError> {
        if organization.name.trim().is_empty() {
            return Err(DomainError::InvariantViolation("organization name is required".into()).into());
        }
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO organizations (name, slug, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(organization.name.trim())
        .bind(organization.slug.as_deref())
        .bind(creator.0)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await;

        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(error) => {
                return Err(match integrity_violation(&error) {
                    Some(IntegrityViolation::Unique) => RepositoryError::Conflict(
                        "an organization with this slug already exists".to_string(),
                    ),
                    Some(IntegrityViolation::ForeignKey) => {
                        RepositoryError::NotFound(format!("user {creator} does not exist"))
                    }
                    None => error.into(),
                });
            }
        };

        sqlx::query(
            "INSERT INTO organization_users (organization_id, user_id, role, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(creator.0)
        .bind(MemberRole::Manager.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "SELECT id, name, slug, created_by, created_at, updated_at FROM organizations WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let created = row_to_organization(&row)?;

        tx.commit().await?;
        Ok(created)
    }

    async fn find_by_id(&self, id: OrganizationId) -> Result<Option<Organization>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, slug, created_by, created_at, updated_at FROM organizations WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_organization).transpose()
    }

    async fn add_member(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        role: MemberRole,
    ) -> Result<OrganizationMember, RepositoryError> {
        let inserted = sqlx::query(
            "INSERT INTO organization_users (organization_id, user_id, role, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(organization_id.0)
        .bind(user_id.0)
        .bind(role.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        if let Err(error) = inserted {
            return Err(match integrity_violation(&error) {
                Some(IntegrityViolation::Unique) => RepositoryError::Conflict(format!(
                    "user {user_id} is already a member of organization {organization_id}"
                )),
                Some(IntegrityViolation::ForeignKey) => RepositoryError::NotFound(format!(
                    "organization {organization_id} or user {user_id} does not exist"
                )),
                None => error.into(),
            });
        }

        let row = sqlx::query(
            "SELECT organization_id, user_id, role, created_at FROM organization_users
             WHERE organization_id = ? AND user_id = ?",
        )
        .bind(organization_id.0)
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await?;
        row_to_member(&row)
    }

    async fn is_member(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM organization_users
                           WHERE organization_id = ? AND user_id = ? AND is_deleted = 0)",
        )
        .bind(organization_id.0)
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists == 1)
    }

    async fn list_members(
        &self,
        organization_id: OrganizationId,
        page: PageRequest,
    ) -> Result<(Vec<OrganizationMember>, i64), RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM organization_users WHERE organization_id = ? AND is_deleted = 0",
        )
        .bind(organization_id.0)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            "SELECT organization_id, user_id, role, created_at FROM organization_users
             WHERE organization_id = ? AND is_deleted = 0
             ORDER BY id ASC LIMIT ? OFFSET ?",
        )
        .bind(organization_id.0)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let members = rows.iter().map(row_to_member).collect::<Result<Vec<_>, _>>()?;
        Ok((members, total))
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<(Vec<Organization>, i64), RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM organization_users WHERE user_id = ? AND is_deleted = 0",
        )
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            "SELECT o.id, o.name, o.slug, o.created_by, o.created_at, o.updated_at
             FROM organizations o
             JOIN organization_users ou ON ou.organization_id = o.id
             WHERE ou.user_id = ? AND ou.is_deleted = 0
             ORDER BY o.id ASC LIMIT ? OFFSET ?",
        )
        .bind(user_id.0)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let organizations = rows.iter().map(row_to_organization).collect::<Result<Vec<_>, _>>()?;
        Ok((organizations, total))
    }
}
