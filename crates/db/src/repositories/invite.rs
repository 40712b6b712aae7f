use std::collections::BTreeSet;

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use tripgate_core::domain::organization::{
    invite_answer, new_invite_token, normalize_email, InviteBatch, InviteId, InviteStatus,
    MemberRole, OrganizationId, OrganizationInvite, UserId,
};
use tripgate_core::errors::DomainError;
use tripgate_core::pagination::PageRequest;

use super::{decode_err, integrity_violation, parse_timestamp, IntegrityViolation};
use super::{InviteRepository, RepositoryError};
use crate::DbPool;

const INVITE_COLUMNS: &str =
    "i.id, i.organization_id, i.email, i.inviter_id, i.token, i.status, i.created_at, i.updated_at";

pub struct SqlInviteRepository {
    pool: DbPool,
}

impl SqlInviteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_invite(row: &SqliteRow) -> Result<OrganizationInvite, RepositoryError> {
    let status: String = row.try_get("status").map_err(decode_err)?;
    let inviter_id: Option<i64> = row.try_get("inviter_id").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(OrganizationInvite {
        id: InviteId(row.try_get("id").map_err(decode_err)?),
        organization_id: OrganizationId(row.try_get("organization_id").map_err(decode_err)?),
        email: row.try_get("email").map_err(decode_err)?,
        inviter_id: inviter_id.map(UserId),
        token: row.try_get("token").map_err(decode_err)?,
        status: status.parse::<InviteStatus>()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

async fn fetch_by_token(
    conn: &mut SqliteConnection,
    token: &str,
) -> Result<Option<OrganizationInvite>, RepositoryError> {
    let row = sqlx::query(&format!(
        "SELECT {INVITE_COLUMNS} FROM organization_invites i WHERE i.token = ?"
    ))
    .bind(token.trim())
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_invite).transpose()
}

#[async_trait::async_trait]
impl InviteRepository for SqlInviteRepository {
    async fn invite(
        &self,
        organization_id: OrganizationId,
        inviter: UserId,
        emails: &[String],
    ) -> Result<InviteBatch, RepositoryError> {
        let emails = emails
            .iter()
            .map(String::as_str)
            .map(normalize_email)
            .collect::<Result<BTreeSet<_>, _>>()?;
        if emails.is_empty() {
            return Err(DomainError::InvariantViolation(
                "at least one email address is required".to_string(),
            )
            .into());
        }

        let now = Utc::now().to_rfc3339();
        let mut batch = InviteBatch::default();
        let mut tx = self.pool.begin().await?;

        for email in emails {
            let already_member: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM organization_users ou
                               JOIN users u ON u.id = ou.user_id
                               WHERE ou.organization_id = ? AND ou.is_deleted = 0 AND u.email = ?)",
            )
            .bind(organization_id.0)
            .bind(&email)
            .fetch_one(&mut *tx)
            .await?;
            if already_member == 1 {
                batch.already_members.push(email);
                continue;
            }

            // A repeated invite reopens the existing row and keeps its token.
            let upserted = sqlx::query(
                "INSERT INTO organization_invites
                     (organization_id, email, inviter_id, token, status, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (organization_id, email) DO UPDATE
                 SET status = excluded.status, inviter_id = excluded.inviter_id,
                     updated_at = excluded.updated_at",
            )
            .bind(organization_id.0)
            .bind(&email)
            .bind(inviter.0)
            .bind(new_invite_token())
            .bind(InviteStatus::Pending.as_str())
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await;
            if let Err(error) = upserted {
                return Err(match integrity_violation(&error) {
                    Some(IntegrityViolation::ForeignKey) => RepositoryError::NotFound(format!(
                        "organization {organization_id} or user {inviter} does not exist"
                    )),
                    _ => error.into(),
                });
            }

            let row = sqlx::query(&format!(
                "SELECT {INVITE_COLUMNS} FROM organization_invites i
                 WHERE i.organization_id = ? AND i.email = ?"
            ))
            .bind(organization_id.0)
            .bind(&email)
            .fetch_one(&mut *tx)
            .await?;
            batch.invites.push(row_to_invite(&row)?);
        }

        tx.commit().await?;
        Ok(batch)
    }

    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<(Vec<OrganizationInvite>, i64), RepositoryError> {
        let pattern = search
            .map(str::trim)
            .filter(|search| !search.is_empty())
            .map(|search| format!("%{}%", search.to_ascii_lowercase()));

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM organization_invites
             WHERE organization_id = ? AND (? IS NULL OR email LIKE ?)",
        )
        .bind(organization_id.0)
        .bind(pattern.as_deref())
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {INVITE_COLUMNS} FROM organization_invites i
             WHERE i.organization_id = ? AND (? IS NULL OR i.email LIKE ?)
             ORDER BY i.created_at DESC, i.id DESC LIMIT ? OFFSET ?"
        ))
        .bind(organization_id.0)
        .bind(pattern.as_deref())
        .bind(pattern.as_deref())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let invites = rows.iter().map(row_to_invite).collect::<Result<Vec<_>, _>>()?;
        Ok((invites, total))
    }

    async fn list_pending_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<(Vec<OrganizationInvite>, i64), RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM organization_invites i
             JOIN users u ON u.email = i.email
             WHERE u.id = ? AND i.status = ?",
        )
        .bind(user_id.0)
        .bind(InviteStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {INVITE_COLUMNS} FROM organization_invites i
             JOIN users u ON u.email = i.email
             WHERE u.id = ? AND i.status = ?
             ORDER BY i.created_at DESC, i.id DESC LIMIT ? OFFSET ?"
        ))
        .bind(user_id.0)
        .bind(InviteStatus::Pending.as_str())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let invites = rows.iter().map(row_to_invite).collect::<Result<Vec<_>, _>>()?;
        Ok((invites, total))
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<OrganizationInvite>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_token(&mut conn, token).await
    }

    async fn respond(
        &self,
        token: &str,
        user_id: UserId,
        answer: InviteStatus,
    ) -> Result<OrganizationInvite, RepositoryError> {
        let answer = invite_answer(answer)?;
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let invite = fetch_by_token(&mut tx, token)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("invite does not exist".to_string()))?;
        let email: Option<String> = sqlx::query_scalar("SELECT email FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        let email =
            email.ok_or_else(|| RepositoryError::NotFound(format!("user {user_id} does not exist")))?;
        if email != invite.email {
            return Err(RepositoryError::NotAuthorized(format!(
                "invite {} was sent to another address",
                invite.id.0
            )));
        }
        if invite.status != InviteStatus::Pending {
            return Err(RepositoryError::Conflict(format!(
                "invite {} is already {}",
                invite.id.0,
                invite.status.as_str()
            )));
        }

        sqlx::query("UPDATE organization_invites SET status = ?, updated_at = ? WHERE id = ?")
            .bind(answer.as_str())
            .bind(&now)
            .bind(invite.id.0)
            .execute(&mut *tx)
            .await?;
        if answer == InviteStatus::Accepted {
            sqlx::query(
                "INSERT INTO organization_users (organization_id, user_id, role, created_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (organization_id, user_id) DO UPDATE SET is_deleted = 0",
            )
            .bind(invite.organization_id.0)
            .bind(user_id.0)
            .bind(MemberRole::Staff.as_str())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        let answered = fetch_by_token(&mut tx, token)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("invite does not exist".to_string()))?;
        tx.commit().await?;
        Ok(answered)
    }
}
