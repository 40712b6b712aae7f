use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use tripgate_core::approvals::{ChainSlot, SkipReason, SlotResult};
use tripgate_core::domain::approval::{ApprovalStatus, RequestApproval, RequestApprovalId};
use tripgate_core::domain::organization::UserId;
use tripgate_core::domain::request::RequestId;

use super::{decode_err, integrity_violation, parse_timestamp, IntegrityViolation, RepositoryError};
use crate::DbPool;

const APPROVAL_COLUMNS: &str =
    "id, request_id, approver_id, position, status, date_created, last_updated";

/// Read access to approval slots outside the decision path.
pub struct SqlRequestApprovalRepository {
    pool: DbPool,
}

impl SqlRequestApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_request(
        &self,
        request_id: RequestId,
    ) -> Result<Vec<RequestApproval>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        list_for_request(&mut conn, request_id).await
    }
}

fn row_to_approval(row: &SqliteRow) -> Result<RequestApproval, RepositoryError> {
    let status: String = row.try_get("status").map_err(decode_err)?;
    let date_created: String = row.try_get("date_created").map_err(decode_err)?;
    let last_updated: String = row.try_get("last_updated").map_err(decode_err)?;

    Ok(RequestApproval {
        id: RequestApprovalId(row.try_get("id").map_err(decode_err)?),
        request_id: RequestId(row.try_get("request_id").map_err(decode_err)?),
        approver_id: UserId(row.try_get("approver_id").map_err(decode_err)?),
        position: row.try_get("position").map_err(decode_err)?,
        status: status.parse::<ApprovalStatus>()?,
        date_created: parse_timestamp(&date_created)?,
        last_updated: parse_timestamp(&last_updated)?,
    })
}

/// Inserts one pending slot. Unique and foreign-key failures become skips; SQLite aborts
/// only the failing statement, so an enclosing transaction stays usable.
pub async fn insert_slot(
    conn: &mut SqliteConnection,
    request_id: RequestId,
    slot: &ChainSlot,
    now: DateTime<Utc>,
) -> Result<SlotResult, RepositoryError> {
    let now = now.to_rfc3339();
    let inserted = sqlx::query(
        "INSERT INTO request_approvals (request_id, approver_id, position, status, date_created,
                                        last_updated)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(request_id.0)
    .bind(slot.approver_id.0)
    .bind(slot.position)
    .bind(ApprovalStatus::Pending.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(result) => Ok(SlotResult::Created(RequestApprovalId(result.last_insert_rowid()))),
        Err(error) => match integrity_violation(&error) {
            Some(IntegrityViolation::Unique) => Ok(SlotResult::Skipped(SkipReason::Duplicate)),
            Some(IntegrityViolation::ForeignKey) => {
                Ok(SlotResult::Skipped(SkipReason::UnknownApprover))
            }
            None => Err(error.into()),
        },
    }
}

/// The chain of a request ordered by row id.
pub async fn list_for_request(
    conn: &mut SqliteConnection,
    request_id: RequestId,
) -> Result<Vec<RequestApproval>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {APPROVAL_COLUMNS} FROM request_approvals WHERE request_id = ? ORDER BY id ASC"
    ))
    .bind(request_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_approval).collect()
}

pub async fn set_status(
    conn: &mut SqliteConnection,
    id: RequestApprovalId,
    status: ApprovalStatus,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    let result =
        sqlx::query("UPDATE request_approvals SET status = ?, last_updated = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now.to_rfc3339())
            .bind(id.0)
            .execute(&mut *conn)
            .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound(format!("approval slot {} does not exist", id.0)));
    }
    Ok(())
}
