use std::collections::BTreeMap;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use tripgate_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use tripgate_core::domain::organization::OrganizationId;
use tripgate_core::domain::request::RequestId;

use super::{decode_err, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Appends an audit event on the caller's connection so it commits with the change it
/// describes.
pub async fn append(conn: &mut SqliteConnection, event: &AuditEvent) -> Result<(), RepositoryError> {
    let metadata_json = serde_json::to_string(&event.metadata)
        .map_err(|error| RepositoryError::Decode(format!("audit metadata: {error}")))?;

    sqlx::query(
        r#"
        INSERT INTO audit_event (
            id, organization_id, request_id, correlation_id, event_type, category,
            actor, outcome, metadata_json, occurred_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.event_id)
    .bind(event.organization_id.map(|id| id.0))
    .bind(event.request_id.map(|id| id.0))
    .bind(&event.correlation_id)
    .bind(&event.event_type)
    .bind(event.category.as_str())
    .bind(&event.actor)
    .bind(event.outcome.as_str())
    .bind(metadata_json)
    .bind(event.occurred_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn row_to_event(row: &SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let organization_id: Option<i64> = row.try_get("organization_id").map_err(decode_err)?;
    let request_id: Option<i64> = row.try_get("request_id").map_err(decode_err)?;
    let category: String = row.try_get("category").map_err(decode_err)?;
    let outcome: String = row.try_get("outcome").map_err(decode_err)?;
    let metadata_json: String = row.try_get("metadata_json").map_err(decode_err)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(decode_err)?;

    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|error| RepositoryError::Decode(format!("audit metadata: {error}")))?;

    Ok(AuditEvent {
        event_id: row.try_get("id").map_err(decode_err)?,
        organization_id: organization_id.map(OrganizationId),
        request_id: request_id.map(RequestId),
        correlation_id: row.try_get("correlation_id").map_err(decode_err)?,
        event_type: row.try_get("event_type").map_err(decode_err)?,
        category: category.parse::<AuditCategory>()?,
        actor: row.try_get("actor").map_err(decode_err)?,
        outcome: outcome.parse::<AuditOutcome>()?,
        metadata,
        occurred_at: parse_timestamp(&occurred_at)?,
    })
}

pub struct SqlAuditRepository {
    pool: DbPool,
}

impl SqlAuditRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Audit trail of one request, oldest first.
    pub async fn list_for_request(
        &self,
        request_id: RequestId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, organization_id, request_id, correlation_id, event_type, category,
                   actor, outcome, metadata_json, occurred_at
            FROM audit_event
            WHERE request_id = ?
            ORDER BY occurred_at ASC, rowid ASC
            "#,
        )
        .bind(request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

#[cfg(test)]
mod tests {
    use tripgate_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
    use tripgate_core::domain::organization::OrganizationId;
    use tripgate_core::domain::request::RequestId;

    use super::{append, SqlAuditRepository};
    use crate::repositories::test_support;

    #[tokio::test]
    async fn appended_events_are_listed_per_request() {
        let pool = test_support::pool().await;
        let event = AuditEvent::new(
            Some(RequestId(4)),
            "corr-1",
            "request.created",
            AuditCategory::Request,
            "7",
            AuditOutcome::Success,
        )
        .in_organization(OrganizationId(2))
        .with_metadata("hotel", "Eko");
        let other = AuditEvent::new(
            Some(RequestId(5)),
            "corr-2",
            "request.created",
            AuditCategory::Request,
            "7",
            AuditOutcome::Success,
        );

        let mut conn = pool.acquire().await.expect("conn");
        append(&mut conn, &event).await.expect("append");
        append(&mut conn, &other).await.expect("append other");
        drop(conn);

        let trail = SqlAuditRepository::new(pool).list_for_request(RequestId(4)).await.expect("trail");
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].event_id, event.event_id);
        assert_eq!(trail[0].organization_id, Some(OrganizationId(2)));
        assert_eq!(trail[0].metadata.get("hotel").map(String::as_str), Some("Eko"));
    }
}
