use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use tripgate_core::domain::approval::ApprovalStatus;
use tripgate_core::domain::organization::{OrganizationId, UserId};
use tripgate_core::domain::request::{NewTravelRequest, RequestId, TravelRequest, TravelRequestPatch};
use tripgate_core::pagination::PageRequest;

use super::{decode_err, parse_date, parse_decimal, parse_timestamp};
use super::{RepositoryError, RequestFilter, RequestRepository};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const REQUEST_COLUMNS: &str = "id, organization_id, requester_id, country, state, city,
     start_date, end_date, purpose, hotel, room, rate, meal, transport, other_requests, rejection_reason,
     status, date_created, last_updated, is_deleted";

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_request(row: &SqliteRow) -> Result<TravelRequest, RepositoryError> {
    let start: String = row.try_get("start_date").map_err(decode_err)?;
    let end: String = row.try_get("end_date").map_err(decode_err)?;
    let rate: Option<String> = row.try_get("rate").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let date_created: String = row.try_get("date_created").map_err(decode_err)?;
    let last_updated: String = row.try_get("last_updated").map_err(decode_err)?;

    Ok(TravelRequest {
        id: RequestId(row.try_get("id").map_err(decode_err)?),
        organization_id: OrganizationId(row.try_get("organization_id").map_err(decode_err)?),
        requester_id: UserId(row.try_get("requester_id").map_err(decode_err)?),
        country: row.try_get("country").map_err(decode_err)?,
        state: row.try_get("state").map_err(decode_err)?,
        city: row.try_get("city").map_err(decode_err)?,
        start: parse_date(&start)?,
        end: parse_date(&end)?,
        purpose: row.try_get("purpose").map_err(decode_err)?,
        hotel: row.try_get("hotel").map_err(decode_err)?,
        room: row.try_get("room").map_err(decode_err)?,
        rate: parse_decimal(rate)?,
        meal: row.try_get("meal").map_err(decode_err)?,
        transport: row.try_get("transport").map_err(decode_err)?,
        other_requests: row.try_get("other_requests").map_err(decode_err)?,
        rejection_reason: row.try_get("rejection_reason").map_err(decode_err)?,
        status: status.parse::<ApprovalStatus>()?,
        date_created: parse_timestamp(&date_created)?,
        last_updated: parse_timestamp(&last_updated)?,
        is_deleted: row.try_get("is_deleted").map_err(decode_err)?,
    })
}

/// Inserts a pending request on the caller's connection, usually inside the transaction
/// that also materializes its approval chain.
pub async fn insert(
    conn: &mut SqliteConnection,
    request: &NewTravelRequest,
    now: DateTime<Utc>,
) -> Result<RequestId, RepositoryError> {
    request.validate()?;
    let now = now.to_rfc3339();

    let result = sqlx::query(
        "INSERT INTO requests (organization_id, requester_id, country, state, city, start_date,
                               end_date, purpose, hotel, room, rate, meal, transport,
                               other_requests, status, date_created, last_updated)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(request.organization_id.0)
    .bind(request.requester_id.0)
    .bind(request.country.as_deref())
    .bind(request.state.trim())
    .bind(request.city.trim())
    .bind(request.start.format(DATE_FORMAT).to_string())
    .bind(request.end.format(DATE_FORMAT).to_string())
    .bind(request.purpose.as_deref())
    .bind(request.hotel.as_deref())
    .bind(request.room.as_deref())
    .bind(request.rate.map(|rate| rate.to_string()))
    .bind(request.meal.as_deref())
    .bind(request.transport.as_deref())
    .bind(request.other_requests.as_deref())
    .bind(ApprovalStatus::Pending.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(RequestId(result.last_insert_rowid()))
}

/// Takes SQLite's write lock for the request row by issuing a no-op update. Returns `false`
/// when the request does not exist or is deleted.
pub async fn touch_for_update(
    conn: &mut SqliteConnection,
    id: RequestId,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "UPDATE requests SET last_updated = last_updated WHERE id = ? AND is_deleted = 0",
    )
    .bind(id.0)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn fetch(
    conn: &mut SqliteConnection,
    id: RequestId,
) -> Result<Option<TravelRequest>, RepositoryError> {
    let row = sqlx::query(&format!(
        "SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ? AND is_deleted = 0"
    ))
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_request).transpose()
}

pub async fn set_status(
    conn: &mut SqliteConnection,
    id: RequestId,
    status: ApprovalStatus,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE requests SET status = ?, last_updated = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(now.to_rfc3339())
        .bind(id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Persists the editable trip fields of an already patched request.
pub async fn write_details(
    conn: &mut SqliteConnection,
    request: &TravelRequest,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE requests
         SET state = ?, city = ?, start_date = ?, end_date = ?, purpose = ?, hotel = ?,
             room = ?, rate = ?, meal = ?, transport = ?, other_requests = ?, last_updated = ?
         WHERE id = ?",
    )
    .bind(&request.state)
    .bind(&request.city)
    .bind(request.start.format(DATE_FORMAT).to_string())
    .bind(request.end.format(DATE_FORMAT).to_string())
    .bind(request.purpose.as_deref())
    .bind(request.hotel.as_deref())
    .bind(request.room.as_deref())
    .bind(request.rate.map(|rate| rate.to_string()))
    .bind(request.meal.as_deref())
    .bind(request.transport.as_deref())
    .bind(request.other_requests.as_deref())
    .bind(request.last_updated.to_rfc3339())
    .bind(request.id.0)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn push_filters<'q>(
    query: &mut QueryBuilder<'q, Sqlite>,
    organization_id: OrganizationId,
    filter: RequestFilter,
) {
    query.push(" WHERE r.is_deleted = 0 AND r.organization_id = ");
    query.push_bind(organization_id.0);
    if let Some(requester) = filter.requester {
        query.push(" AND r.requester_id = ");
        query.push_bind(requester.0);
    }
    if let Some(status) = filter.status {
        query.push(" AND r.status = ");
        query.push_bind(status.as_str());
    }
    if let Some(approver) = filter.approver {
        query.push(
            " AND EXISTS (SELECT 1 FROM request_approvals ra
                          WHERE ra.request_id = r.id AND ra.approver_id = ",
        );
        query.push_bind(approver.0);
        query.push(")");
    }
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find(
        &self,
        organization_id: OrganizationId,
        id: RequestId,
    ) -> Result<Option<TravelRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests
             WHERE id = ? AND organization_id = ? AND is_deleted = 0"
        ))
        .bind(id.0)
        .bind(organization_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn list(
        &self,
        organization_id: OrganizationId,
        filter: RequestFilter,
        page: PageRequest,
    ) -> Result<(Vec<TravelRequest>, i64), RepositoryError> {
        let mut count: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM requests r");
        push_filters(&mut count, organization_id, filter);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let columns = REQUEST_COLUMNS
            .split(',')
            .map(|column| format!("r.{}", column.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut select: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {columns} FROM requests r"));
        push_filters(&mut select, organization_id, filter);
        select.push(" ORDER BY r.date_created DESC, r.id DESC LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());

        let rows = select.build().fetch_all(&self.pool).await?;
        let requests = rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()?;
        Ok((requests, total))
    }

    async fn update_details(
        &self,
        organization_id: OrganizationId,
        id: RequestId,
        patch: &TravelRequestPatch,
    ) -> Result<TravelRequest, RepositoryError> {
        let mut request = self
            .find(organization_id, id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("request {id} does not exist")))?;
        patch.apply(&mut request, Utc::now())?;

        let mut conn = self.pool.acquire().await?;
        write_details(&mut conn, &request).await?;
        Ok(request)
    }

    async fn soft_delete(
        &self,
        organization_id: OrganizationId,
        id: RequestId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE requests SET is_deleted = 1, last_updated = ?
             WHERE id = ? AND organization_id = ? AND is_deleted = 0",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .bind(organization_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("request {id} does not exist")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;

    use tripgate_core::domain::approval::ApprovalStatus;
    use tripgate_core::domain::organization::{OrganizationId, UserId};
    use tripgate_core::domain::request::{NewTravelRequest, RequestId, TravelRequestPatch};
    use tripgate_core::errors::DomainError;
    use tripgate_core::pagination::PageRequest;

    use super::{fetch, insert, set_status, touch_for_update, SqlRequestRepository};
    use crate::repositories::{test_support, RepositoryError, RequestFilter, RequestRepository};
    use crate::DbPool;

    const PAGE: PageRequest = PageRequest { page: 1, size: 20 };

    fn new_request(requester: i64) -> NewTravelRequest {
        NewTravelRequest {
            organization_id: OrganizationId(1),
            requester_id: UserId(requester),
            country: Some("Nigeria".to_string()),
            state: "Lagos".to_string(),
            city: "Ikeja".to_string(),
            start: NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"),
            end: NaiveDate::from_ymd_opt(2026, 3, 4).expect("date"),
            purpose: Some("Client visit".to_string()),
            hotel: Some("Eko Hotel".to_string()),
            room: None,
            rate: Some(Decimal::from_str("120.50").expect("decimal")),
            meal: None,
            transport: None,
            other_requests: None,
        }
    }

    async fn setup() -> DbPool {
        let pool = test_support::pool().await;
        for id in 1..=3 {
            test_support::insert_user(&pool, id).await;
        }
        test_support::insert_organization(&pool, 1, &[1, 2, 3]).await;
        test_support::insert_organization(&pool, 2, &[1]).await;
        pool
    }

    #[tokio::test]
    async fn inserted_request_starts_pending_and_keeps_its_rate() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.expect("conn");

        let id = insert(&mut conn, &new_request(1), Utc::now()).await.expect("insert");
        let stored = fetch(&mut conn, id).await.expect("fetch").expect("exists");

        assert_eq!(stored.status, ApprovalStatus::Pending);
        assert_eq!(stored.rate, Some(Decimal::from_str("120.50").expect("decimal")));
        assert_eq!(stored.nights(), 3);
    }

    #[tokio::test]
    async fn touch_reports_missing_requests() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.expect("conn");
        let id = insert(&mut conn, &new_request(1), Utc::now()).await.expect("insert");

        assert!(touch_for_update(&mut conn, id).await.expect("touch"));
        assert!(!touch_for_update(&mut conn, RequestId(404)).await.expect("touch"));
    }

    #[tokio::test]
    async fn list_filters_by_requester_status_and_approver() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.expect("conn");
        let base = Utc::now();
        let first = insert(&mut conn, &new_request(1), base).await.expect("first");
        let second =
            insert(&mut conn, &new_request(2), base + Duration::seconds(1)).await.expect("second");
        set_status(&mut conn, second, ApprovalStatus::Approved, base).await.expect("status");
        sqlx::query(
            "INSERT INTO request_approvals (request_id, approver_id, position, date_created, last_updated)
             VALUES (?, 3, 1, ?, ?)",
        )
        .bind(first.0)
        .bind(base.to_rfc3339())
        .bind(base.to_rfc3339())
        .execute(&mut *conn)
        .await
        .expect("slot");
        drop(conn);

        let repo = SqlRequestRepository::new(pool);
        let (all, total) =
            repo.list(OrganizationId(1), RequestFilter::default(), PAGE).await.expect("all");
        assert_eq!(total, 2);
        assert_eq!(all[0].id, second, "newest first");

        let filter = RequestFilter { requester: Some(UserId(1)), ..RequestFilter::default() };
        let (mine, _) = repo.list(OrganizationId(1), filter, PAGE).await.expect("mine");
        assert_eq!(mine.iter().map(|request| request.id).collect::<Vec<_>>(), vec![first]);

        let filter =
            RequestFilter { status: Some(ApprovalStatus::Approved), ..RequestFilter::default() };
        let (approved, _) = repo.list(OrganizationId(1), filter, PAGE).await.expect("approved");
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, second);

        let filter = RequestFilter { approver: Some(UserId(3)), ..RequestFilter::default() };
        let (to_review, _) = repo.list(OrganizationId(1), filter, PAGE).await.expect("review");
        assert_eq!(to_review.len(), 1);
        assert_eq!(to_review[0].id, first);

        let (other_org, other_total) =
            repo.list(OrganizationId(2), RequestFilter::default(), PAGE).await.expect("other");
        assert!(other_org.is_empty());
        assert_eq!(other_total, 0);
    }

    #[tokio::test]
    async fn update_details_rejects_inverted_dates() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.expect("conn");
        let id = insert(&mut conn, &new_request(1), Utc::now()).await.expect("insert");
        drop(conn);
        let repo = SqlRequestRepository::new(pool);

        let patch = TravelRequestPatch {
            end: NaiveDate::from_ymd_opt(2026, 2, 1),
            ..TravelRequestPatch::default()
        };
        let error = repo.update_details(OrganizationId(1), id, &patch).await.expect_err("range");
        assert!(matches!(error, RepositoryError::Domain(DomainError::InvalidDateRange { .. })));

        let patch =
            TravelRequestPatch { hotel: Some("Radisson".to_string()), ..TravelRequestPatch::default() };
        let updated = repo.update_details(OrganizationId(1), id, &patch).await.expect("update");
        assert_eq!(updated.hotel.as_deref(), Some("Radisson"));
        assert_eq!(updated.city, "Ikeja");

        let reloaded = repo.find(OrganizationId(1), id).await.expect("find").expect("exists");
        assert_eq!(reloaded.hotel.as_deref(), Some("Radisson"));
    }

    #[tokio::test]
    async fn soft_delete_hides_request_from_other_organizations_and_reads() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.expect("conn");
        let id = insert(&mut conn, &new_request(1), Utc::now()).await.expect("insert");
        drop(conn);
        let repo = SqlRequestRepository::new(pool);

        assert!(matches!(
            repo.soft_delete(OrganizationId(2), id).await,
            Err(RepositoryError::NotFound(_))
        ));
        repo.soft_delete(OrganizationId(1), id).await.expect("delete");
        assert!(repo.find(OrganizationId(1), id).await.expect("find").is_none());
        let (listed, _) =
            repo.list(OrganizationId(1), RequestFilter::default(), PAGE).await.expect("list");
        assert!(listed.is_empty());
    }
}
