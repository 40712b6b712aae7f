use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use tripgate_core::domain::hotel::{ApprovedHotel, HotelFilter, HotelId, NewApprovedHotel};
use tripgate_core::domain::organization::{OrganizationId, UserId};
use tripgate_core::pagination::PageRequest;

use super::{decode_err, integrity_violation, parse_timestamp, IntegrityViolation};
use super::{HotelRepository, RepositoryError};
use crate::DbPool;

const HOTEL_COLUMNS: &str =
    "id, organization_id, name, country, state, city, created_by, date_created, last_updated";

pub struct SqlHotelRepository {
    pool: DbPool,
}

impl SqlHotelRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_hotel(row: &SqliteRow) -> Result<ApprovedHotel, RepositoryError> {
    let created_by: Option<i64> = row.try_get("created_by").map_err(decode_err)?;
    let date_created: String = row.try_get("date_created").map_err(decode_err)?;
    let last_updated: String = row.try_get("last_updated").map_err(decode_err)?;

    Ok(ApprovedHotel {
        id: HotelId(row.try_get("id").map_err(decode_err)?),
        organization_id: OrganizationId(row.try_get("organization_id").map_err(decode_err)?),
        name: row.try_get("name").map_err(decode_err)?,
        country: row.try_get("country").map_err(decode_err)?,
        state: row.try_get("state").map_err(decode_err)?,
        city: row.try_get("city").map_err(decode_err)?,
        created_by: created_by.map(UserId),
        date_created: parse_timestamp(&date_created)?,
        last_updated: parse_timestamp(&last_updated)?,
    })
}

fn push_filters<'q>(
    query: &mut QueryBuilder<'q, Sqlite>,
    organization_id: OrganizationId,
    filter: &'q HotelFilter,
) {
    query.push(" WHERE is_deleted = 0 AND organization_id = ");
    query.push_bind(organization_id.0);
    let columns = [("country", &filter.country), ("state", &filter.state), ("city", &filter.city)];
    for (column, value) in columns {
        if let Some(value) = value {
            query.push(format!(" AND {column} = "));
            query.push_bind(value.as_str());
            query.push(" COLLATE NOCASE");
        }
    }
}

#[async_trait::async_trait]
impl HotelRepository for SqlHotelRepository {
    async fn create(
        &self,
        hotel: NewApprovedHotel,
        created_by: UserId,
    ) -> Result<ApprovedHotel, RepositoryError> {
        let hotel = hotel.normalized()?;
        let now = Utc::now().to_rfc3339();

        let inserted = sqlx::query(
            "INSERT INTO approved_hotels (organization_id, name, country, state, city, created_by,
                                          date_created, last_updated)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(hotel.organization_id.0)
        .bind(&hotel.name)
        .bind(&hotel.country)
        .bind(&hotel.state)
        .bind(&hotel.city)
        .bind(created_by.0)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(error) => {
                return Err(match integrity_violation(&error) {
                    Some(IntegrityViolation::Unique) => RepositoryError::Conflict(format!(
                        "{} in {}, {} is already approved",
                        hotel.name, hotel.city, hotel.state
                    )),
                    Some(IntegrityViolation::ForeignKey) => RepositoryError::NotFound(format!(
                        "organization {} does not exist",
                        hotel.organization_id
                    )),
                    None => error.into(),
                });
            }
        };

        let row = sqlx::query(&format!("SELECT {HOTEL_COLUMNS} FROM approved_hotels WHERE id = ?"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        row_to_hotel(&row)
    }

    async fn list(
        &self,
        organization_id: OrganizationId,
        filter: HotelFilter,
        page: PageRequest,
    ) -> Result<(Vec<ApprovedHotel>, i64), RepositoryError> {
        let filter = filter.normalized();

        let mut count: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM approved_hotels");
        push_filters(&mut count, organization_id, &filter);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {HOTEL_COLUMNS} FROM approved_hotels"));
        push_filters(&mut select, organization_id, &filter);
        select.push(" ORDER BY name ASC, id ASC LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());

        let rows = select.build().fetch_all(&self.pool).await?;
        let hotels = rows.iter().map(row_to_hotel).collect::<Result<Vec<_>, _>>()?;
        Ok((hotels, total))
    }
}
