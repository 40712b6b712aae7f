use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tripgate_core::analytics::{
    rank_coworkers, rank_destinations, rank_hotels, rank_requesters, rank_travellers, trip_cost,
    DateWindow, DepartmentSpend, OrganizationSummary, PlaceStat, RequestTotals, RequesterStat,
    Traveller, TravellerStat,
};
use tripgate_core::domain::group::GroupId;
use tripgate_core::domain::organization::{OrganizationId, UserId};
use tripgate_core::domain::request::TravelRequest;

use super::request::{row_to_request, REQUEST_COLUMNS};
use super::{decode_err, RepositoryError};
use crate::DbPool;

/// Live members with their first live group as department.
const TRAVELLER_SELECT: &str = "SELECT u.id AS user_id, u.first_name, u.last_name,
        (SELECT g.name FROM group_members gm
         JOIN org_groups g ON g.id = gm.group_id
         WHERE gm.member_id = u.id AND g.organization_id = ou.organization_id
           AND g.is_deleted = 0
         ORDER BY g.id ASC LIMIT 1) AS department
     FROM organization_users ou
     JOIN users u ON u.id = ou.user_id
     WHERE ou.organization_id = ? AND ou.is_deleted = 0";

fn row_to_traveller(row: &SqliteRow) -> Result<Traveller, RepositoryError> {
    let first_name: String = row.try_get("first_name").map_err(decode_err)?;
    let last_name: String = row.try_get("last_name").map_err(decode_err)?;
    Ok(Traveller {
        user_id: UserId(row.try_get("user_id").map_err(decode_err)?),
        name: format!("{first_name} {last_name}"),
        department: row.try_get("department").map_err(decode_err)?,
    })
}

/// Read-only reporting queries. Aggregation itself lives in `tripgate_core::analytics`.
pub struct SqlAnalyticsRepository {
    pool: DbPool,
}

impl SqlAnalyticsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn live_requests(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<TravelRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests WHERE organization_id = ? AND is_deleted = 0"
        ))
        .bind(organization_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }

    pub async fn summary(
        &self,
        organization_id: OrganizationId,
        window: &DateWindow,
    ) -> Result<OrganizationSummary, RepositoryError> {
        let department_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM org_groups WHERE organization_id = ? AND is_deleted = 0",
        )
        .bind(organization_id.0)
        .fetch_one(&self.pool)
        .await?;
        let member_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM organization_users WHERE organization_id = ? AND is_deleted = 0",
        )
        .bind(organization_id.0)
        .fetch_one(&self.pool)
        .await?;

        let requests = self.live_requests(organization_id).await?;
        let totals = RequestTotals::collect(&requests, window);

        Ok(OrganizationSummary {
            organization_id,
            window: *window,
            department_count: department_count.max(0) as u64,
            member_count: member_count.max(0) as u64,
            hotels_booked: totals.hotels_booked,
            total_spend: totals.total_spend,
            requests: totals.requests,
            top_hotels: totals.top_hotels,
        })
    }

    async fn travellers(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Traveller>, RepositoryError> {
        let rows = sqlx::query(&format!("{TRAVELLER_SELECT} ORDER BY u.id ASC"))
            .bind(organization_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_traveller).collect()
    }

    pub async fn top_travellers(
        &self,
        organization_id: OrganizationId,
        window: &DateWindow,
    ) -> Result<Vec<TravellerStat>, RepositoryError> {
        let people = self.travellers(organization_id).await?;
        let requests = self.live_requests(organization_id).await?;
        Ok(rank_travellers(&requests, window, &people))
    }

    pub async fn top_requesters(
        &self,
        organization_id: OrganizationId,
        window: &DateWindow,
    ) -> Result<Vec<RequesterStat>, RepositoryError> {
        let people = self.travellers(organization_id).await?;
        let requests = self.live_requests(organization_id).await?;
        Ok(rank_requesters(&requests, window, &people))
    }

    pub async fn top_hotels(
        &self,
        organization_id: OrganizationId,
        window: &DateWindow,
    ) -> Result<Vec<PlaceStat>, RepositoryError> {
        let requests = self.live_requests(organization_id).await?;
        Ok(rank_hotels(&requests, window))
    }

    pub async fn top_destinations(
        &self,
        organization_id: OrganizationId,
        window: &DateWindow,
    ) -> Result<Vec<PlaceStat>, RepositoryError> {
        let requests = self.live_requests(organization_id).await?;
        Ok(rank_destinations(&requests, window))
    }

    /// Members sharing at least one live group with `user_id`, ranked by approved trips.
    pub async fn coworkers(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        window: &DateWindow,
    ) -> Result<Vec<TravellerStat>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{TRAVELLER_SELECT}
               AND u.id <> ?
               AND EXISTS (SELECT 1 FROM group_members mine
                           JOIN group_members theirs ON theirs.group_id = mine.group_id
                           JOIN org_groups g ON g.id = mine.group_id
                           WHERE mine.member_id = ? AND theirs.member_id = u.id
                             AND g.organization_id = ou.organization_id AND g.is_deleted = 0)
             ORDER BY u.id ASC"
        ))
        .bind(organization_id.0)
        .bind(user_id.0)
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        let coworkers = rows.iter().map(row_to_traveller).collect::<Result<Vec<_>, _>>()?;

        let requests = self.live_requests(organization_id).await?;
        Ok(rank_coworkers(&requests, window, &coworkers))
    }

    /// Spend of each live group, counting requests raised by the group's members. A requester
    /// in two groups counts toward both.
    pub async fn department_spend(
        &self,
        organization_id: OrganizationId,
        window: &DateWindow,
    ) -> Result<Vec<DepartmentSpend>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT g.id AS group_id, g.name AS name, gm.member_id AS member_id
             FROM org_groups g
             LEFT JOIN group_members gm ON gm.group_id = g.id
             WHERE g.organization_id = ? AND g.is_deleted = 0
             ORDER BY g.id ASC",
        )
        .bind(organization_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut departments: BTreeMap<GroupId, (String, BTreeSet<UserId>)> = BTreeMap::new();
        for row in &rows {
            let group_id = GroupId(row.try_get("group_id").map_err(decode_err)?);
            let name: String = row.try_get("name").map_err(decode_err)?;
            let member: Option<i64> = row.try_get("member_id").map_err(decode_err)?;
            let entry = departments.entry(group_id).or_insert_with(|| (name, BTreeSet::new()));
            if let Some(member) = member {
                entry.1.insert(UserId(member));
            }
        }

        let requests = self.live_requests(organization_id).await?;
        let in_window: Vec<&TravelRequest> =
            requests.iter().filter(|request| window.contains(request.date_created)).collect();

        Ok(departments
            .into_iter()
            .map(|(group_id, (name, members))| {
                let mut spend = DepartmentSpend {
                    group_id,
                    name,
                    request_count: 0,
                    total_spend: Decimal::ZERO,
                };
                let raised = in_window.iter().filter(|request| members.contains(&request.requester_id));
                for request in raised {
                    spend.request_count += 1;
                    spend.total_spend += trip_cost(request);
                }
                spend
            })
            .collect())
    }
}
