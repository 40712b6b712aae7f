use std::collections::BTreeSet;

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use tripgate_core::domain::group::{
    assign_positions, ApproverAssignment, Group, GroupApprover, GroupId, GroupMember, GroupPatch,
    NewGroup,
};
use tripgate_core::domain::organization::{OrganizationId, UserId};
use tripgate_core::pagination::PageRequest;

use super::{decode_err, integrity_violation, parse_timestamp, IntegrityViolation};
use super::{GroupRepository, RepositoryError};
use crate::DbPool;

const GROUP_COLUMNS: &str = "id, organization_id, name, description, parent_group_id, approval_levels,
     created_by, date_created, last_updated, is_deleted";

pub struct SqlGroupRepository {
    pool: DbPool,
}

impl SqlGroupRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn name_taken(
        &self,
        organization_id: OrganizationId,
        name: &str,
        except: Option<GroupId>,
    ) -> Result<bool, RepositoryError> {
        let taken: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM org_groups
                           WHERE organization_id = ? AND name = ? AND is_deleted = 0 AND id != ?)",
        )
        .bind(organization_id.0)
        .bind(name)
        .bind(except.map_or(0, |id| id.0))
        .fetch_one(&self.pool)
        .await?;
        Ok(taken == 1)
    }

    async fn ensure_parent(
        &self,
        organization_id: OrganizationId,
        parent: Option<GroupId>,
    ) -> Result<(), RepositoryError> {
        let Some(parent) = parent else {
            return Ok(());
        };
        if self.find(organization_id, parent).await?.is_none() {
            return Err(RepositoryError::NotFound(format!("parent group {parent} does not exist")));
        }
        Ok(())
    }

    async fn count_present(
        &self,
        table: &str,
        column: &str,
        group_id: GroupId,
        ids: &BTreeSet<i64>,
    ) -> Result<i64, RepositoryError> {
        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {table} WHERE group_id = "));
        query.push_bind(group_id.0);
        query.push(format!(" AND {column} IN ("));
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        Ok(query.build_query_scalar::<i64>().fetch_one(&self.pool).await?)
    }

    /// Deletes the given users from one group's `table`. Every id must currently be in the
    /// group, otherwise nothing is removed.
    async fn remove_from_group(
        &self,
        table: &str,
        column: &str,
        group_id: GroupId,
        user_ids: &[UserId],
    ) -> Result<u64, RepositoryError> {
        let ids: BTreeSet<i64> = user_ids.iter().map(|id| id.0).collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let present = self.count_present(table, column, group_id, &ids).await?;
        if present != ids.len() as i64 {
            return Err(RepositoryError::NotFound(format!(
                "one or more users are not in {table} of group {group_id}"
            )));
        }

        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("DELETE FROM {table} WHERE group_id = "));
        query.push_bind(group_id.0);
        query.push(format!(" AND {column} IN ("));
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        Ok(query.build().execute(&self.pool).await?.rows_affected())
    }
}

fn row_to_group(row: &SqliteRow) -> Result<Group, RepositoryError> {
    let parent: Option<i64> = row.try_get("parent_group_id").map_err(decode_err)?;
    let created_by: Option<i64> = row.try_get("created_by").map_err(decode_err)?;
    let date_created: String = row.try_get("date_created").map_err(decode_err)?;
    let last_updated: String = row.try_get("last_updated").map_err(decode_err)?;

    Ok(Group {
        id: GroupId(row.try_get("id").map_err(decode_err)?),
        organization_id: OrganizationId(row.try_get("organization_id").map_err(decode_err)?),
        name: row.try_get("name").map_err(decode_err)?,
        description: row.try_get("description").map_err(decode_err)?,
        parent_group_id: parent.map(GroupId),
        approval_levels: row.try_get("approval_levels").map_err(decode_err)?,
        created_by: created_by.map(UserId),
        date_created: parse_timestamp(&date_created)?,
        last_updated: parse_timestamp(&last_updated)?,
        is_deleted: row.try_get("is_deleted").map_err(decode_err)?,
    })
}

fn row_to_member(row: &SqliteRow) -> Result<GroupMember, RepositoryError> {
    let date_created: String = row.try_get("date_created").map_err(decode_err)?;
    Ok(GroupMember {
        id: row.try_get("id").map_err(decode_err)?,
        group_id: GroupId(row.try_get("group_id").map_err(decode_err)?),
        member_id: UserId(row.try_get("member_id").map_err(decode_err)?),
        date_created: parse_timestamp(&date_created)?,
    })
}

pub(crate) fn row_to_approver(row: &SqliteRow) -> Result<GroupApprover, RepositoryError> {
    let date_created: String = row.try_get("date_created").map_err(decode_err)?;
    Ok(GroupApprover {
        id: row.try_get("id").map_err(decode_err)?,
        group_id: GroupId(row.try_get("group_id").map_err(decode_err)?),
        approver_id: UserId(row.try_get("approver_id").map_err(decode_err)?),
        position: row.try_get("position").map_err(decode_err)?,
        date_created: parse_timestamp(&date_created)?,
    })
}

#[async_trait::async_trait]
impl GroupRepository for SqlGroupRepository {
    async fn create(&self, group: NewGroup, created_by: UserId) -> Result<Group, RepositoryError> {
        group.validate()?;
        let name = group.name.trim();
        if self.name_taken(group.organization_id, name, None).await? {
            return Err(RepositoryError::Conflict(format!(
                "a group named `{name}` already exists in organization {}",
                group.organization_id
            )));
        }
        self.ensure_parent(group.organization_id, group.parent_group_id).await?;

        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO org_groups (organization_id, name, description, parent_group_id,
                                     approval_levels, created_by, date_created, last_updated)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(group.organization_id.0)
        .bind(name)
        .bind(group.description.as_deref())
        .bind(group.parent_group_id.map(|id| id.0))
        .bind(group.approval_levels.unwrap_or(1))
        .bind(created_by.0)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = GroupId(result.last_insert_rowid());
        self.find(group.organization_id, id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("group {id} vanished after insert")))
    }

    async fn find(
        &self,
        organization_id: OrganizationId,
        id: GroupId,
    ) -> Result<Option<Group>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM org_groups
             WHERE id = ? AND organization_id = ? AND is_deleted = 0"
        ))
        .bind(id.0)
        .bind(organization_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_group).transpose()
    }

    async fn list(
        &self,
        organization_id: OrganizationId,
        page: PageRequest,
    ) -> Result<(Vec<Group>, i64), RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM org_groups WHERE organization_id = ? AND is_deleted = 0",
        )
        .bind(organization_id.0)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM org_groups
             WHERE organization_id = ? AND is_deleted = 0
             ORDER BY id DESC LIMIT ? OFFSET ?"
        ))
        .bind(organization_id.0)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let groups = rows.iter().map(row_to_group).collect::<Result<Vec<_>, _>>()?;
        Ok((groups, total))
    }

    async fn update(
        &self,
        organization_id: OrganizationId,
        id: GroupId,
        patch: GroupPatch,
    ) -> Result<Group, RepositoryError> {
        let mut group = self
            .find(organization_id, id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("group {id} does not exist")))?;

        if let Some(name) = patch.name.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
            if self.name_taken(organization_id, name, Some(id)).await? {
                return Err(RepositoryError::Conflict(format!(
                    "a group named `{name}` already exists in organization {organization_id}"
                )));
            }
        }
        if patch.parent_group_id == Some(id) {
            return Err(RepositoryError::Conflict("a group cannot be its own parent".to_string()));
        }
        self.ensure_parent(organization_id, patch.parent_group_id).await?;

        patch.apply(&mut group, Utc::now());
        sqlx::query(
            "UPDATE org_groups
             SET name = ?, description = ?, approval_levels = ?, parent_group_id = ?, last_updated = ?
             WHERE id = ?",
        )
        .bind(group.name.trim())
        .bind(group.description.as_deref())
        .bind(group.approval_levels)
        .bind(group.parent_group_id.map(|parent| parent.0))
        .bind(group.last_updated.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(group)
    }

    async fn soft_delete(
        &self,
        organization_id: OrganizationId,
        id: GroupId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE org_groups SET is_deleted = 1, last_updated = ?
             WHERE id = ? AND organization_id = ? AND is_deleted = 0",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .bind(organization_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("group {id} does not exist")));
        }
        Ok(())
    }

    async fn add_members(
        &self,
        group_id: GroupId,
        member_ids: &[UserId],
    ) -> Result<Vec<GroupMember>, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut added = Vec::new();

        for member_id in member_ids {
            let inserted = sqlx::query(
                "INSERT INTO group_members (group_id, member_id, date_created) VALUES (?, ?, ?)",
            )
            .bind(group_id.0)
            .bind(member_id.0)
            .bind(&now)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(result) => {
                    let row = sqlx::query(
                        "SELECT id, group_id, member_id, date_created FROM group_members WHERE id = ?",
                    )
                    .bind(result.last_insert_rowid())
                    .fetch_one(&mut *tx)
                    .await?;
                    added.push(row_to_member(&row)?);
                }
                Err(error) if integrity_violation(&error).is_some() => {
                    debug!(
                        event_name = "group.member.skipped",
                        group_id = group_id.0,
                        member_id = member_id.0,
                        error = %error,
                        "group member insert skipped"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }

        tx.commit().await?;
        Ok(added)
    }

    async fn remove_members(
        &self,
        group_id: GroupId,
        member_ids: &[UserId],
    ) -> Result<u64, RepositoryError> {
        self.remove_from_group("group_members", "member_id", group_id, member_ids).await
    }

    async fn list_members(
        &self,
        group_id: GroupId,
        page: PageRequest,
    ) -> Result<(Vec<GroupMember>, i64), RepositoryError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM group_members WHERE group_id = ?")
            .bind(group_id.0)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            "SELECT id, group_id, member_id, date_created FROM group_members
             WHERE group_id = ? ORDER BY id ASC LIMIT ? OFFSET ?",
        )
        .bind(group_id.0)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let members = rows.iter().map(row_to_member).collect::<Result<Vec<_>, _>>()?;
        Ok((members, total))
    }

    async fn add_approvers(
        &self,
        group_id: GroupId,
        assignments: &[ApproverAssignment],
    ) -> Result<Vec<GroupApprover>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT id, group_id, approver_id, position, date_created FROM group_approvers
             WHERE group_id = ?",
        )
        .bind(group_id.0)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(row_to_approver)
        .collect::<Result<Vec<_>, _>>()?;

        let mut seen: BTreeSet<UserId> =
            existing.iter().map(|approver| approver.approver_id).collect();
        let fresh: Vec<ApproverAssignment> = assignments
            .iter()
            .filter(|assignment| seen.insert(assignment.approver_id))
            .copied()
            .collect();
        let placements = assign_positions(group_id, &existing, &fresh)?;

        let now = Utc::now().to_rfc3339();
        let mut added = Vec::with_capacity(placements.len());
        for (approver_id, position) in placements {
            let inserted = sqlx::query(
                "INSERT INTO group_approvers (group_id, approver_id, position, date_created)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(group_id.0)
            .bind(approver_id.0)
            .bind(position)
            .bind(&now)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(result) => {
                    let row = sqlx::query(
                        "SELECT id, group_id, approver_id, position, date_created
                         FROM group_approvers WHERE id = ?",
                    )
                    .bind(result.last_insert_rowid())
                    .fetch_one(&mut *tx)
                    .await?;
                    added.push(row_to_approver(&row)?);
                }
                Err(error) => match integrity_violation(&error) {
                    Some(IntegrityViolation::ForeignKey) => {
                        debug!(
                            event_name = "group.approver.skipped",
                            group_id = group_id.0,
                            approver_id = approver_id.0,
                            "approver does not exist; skipped"
                        );
                    }
                    Some(IntegrityViolation::Unique) => {
                        return Err(RepositoryError::Conflict(format!(
                            "position {position} is already taken in group {group_id}"
                        )));
                    }
                    None => return Err(error.into()),
                },
            }
        }

        tx.commit().await?;
        Ok(added)
    }

    async fn remove_approvers(
        &self,
        group_id: GroupId,
        approver_ids: &[UserId],
    ) -> Result<u64, RepositoryError> {
        self.remove_from_group("group_approvers", "approver_id", group_id, approver_ids).await
    }

    async fn list_approvers(
        &self,
        group_id: GroupId,
        page: PageRequest,
    ) -> Result<(Vec<GroupApprover>, i64), RepositoryError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM group_approvers WHERE group_id = ?")
                .bind(group_id.0)
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query(
            "SELECT id, group_id, approver_id, position, date_created FROM group_approvers
             WHERE group_id = ? ORDER BY position ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(group_id.0)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let approvers = rows.iter().map(row_to_approver).collect::<Result<Vec<_>, _>>()?;
        Ok((approvers, total))
    }

    async fn approvers_for_member(
        &self,
        organization_id: OrganizationId,
        member_id: UserId,
    ) -> Result<Vec<GroupApprover>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT ga.id, ga.group_id, ga.approver_id, ga.position, ga.date_created
             FROM group_approvers ga
             JOIN org_groups g ON g.id = ga.group_id
             JOIN group_members gm ON gm.group_id = g.id
             WHERE gm.member_id = ? AND g.organization_id = ? AND g.is_deleted = 0
             ORDER BY ga.position ASC, ga.id ASC",
        )
        .bind(member_id.0)
        .bind(organization_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_approver).collect()
    }

    async fn open_requests_count(&self, group_id: GroupId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM requests r
             WHERE r.is_deleted = 0
               AND r.status = 'pending'
               AND r.organization_id = (SELECT organization_id FROM org_groups WHERE id = ?)
               AND r.requester_id IN (SELECT member_id FROM group_members WHERE group_id = ?)",
        )
        .bind(group_id.0)
        .bind(group_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
