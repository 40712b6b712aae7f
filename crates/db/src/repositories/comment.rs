use chrono::Utc;
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use tripgate_core::domain::comment::{validate_content, Comment, CommentEntity, CommentId, NewComment};
use tripgate_core::domain::organization::{OrganizationId, UserId};
use tripgate_core::pagination::PageRequest;

use super::{decode_err, parse_timestamp, CommentRepository, RepositoryError};
use crate::DbPool;

const COMMENT_COLUMNS: &str = "id, organization_id, author_id, table_name, record_id, parent_id,
     content, is_edited, date_created, last_updated";

/// Which thread to list. `parent_id` narrows the listing to replies of one comment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct CommentQuery {
    pub organization_id: OrganizationId,
    pub table_name: CommentEntity,
    pub record_id: i64,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
}

pub struct SqlCommentRepository {
    pool: DbPool,
}

impl SqlCommentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn record_exists(
        &self,
        organization_id: OrganizationId,
        table_name: CommentEntity,
        record_id: i64,
    ) -> Result<bool, RepositoryError> {
        let exists: i64 = match table_name {
            CommentEntity::Request => {
                sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM requests
                                   WHERE id = ? AND organization_id = ? AND is_deleted = 0)",
                )
                .bind(record_id)
                .bind(organization_id.0)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(exists == 1)
    }

    /// Loads a comment the caller is about to change, enforcing authorship.
    async fn owned(
        &self,
        organization_id: OrganizationId,
        id: CommentId,
        author: UserId,
    ) -> Result<Comment, RepositoryError> {
        let comment = self
            .find(organization_id, id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("comment {} does not exist", id.0)))?;
        if comment.author_id != author {
            return Err(RepositoryError::NotAuthorized(format!(
                "user {author} is not the author of comment {}",
                id.0
            )));
        }
        Ok(comment)
    }
}

fn row_to_comment(row: &SqliteRow) -> Result<Comment, RepositoryError> {
    let table_name: String = row.try_get("table_name").map_err(decode_err)?;
    let parent_id: Option<i64> = row.try_get("parent_id").map_err(decode_err)?;
    let date_created: String = row.try_get("date_created").map_err(decode_err)?;
    let last_updated: String = row.try_get("last_updated").map_err(decode_err)?;

    Ok(Comment {
        id: CommentId(row.try_get("id").map_err(decode_err)?),
        organization_id: OrganizationId(row.try_get("organization_id").map_err(decode_err)?),
        author_id: UserId(row.try_get("author_id").map_err(decode_err)?),
        table_name: table_name.parse::<CommentEntity>()?,
        record_id: row.try_get("record_id").map_err(decode_err)?,
        parent_id: parent_id.map(CommentId),
        content: row.try_get("content").map_err(decode_err)?,
        is_edited: row.try_get("is_edited").map_err(decode_err)?,
        date_created: parse_timestamp(&date_created)?,
        last_updated: parse_timestamp(&last_updated)?,
    })
}

fn push_thread_filter(query: &mut QueryBuilder<'_, Sqlite>, thread: CommentQuery) {
    query.push(" WHERE organization_id = ");
    query.push_bind(thread.organization_id.0);
    query.push(" AND table_name = ");
    query.push_bind(thread.table_name.as_str());
    query.push(" AND record_id = ");
    query.push_bind(thread.record_id);
    if let Some(parent) = thread.parent_id {
        query.push(" AND parent_id = ");
        query.push_bind(parent.0);
    }
}

#[async_trait::async_trait]
impl CommentRepository for SqlCommentRepository {
    async fn create(&self, author: UserId, comment: NewComment) -> Result<Comment, RepositoryError> {
        validate_content(&comment.content)?;
        if !self.record_exists(comment.organization_id, comment.table_name, comment.record_id).await? {
            return Err(RepositoryError::NotFound(format!(
                "{} {} does not exist",
                comment.table_name.as_str(),
                comment.record_id
            )));
        }
        if let Some(parent) = comment.parent_id {
            if self.find(comment.organization_id, parent).await?.is_none() {
                return Err(RepositoryError::NotFound(format!(
                    "parent comment {} does not exist",
                    parent.0
                )));
            }
        }

        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO comments (organization_id, author_id, table_name, record_id, parent_id,
                                   content, date_created, last_updated)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(comment.organization_id.0)
        .bind(author.0)
        .bind(comment.table_name.as_str())
        .bind(comment.record_id)
        .bind(comment.parent_id.map(|parent| parent.0))
        .bind(&comment.content)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = CommentId(result.last_insert_rowid());
        self.find(comment.organization_id, id).await?.ok_or_else(|| {
            RepositoryError::NotFound(format!("comment {} vanished after insert", id.0))
        })
    }

    async fn find(
        &self,
        organization_id: OrganizationId,
        id: CommentId,
    ) -> Result<Option<Comment>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ? AND organization_id = ?"
        ))
        .bind(id.0)
        .bind(organization_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_comment).transpose()
    }

    async fn list(
        &self,
        query: CommentQuery,
        page: PageRequest,
    ) -> Result<(Vec<Comment>, i64), RepositoryError> {
        let mut count: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM comments");
        push_thread_filter(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {COMMENT_COLUMNS} FROM comments"));
        push_thread_filter(&mut select, query);
        select.push(" ORDER BY date_created DESC, id DESC LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());

        let rows = select.build().fetch_all(&self.pool).await?;
        let comments = rows.iter().map(row_to_comment).collect::<Result<Vec<_>, _>>()?;
        Ok((comments, total))
    }

    async fn update_content(
        &self,
        organization_id: OrganizationId,
        id: CommentId,
        author: UserId,
        content: &str,
    ) -> Result<Comment, RepositoryError> {
        validate_content(content)?;
        let mut comment = self.owned(organization_id, id, author).await?;
        let now = Utc::now();

        sqlx::query("UPDATE comments SET content = ?, is_edited = 1, last_updated = ? WHERE id = ?")
            .bind(content)
            .bind(now.to_rfc3339())
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        comment.content = content.to_string();
        comment.is_edited = true;
        comment.last_updated = now;
        Ok(comment)
    }

    async fn delete(
        &self,
        organization_id: OrganizationId,
        id: CommentId,
        author: UserId,
    ) -> Result<(), RepositoryError> {
        self.owned(organization_id, id, author).await?;
        sqlx::query("DELETE FROM comments WHERE id = ?").bind(id.0).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tripgate_core::domain::comment::{CommentEntity, CommentId, NewComment};
    use tripgate_core::domain::organization::{OrganizationId, UserId};
    use tripgate_core::errors::DomainError;
    use tripgate_core::pagination::PageRequest;

    use super::{CommentQuery, SqlCommentRepository};
    use crate::repositories::{test_support, CommentRepository, RepositoryError};

    const PAGE: PageRequest = PageRequest { page: 1, size: 20 };

    async fn setup() -> SqlCommentRepository {
        let pool = test_support::pool().await;
        test_support::insert_user(&pool, 1).await;
        test_support::insert_user(&pool, 2).await;
        test_support::insert_organization(&pool, 1, &[1, 2]).await;
        sqlx::query(
            "INSERT INTO requests (id, organization_id, requester_id, state, city, start_date,
                                   end_date, date_created, last_updated)
             VALUES (7, 1, 1, 'Lagos', 'Ikeja', '2026-01-01', '2026-01-02',
                     '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("request");
        SqlCommentRepository::new(pool)
    }

    fn on_request(record_id: i64, parent_id: Option<CommentId>, content: &str) -> NewComment {
        NewComment {
            organization_id: OrganizationId(1),
            table_name: CommentEntity::Request,
            record_id,
            parent_id,
            content: content.to_string(),
        }
    }

    fn thread(parent_id: Option<CommentId>) -> CommentQuery {
        CommentQuery {
            organization_id: OrganizationId(1),
            table_name: CommentEntity::Request,
            record_id: 7,
            parent_id,
        }
    }

    #[tokio::test]
    async fn comments_require_an_existing_request_and_parent() {
        let repo = setup().await;

        let missing_record = repo.create(UserId(1), on_request(99, None, "hello")).await;
        assert!(matches!(missing_record, Err(RepositoryError::NotFound(_))));

        let missing_parent = repo.create(UserId(1), on_request(7, Some(CommentId(5)), "hi")).await;
        assert!(matches!(missing_parent, Err(RepositoryError::NotFound(_))));

        let empty = repo.create(UserId(1), on_request(7, None, "")).await;
        assert!(matches!(empty, Err(RepositoryError::Domain(DomainError::InvariantViolation(_)))));
    }

    #[tokio::test]
    async fn replies_are_listed_by_parent_newest_first() {
        let repo = setup().await;
        let root = repo.create(UserId(1), on_request(7, None, "first")).await.expect("root");
        let reply = repo
            .create(UserId(2), on_request(7, Some(root.id), "reply"))
            .await
            .expect("reply");

        let (all, total) = repo.list(thread(None), PAGE).await.expect("all");
        assert_eq!(total, 2);
        assert_eq!(all[0].id, reply.id);

        let (replies, reply_total) = repo.list(thread(Some(root.id)), PAGE).await.expect("replies");
        assert_eq!(reply_total, 1);
        assert_eq!(replies[0].parent_id, Some(root.id));
    }

    #[tokio::test]
    async fn only_the_author_can_edit_or_delete() {
        let repo = setup().await;
        let comment = repo.create(UserId(1), on_request(7, None, "draft")).await.expect("create");
        assert!(!comment.is_edited);

        let foreign = repo.update_content(OrganizationId(1), comment.id, UserId(2), "mine now").await;
        assert!(matches!(foreign, Err(RepositoryError::NotAuthorized(_))));

        let edited = repo
            .update_content(OrganizationId(1), comment.id, UserId(1), "final")
            .await
            .expect("edit");
        assert!(edited.is_edited);
        assert_eq!(edited.content, "final");

        let foreign_delete = repo.delete(OrganizationId(1), comment.id, UserId(2)).await;
        assert!(matches!(foreign_delete, Err(RepositoryError::NotAuthorized(_))));
        repo.delete(OrganizationId(1), comment.id, UserId(1)).await.expect("delete");
        assert!(repo.find(OrganizationId(1), comment.id).await.expect("find").is_none());
    }
}
