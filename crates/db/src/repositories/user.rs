use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tripgate_core::domain::organization::{NewUser, User, UserId};

use super::{decode_err, integrity_violation, parse_timestamp, IntegrityViolation};
use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let date_created: String = row.try_get("date_created").map_err(decode_err)?;
    Ok(User {
        id: UserId(row.try_get("id").map_err(decode_err)?),
        first_name: row.try_get("first_name").map_err(decode_err)?,
        last_name: row.try_get("last_name").map_err(decode_err)?,
        email: row.try_get("email").map_err(decode_err)?,
        date_created: parse_timestamp(&date_created)?,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        user.validate()?;
        let now = Utc::now();

        let inserted = sqlx::query(
            "INSERT INTO users (first_name, last_name, email, date_created) VALUES (?, ?, ?, ?)",
        )
        .bind(user.first_name.trim())
        .bind(user.last_name.trim())
        .bind(user.email.trim().to_ascii_lowercase())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await;

        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(error) if integrity_violation(&error) == Some(IntegrityViolation::Unique) => {
                return Err(RepositoryError::Conflict(format!(
                    "a user with email `{}` already exists",
                    user.email.trim()
                )));
            }
            Err(error) => return Err(error.into()),
        };

        self.find_by_id(UserId(id))
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("user {id} vanished after insert")))
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, email, date_created FROM users WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }
}
