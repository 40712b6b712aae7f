use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::organization::{OrganizationId, UserId};
use crate::errors::DomainError;

pub const MAX_COMMENT_LENGTH: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub i64);

/// Records a comment can be attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentEntity {
    Request,
}

impl CommentEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
        }
    }
}

impl std::str::FromStr for CommentEntity {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "request" => Ok(Self::Request),
            other => Err(DomainError::InvariantViolation(format!(
                "comments cannot reference table `{other}`"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub organization_id: OrganizationId,
    pub author_id: UserId,
    pub table_name: CommentEntity,
    pub record_id: i64,
    pub parent_id: Option<CommentId>,
    pub content: String,
    pub is_edited: bool,
    pub date_created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub organization_id: OrganizationId,
    pub table_name: CommentEntity,
    pub record_id: i64,
    pub parent_id: Option<CommentId>,
    pub content: String,
}

pub fn validate_content(content: &str) -> Result<(), DomainError> {
    let length = content.chars().count();
    if length == 0 || length > MAX_COMMENT_LENGTH {
        return Err(DomainError::InvariantViolation(format!(
            "comment content must be between 1 and {MAX_COMMENT_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_content, CommentEntity, MAX_COMMENT_LENGTH};

    #[test]
    fn content_length_bounds() {
        assert!(validate_content("").is_err());
        assert!(validate_content("ok").is_ok());
        assert!(validate_content(&"x".repeat(MAX_COMMENT_LENGTH)).is_ok());
        assert!(validate_content(&"x".repeat(MAX_COMMENT_LENGTH + 1)).is_err());
    }

    #[test]
    fn only_requests_accept_comments() {
        assert_eq!("request".parse::<CommentEntity>(), Ok(CommentEntity::Request));
        assert!("hotel".parse::<CommentEntity>().is_err());
    }
}
