use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::organization::UserId;
use crate::domain::request::RequestId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestApprovalId(pub i64);

/// Status shared by a request and each of its approval slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

/// A decision an approver can record. Pending is deliberately absent: a slot never
/// moves back to pending once decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn status(&self) -> ApprovalStatus {
        match self {
            Self::Approved => ApprovalStatus::Approved,
            Self::Rejected => ApprovalStatus::Rejected,
        }
    }
}

impl TryFrom<ApprovalStatus> for Decision {
    type Error = DomainError;

    fn try_from(status: ApprovalStatus) -> Result<Self, Self::Error> {
        match status {
            ApprovalStatus::Approved => Ok(Self::Approved),
            ApprovalStatus::Rejected => Ok(Self::Rejected),
            ApprovalStatus::Pending => Err(DomainError::InvariantViolation(
                "pending is not a decision an approver can record".to_string(),
            )),
        }
    }
}

/// One approver's slot in a request's approval chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestApproval {
    pub id: RequestApprovalId,
    pub request_id: RequestId,
    pub approver_id: UserId,
    pub position: i64,
    pub status: ApprovalStatus,
    pub date_created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}
