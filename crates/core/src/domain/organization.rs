use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub i64);

impl std::fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_created: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "first_name and last_name are required".to_string(),
            ));
        }
        if !self.email.contains('@') {
            return Err(DomainError::InvariantViolation(format!(
                "`{}` is not a valid email address",
                self.email
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub slug: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    pub slug: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberRole {
    Manager,
    Staff,
    Logistics,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "Manager",
            Self::Staff => "Staff",
            Self::Logistics => "Logistics",
        }
    }
}

impl std::str::FromStr for MemberRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manager" => Ok(Self::Manager),
            "staff" => Ok(Self::Staff),
            "logistics" => Ok(Self::Logistics),
            other => Err(DomainError::InvariantViolation(format!("unknown member role `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMember {
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Rejected,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for InviteStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "accepted" | "accept" => Ok(Self::Accepted),
            "rejected" | "reject" | "declined" | "decline" => Ok(Self::Rejected),
            other => Err(DomainError::InvariantViolation(format!("unknown invite status `{other}`"))),
        }
    }
}

/// A standing invitation for an email address to join an organization. Accepting it makes the
/// invitee a `Staff` member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationInvite {
    pub id: InviteId,
    pub organization_id: OrganizationId,
    pub email: String,
    pub inviter_id: Option<UserId>,
    pub token: String,
    pub status: InviteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of inviting a batch of addresses. Addresses that already belong to members get no
/// invite.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteBatch {
    pub invites: Vec<OrganizationInvite>,
    pub already_members: Vec<String>,
}

/// Lowercases and trims an address, refusing anything without an `@`.
pub fn normalize_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim().to_ascii_lowercase();
    if email.len() < 3 || !email.contains('@') {
        return Err(DomainError::InvariantViolation(format!(
            "`{}` is not a valid email address",
            raw.trim()
        )));
    }
    Ok(email)
}

pub fn new_invite_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// An invitee's answer. Only `accepted` and `rejected` are answers.
pub fn invite_answer(status: InviteStatus) -> Result<InviteStatus, DomainError> {
    match status {
        InviteStatus::Pending => Err(DomainError::InvariantViolation(
            "an invite can only be accepted or rejected".to_string(),
        )),
        answer => Ok(answer),
    }
}
