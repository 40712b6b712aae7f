use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::organization::{OrganizationId, UserId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A department inside an organization. Members submit requests; approvers decide on them
/// in ascending `position` order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub description: Option<String>,
    pub parent_group_id: Option<GroupId>,
    pub approval_levels: i64,
    pub created_by: Option<UserId>,
    pub date_created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub is_deleted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub organization_id: OrganizationId,
    pub name: String,
    pub description: Option<String>,
    pub parent_group_id: Option<GroupId>,
    pub approval_levels: Option<i64>,
}

impl NewGroup {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvariantViolation("group name is required".to_string()));
        }
        if matches!(self.approval_levels, Some(levels) if levels < 1) {
            return Err(DomainError::InvariantViolation(
                "approval_levels must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub approval_levels: Option<i64>,
    pub parent_group_id: Option<GroupId>,
}

impl GroupPatch {
    pub fn apply(&self, group: &mut Group, now: DateTime<Utc>) {
        if let Some(name) = self.name.as_ref().filter(|name| !name.trim().is_empty()) {
            group.name = name.clone();
        }
        if let Some(description) = &self.description {
            group.description = Some(description.clone());
        }
        if let Some(levels) = self.approval_levels.filter(|levels| *levels >= 1) {
            group.approval_levels = levels;
        }
        if let Some(parent) = self.parent_group_id {
            group.parent_group_id = Some(parent);
        }
        group.last_updated = now;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: i64,
    pub group_id: GroupId,
    pub member_id: UserId,
    pub date_created: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupApprover {
    pub id: i64,
    pub group_id: GroupId,
    pub approver_id: UserId,
    pub position: i64,
    pub date_created: DateTime<Utc>,
}

/// Request to place a user into a group's approval hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverAssignment {
    pub approver_id: UserId,
    pub position: Option<i64>,
}

/// Resolves the position of every assignment against the approvers already in the group.
///
/// Explicit positions must be >= 1 and unused in the group (and within the batch). Missing
/// positions take the next free slot above the current maximum.
pub fn assign_positions(
    group_id: GroupId,
    existing: &[GroupApprover],
    requested: &[ApproverAssignment],
) -> Result<Vec<(UserId, i64)>, DomainError> {
    let mut taken: BTreeSet<i64> = existing.iter().map(|approver| approver.position).collect();
    let mut assigned = Vec::with_capacity(requested.len());

    for position in requested.iter().filter_map(|assignment| assignment.position) {
        if position < 1 {
            return Err(DomainError::InvariantViolation(format!(
                "approver position must be at least 1, got {position}"
            )));
        }
        if !taken.insert(position) {
            return Err(DomainError::DuplicatePosition { group_id: group_id.0, position });
        }
    }

    for assignment in requested {
        let position = match assignment.position {
            Some(position) => position,
            None => {
                let next = taken.last().copied().unwrap_or(0) + 1;
                taken.insert(next);
                next
            }
        };
        assigned.push((assignment.approver_id, position));
    }

    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{assign_positions, ApproverAssignment, GroupApprover, GroupId};
    use crate::domain::organization::UserId;
    use crate::errors::DomainError;

    fn approver(id: i64, position: i64) -> GroupApprover {
        GroupApprover {
            id,
            group_id: GroupId(1),
            approver_id: UserId(100 + id),
            position,
            date_created: Utc::now(),
        }
    }

    #[test]
    fn missing_positions_take_next_free_slot() {
        let existing = vec![approver(1, 1), approver(2, 2)];
        let assigned = assign_positions(
            GroupId(1),
            &existing,
            &[
                ApproverAssignment { approver_id: UserId(7), position: None },
                ApproverAssignment { approver_id: UserId(8), position: None },
            ],
        )
        .expect("positions should be assigned");

        assert_eq!(assigned, vec![(UserId(7), 3), (UserId(8), 4)]);
    }

    #[test]
    fn empty_group_starts_at_position_one() {
        let assigned = assign_positions(
            GroupId(1),
            &[],
            &[ApproverAssignment { approver_id: UserId(7), position: None }],
        )
        .expect("positions should be assigned");

        assert_eq!(assigned, vec![(UserId(7), 1)]);
    }

    #[test]
    fn explicit_positions_are_reserved_before_auto_assignment() {
        let assigned = assign_positions(
            GroupId(1),
            &[],
            &[
                ApproverAssignment { approver_id: UserId(7), position: None },
                ApproverAssignment { approver_id: UserId(8), position: Some(1) },
            ],
        )
        .expect("positions should be assigned");

        assert_eq!(assigned, vec![(UserId(7), 2), (UserId(8), 1)]);
    }

    #[test]
    fn duplicate_position_in_group_is_rejected() {
        let error = assign_positions(
            GroupId(1),
            &[approver(1, 1)],
            &[ApproverAssignment { approver_id: UserId(9), position: Some(1) }],
        )
        .expect_err("position 1 is taken");

        assert_eq!(error, DomainError::DuplicatePosition { group_id: 1, position: 1 });
    }

    #[test]
    fn duplicate_position_within_batch_is_rejected() {
        let error = assign_positions(
            GroupId(3),
            &[],
            &[
                ApproverAssignment { approver_id: UserId(8), position: Some(2) },
                ApproverAssignment { approver_id: UserId(9), position: Some(2) },
            ],
        )
        .expect_err("batch reuses position 2");

        assert_eq!(error, DomainError::DuplicatePosition { group_id: 3, position: 2 });
    }

    #[test]
    fn non_positive_position_is_rejected() {
        let error = assign_positions(
            GroupId(1),
            &[],
            &[ApproverAssignment { approver_id: UserId(8), position: Some(0) }],
        )
        .expect_err("zero is not a position");

        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }
}
