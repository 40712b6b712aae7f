use serde::{Deserialize, Serialize};

use crate::domain::approval::RequestApprovalId;
use crate::domain::group::{GroupApprover, GroupId};
use crate::domain::organization::UserId;
use crate::domain::request::RequestId;

/// An approval slot to materialize for a new request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSlot {
    pub group_id: GroupId,
    pub approver_id: UserId,
    pub position: i64,
}

/// Orders the requester's group approvers into the slots to insert.
///
/// Slots are ordered by position, then by group approver id, so an approver sitting in two
/// groups keeps the lower of their positions once the duplicate insert is skipped.
pub fn plan_chain(approvers: &[GroupApprover]) -> Vec<ChainSlot> {
    let mut ordered: Vec<&GroupApprover> = approvers.iter().collect();
    ordered.sort_by_key(|approver| (approver.position, approver.id));
    ordered
        .into_iter()
        .map(|approver| ChainSlot {
            group_id: approver.group_id,
            approver_id: approver.approver_id,
            position: approver.position,
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The approver already holds a slot on this request.
    Duplicate,
    /// The approver's user record no longer exists.
    UnknownApprover,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum SlotResult {
    Created(RequestApprovalId),
    Skipped(SkipReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOutcome {
    pub slot: ChainSlot,
    pub result: SlotResult,
}

/// Per-slot result of materializing a request's approval chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub request_id: RequestId,
    pub outcomes: Vec<SlotOutcome>,
}

impl ChainReport {
    pub fn new(request_id: RequestId) -> Self {
        Self { request_id, outcomes: Vec::new() }
    }

    pub fn record(&mut self, slot: ChainSlot, result: SlotResult) {
        self.outcomes.push(SlotOutcome { slot, result });
    }

    pub fn created_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| matches!(outcome.result, SlotResult::Created(_))).count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&ChainSlot, SkipReason)> {
        self.outcomes.iter().filter_map(|outcome| match outcome.result {
            SlotResult::Skipped(reason) => Some((&outcome.slot, reason)),
            SlotResult::Created(_) => None,
        })
    }

    pub fn created_approvers(&self) -> Vec<UserId> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.result, SlotResult::Created(_)))
            .map(|outcome| outcome.slot.approver_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{plan_chain, ChainReport, SkipReason, SlotResult};
    use crate::domain::approval::RequestApprovalId;
    use crate::domain::group::{GroupApprover, GroupId};
    use crate::domain::organization::UserId;
    use crate::domain::request::RequestId;

    fn approver(id: i64, group: i64, user: i64, position: i64) -> GroupApprover {
        GroupApprover {
            id,
            group_id: GroupId(group),
            approver_id: UserId(user),
            position,
            date_created: Utc::now(),
        }
    }

    #[test]
    fn plan_orders_slots_by_position_then_id() {
        let slots = plan_chain(&[
            approver(3, 1, 30, 2),
            approver(1, 1, 10, 1),
            approver(2, 2, 20, 1),
        ]);

        let approvers: Vec<i64> = slots.iter().map(|slot| slot.approver_id.0).collect();
        assert_eq!(approvers, vec![10, 20, 30]);
        assert_eq!(slots[2].position, 2);
    }

    #[test]
    fn plan_keeps_cross_group_duplicates_for_the_store_to_skip() {
        let slots = plan_chain(&[approver(1, 1, 10, 2), approver(2, 2, 10, 1)]);

        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].group_id, GroupId(2));
        assert_eq!(slots[0].position, 1);
    }

    #[test]
    fn report_separates_created_and_skipped_slots() {
        let slots = plan_chain(&[approver(1, 1, 10, 1), approver(2, 1, 20, 2), approver(3, 2, 10, 3)]);
        let mut report = ChainReport::new(RequestId(5));
        report.record(slots[0], SlotResult::Created(RequestApprovalId(1)));
        report.record(slots[1], SlotResult::Created(RequestApprovalId(2)));
        report.record(slots[2], SlotResult::Skipped(SkipReason::Duplicate));

        assert_eq!(report.created_count(), 2);
        assert_eq!(report.created_approvers(), vec![UserId(10), UserId(20)]);
        let skipped: Vec<_> = report.skipped().collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].1, SkipReason::Duplicate);
    }
}
