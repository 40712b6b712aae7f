use serde::{Deserialize, Serialize};

use crate::approvals::{ApprovalError, ChainScope};
use crate::domain::approval::{ApprovalStatus, Decision, RequestApproval, RequestApprovalId};
use crate::domain::organization::UserId;
use crate::domain::request::RequestId;

/// The writes an admissible decision produces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionPlan {
    pub request_id: RequestId,
    pub approval_id: RequestApprovalId,
    pub approver_id: UserId,
    pub position: i64,
    pub previous_status: ApprovalStatus,
    pub new_status: ApprovalStatus,
    /// New request status, or `None` when the request keeps its current status.
    pub derived_request_status: Option<ApprovalStatus>,
}

impl SubmissionPlan {
    /// The approver had already decided; the new decision overwrites the old one.
    pub fn is_resubmission(&self) -> bool {
        self.previous_status.is_decided()
    }
}

/// Validates a decision against the request's current chain and computes the resulting writes.
///
/// `chain` is every approval row of the request. When an approver holds more than one row
/// (only possible if the uniqueness constraint is bypassed) the row with the lowest id is used.
pub fn evaluate_submission(
    request_id: RequestId,
    chain: &[RequestApproval],
    updater_id: UserId,
    decision: Decision,
    scope: ChainScope,
) -> Result<SubmissionPlan, ApprovalError> {
    let mut ordered: Vec<RequestApproval> =
        chain.iter().filter(|approval| approval.request_id == request_id).cloned().collect();
    ordered.sort_by_key(|approval| approval.id);

    let updater_rows: Vec<&RequestApproval> =
        ordered.iter().filter(|approval| approval.approver_id == updater_id).collect();
    let Some(updater_approval) = updater_rows.first().copied() else {
        return Err(ApprovalError::NotAllowedToUpdateStatus { request_id, updater_id });
    };

    let lower = match scope {
        ChainScope::Request => find_lower_approval_request_wide(&ordered, updater_approval.position),
        ChainScope::Updater => {
            find_lower_approval_updater_scoped(&updater_rows, updater_approval.position)
        }
    };
    if let Some(lower) = lower.filter(|lower| lower.status == ApprovalStatus::Pending) {
        return Err(ApprovalError::LowerApproverHasNotApproved {
            request_id,
            pending_position: lower.position,
        });
    }

    let approval_id = updater_approval.id;
    let position = updater_approval.position;
    let previous_status = updater_approval.status;
    let new_status = decision.status();

    let mut decided = ordered.clone();
    if let Some(row) = decided.iter_mut().find(|approval| approval.id == approval_id) {
        row.status = new_status;
    }

    Ok(SubmissionPlan {
        request_id,
        approval_id,
        approver_id: updater_id,
        position,
        previous_status,
        new_status,
        derived_request_status: derive_request_status(&decided, updater_id, scope),
    })
}

/// Lower-approver lookup restricted to the acting approver's own rows.
///
/// This mirrors the legacy check, which searched the updater's rows for one at
/// `position - 1`. With one row per approver it can never find a different approver, so the
/// ordering rule is effectively not enforced. Kept for compatibility behind
/// [`ChainScope::Updater`]. Of several matches, the last one wins, as in the legacy loop.
pub fn find_lower_approval_updater_scoped<'a>(
    updater_rows: &[&'a RequestApproval],
    position: i64,
) -> Option<&'a RequestApproval> {
    updater_rows.iter().copied().filter(|approval| approval.position == position - 1).last()
}

/// Lower-approver lookup across the whole chain: the slot at `position - 1`.
///
/// If several slots share that position, a pending one is returned first so the ordering rule
/// holds for all of them.
pub fn find_lower_approval_request_wide(
    chain: &[RequestApproval],
    position: i64,
) -> Option<&RequestApproval> {
    let mut lower = chain.iter().filter(|approval| approval.position == position - 1).peekable();
    let first = lower.peek().copied();
    lower.find(|approval| approval.status == ApprovalStatus::Pending).or(first)
}

/// Request status implied by a chain after a decision has been applied to it.
///
/// Request scope: the slot at the chain's highest position (lowest id on ties) decides the
/// request once it is no longer pending. Updater scope: the highest position is taken from
/// the updater's rows only and its slot's status is copied unconditionally.
pub fn derive_request_status(
    chain: &[RequestApproval],
    updater_id: UserId,
    scope: ChainScope,
) -> Option<ApprovalStatus> {
    let max_position = match scope {
        ChainScope::Request => chain.iter().map(|approval| approval.position).max()?,
        ChainScope::Updater => chain
            .iter()
            .filter(|approval| approval.approver_id == updater_id)
            .map(|approval| approval.position)
            .max()?,
    };

    let highest = chain
        .iter()
        .filter(|approval| approval.position == max_position)
        .min_by_key(|approval| approval.id)?;

    match scope {
        ChainScope::Request => highest.status.is_decided().then_some(highest.status),
        ChainScope::Updater => Some(highest.status),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{
        derive_request_status, evaluate_submission, find_lower_approval_request_wide,
        find_lower_approval_updater_scoped,
    };
    use crate::approvals::{ApprovalError, ChainScope};
    use crate::domain::approval::{
        ApprovalStatus::{self, Approved, Pending, Rejected},
        Decision, RequestApproval, RequestApprovalId,
    };
    use crate::domain::organization::UserId;
    use crate::domain::request::RequestId;

    const REQUEST: RequestId = RequestId(42);

    fn slot(id: i64, approver: i64, position: i64, status: ApprovalStatus) -> RequestApproval {
        let now = Utc::now();
        RequestApproval {
            id: RequestApprovalId(id),
            request_id: REQUEST,
            approver_id: UserId(approver),
            position,
            status,
            date_created: now,
            last_updated: now,
        }
    }

    fn three_level_chain() -> Vec<RequestApproval> {
        vec![slot(1, 10, 1, Pending), slot(2, 20, 2, Pending), slot(3, 30, 3, Pending)]
    }

    #[test]
    fn approver_without_slot_is_not_allowed() {
        for scope in [ChainScope::Request, ChainScope::Updater] {
            let error = evaluate_submission(
                REQUEST,
                &three_level_chain(),
                UserId(99),
                Decision::Approved,
                scope,
            )
            .expect_err("outsider must be refused");

            assert_eq!(
                error,
                ApprovalError::NotAllowedToUpdateStatus { request_id: REQUEST, updater_id: UserId(99) }
            );
        }
    }

    #[test]
    fn empty_chain_refuses_everyone() {
        let error = evaluate_submission(REQUEST, &[], UserId(10), Decision::Rejected, ChainScope::Request)
            .expect_err("no slots at all");
        assert!(matches!(error, ApprovalError::NotAllowedToUpdateStatus { .. }));
    }

    #[test]
    fn rows_of_other_requests_do_not_grant_a_slot() {
        let mut foreign = slot(7, 99, 1, Pending);
        foreign.request_id = RequestId(7);
        let mut chain = three_level_chain();
        chain.push(foreign);

        let error =
            evaluate_submission(REQUEST, &chain, UserId(99), Decision::Approved, ChainScope::Request)
                .expect_err("slot belongs to another request");
        assert!(matches!(error, ApprovalError::NotAllowedToUpdateStatus { .. }));
    }

    #[test]
    fn higher_position_waits_for_pending_lower_position() {
        let error = evaluate_submission(
            REQUEST,
            &three_level_chain(),
            UserId(20),
            Decision::Approved,
            ChainScope::Request,
        )
        .expect_err("position 1 is still pending");

        assert_eq!(
            error,
            ApprovalError::LowerApproverHasNotApproved { request_id: REQUEST, pending_position: 1 }
        );

        let rejected = evaluate_submission(
            REQUEST,
            &three_level_chain(),
            UserId(20),
            Decision::Rejected,
            ChainScope::Request,
        );
        assert!(rejected.is_err(), "rejections are ordered too");
    }

    #[test]
    fn updater_scope_does_not_enforce_ordering() {
        let plan = evaluate_submission(
            REQUEST,
            &three_level_chain(),
            UserId(20),
            Decision::Approved,
            ChainScope::Updater,
        )
        .expect("legacy scope cannot see the other approver");

        assert_eq!(plan.position, 2);
        assert_eq!(plan.derived_request_status, Some(Approved), "legacy scope mirrors the decision");
    }

    #[test]
    fn only_the_immediately_lower_position_is_checked() {
        let chain = vec![slot(1, 10, 1, Pending), slot(2, 20, 2, Approved), slot(3, 30, 3, Pending)];

        let plan = evaluate_submission(REQUEST, &chain, UserId(30), Decision::Approved, ChainScope::Request)
            .expect("position 2 has decided");

        assert_eq!(plan.new_status, Approved);
        assert_eq!(plan.derived_request_status, Some(Approved));
    }

    #[test]
    fn lower_rejection_counts_as_a_decision() {
        let chain = vec![slot(1, 10, 1, Rejected), slot(2, 20, 2, Pending)];

        let plan = evaluate_submission(REQUEST, &chain, UserId(20), Decision::Approved, ChainScope::Request)
            .expect("rejected is not pending");

        assert_eq!(plan.derived_request_status, Some(Approved));
    }

    #[test]
    fn lowest_position_decision_leaves_request_status_alone() {
        let chain = vec![slot(1, 10, 1, Pending), slot(2, 20, 2, Pending)];

        let plan = evaluate_submission(REQUEST, &chain, UserId(10), Decision::Approved, ChainScope::Request)
            .expect("position 1 has no lower approver");

        assert_eq!(plan.approval_id, RequestApprovalId(1));
        assert_eq!(plan.previous_status, Pending);
        assert_eq!(plan.new_status, Approved);
        assert_eq!(plan.derived_request_status, None);
    }

    #[test]
    fn highest_position_decision_sets_request_status() {
        let chain = vec![slot(1, 10, 1, Approved), slot(2, 20, 2, Pending)];

        let approved = evaluate_submission(REQUEST, &chain, UserId(20), Decision::Approved, ChainScope::Request)
            .expect("approve");
        assert_eq!(approved.derived_request_status, Some(Approved));

        let rejected = evaluate_submission(REQUEST, &chain, UserId(20), Decision::Rejected, ChainScope::Request)
            .expect("reject");
        assert_eq!(rejected.derived_request_status, Some(Rejected));
    }

    #[test]
    fn single_approver_chain_finalizes_immediately() {
        let chain = vec![slot(1, 10, 1, Pending)];

        let plan = evaluate_submission(REQUEST, &chain, UserId(10), Decision::Rejected, ChainScope::Request)
            .expect("sole approver decides");

        assert_eq!(plan.derived_request_status, Some(Rejected));
    }

    #[test]
    fn resubmission_overwrites_previous_decision() {
        let chain = vec![slot(1, 10, 1, Approved), slot(2, 20, 2, Approved)];

        let plan = evaluate_submission(REQUEST, &chain, UserId(20), Decision::Rejected, ChainScope::Request)
            .expect("re-submission is not guarded");

        assert!(plan.is_resubmission());
        assert_eq!(plan.previous_status, Approved);
        assert_eq!(plan.derived_request_status, Some(Rejected));
    }

    #[test]
    fn duplicate_rows_for_one_approver_use_the_lowest_id() {
        let chain = vec![slot(5, 10, 2, Pending), slot(3, 10, 1, Pending), slot(4, 20, 3, Pending)];

        let plan = evaluate_submission(REQUEST, &chain, UserId(10), Decision::Approved, ChainScope::Request)
            .expect("row 3 sits at position 1");

        assert_eq!(plan.approval_id, RequestApprovalId(3));
        assert_eq!(plan.position, 1);
    }

    #[test]
    fn request_wide_lookup_prefers_pending_rows_on_shared_positions() {
        let chain = vec![slot(1, 10, 1, Approved), slot(2, 11, 1, Pending), slot(3, 20, 2, Pending)];

        let lower = find_lower_approval_request_wide(&chain, 2).expect("position 1 exists");
        assert_eq!(lower.id, RequestApprovalId(2));
        assert!(find_lower_approval_request_wide(&chain, 1).is_none());
    }

    #[test]
    fn updater_scoped_lookup_only_sees_own_rows() {
        let chain = three_level_chain();
        let own: Vec<&_> = chain.iter().filter(|approval| approval.approver_id == UserId(20)).collect();

        assert!(find_lower_approval_updater_scoped(&own, 2).is_none());
    }

    #[test]
    fn derived_status_uses_lowest_id_on_shared_top_position() {
        let chain = vec![slot(1, 10, 1, Approved), slot(3, 30, 2, Rejected), slot(2, 20, 2, Pending)];

        assert_eq!(derive_request_status(&chain, UserId(30), ChainScope::Request), None);
        assert_eq!(derive_request_status(&chain, UserId(30), ChainScope::Updater), Some(Pending));
    }
}
