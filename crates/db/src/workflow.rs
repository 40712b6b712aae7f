//! Request creation and approval decisions against the store.
//!
//! The pure rules live in `tripgate_core::approvals`; this module loads the chain, applies a
//! [`SubmissionPlan`] and its audit trail in one transaction, and announces the outcome.
//! Chain creation is the exception: each slot is its own statement.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::{info, warn};

use tripgate_core::approvals::{
    evaluate_submission, plan_chain, ApprovalError, ChainReport, ChainScope, ChainSlot,
    SubmissionPlan,
};
use tripgate_core::audit::AuditEvent;
use tripgate_core::domain::approval::Decision;
use tripgate_core::domain::organization::{OrganizationId, UserId};
use tripgate_core::domain::request::{
    NewTravelRequest, RequestId, TravelRequest, TravelRequestPatch,
};
use tripgate_core::errors::ApplicationError;
use tripgate_core::notify::{Notification, Notifier};

use crate::locks::RequestLocks;
use crate::repositories::{
    audit, request, request_approval, GroupRepository, RepositoryError, SqlGroupRepository,
};
use crate::DbPool;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error("request {0} does not exist")]
    RequestNotFound(RequestId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for WorkflowError {
    fn from(error: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(error))
    }
}

impl From<WorkflowError> for ApplicationError {
    fn from(error: WorkflowError) -> Self {
        match error {
            WorkflowError::Approval(error) => Self::Approval(error),
            WorkflowError::RequestNotFound(id) => {
                Self::NotFound(format!("request {id} does not exist"))
            }
            WorkflowError::Repository(error) => error.into(),
        }
    }
}

struct RecordedDecision {
    plan: SubmissionPlan,
    finalized: bool,
}

/// Outcome of a recorded decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub request: TravelRequest,
    pub plan: SubmissionPlan,
}

#[derive(Clone)]
pub struct ApprovalWorkflow {
    pool: DbPool,
    scope: ChainScope,
    locks: RequestLocks,
    notifier: Arc<dyn Notifier>,
}

impl ApprovalWorkflow {
    pub fn new(pool: DbPool, scope: ChainScope, notifier: Arc<dyn Notifier>) -> Self {
        Self { pool, scope, locks: RequestLocks::new(), notifier }
    }

    pub fn scope(&self) -> ChainScope {
        self.scope
    }

    /// Stores a new pending request, then builds its approval chain and asks the approvers for
    /// a decision.
    ///
    /// The request row commits on its own. Chain slots follow as separate statements, so a
    /// failure part way through leaves the request with a partial chain.
    pub async fn create_request(
        &self,
        new_request: NewTravelRequest,
        correlation_id: &str,
    ) -> Result<(TravelRequest, ChainReport), WorkflowError> {
        new_request.validate().map_err(RepositoryError::from)?;
        let slots = self.chain_slots(new_request.organization_id, new_request.requester_id).await?;

        let mut conn = self.pool.acquire().await?;
        let request_id = request::insert(&mut conn, &new_request, Utc::now()).await?;
        info!(
            event_name = "request.created",
            correlation_id,
            request_id = request_id.0,
            "travel request created"
        );

        let report = materialize_chain(&mut conn, request_id, &slots, correlation_id).await?;
        audit::append(
            &mut conn,
            &AuditEvent::chain_created(&report, correlation_id, new_request.requester_id)
                .in_organization(new_request.organization_id),
        )
        .await?;
        let stored = request::fetch(&mut conn, request_id)
            .await?
            .ok_or(WorkflowError::RequestNotFound(request_id))?;
        drop(conn);

        info!(
            event_name = "approval.chain.created",
            correlation_id,
            request_id = request_id.0,
            approvers = report.created_count(),
            "approval chain created"
        );
        self.announce_chain(&stored, &report);
        Ok((stored, report))
    }

    /// Creates one pending slot per approver of the requester's groups. Each slot is its own
    /// statement; duplicates and vanished approvers are reported as skips.
    pub async fn create_approval_chain(
        &self,
        request_id: RequestId,
        requester_id: UserId,
        correlation_id: &str,
    ) -> Result<ChainReport, WorkflowError> {
        let stored = {
            let mut conn = self.pool.acquire().await?;
            request::fetch(&mut conn, request_id)
                .await?
                .ok_or(WorkflowError::RequestNotFound(request_id))?
        };
        let slots = self.chain_slots(stored.organization_id, requester_id).await?;

        let mut conn = self.pool.acquire().await?;
        let report = materialize_chain(&mut conn, request_id, &slots, correlation_id).await?;
        audit::append(
            &mut conn,
            &AuditEvent::chain_created(&report, correlation_id, requester_id)
                .in_organization(stored.organization_id),
        )
        .await?;
        drop(conn);

        self.announce_chain(&stored, &report);
        Ok(report)
    }

    /// Records an approver's decision and derives the request status.
    ///
    /// Decisions on one request are serialized: the in-process lock is held for the whole
    /// call and the transaction opens by touching the request row.
    pub async fn submit_approval(
        &self,
        organization_id: OrganizationId,
        request_id: RequestId,
        updater_id: UserId,
        decision: Decision,
        correlation_id: &str,
    ) -> Result<DecisionOutcome, WorkflowError> {
        let _guard = self.locks.lock(request_id).await;
        let mut tx = self.pool.begin().await?;
        let current = load_for_update(&mut tx, organization_id, request_id).await?;

        let recorded =
            self.record_decision(&mut tx, &current, updater_id, decision, correlation_id).await?;
        let updated = request::fetch(&mut tx, request_id)
            .await?
            .ok_or(WorkflowError::RequestNotFound(request_id))?;
        tx.commit().await?;

        self.announce_decision(&updated, updater_id, &recorded, correlation_id);
        Ok(DecisionOutcome { request: updated, plan: recorded.plan })
    }

    /// Applies trip detail changes and, when given, the caller's decision as one unit. A
    /// refused decision or an invalid patch leaves the request untouched.
    pub async fn update_request(
        &self,
        organization_id: OrganizationId,
        request_id: RequestId,
        updater_id: UserId,
        decision: Option<Decision>,
        patch: &TravelRequestPatch,
        correlation_id: &str,
    ) -> Result<TravelRequest, WorkflowError> {
        let _guard = self.locks.lock(request_id).await;
        let mut tx = self.pool.begin().await?;
        let current = load_for_update(&mut tx, organization_id, request_id).await?;

        if !patch.is_empty() {
            let mut patched = current.clone();
            patch.apply(&mut patched, Utc::now()).map_err(RepositoryError::from)?;
            request::write_details(&mut tx, &patched).await?;
        }
        let recorded = match decision {
            Some(decision) => Some(
                self.record_decision(&mut tx, &current, updater_id, decision, correlation_id)
                    .await?,
            ),
            None => None,
        };
        let updated = request::fetch(&mut tx, request_id)
            .await?
            .ok_or(WorkflowError::RequestNotFound(request_id))?;
        tx.commit().await?;

        if !patch.is_empty() {
            info!(
                event_name = "request.details.updated",
                correlation_id,
                request_id = request_id.0,
                "travel request details updated"
            );
        }
        if let Some(recorded) = recorded {
            self.announce_decision(&updated, updater_id, &recorded, correlation_id);
        }
        Ok(updated)
    }

    /// Evaluates the decision against the chain and writes the slot, the derived request
    /// status and the audit rows. Nothing is written when the decision is refused.
    async fn record_decision(
        &self,
        conn: &mut SqliteConnection,
        current: &TravelRequest,
        updater_id: UserId,
        decision: Decision,
        correlation_id: &str,
    ) -> Result<RecordedDecision, WorkflowError> {
        let request_id = current.id;
        let organization_id = current.organization_id;
        let now = Utc::now();
        let chain = request_approval::list_for_request(conn, request_id).await?;

        let plan = match evaluate_submission(request_id, &chain, updater_id, decision, self.scope) {
            Ok(plan) => plan,
            Err(error) => {
                warn!(
                    event_name = "approval.decision.refused",
                    correlation_id,
                    request_id = request_id.0,
                    updater_id = updater_id.0,
                    scope = self.scope.as_str(),
                    error = %error,
                    "approval decision refused"
                );
                return Err(error.into());
            }
        };

        request_approval::set_status(conn, plan.approval_id, plan.new_status, now).await?;
        let status = plan.derived_request_status.unwrap_or(current.status);
        request::set_status(conn, request_id, status, now).await?;

        audit::append(
            conn,
            &AuditEvent::decision_recorded(&plan, correlation_id).in_organization(organization_id),
        )
        .await?;
        let finalized = status.is_decided() && status != current.status;
        if finalized {
            audit::append(
                conn,
                &AuditEvent::request_finalized(
                    request_id,
                    current.status,
                    status,
                    correlation_id,
                    updater_id,
                )
                .in_organization(organization_id),
            )
            .await?;
        }

        Ok(RecordedDecision { plan, finalized })
    }

    fn announce_decision(
        &self,
        updated: &TravelRequest,
        updater_id: UserId,
        recorded: &RecordedDecision,
        correlation_id: &str,
    ) {
        let plan = &recorded.plan;
        info!(
            event_name = "approval.decision.recorded",
            correlation_id,
            request_id = updated.id.0,
            approver_id = updater_id.0,
            position = plan.position,
            status = plan.new_status.as_str(),
            request_status = updated.status.as_str(),
            resubmission = plan.is_resubmission(),
            "approval decision recorded"
        );

        self.notifier.notify(Notification::DecisionRecorded {
            request_id: updated.id,
            approver_id: updater_id,
            status: plan.new_status,
        });
        if recorded.finalized {
            self.notifier.notify(Notification::RequestFinalized {
                request_id: updated.id,
                requester_id: updated.requester_id,
                status: updated.status,
            });
        }
    }

    async fn chain_slots(
        &self,
        organization_id: OrganizationId,
        requester_id: UserId,
    ) -> Result<Vec<ChainSlot>, WorkflowError> {
        let approvers = SqlGroupRepository::new(self.pool.clone())
            .approvers_for_member(organization_id, requester_id)
            .await?;
        Ok(plan_chain(&approvers))
    }

    fn announce_chain(&self, request: &TravelRequest, report: &ChainReport) {
        let approver_ids = report.created_approvers();
        if approver_ids.is_empty() {
            return;
        }
        self.notifier.notify(Notification::ApprovalRequested {
            request_id: request.id,
            requester_id: request.requester_id,
            approver_ids,
        });
    }
}

/// Opens the request for writing: touches the row to take SQLite's write lock, then reads it
/// back scoped to the organization.
async fn load_for_update(
    conn: &mut SqliteConnection,
    organization_id: OrganizationId,
    request_id: RequestId,
) -> Result<TravelRequest, WorkflowError> {
    if !request::touch_for_update(conn, request_id).await? {
        return Err(WorkflowError::RequestNotFound(request_id));
    }
    request::fetch(conn, request_id)
        .await?
        .filter(|current| current.organization_id == organization_id)
        .ok_or(WorkflowError::RequestNotFound(request_id))
}

async fn materialize_chain(
    conn: &mut SqliteConnection,
    request_id: RequestId,
    slots: &[ChainSlot],
    correlation_id: &str,
) -> Result<ChainReport, WorkflowError> {
    let now = Utc::now();
    let mut report = ChainReport::new(request_id);

    for slot in slots {
        let result = request_approval::insert_slot(conn, request_id, slot, now).await?;
        report.record(*slot, result);
    }
    for (slot, reason) in report.skipped() {
        warn!(
            event_name = "approval.chain.slot_skipped",
            correlation_id,
            request_id = request_id.0,
            group_id = slot.group_id.0,
            approver_id = slot.approver_id.0,
            reason = ?reason,
            "approval slot skipped"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use tripgate_core::approvals::{ApprovalError, ChainScope, SkipReason};
    use tripgate_core::domain::approval::{ApprovalStatus, Decision};
    use tripgate_core::domain::group::{ApproverAssignment, NewGroup};
    use tripgate_core::domain::organization::{OrganizationId, UserId};
    use tripgate_core::domain::request::{NewTravelRequest, RequestId, TravelRequestPatch};
    use tripgate_core::notify::{InMemoryNotifier, Notification};

    use super::{ApprovalWorkflow, WorkflowError};
    use crate::repositories::{
        test_support, GroupRepository, RepositoryError, RequestRepository, SqlAuditRepository,
        SqlGroupRepository, SqlRequestApprovalRepository, SqlRequestRepository,
    };
    use crate::DbPool;

    const ORG: OrganizationId = OrganizationId(1);
    const REQUESTER: UserId = UserId(1);

    /// Requester 1 sits in a group whose approvers are users 2 (position 1) and 3 (position 2).
    async fn two_level_setup() -> DbPool {
        let pool = test_support::pool().await;
        for id in 1..=5 {
            test_support::insert_user(&pool, id).await;
        }
        test_support::insert_organization(&pool, 1, &[1, 2, 3, 4, 5]).await;
        add_group(&pool, "Ops", &[(2, 1), (3, 2)]).await;
        pool
    }

    async fn add_group(pool: &DbPool, name: &str, approvers: &[(i64, i64)]) {
        let groups = SqlGroupRepository::new(pool.clone());
        let group = groups
            .create(
                NewGroup {
                    organization_id: ORG,
                    name: name.to_string(),
                    description: None,
                    parent_group_id: None,
                    approval_levels: Some(approvers.len() as i64),
                },
                REQUESTER,
            )
            .await
            .expect("group");
        groups.add_members(group.id, &[REQUESTER]).await.expect("member");
        let assignments: Vec<ApproverAssignment> = approvers
            .iter()
            .map(|(approver, position)| ApproverAssignment {
                approver_id: UserId(*approver),
                position: Some(*position),
            })
            .collect();
        groups.add_approvers(group.id, &assignments).await.expect("approvers");
    }

    fn trip() -> NewTravelRequest {
        NewTravelRequest {
            organization_id: ORG,
            requester_id: REQUESTER,
            country: None,
            state: "Lagos".to_string(),
            city: "Ikeja".to_string(),
            start: NaiveDate::from_ymd_opt(2026, 5, 1).expect("date"),
            end: NaiveDate::from_ymd_opt(2026, 5, 3).expect("date"),
            purpose: None,
            hotel: Some("Eko".to_string()),
            room: None,
            rate: None,
            meal: None,
            transport: None,
            other_requests: None,
        }
    }

    fn workflow(pool: &DbPool, scope: ChainScope) -> (ApprovalWorkflow, InMemoryNotifier) {
        let notifier = InMemoryNotifier::default();
        (ApprovalWorkflow::new(pool.clone(), scope, Arc::new(notifier.clone())), notifier)
    }

    async fn decide(
        workflow: &ApprovalWorkflow,
        request_id: RequestId,
        approver: i64,
        decision: Decision,
    ) -> Result<ApprovalStatus, WorkflowError> {
        workflow
            .submit_approval(ORG, request_id, UserId(approver), decision, "corr-test")
            .await
            .map(|outcome| outcome.request.status)
    }

    #[tokio::test]
    async fn two_level_chain_approves_only_after_the_top_approver() {
        let pool = two_level_setup().await;
        let (workflow, notifier) = workflow(&pool, ChainScope::Request);

        let (request, report) =
            workflow.create_request(trip(), "corr-create").await.expect("create");
        assert_eq!(request.status, ApprovalStatus::Pending);
        assert_eq!(report.created_count(), 2);

        let after_first = decide(&workflow, request.id, 2, Decision::Approved).await.expect("first");
        assert_eq!(after_first, ApprovalStatus::Pending);
        let after_second = decide(&workflow, request.id, 3, Decision::Approved).await.expect("second");
        assert_eq!(after_second, ApprovalStatus::Approved);

        let sent = notifier.sent();
        assert!(matches!(
            &sent[0],
            Notification::ApprovalRequested { approver_ids, .. } if approver_ids.len() == 2
        ));
        assert!(matches!(
            sent.last(),
            Some(Notification::RequestFinalized { status: ApprovalStatus::Approved, .. })
        ));

        let trail = SqlAuditRepository::new(pool).list_for_request(request.id).await.expect("trail");
        let kinds: Vec<&str> = trail.iter().map(|event| event.event_type.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "approval.chain.created",
                "approval.decision.recorded",
                "approval.decision.recorded",
                "request.status.finalized",
            ]
        );
    }

    #[tokio::test]
    async fn top_approver_cannot_decide_before_the_lower_one() {
        let pool = two_level_setup().await;
        let (workflow, _) = workflow(&pool, ChainScope::Request);
        let (request, _) = workflow.create_request(trip(), "corr").await.expect("create");

        let error =
            decide(&workflow, request.id, 3, Decision::Approved).await.expect_err("ordered");
        assert!(matches!(
            error,
            WorkflowError::Approval(ApprovalError::LowerApproverHasNotApproved {
                pending_position: 1,
                ..
            })
        ));

        let chain = SqlRequestApprovalRepository::new(pool)
            .list_for_request(request.id)
            .await
            .expect("chain");
        assert!(chain.iter().all(|slot| slot.status == ApprovalStatus::Pending), "nothing written");
    }

    #[tokio::test]
    async fn legacy_scope_lets_any_approver_decide_and_mirrors_the_decision() {
        let pool = two_level_setup().await;
        let (workflow, _) = workflow(&pool, ChainScope::Updater);
        let (request, _) = workflow.create_request(trip(), "corr").await.expect("create");

        let status = decide(&workflow, request.id, 3, Decision::Rejected).await.expect("unordered");
        assert_eq!(status, ApprovalStatus::Rejected);

        let status = decide(&workflow, request.id, 2, Decision::Approved).await.expect("lower");
        assert_eq!(status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn outsiders_and_unknown_requests_are_refused() {
        let pool = two_level_setup().await;
        let (workflow, _) = workflow(&pool, ChainScope::Request);
        let (request, _) = workflow.create_request(trip(), "corr").await.expect("create");

        let outsider =
            decide(&workflow, request.id, 4, Decision::Approved).await.expect_err("outsider");
        assert!(matches!(
            outsider,
            WorkflowError::Approval(ApprovalError::NotAllowedToUpdateStatus { .. })
        ));

        let missing =
            decide(&workflow, RequestId(999), 2, Decision::Approved).await.expect_err("missing");
        assert!(matches!(missing, WorkflowError::RequestNotFound(RequestId(999))));

        let foreign = workflow
            .submit_approval(OrganizationId(2), request.id, UserId(2), Decision::Approved, "corr")
            .await
            .expect_err("other organization");
        assert!(matches!(foreign, WorkflowError::RequestNotFound(_)));
    }

    #[tokio::test]
    async fn rejection_by_the_top_approver_rejects_the_request_and_resubmission_overwrites() {
        let pool = two_level_setup().await;
        let (workflow, _) = workflow(&pool, ChainScope::Request);
        let (request, _) = workflow.create_request(trip(), "corr").await.expect("create");

        decide(&workflow, request.id, 2, Decision::Approved).await.expect("lower");
        let rejected = decide(&workflow, request.id, 3, Decision::Rejected).await.expect("reject");
        assert_eq!(rejected, ApprovalStatus::Rejected);

        let outcome = workflow
            .submit_approval(ORG, request.id, UserId(3), Decision::Approved, "corr")
            .await
            .expect("resubmit");
        assert!(outcome.plan.is_resubmission());
        assert_eq!(outcome.request.status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn approver_in_two_groups_gets_one_slot() {
        let pool = two_level_setup().await;
        add_group(&pool, "Finance", &[(3, 1), (4, 3)]).await;
        let (workflow, _) = workflow(&pool, ChainScope::Request);

        let (request, report) = workflow.create_request(trip(), "corr").await.expect("create");

        assert_eq!(report.created_count(), 3);
        let skipped: Vec<SkipReason> = report.skipped().map(|(_, reason)| reason).collect();
        assert_eq!(skipped, vec![SkipReason::Duplicate]);

        let chain = SqlRequestApprovalRepository::new(pool)
            .list_for_request(request.id)
            .await
            .expect("chain");
        let slots: Vec<(i64, i64)> =
            chain.iter().map(|slot| (slot.approver_id.0, slot.position)).collect();
        assert_eq!(slots, vec![(2, 1), (3, 1), (4, 3)]);
    }

    #[tokio::test]
    async fn chain_can_be_rebuilt_for_an_existing_request() {
        let pool = two_level_setup().await;
        let (workflow, _) = workflow(&pool, ChainScope::Request);
        let (request, _) = workflow.create_request(trip(), "corr").await.expect("create");

        let report = workflow
            .create_approval_chain(request.id, REQUESTER, "corr-rebuild")
            .await
            .expect("rebuild");

        assert_eq!(report.created_count(), 0);
        assert_eq!(report.skipped().count(), 2);
    }

    #[tokio::test]
    async fn concurrent_decisions_on_one_request_are_serialized() {
        let pool = test_support::pool().await;
        for id in 1..=3 {
            test_support::insert_user(&pool, id).await;
        }
        test_support::insert_organization(&pool, 1, &[1, 2, 3]).await;
        add_group(&pool, "Ops", &[(2, 1)]).await;
        add_group(&pool, "Sales", &[(3, 1)]).await;
        let (workflow, _) = workflow(&pool, ChainScope::Request);
        let (request, _) = workflow.create_request(trip(), "corr").await.expect("create");

        let handles: Vec<_> = [2, 3]
            .into_iter()
            .map(|approver| {
                let workflow = workflow.clone();
                tokio::spawn(async move {
                    workflow
                        .submit_approval(ORG, request.id, UserId(approver), Decision::Approved, "corr")
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.expect("task").expect("decision");
        }

        let chain = SqlRequestApprovalRepository::new(pool.clone())
            .list_for_request(request.id)
            .await
            .expect("chain");
        assert!(chain.iter().all(|slot| slot.status == ApprovalStatus::Approved));
        let trail = SqlAuditRepository::new(pool).list_for_request(request.id).await.expect("trail");
        let decisions =
            trail.iter().filter(|event| event.event_type == "approval.decision.recorded").count();
        assert_eq!(decisions, 2);
    }

    #[tokio::test]
    async fn invalid_details_discard_the_decision_sent_with_them() {
        let pool = two_level_setup().await;
        let (workflow, notifier) = workflow(&pool, ChainScope::Request);
        let (request, _) = workflow.create_request(trip(), "corr").await.expect("create");
        let inverted = TravelRequestPatch {
            end: NaiveDate::from_ymd_opt(2020, 1, 1),
            ..TravelRequestPatch::default()
        };

        let error = workflow
            .update_request(ORG, request.id, UserId(2), Some(Decision::Approved), &inverted, "corr")
            .await
            .expect_err("inverted range");
        assert!(matches!(error, WorkflowError::Repository(RepositoryError::Domain(_))));

        let chain = SqlRequestApprovalRepository::new(pool.clone())
            .list_for_request(request.id)
            .await
            .expect("chain");
        assert!(chain.iter().all(|slot| slot.status == ApprovalStatus::Pending));
        let trail = SqlAuditRepository::new(pool).list_for_request(request.id).await.expect("trail");
        assert_eq!(trail.len(), 1, "only the chain creation is audited");
        assert_eq!(notifier.sent().len(), 1, "no decision announced");
    }

    #[tokio::test]
    async fn refused_decisions_discard_the_details_sent_with_them() {
        let pool = two_level_setup().await;
        let (workflow, _) = workflow(&pool, ChainScope::Request);
        let (request, _) = workflow.create_request(trip(), "corr").await.expect("create");
        let patch =
            TravelRequestPatch { city: Some("Lekki".to_string()), ..TravelRequestPatch::default() };

        workflow
            .update_request(ORG, request.id, UserId(3), Some(Decision::Approved), &patch, "corr")
            .await
            .expect_err("lower approver pending");

        let stored = SqlRequestRepository::new(pool)
            .find(ORG, request.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(stored.city, "Ikeja");
    }

    #[tokio::test]
    async fn details_and_decision_commit_together() {
        let pool = two_level_setup().await;
        let (workflow, _) = workflow(&pool, ChainScope::Request);
        let (request, _) = workflow.create_request(trip(), "corr").await.expect("create");
        let patch =
            TravelRequestPatch { city: Some("Lekki".to_string()), ..TravelRequestPatch::default() };

        let updated = workflow
            .update_request(ORG, request.id, UserId(2), Some(Decision::Approved), &patch, "corr")
            .await
            .expect("update");

        assert_eq!(updated.city, "Lekki");
        let chain = SqlRequestApprovalRepository::new(pool)
            .list_for_request(request.id)
            .await
            .expect("chain");
        assert_eq!(chain[0].status, ApprovalStatus::Approved);
        assert_eq!(chain[1].status, ApprovalStatus::Pending);
    }

    #[tokio::test]
    async fn a_failed_chain_keeps_the_committed_request() {
        let pool = two_level_setup().await;
        let (workflow, _) = workflow(&pool, ChainScope::Request);
        sqlx::query("DROP TABLE request_approvals").execute(&pool).await.expect("drop");

        workflow.create_request(trip(), "corr").await.expect_err("chain store missing");

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM requests")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(stored, 1);
    }
}
