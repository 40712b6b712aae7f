use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::approvals::{ChainReport, SubmissionPlan};
use crate::domain::approval::ApprovalStatus;
use crate::domain::organization::{OrganizationId, UserId};
use crate::domain::request::RequestId;
use crate::errors::DomainError;

pub const EVENT_CHAIN_CREATED: &str = "approval.chain.created";
pub const EVENT_DECISION_RECORDED: &str = "approval.decision.recorded";
pub const EVENT_REQUEST_FINALIZED: &str = "request.status.finalized";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Request,
    Approval,
    Group,
    Comment,
    System,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Approval => "approval",
            Self::Group => "group",
            Self::Comment => "comment",
            Self::System => "system",
        }
    }
}

impl std::str::FromStr for AuditCategory {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "request" => Ok(Self::Request),
            "approval" => Ok(Self::Approval),
            "group" => Ok(Self::Group),
            "comment" => Ok(Self::Comment),
            "system" => Ok(Self::System),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown audit category `{other}`")))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for AuditOutcome {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "success" => Ok(Self::Success),
            "rejected" => Ok(Self::Rejected),
            "failed" => Ok(Self::Failed),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown audit outcome `{other}`")))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub organization_id: Option<OrganizationId>,
    pub request_id: Option<RequestId>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        request_id: Option<RequestId>,
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            organization_id: None,
            request_id,
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn in_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn chain_created(report: &ChainReport, correlation_id: &str, actor: UserId) -> Self {
        let skipped = report.skipped().count();
        Self::new(
            Some(report.request_id),
            correlation_id,
            EVENT_CHAIN_CREATED,
            AuditCategory::Approval,
            actor.to_string(),
            AuditOutcome::Success,
        )
        .with_metadata("created", report.created_count().to_string())
        .with_metadata("skipped", skipped.to_string())
    }

    pub fn decision_recorded(plan: &SubmissionPlan, correlation_id: &str) -> Self {
        let outcome = match plan.new_status {
            ApprovalStatus::Rejected => AuditOutcome::Rejected,
            ApprovalStatus::Approved | ApprovalStatus::Pending => AuditOutcome::Success,
        };
        Self::new(
            Some(plan.request_id),
            correlation_id,
            EVENT_DECISION_RECORDED,
            AuditCategory::Approval,
            plan.approver_id.to_string(),
            outcome,
        )
        .with_metadata("position", plan.position.to_string())
        .with_metadata("from", plan.previous_status.as_str())
        .with_metadata("to", plan.new_status.as_str())
    }

    pub fn request_finalized(
        request_id: RequestId,
        previous: ApprovalStatus,
        status: ApprovalStatus,
        correlation_id: &str,
        actor: UserId,
    ) -> Self {
        Self::new(
            Some(request_id),
            correlation_id,
            EVENT_REQUEST_FINALIZED,
            AuditCategory::Request,
            actor.to_string(),
            AuditOutcome::Success,
        )
        .with_metadata("from", previous.as_str())
        .with_metadata("to", status.as_str())
    }
}

#[cfg(test)]
mod tests {
    use crate::approvals::{ChainReport, ChainSlot, SkipReason, SlotResult, SubmissionPlan};
    use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, EVENT_DECISION_RECORDED};
    use crate::domain::approval::{ApprovalStatus, RequestApprovalId};
    use crate::domain::group::GroupId;
    use crate::domain::organization::UserId;
    use crate::domain::request::RequestId;

    #[test]
    fn decision_event_carries_transition_metadata() {
        let plan = SubmissionPlan {
            request_id: RequestId(3),
            approval_id: RequestApprovalId(8),
            approver_id: UserId(20),
            position: 2,
            previous_status: ApprovalStatus::Pending,
            new_status: ApprovalStatus::Rejected,
            derived_request_status: Some(ApprovalStatus::Rejected),
        };

        let event = AuditEvent::decision_recorded(&plan, "req-123");

        assert_eq!(event.event_type, EVENT_DECISION_RECORDED);
        assert_eq!(event.correlation_id, "req-123");
        assert_eq!(event.outcome, AuditOutcome::Rejected);
        assert_eq!(event.actor, "20");
        assert_eq!(event.metadata.get("from").map(String::as_str), Some("pending"));
        assert_eq!(event.metadata.get("to").map(String::as_str), Some("rejected"));
    }

    #[test]
    fn chain_event_counts_skipped_slots() {
        let slot = ChainSlot { group_id: GroupId(1), approver_id: UserId(10), position: 1 };
        let mut report = ChainReport::new(RequestId(4));
        report.record(slot, SlotResult::Created(RequestApprovalId(1)));
        report.record(slot, SlotResult::Skipped(SkipReason::Duplicate));

        let event = AuditEvent::chain_created(&report, "req-9", UserId(2));

        assert_eq!(event.category, AuditCategory::Approval);
        assert_eq!(event.request_id, Some(RequestId(4)));
        assert_eq!(event.metadata.get("created").map(String::as_str), Some("1"));
        assert_eq!(event.metadata.get("skipped").map(String::as_str), Some("1"));
    }

    #[test]
    fn categories_round_trip_through_storage_names() {
        for category in [
            AuditCategory::Request,
            AuditCategory::Approval,
            AuditCategory::Group,
            AuditCategory::Comment,
            AuditCategory::System,
        ] {
            assert_eq!(category.as_str().parse::<AuditCategory>(), Ok(category));
        }
        assert!("pricing".parse::<AuditCategory>().is_err());
    }
}
