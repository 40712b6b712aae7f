//! Multi-level approval chains for travel requests.
//!
//! A request's chain holds one slot per approver of the requester's groups. Approvers decide
//! in ascending `position` order, and the request takes the status of the slot at the highest
//! position once that slot is decided.

pub mod chain;
pub mod submission;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::approval::ApprovalStatus;
use crate::domain::organization::UserId;
use crate::domain::request::RequestId;

pub use chain::{plan_chain, ChainReport, ChainSlot, SkipReason, SlotOutcome, SlotResult};
pub use submission::{
    derive_request_status, evaluate_submission, find_lower_approval_request_wide,
    find_lower_approval_updater_scoped, SubmissionPlan,
};

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalError {
    #[error("user {updater_id} is not allowed to update the status of request {request_id}")]
    NotAllowedToUpdateStatus { request_id: RequestId, updater_id: UserId },
    #[error(
        "cannot record a decision on request {request_id} until the approver at position \
         {pending_position} has decided"
    )]
    LowerApproverHasNotApproved { request_id: RequestId, pending_position: i64 },
}

/// Which rows the ordering check and the status derivation look at.
///
/// `Updater` reproduces the legacy behavior where both lookups were filtered to the acting
/// approver's own rows: the lower-approver check then never sees another approver, and the
/// request status mirrors every decision. `Request` looks across the whole chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainScope {
    #[default]
    Request,
    Updater,
}

impl ChainScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Updater => "updater",
        }
    }
}

impl std::str::FromStr for ChainScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "request" => Ok(Self::Request),
            "updater" => Ok(Self::Updater),
            other => Err(format!("unsupported chain scope `{other}` (expected request|updater)")),
        }
    }
}

/// Majority vote across a set of statuses.
///
/// Starts from pending and only moves to a status with a strictly greater count, visiting
/// approved, pending, rejected in that order. An approved/rejected tie therefore resolves to
/// approved and any tie involving pending stays pending. Not used by the decision path; kept
/// as an alternative aggregation policy.
pub fn dominant_status(statuses: &[ApprovalStatus]) -> ApprovalStatus {
    let mut counts: HashMap<ApprovalStatus, usize> = HashMap::new();
    for status in statuses {
        *counts.entry(*status).or_default() += 1;
    }
    let count = |status: ApprovalStatus| counts.get(&status).copied().unwrap_or(0);

    let mut dominant = ApprovalStatus::Pending;
    for status in [ApprovalStatus::Approved, ApprovalStatus::Pending, ApprovalStatus::Rejected] {
        if count(status) > count(dominant) {
            dominant = status;
        }
    }
    dominant
}
