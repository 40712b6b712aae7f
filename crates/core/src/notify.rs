//! Outbound notifications about request progress.
//!
//! Delivery is an external concern. The service only decides *what* to announce and hands it
//! to a [`Notifier`].

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::approval::ApprovalStatus;
use crate::domain::organization::UserId;
use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A new request is waiting on its approvers.
    ApprovalRequested { request_id: RequestId, requester_id: UserId, approver_ids: Vec<UserId> },
    DecisionRecorded { request_id: RequestId, approver_id: UserId, status: ApprovalStatus },
    /// The request reached a final status.
    RequestFinalized { request_id: RequestId, requester_id: UserId, status: ApprovalStatus },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApprovalRequested { .. } => "approval_requested",
            Self::DecisionRecorded { .. } => "decision_recorded",
            Self::RequestFinalized { .. } => "request_finalized",
        }
    }

    pub fn request_id(&self) -> RequestId {
        match self {
            Self::ApprovalRequested { request_id, .. }
            | Self::DecisionRecorded { request_id, .. }
            | Self::RequestFinalized { request_id, .. } => *request_id,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes every notification to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let payload = serde_json::to_string(&notification).unwrap_or_default();
        info!(
            event_name = "notification.dispatched",
            kind = notification.kind(),
            request_id = notification.request_id().0,
            payload = %payload,
            "notification dispatched"
        );
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, notification: Notification) {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}
