pub mod analytics;
pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod pagination;

pub use approvals::{
    evaluate_submission, plan_chain, ApprovalError, ChainReport, ChainScope, ChainSlot,
    SkipReason, SlotResult, SubmissionPlan,
};
pub use audit::{AuditCategory, AuditEvent, AuditOutcome};
pub use domain::approval::{ApprovalStatus, Decision, RequestApproval, RequestApprovalId};
pub use domain::comment::{Comment, CommentEntity, CommentId, NewComment};
pub use domain::group::{ApproverAssignment, Group, GroupApprover, GroupId, GroupMember, NewGroup};
pub use domain::organization::{
    MemberRole, NewOrganization, NewUser, Organization, OrganizationId, OrganizationMember, User,
    UserId,
};
pub use domain::request::{NewTravelRequest, RequestId, TravelRequest, TravelRequestPatch};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use notify::{InMemoryNotifier, Notification, Notifier, TracingNotifier};
pub use pagination::{Page, PageQuery, PageRequest};
