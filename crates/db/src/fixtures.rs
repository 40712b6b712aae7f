use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Approval slots the demo request must carry, in row order: (approver, position, status).
const DEMO_CHAIN: &[(i64, i64, &str)] = &[(9002, 1, "approved"), (9003, 2, "pending")];

const DEMO_USER_IDS: &[i64] = &[9001, 9002, 9003, 9004];
const DEMO_AUDIT_EVENT_IDS: &[&str] = &["ae-demo-001", "ae-demo-002"];

pub const DEMO_ORGANIZATION_ID: i64 = 9001;
pub const DEMO_GROUP_ID: i64 = 9001;
pub const DEMO_REQUEST_ID: i64 = 9001;
pub const DEMO_REQUESTER_ID: i64 = 9001;

/// Demo organization with a two-level approval chain.
///
/// The request's first approver has approved; the second is still pending, so the next
/// decision by user 9003 finalizes it.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Loads the dataset. Rows are inserted with `OR IGNORE`, so loading twice is harmless.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            organization_id: DEMO_ORGANIZATION_ID,
            users_seeded: DEMO_USER_IDS.len(),
            request_id: DEMO_REQUEST_ID,
            approval_levels: DEMO_CHAIN.len(),
        })
    }

    /// Checks that every seeded row is present and the chain is in its expected state.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let users: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM users WHERE id IN {}",
            sql_list(DEMO_USER_IDS.iter().map(ToString::to_string))
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("demo-users", users == DEMO_USER_IDS.len() as i64));

        let members: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM organization_users WHERE organization_id = ?1 AND is_deleted = 0",
        )
        .bind(DEMO_ORGANIZATION_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("demo-organization-members", members == DEMO_USER_IDS.len() as i64));

        let requester_in_group: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM group_members WHERE group_id = ?1 AND member_id = ?2)",
        )
        .bind(DEMO_GROUP_ID)
        .bind(DEMO_REQUESTER_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("demo-group-membership", requester_in_group == 1));

        let positions: Vec<i64> = sqlx::query_scalar(
            "SELECT position FROM group_approvers WHERE group_id = ?1 ORDER BY position",
        )
        .bind(DEMO_GROUP_ID)
        .fetch_all(pool)
        .await?;
        checks.push(("demo-group-approver-positions", positions == vec![1, 2]));

        let request_pending: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM requests WHERE id = ?1 AND status = 'pending' AND is_deleted = 0)",
        )
        .bind(DEMO_REQUEST_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("demo-request-pending", request_pending == 1));

        let chain: Vec<(i64, i64, String)> = sqlx::query_as(
            "SELECT approver_id, position, status FROM request_approvals
             WHERE request_id = ?1 ORDER BY id",
        )
        .bind(DEMO_REQUEST_ID)
        .fetch_all(pool)
        .await?;
        let chain_ok = chain.len() == DEMO_CHAIN.len()
            && chain.iter().zip(DEMO_CHAIN).all(|(actual, expected)| {
                actual.0 == expected.0 && actual.1 == expected.1 && actual.2 == expected.2
            });
        checks.push(("demo-approval-chain", chain_ok));

        let comments: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM comments WHERE table_name = 'request' AND record_id = ?1",
        )
        .bind(DEMO_REQUEST_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("demo-comment", comments >= 1));

        let hotel_approved: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM approved_hotels h JOIN requests r
                           ON r.organization_id = h.organization_id AND r.hotel = h.name
                           WHERE r.id = ?1 AND h.is_deleted = 0)",
        )
        .bind(DEMO_REQUEST_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("demo-approved-hotel", hotel_approved == 1));

        let audit_events: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM audit_event WHERE id IN {}",
            sql_list(DEMO_AUDIT_EVENT_IDS.iter().map(|id| format!("'{id}'")))
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("demo-audit-events", audit_events == DEMO_AUDIT_EVENT_IDS.len() as i64));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

fn sql_list(values: impl Iterator<Item = String>) -> String {
    format!("({})", values.collect::<Vec<_>>().join(","))
}

#[derive(Debug)]
pub struct SeedResult {
    pub organization_id: i64,
    pub users_seeded: usize,
    pub request_id: i64,
    pub approval_levels: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tripgate_core::approvals::ChainScope;
    use tripgate_core::domain::approval::{ApprovalStatus, Decision};
    use tripgate_core::domain::organization::{OrganizationId, UserId};
    use tripgate_core::domain::request::RequestId;
    use tripgate_core::notify::InMemoryNotifier;

    use super::*;
    use crate::repositories::test_support;
    use crate::workflow::ApprovalWorkflow;

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoSeedDataset::SQL.is_empty());
        assert!(DemoSeedDataset::SQL.contains("INSERT OR IGNORE"));
    }

    #[tokio::test]
    async fn seed_loads_verifies_and_is_idempotent() {
        let pool = test_support::pool().await;

        let first = DemoSeedDataset::load(&pool).await.expect("load");
        let first_verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.approval_levels, 2);

        DemoSeedDataset::load(&pool).await.expect("reload");
        let second_verification = DemoSeedDataset::verify(&pool).await.expect("re-verify");
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn seeded_request_finalizes_on_the_second_level_decision() {
        let pool = test_support::pool().await;
        DemoSeedDataset::load(&pool).await.expect("load");
        let workflow =
            ApprovalWorkflow::new(pool, ChainScope::Request, Arc::new(InMemoryNotifier::default()));

        let outcome = workflow
            .submit_approval(
                OrganizationId(DEMO_ORGANIZATION_ID),
                RequestId(DEMO_REQUEST_ID),
                UserId(9003),
                Decision::Approved,
                "seed-test",
            )
            .await
            .expect("decision");

        assert_eq!(outcome.request.status, ApprovalStatus::Approved);
    }
}
