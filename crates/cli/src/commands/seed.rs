use tripgate_db::{migrations, DemoSeedDataset, SeedResult};

use crate::commands::{with_database, CommandResult, EXIT_MIGRATION, EXIT_VERIFICATION};

pub fn run() -> CommandResult {
    let result = with_database("seed", |pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_VERIFICATION))?;

        if verification.all_present {
            Ok(seeded)
        } else {
            Err(("seed_verification", failed_checks_message(&verification.checks), EXIT_VERIFICATION))
        }
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err(failure) => failure,
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo dataset loaded: organization {} with {} users; request {} awaits level {} of {}",
        seeded.organization_id,
        seeded.users_seeded,
        seeded.request_id,
        seeded.approval_levels,
        seeded.approval_levels
    )
}

fn failed_checks_message(checks: &[(&'static str, bool)]) -> String {
    let failed = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use tripgate_db::SeedResult;

    use super::{failed_checks_message, summary};

    #[test]
    fn verification_message_names_failed_checks() {
        let checks = [
            ("demo-users", true),
            ("demo-approval-chain", false),
            ("demo-audit-events", false),
        ];

        assert_eq!(
            failed_checks_message(&checks),
            "seed verification failed for checks: demo-approval-chain, demo-audit-events"
        );
    }

    #[test]
    fn verification_message_falls_back_when_nothing_is_labelled() {
        assert_eq!(failed_checks_message(&[("demo-users", true)]), "some seed data failed to load");
    }

    #[test]
    fn summary_points_at_the_pending_level() {
        let seeded =
            SeedResult { organization_id: 9001, users_seeded: 4, request_id: 9001, approval_levels: 2 };

        assert_eq!(
            summary(&seeded),
            "demo dataset loaded: organization 9001 with 4 users; request 9001 awaits level 2 of 2"
        );
    }
}
