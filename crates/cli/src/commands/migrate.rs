use tripgate_db::migrations;

use crate::commands::{with_database, CommandResult, EXIT_MIGRATION};

pub fn run() -> CommandResult {
    let result = with_database("migrate", |pool| async move {
        let pending = migrations::pending_versions(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        Ok(pending.len())
    });

    match result {
        Ok(0) => CommandResult::success("migrate", "schema already up to date"),
        Ok(applied) => {
            CommandResult::success("migrate", format!("applied {applied} pending migration(s)"))
        }
        Err(failure) => failure,
    }
}
