use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tripgate_cli::commands::{config, doctor, migrate, seed};

#[test]
fn migrate_applies_then_reports_up_to_date() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir.path().join("migrate.db"));

    with_env(&[("TRIPGATE_DATABASE_URL", &url)], || {
        let first = migrate::run();
        assert_eq!(first.exit_code, 0, "expected successful migrate run: {}", first.output);
        let payload = parse_payload(&first.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");

        let second = migrate::run();
        assert_eq!(second.exit_code, 0);
        assert_eq!(parse_payload(&second.output)["message"], "schema already up to date");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("TRIPGATE_DATABASE_URL", "postgres://localhost/tripgate")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_returns_connectivity_failure_for_missing_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("absent").join("x.db").display());

    with_env(&[("TRIPGATE_DATABASE_URL", &url)], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 4, "expected connectivity failure code: {}", result.output);
        assert_eq!(parse_payload(&result.output)["error_class"], "db_connectivity");
    });
}

#[test]
fn seed_loads_demo_dataset_idempotently() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir.path().join("seed.db"));

    with_env(&[("TRIPGATE_DATABASE_URL", &url)], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected seed success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");
        let message = first_payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("organization 9001"), "{message}");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed success");
        assert_eq!(first_payload["message"], parse_payload(&second.output)["message"]);
    });
}

#[test]
fn doctor_flags_pending_migrations_until_migrate_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir.path().join("doctor.db"));

    with_env(&[("TRIPGATE_DATABASE_URL", &url)], || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 5, "expected pending-migration code: {}", before.output);
        let report = parse_payload(&before.output);
        assert_eq!(report["overall_status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0, "{}", after.output);
        let report = parse_payload(&after.output);
        assert_eq!(report["overall_status"], "pass");
        let names: Vec<&str> = report["checks"]
            .as_array()
            .map(|checks| checks.iter().filter_map(|check| check["name"].as_str()).collect())
            .unwrap_or_default();
        assert_eq!(names, vec!["config_validation", "database_connectivity", "migrations_current"]);
    });
}

#[test]
fn doctor_skips_database_checks_when_config_is_invalid() {
    with_env(&[("TRIPGATE_PAGINATION_MAX_PAGE_SIZE", "0")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("- [fail] config_validation"), "{}", result.output);
        assert!(result.output.contains("- [skip] database_connectivity"));
    });
}

#[test]
fn config_attributes_env_values() {
    with_env(
        &[("TRIPGATE_APPROVALS_CHAIN_SCOPE", "updater"), ("TRIPGATE_LOG_LEVEL", "debug")],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            let payload = parse_payload(&result.output);
            let message = payload["message"].as_str().unwrap_or_default();
            assert!(message.contains(
                "- approvals.chain_scope = updater (source: env (TRIPGATE_APPROVALS_CHAIN_SCOPE))"
            ));
            assert!(message.contains("- logging.level = debug (source: env (TRIPGATE_LOG_LEVEL))"));
            assert!(message.contains("- server.port = 8080 (source: default)"));
        },
    );
}

fn database_url(path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", path.display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "TRIPGATE_DATABASE_URL",
        "TRIPGATE_DATABASE_MAX_CONNECTIONS",
        "TRIPGATE_DATABASE_TIMEOUT_SECS",
        "TRIPGATE_SERVER_BIND_ADDRESS",
        "TRIPGATE_SERVER_PORT",
        "TRIPGATE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "TRIPGATE_APPROVALS_CHAIN_SCOPE",
        "TRIPGATE_PAGINATION_DEFAULT_PAGE_SIZE",
        "TRIPGATE_PAGINATION_MAX_PAGE_SIZE",
        "TRIPGATE_LOGGING_LEVEL",
        "TRIPGATE_LOGGING_FORMAT",
        "TRIPGATE_LOG_LEVEL",
        "TRIPGATE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
