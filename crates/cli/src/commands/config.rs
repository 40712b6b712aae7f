use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;
use tripgate_core::config::{resolve_config_path, AppConfig, LoadOptions};

use crate::commands::{CommandResult, EXIT_CONFIG};

/// Reports every effective value and where it came from. Overrides from env win over the
/// file, which wins over defaults.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let path = resolve_config_path(None);
    let document = load_config_file_doc(path.as_deref());
    let lines = render(&config, path.as_deref(), document.as_ref());

    CommandResult::success("config", lines.join("\n"))
}

struct Entry {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

fn entry(key: &'static str, env_keys: &'static [&'static str], value: impl ToString) -> Entry {
    Entry { key, env_keys, value: value.to_string() }
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    vec![
        entry("database.url", &["TRIPGATE_DATABASE_URL"], &config.database.url),
        entry(
            "database.max_connections",
            &["TRIPGATE_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections,
        ),
        entry(
            "database.timeout_secs",
            &["TRIPGATE_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs,
        ),
        entry(
            "server.bind_address",
            &["TRIPGATE_SERVER_BIND_ADDRESS"],
            &config.server.bind_address,
        ),
        entry("server.port", &["TRIPGATE_SERVER_PORT"], config.server.port),
        entry(
            "server.graceful_shutdown_secs",
            &["TRIPGATE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs,
        ),
        entry(
            "approvals.chain_scope",
            &["TRIPGATE_APPROVALS_CHAIN_SCOPE"],
            config.approvals.chain_scope.as_str(),
        ),
        entry(
            "pagination.default_page_size",
            &["TRIPGATE_PAGINATION_DEFAULT_PAGE_SIZE"],
            config.pagination.default_page_size,
        ),
        entry(
            "pagination.max_page_size",
            &["TRIPGATE_PAGINATION_MAX_PAGE_SIZE"],
            config.pagination.max_page_size,
        ),
        entry(
            "logging.level",
            &["TRIPGATE_LOGGING_LEVEL", "TRIPGATE_LOG_LEVEL"],
            &config.logging.level,
        ),
        entry(
            "logging.format",
            &["TRIPGATE_LOGGING_FORMAT", "TRIPGATE_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
        ),
    ]
}

fn render(config: &AppConfig, path: Option<&Path>, document: Option<&Value>) -> Vec<String> {
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for Entry { key, env_keys, value } in entries(config) {
        let source = field_source(key, env_keys, document, path);
        lines.push(format!("- {key} = {value} (source: {source})"));
    }
    lines
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    document: Option<&Value>,
    path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if document.is_some_and(|doc| contains_path(doc, key_path)) {
        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("config file"))
            .display()
            .to_string();
        return format!("file ({file})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use toml::Value;
    use tripgate_core::config::AppConfig;

    use super::{contains_path, field_source, render};

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let document: Value =
            "[approvals]\nchain_scope = \"updater\"\n".parse().expect("toml");

        assert!(contains_path(&document, "approvals.chain_scope"));
        assert!(!contains_path(&document, "approvals.missing"));
        assert!(!contains_path(&document, "server.port"));
    }

    #[test]
    fn file_values_are_attributed_to_the_file() {
        let document: Value = "[server]\nport = 9000\n".parse().expect("toml");

        let source = field_source(
            "server.port",
            &["TRIPGATE_TEST_UNSET_SERVER_PORT"],
            Some(&document),
            Some(Path::new("tripgate.toml")),
        );
        assert_eq!(source, "file (tripgate.toml)");

        let source = field_source("server.bind_address", &[], Some(&document), None);
        assert_eq!(source, "default");
    }

    #[test]
    fn every_section_is_rendered() {
        let lines = render(&AppConfig::default(), None, None);

        for key in ["database.url", "server.port", "approvals.chain_scope", "pagination.max_page_size"]
        {
            assert!(lines.iter().any(|line| line.starts_with(&format!("- {key} = "))), "{key}");
        }
        assert!(lines.iter().any(|line| line == "- approvals.chain_scope = request (source: default)"));
    }
}
