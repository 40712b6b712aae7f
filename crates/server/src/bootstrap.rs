use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use tripgate_core::config::{AppConfig, ConfigError};
use tripgate_core::notify::TracingNotifier;
use tripgate_db::{connect_with_config, migrations, ApprovalWorkflow, DbPool};

use crate::api::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub workflow: ApprovalWorkflow,
}

impl Application {
    pub fn state(&self) -> AppState {
        AppState {
            db_pool: self.db_pool.clone(),
            workflow: self.workflow.clone(),
            pagination: self.config.pagination.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let workflow = ApprovalWorkflow::new(
        db_pool.clone(),
        config.approvals.chain_scope,
        Arc::new(TracingNotifier),
    );

    Ok(Application { config, db_pool, workflow })
}
