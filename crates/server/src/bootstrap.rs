use procura_core::config::{AppConfig, ConfigError, LoadOptions};
use procura_core::notifications::{DispatchError, DispatchSettings, DispatchWorker};
use procura_core::{ApprovalWorkflowService, NotificationDispatcher, RequestLifecycleService};
use procura_db::{connect_with_settings, migrations, sql_stores, DbPool};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;
use crate::notifier::build_notifier;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub lifecycle: RequestLifecycleService,
    pub approvals: ApprovalWorkflowService,
    pub notifications: NotificationDispatcher,
    pub dispatch_worker: Option<DispatchWorker>,
}

impl Application {
    pub fn api_state(&self) -> ApiState {
        ApiState { lifecycle: self.lifecycle.clone(), approvals: self.approvals.clone() }
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
    #[error("notification client setup failed: {0}")]
    NotificationClient(#[source] reqwest::Error),
    #[error("notification dispatcher failed to start: {0}")]
    Notifications(#[source] DispatchError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let stores = sql_stores(db_pool.clone());
    let (dispatcher, dispatch_worker) = if config.notifications.enabled {
        let notifier =
            build_notifier(&config.notifications).map_err(BootstrapError::NotificationClient)?;
        let (dispatcher, worker) = NotificationDispatcher::spawn(
            stores.users.clone(),
            notifier,
            DispatchSettings { queue_capacity: config.notifications.queue_capacity },
        )
        .map_err(BootstrapError::Notifications)?;
        (dispatcher, Some(worker))
    } else {
        (NotificationDispatcher::disabled(), None)
    };
    info!(
        event_name = "system.bootstrap.notifications_ready",
        correlation_id = "bootstrap",
        enabled = config.notifications.enabled,
        transport = if config.notifications.gateway_url.is_some() { "gateway" } else { "log" },
        "notification dispatcher initialized"
    );

    Ok(Application {
        lifecycle: RequestLifecycleService::new(stores.clone(), dispatcher.clone()),
        approvals: ApprovalWorkflowService::new(stores, dispatcher.clone()),
        notifications: dispatcher,
        config,
        db_pool,
        dispatch_worker,
    })
}
