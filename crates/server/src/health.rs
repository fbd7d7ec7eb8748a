use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use procura_core::notifications::QueueStatus;
use procura_core::NotificationDispatcher;
use procura_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    notifications: NotificationDispatcher,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub notifications: HealthCheck,
    pub checked_at: String,
}

/// `GET /health`: readiness of the process, its database and the notification worker.
///
/// A disabled notification queue is not a degradation; a stopped worker is.
pub fn router(db_pool: DbPool, notifications: NotificationDispatcher) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, notifications })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let notifications = notification_check(state.notifications.status());
    let ready = database.status != "degraded" && notifications.status != "degraded";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "procura-server runtime initialized".to_string(),
        },
        database,
        notifications,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

fn notification_check(status: QueueStatus) -> HealthCheck {
    match status {
        QueueStatus::Disabled => {
            HealthCheck { status: "disabled", detail: "notifications are turned off".to_string() }
        }
        QueueStatus::Running { queued, capacity } => HealthCheck {
            status: "ready",
            detail: format!("notification queue {queued}/{capacity} in use"),
        },
        QueueStatus::Stopped => HealthCheck {
            status: "degraded",
            detail: "notification worker has stopped; events are being dropped".to_string(),
        },
    }
}
