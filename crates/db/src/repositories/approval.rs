use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use tracing::debug;

use procura_core::domain::approval::{Approval, ApprovalId, NewApproval};
use procura_core::domain::request::{RequestId, RequestStatus};
use procura_core::domain::user::UserId;
use procura_core::store::{ApprovalStore, Resolution, StoreError};

use super::request::{row_to_request, REQUEST_COLUMNS};
use super::{column, format_timestamp, parse_enum, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlApprovalStore {
    pool: DbPool,
}

impl SqlApprovalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Conditional `pending -> decision` update and approval insert in one transaction. A caller
    /// that updates zero rows re-reads the request inside the same transaction and rolls back.
    async fn resolve_in_tx(&self, approval: NewApproval) -> Result<Resolution, RepositoryError> {
        let status = RequestStatus::from(approval.decision);
        let approved_at = format_timestamp(approval.approved_at);
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE procurement_request
             SET status = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(&approved_at)
        .bind(approval.request_id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM procurement_request WHERE id = ?")
                    .bind(approval.request_id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;

            return match current {
                None => Ok(Resolution::NotFound),
                Some(current) => {
                    let current: RequestStatus = parse_enum("status", &current)?;
                    debug!(
                        event_name = "db.approval.resolve_lost",
                        request_id = %approval.request_id,
                        status = %current,
                        "conditional update matched no pending row"
                    );
                    Ok(Resolution::AlreadyProcessed(current))
                }
            };
        }

        let inserted = sqlx::query(
            "INSERT INTO approval (request_id, approver_id, status, comments, approved_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(approval.request_id.0)
        .bind(approval.approver_id.0)
        .bind(approval.decision.as_str())
        .bind(approval.comments.as_deref())
        .bind(&approved_at)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM procurement_request WHERE id = ?"
        ))
        .bind(approval.request_id.0)
        .fetch_one(&mut *tx)
        .await?;
        let request = row_to_request(&row)?;

        tx.commit().await?;

        Ok(Resolution::Resolved {
            request,
            approval: Approval {
                id: ApprovalId(inserted.last_insert_rowid()),
                request_id: approval.request_id,
                approver_id: approval.approver_id,
                decision: approval.decision,
                comments: approval.comments,
                approved_at: approval.approved_at,
            },
        })
    }

    async fn list_rows(&self, request_id: RequestId) -> Result<Vec<Approval>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, request_id, approver_id, status, comments, approved_at
             FROM approval
             WHERE request_id = ?
             ORDER BY approved_at DESC, id DESC",
        )
        .bind(request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_approval).collect()
    }
}

fn row_to_approval(row: &SqliteRow) -> Result<Approval, RepositoryError> {
    let status: String = column(row, "status")?;
    let approved_at: String = column(row, "approved_at")?;

    Ok(Approval {
        id: ApprovalId(column(row, "id")?),
        request_id: RequestId(column(row, "request_id")?),
        approver_id: UserId(column(row, "approver_id")?),
        decision: parse_enum("status", &status)?,
        comments: column(row, "comments")?,
        approved_at: parse_timestamp("approved_at", &approved_at)?,
    })
}

#[async_trait]
impl ApprovalStore for SqlApprovalStore {
    async fn resolve(&self, approval: NewApproval) -> Result<Resolution, StoreError> {
        Ok(self.resolve_in_tx(approval).await?)
    }

    async fn list_for_request(&self, request_id: RequestId) -> Result<Vec<Approval>, StoreError> {
        Ok(self.list_rows(request_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use procura_core::domain::approval::{Decision, NewApproval};
    use procura_core::domain::request::{RequestDraft, RequestId, RequestStatus};
    use procura_core::domain::user::UserId;
    use procura_core::store::{ApprovalStore, RequestStore, Resolution};

    use super::SqlApprovalStore;
    use crate::repositories::test_support::setup;
    use crate::repositories::SqlRequestStore;
    use crate::{connect_with_settings, migrations, DbPool};

    fn draft() -> RequestDraft {
        RequestDraft {
            requestor_id: UserId(1),
            item_name: "Laptop".to_string(),
            description: String::new(),
            quantity: 2,
            unit_price: Decimal::new(150_000, 2),
            total_cost: Decimal::new(300_000, 2),
            justification: String::new(),
            vendor_id: None,
            created_at: Utc::now(),
        }
    }

    fn decision(request_id: RequestId, approver: i64, decision: Decision) -> NewApproval {
        NewApproval {
            request_id,
            approver_id: UserId(approver),
            decision,
            comments: Some(format!("decided by {approver}")),
            approved_at: Utc::now(),
        }
    }

    async fn insert_request(pool: &DbPool) -> RequestId {
        SqlRequestStore::new(pool.clone()).insert(draft()).await.expect("insert request").id
    }

    #[tokio::test]
    async fn first_decision_closes_the_request() {
        let pool = setup().await;
        let id = insert_request(&pool).await;
        let store = SqlApprovalStore::new(pool.clone());

        let first = store.resolve(decision(id, 3, Decision::Approved)).await.expect("resolve");
        let Resolution::Resolved { request, approval } = first else {
            panic!("expected resolution, got {first:?}");
        };
        assert_eq!(request.status, RequestStatus::Approved);
        assert_eq!(approval.decision, Decision::Approved);

        let second = store.resolve(decision(id, 4, Decision::Rejected)).await.expect("resolve");
        assert_eq!(second, Resolution::AlreadyProcessed(RequestStatus::Approved));

        let history = store.list_for_request(id).await.expect("list");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].approver_id, UserId(3));
        assert_eq!(history[0].comments.as_deref(), Some("decided by 3"));

        let stored = SqlRequestStore::new(pool).find_by_id(id).await.expect("find").expect("row");
        assert_eq!(stored.status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn unknown_request_resolves_to_not_found() {
        let store = SqlApprovalStore::new(setup().await);
        let outcome =
            store.resolve(decision(RequestId(404), 3, Decision::Approved)).await.expect("resolve");
        assert_eq!(outcome, Resolution::NotFound);
        assert!(store.list_for_request(RequestId(404)).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let pool = setup().await;
        let id = insert_request(&pool).await;
        let older = Utc::now() - Duration::minutes(5);
        sqlx::query(
            "INSERT INTO approval (request_id, approver_id, status, comments, approved_at)
             VALUES (?, 4, 'rejected', NULL, ?)",
        )
        .bind(id.0)
        .bind(super::format_timestamp(older))
        .execute(&pool)
        .await
        .expect("insert historical approval");

        let store = SqlApprovalStore::new(pool);
        store.resolve(decision(id, 3, Decision::Approved)).await.expect("resolve");

        let history = store.list_for_request(id).await.expect("list");
        let approvers: Vec<UserId> = history.iter().map(|approval| approval.approver_id).collect();
        assert_eq!(approvers, vec![UserId(3), UserId(4)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolutions_on_a_shared_file_close_once() {
        let dir = TempDir::new().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("procura.db").display());
        let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let id = insert_request(&pool).await;

        let store = Arc::new(SqlApprovalStore::new(pool.clone()));
        let mut handles = Vec::new();
        for attempt in 0..8 {
            let store = store.clone();
            let outcome = if attempt % 2 == 0 { Decision::Approved } else { Decision::Rejected };
            handles.push(tokio::spawn(async move {
                store.resolve(decision(id, 3 + attempt % 2, outcome)).await
            }));
        }

        let mut resolved = 0;
        let mut already_processed = 0;
        for handle in handles {
            match handle.await.expect("task").expect("resolve") {
                Resolution::Resolved { .. } => resolved += 1,
                Resolution::AlreadyProcessed(_) => already_processed += 1,
                Resolution::NotFound => panic!("request should exist"),
            }
        }

        assert_eq!(resolved, 1);
        assert_eq!(already_processed, 7);
        assert_eq!(store.list_for_request(id).await.expect("list").len(), 1);
    }
}
