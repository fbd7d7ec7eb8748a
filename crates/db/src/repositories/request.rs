use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;

use procura_core::domain::request::{
    ProcurementRequest, RequestDraft, RequestFilter, RequestId, RequestStatus,
};
use procura_core::domain::user::UserId;
use procura_core::domain::vendor::VendorId;
use procura_core::store::{RequestStore, StoreError};

use super::{column, format_timestamp, parse_decimal, parse_enum, parse_timestamp, RepositoryError};
use crate::DbPool;

pub(crate) const REQUEST_COLUMNS: &str = "id, requestor_id, item_name, description, quantity, \
     unit_price, total_cost, justification, vendor_id, status, created_at, updated_at";

pub struct SqlRequestStore {
    pool: DbPool,
}

impl SqlRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_row(&self, draft: RequestDraft) -> Result<ProcurementRequest, RepositoryError> {
        let created_at = format_timestamp(draft.created_at);
        let quantity = i64::from(draft.quantity);
        let result = sqlx::query(
            "INSERT INTO procurement_request (
                requestor_id, item_name, description, quantity, unit_price, total_cost,
                justification, vendor_id, status, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(draft.requestor_id.0)
        .bind(&draft.item_name)
        .bind(&draft.description)
        .bind(quantity)
        .bind(draft.unit_price.to_string())
        .bind(draft.total_cost.to_string())
        .bind(&draft.justification)
        .bind(draft.vendor_id.map(|id| id.0))
        .bind(RequestStatus::Pending.as_str())
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        Ok(ProcurementRequest {
            id: RequestId(result.last_insert_rowid()),
            requestor_id: draft.requestor_id,
            item_name: draft.item_name,
            description: draft.description,
            quantity: draft.quantity,
            unit_price: draft.unit_price,
            total_cost: draft.total_cost,
            justification: draft.justification,
            vendor_id: draft.vendor_id,
            status: RequestStatus::Pending,
            created_at: draft.created_at,
            updated_at: draft.created_at,
        })
    }

    async fn find_row(&self, id: RequestId) -> Result<Option<ProcurementRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM procurement_request WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn find_rows(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<ProcurementRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM procurement_request
             WHERE (?1 IS NULL OR requestor_id = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(filter.requestor_id.map(|id| id.0))
        .bind(filter.status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }

    async fn overwrite_row(
        &self,
        id: RequestId,
        status: RequestStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<ProcurementRequest>, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE procurement_request SET status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(format_timestamp(updated_at))
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_row(id).await
    }
}

pub(crate) fn row_to_request(row: &SqliteRow) -> Result<ProcurementRequest, RepositoryError> {
    let quantity: i64 = column(row, "quantity")?;
    let quantity = u32::try_from(quantity)
        .map_err(|_| RepositoryError::Decode(format!("invalid quantity: {quantity}")))?;
    let unit_price: String = column(row, "unit_price")?;
    let total_cost: String = column(row, "total_cost")?;
    let status: String = column(row, "status")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;
    let vendor_id: Option<i64> = column(row, "vendor_id")?;

    Ok(ProcurementRequest {
        id: RequestId(column(row, "id")?),
        requestor_id: UserId(column(row, "requestor_id")?),
        item_name: column(row, "item_name")?,
        description: column(row, "description")?,
        quantity,
        unit_price: parse_decimal("unit_price", &unit_price)?,
        total_cost: parse_decimal("total_cost", &total_cost)?,
        justification: column(row, "justification")?,
        vendor_id: vendor_id.map(VendorId),
        status: parse_enum("status", &status)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait]
impl RequestStore for SqlRequestStore {
    async fn insert(&self, draft: RequestDraft) -> Result<ProcurementRequest, StoreError> {
        Ok(self.insert_row(draft).await?)
    }

    async fn find_by_id(&self, id: RequestId) -> Result<Option<ProcurementRequest>, StoreError> {
        Ok(self.find_row(id).await?)
    }

    async fn find(&self, filter: &RequestFilter) -> Result<Vec<ProcurementRequest>, StoreError> {
        Ok(self.find_rows(filter).await?)
    }

    async fn overwrite_status(
        &self,
        id: RequestId,
        status: RequestStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<ProcurementRequest>, StoreError> {
        Ok(self.overwrite_row(id, status, updated_at).await?)
    }
}
