use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;

use procura_core::domain::vendor::{Vendor, VendorId};
use procura_core::store::{StoreError, VendorStore};

use super::{column, format_timestamp, RepositoryError};
use crate::DbPool;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewVendor {
    pub name: String,
    pub category: String,
    pub email: Option<String>,
}

pub struct SqlVendorStore {
    pool: DbPool,
}

impl SqlVendorStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts or refreshes the vendor keyed by `name`.
    pub async fn save(&self, vendor: NewVendor) -> Result<Vendor, RepositoryError> {
        sqlx::query(
            "INSERT INTO vendor (name, category, email, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                 category = excluded.category,
                 email = excluded.email",
        )
        .bind(&vendor.name)
        .bind(&vendor.category)
        .bind(vendor.email.as_deref())
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id, name, category, email FROM vendor WHERE name = ?")
            .bind(&vendor.name)
            .fetch_one(&self.pool)
            .await?;
        row_to_vendor(&row)
    }

    async fn find_row(&self, id: VendorId) -> Result<Option<Vendor>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, category, email FROM vendor WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_vendor).transpose()
    }
}

fn row_to_vendor(row: &SqliteRow) -> Result<Vendor, RepositoryError> {
    Ok(Vendor {
        id: VendorId(column(row, "id")?),
        name: column(row, "name")?,
        category: column(row, "category")?,
        email: column(row, "email")?,
    })
}

#[async_trait]
impl VendorStore for SqlVendorStore {
    async fn find_by_id(&self, id: VendorId) -> Result<Option<Vendor>, StoreError> {
        Ok(self.find_row(id).await?)
    }
}
