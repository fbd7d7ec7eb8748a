pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

use std::sync::Arc;

use procura_core::store::Stores;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{SeedDataset, SeedResult, VerificationResult};
pub use repositories::{
    RepositoryError, SqlApprovalStore, SqlRequestStore, SqlUserDirectory, SqlVendorStore,
};

/// Wires every store seam to the SQLite implementations sharing `pool`.
pub fn sql_stores(pool: DbPool) -> Stores {
    Stores {
        requests: Arc::new(SqlRequestStore::new(pool.clone())),
        approvals: Arc::new(SqlApprovalStore::new(pool.clone())),
        users: Arc::new(SqlUserDirectory::new(pool.clone())),
        vendors: Arc::new(SqlVendorStore::new(pool)),
    }
}
