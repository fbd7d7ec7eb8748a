use procura_core::domain::user::Role;

use crate::connection::DbPool;
use crate::repositories::user::NewUser;
use crate::repositories::vendor::NewVendor;
use crate::repositories::{RepositoryError, SqlUserDirectory, SqlVendorStore};

struct SeedAccount {
    username: &'static str,
    full_name: &'static str,
    email: &'static str,
    role: Role,
}

struct SeedVendor {
    name: &'static str,
    category: &'static str,
    email: &'static str,
}

/// One account per role.
const SEED_ACCOUNTS: &[SeedAccount] = &[
    SeedAccount {
        username: "user",
        full_name: "Regular User",
        email: "user@procurement.com",
        role: Role::User,
    },
    SeedAccount {
        username: "superuser",
        full_name: "Super User",
        email: "superuser@procurement.com",
        role: Role::Superuser,
    },
    SeedAccount {
        username: "manager",
        full_name: "Manager User",
        email: "manager@procurement.com",
        role: Role::Manager,
    },
    SeedAccount {
        username: "director",
        full_name: "Director User",
        email: "director@procurement.com",
        role: Role::Director,
    },
];

const SEED_VENDORS: &[SeedVendor] = &[
    SeedVendor {
        name: "Tech Supplies Co",
        category: "IT Equipment",
        email: "sales@techsupplies.example",
    },
    SeedVendor {
        name: "Office Depot Pro",
        category: "Office Supplies",
        email: "orders@officedepotpro.example",
    },
];

/// Directory accounts and demo vendors for local and demo environments.
///
/// Loading is idempotent: rows are upserted by username and vendor name.
pub struct SeedDataset;

impl SeedDataset {
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let users = SqlUserDirectory::new(pool.clone());
        let vendors = SqlVendorStore::new(pool.clone());

        let mut accounts = Vec::with_capacity(SEED_ACCOUNTS.len());
        for account in SEED_ACCOUNTS {
            let saved = users
                .save(NewUser {
                    username: account.username.to_string(),
                    full_name: account.full_name.to_string(),
                    email: Some(account.email.to_string()),
                    role: account.role,
                })
                .await?;
            accounts.push(SeededAccount {
                id: saved.id.0,
                username: account.username,
                role: account.role.as_str(),
            });
        }

        let mut vendor_names = Vec::with_capacity(SEED_VENDORS.len());
        for vendor in SEED_VENDORS {
            vendors
                .save(NewVendor {
                    name: vendor.name.to_string(),
                    category: vendor.category.to_string(),
                    email: Some(vendor.email.to_string()),
                })
                .await?;
            vendor_names.push(vendor.name);
        }

        Ok(SeedResult { accounts, vendors: vendor_names })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for account in SEED_ACCOUNTS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM app_user WHERE username = ?1 AND role = ?2)",
            )
            .bind(account.username)
            .bind(account.role.as_str())
            .fetch_one(pool)
            .await?;
            checks.push((account.username, present == 1));
        }

        for vendor in SEED_VENDORS {
            let present: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM vendor WHERE name = ?1)")
                    .bind(vendor.name)
                    .fetch_one(pool)
                    .await?;
            checks.push((vendor.name, present == 1));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub accounts: Vec<SeededAccount>,
    pub vendors: Vec<&'static str>,
}

#[derive(Debug)]
pub struct SeededAccount {
    pub id: i64,
    pub username: &'static str,
    pub role: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
