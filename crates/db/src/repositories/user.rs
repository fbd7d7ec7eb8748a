use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;

use procura_core::domain::user::{Role, User, UserId};
use procura_core::store::{StoreError, UserDirectory};

use super::{column, format_timestamp, parse_enum, RepositoryError};
use crate::DbPool;

/// Account fields written by the seeding path. Passwords and sessions live elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: Role,
}

pub struct SqlUserDirectory {
    pool: DbPool,
}

impl SqlUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts or refreshes the account keyed by `username`.
    pub async fn save(&self, user: NewUser) -> Result<User, RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (username, full_name, email, role, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(username) DO UPDATE SET
                 full_name = excluded.full_name,
                 email = excluded.email,
                 role = excluded.role",
        )
        .bind(&user.username)
        .bind(&user.full_name)
        .bind(user.email.as_deref())
        .bind(user.role.as_str())
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, username, full_name, email, role FROM app_user WHERE username = ?",
        )
        .bind(&user.username)
        .fetch_one(&self.pool)
        .await?;
        row_to_user(&row)
    }

    async fn find_row(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, username, full_name, email, role FROM app_user WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_rows_by_roles(&self, roles: &[Role]) -> Result<Vec<User>, RepositoryError> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; roles.len()].join(", ");
        let sql = format!(
            "SELECT id, username, full_name, email, role FROM app_user
             WHERE role IN ({placeholders})
             ORDER BY id"
        );
        let mut query = sqlx::query(&sql);
        for role in roles {
            query = query.bind(role.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_user).collect()
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let role: String = column(row, "role")?;
    Ok(User {
        id: UserId(column(row, "id")?),
        username: column(row, "username")?,
        full_name: column(row, "full_name")?,
        email: column(row, "email")?,
        role: parse_enum("role", &role)?,
    })
}

#[async_trait]
impl UserDirectory for SqlUserDirectory {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.find_row(id).await?)
    }

    async fn find_by_roles(&self, roles: &[Role]) -> Result<Vec<User>, StoreError> {
        Ok(self.find_rows_by_roles(roles).await?)
    }
}

#[cfg(test)]
mod tests {
    use procura_core::domain::user::{Role, UserId};
    use procura_core::store::UserDirectory;

    use super::{NewUser, SqlUserDirectory};
    use crate::repositories::test_support::setup;

    fn account(username: &str, role: Role) -> NewUser {
        NewUser {
            username: username.to_string(),
            full_name: format!("{username} account"),
            email: Some(format!("{username}@procurement.com")),
            role,
        }
    }

    #[tokio::test]
    async fn save_is_idempotent_per_username() {
        let directory = SqlUserDirectory::new(setup().await);
        let first = directory.save(account("manager", Role::Manager)).await.expect("save");

        let mut renamed = account("manager", Role::Manager);
        renamed.full_name = "Morgan Manager".to_string();
        let second = directory.save(renamed).await.expect("save again");

        assert_eq!(first.id, second.id);
        let found = directory.find_by_id(first.id).await.expect("find").expect("exists");
        assert_eq!(found.full_name, "Morgan Manager");
        assert!(directory.find_by_id(UserId(999)).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn find_by_roles_lists_only_requested_roles() {
        let directory = SqlUserDirectory::new(setup().await);
        for (username, role) in [
            ("user", Role::User),
            ("superuser", Role::Superuser),
            ("manager", Role::Manager),
            ("director", Role::Director),
        ] {
            directory.save(account(username, role)).await.expect("save");
        }

        let approvers = directory.find_by_roles(&Role::APPROVERS).await.expect("approvers");
        let usernames: Vec<&str> = approvers.iter().map(|user| user.username.as_str()).collect();
        assert_eq!(usernames, vec!["manager", "director"]);

        assert!(directory.find_by_roles(&[]).await.expect("empty").is_empty());
    }
}
