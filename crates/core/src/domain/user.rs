use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Superuser,
    Manager,
    Director,
}

impl Role {
    pub const APPROVERS: [Role; 2] = [Role::Manager, Role::Director];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Superuser => "superuser",
            Self::Manager => "manager",
            Self::Director => "director",
        }
    }

    pub fn is_approver(&self) -> bool {
        matches!(self, Self::Manager | Self::Director)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "superuser" => Ok(Self::Superuser),
            "manager" => Ok(Self::Manager),
            "director" => Ok(Self::Director),
            other => Err(DomainError::Validation(format!(
                "unknown role `{other}` (expected user|superuser|manager|director)"
            ))),
        }
    }
}

/// Caller identity as resolved by the authentication layer. Trusted as given.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn parses_roles_case_insensitively() {
        assert_eq!("Manager".parse::<Role>().expect("manager"), Role::Manager);
        assert_eq!(" director ".parse::<Role>().expect("director"), Role::Director);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn only_managers_and_directors_are_approvers() {
        assert!(Role::Manager.is_approver());
        assert!(Role::Director.is_approver());
        assert!(!Role::User.is_approver());
        assert!(!Role::Superuser.is_approver());
    }
}
