use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::FromRow;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Role string that grants admin access.
pub const ADMIN_ROLE: &str = "admin";
pub const DEFAULT_ROLE: &str = "user";

/// A club account as seen by request handlers. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn has_admin_access(&self) -> bool {
        self.role == ADMIN_ROLE || self.is_admin
    }
}

/// A user row joined with its password hash; only the login flow sees this.
#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    #[sqlx(flatten)]
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    pub is_admin: bool,
    pub password_hash: String,
}

impl NewUser {
    pub fn member(email: impl Into<String>, name: Option<String>, password_hash: String) -> Self {
        Self {
            email: email.into(),
            name,
            role: DEFAULT_ROLE.to_string(),
            is_admin: false,
            password_hash,
        }
    }
}

/// Normalise an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str, is_admin: bool) -> User {
        User {
            id: "u1".into(),
            email: "a@b.com".into(),
            name: None,
            role: role.into(),
            is_admin,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn admin_access_by_role_or_flag() {
        assert!(user("admin", false).has_admin_access());
        assert!(user("user", true).has_admin_access());
        assert!(!user("user", false).has_admin_access());
    }

    #[test]
    fn user_serializes_without_password() {
        let json = serde_json::to_value(user("user", false)).expect("serialize");
        assert_eq!(json["isAdmin"], false);
        assert!(json.get("password").is_none());
        assert!(json.get("passwordHash").is_none());
    }
}
