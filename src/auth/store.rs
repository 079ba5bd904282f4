//! User lookup used by the authenticator and the login flow.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rocket_db_pools::sqlx::{self, PgPool};
use uuid::Uuid;

use crate::auth::{AuthError, AuthResult};
use crate::models::{NewUser, User, UserCredentials, normalize_email};

const UNIQUE_VIOLATION: &str = "23505";

#[rocket::async_trait]
pub trait UserStore: Send + Sync {
    /// Find a user by id. The returned record never includes the password hash.
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<User>>;

    async fn find_credentials_by_email(&self, email: &str) -> AuthResult<Option<UserCredentials>>;

    /// Fails with [`AuthError::EmailTaken`] when the email is already registered.
    async fn insert(&self, new_user: NewUser) -> AuthResult<User>;
}

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, name, role, is_admin, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_credentials_by_email(&self, email: &str) -> AuthResult<Option<UserCredentials>> {
        let credentials = sqlx::query_as::<_, UserCredentials>(
            "SELECT id, email, name, role, is_admin, created_at, password_hash FROM users WHERE email = $1",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        Ok(credentials)
    }

    async fn insert(&self, new_user: NewUser) -> AuthResult<User> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, role, is_admin, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, name, role, is_admin, created_at
            "#,
        )
        .bind(Uuid::new_v4().simple().to_string())
        .bind(normalize_email(&new_user.email))
        .bind(new_user.name.as_deref())
        .bind(&new_user.role)
        .bind(new_user.is_admin)
        .bind(&new_user.password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(AuthError::EmailTaken)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Process-local store keyed by user id, with an email index that makes
/// email uniqueness a single entry operation.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: DashMap<String, UserCredentials>,
    emails: DashMap<String, String>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a fully formed record in place, replacing any user with the same id.
    pub fn upsert(&self, credentials: UserCredentials) {
        let id = credentials.user.id.clone();
        let email = credentials.user.email.clone();
        if let Some(previous) = self.users.insert(id.clone(), credentials) {
            if previous.user.email != email {
                self.emails.remove_if(&previous.user.email, |_, owner| *owner == id);
            }
        }
        self.emails.insert(email, id);
    }

    pub fn remove(&self, id: &str) -> Option<User> {
        let (_, credentials) = self.users.remove(id)?;
        self.emails.remove_if(&credentials.user.email, |_, owner| owner == id);
        Some(credentials.user)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[rocket::async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<User>> {
        Ok(self.users.get(id).map(|entry| entry.user.clone()))
    }

    async fn find_credentials_by_email(&self, email: &str) -> AuthResult<Option<UserCredentials>> {
        let email = normalize_email(email);
        let Some(id) = self.emails.get(&email) else {
            return Ok(None);
        };
        Ok(self.users.get(id.value()).map(|entry| entry.value().clone()))
    }

    async fn insert(&self, new_user: NewUser) -> AuthResult<User> {
        let email = normalize_email(&new_user.email);
        // The vacant slot stays locked until the user is in place.
        let Entry::Vacant(slot) = self.emails.entry(email.clone()) else {
            return Err(AuthError::EmailTaken);
        };

        let user = User {
            id: Uuid::new_v4().simple().to_string(),
            email,
            name: new_user.name,
            role: new_user.role,
            is_admin: new_user.is_admin,
            created_at: Utc::now(),
        };
        self.users.insert(
            user.id.clone(),
            UserCredentials {
                user: user.clone(),
                password_hash: new_user.password_hash,
            },
        );
        slot.insert(user.id.clone());
        Ok(user)
    }
}
