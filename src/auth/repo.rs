use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::password;
use crate::auth::repo_types::{NewUser, RepoError, RepoResult, UniqueField, User};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, is_active, created_at, updated_at, last_login";

/// Persistent store for user rows. Uniqueness of username and email is enforced by the store
/// itself and surfaces as [`RepoError::Conflict`].
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn insert(&self, user: NewUser) -> RepoResult<User>;
    /// `None` leaves a column untouched. Returns `None` when the row is gone.
    async fn update_profile(
        &self,
        id: Uuid,
        username: Option<&str>,
        email: Option<&str>,
    ) -> RepoResult<Option<User>>;
    /// Returns false when the row is gone.
    async fn update_password(&self, id: Uuid, password: &str) -> RepoResult<bool>;
    /// Stamps `last_login` with the current time.
    async fn record_login(&self, id: Uuid) -> RepoResult<Option<User>>;
    /// Returns false when there was nothing to delete.
    async fn delete(&self, id: Uuid) -> RepoResult<bool>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one(&self, column: &str, value: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("find user by {column}"))?;
        Ok(user)
    }
}

fn write_error(e: sqlx::Error, what: &'static str) -> RepoError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            let field = match db_err.constraint() {
                Some("users_username_key") => UniqueField::Username,
                _ => UniqueField::Email,
            };
            return RepoError::Conflict(field);
        }
    }
    RepoError::Backend(anyhow::Error::new(e).context(what))
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.find_one("email", &email.to_lowercase()).await
    }

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        self.find_one("username", username).await
    }

    async fn insert(&self, user: NewUser) -> RepoResult<User> {
        let password_hash = password::ensure_hashed(&user.password)?;
        let sql = format!(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.username)
            .bind(user.email.to_lowercase())
            .bind(password_hash)
            .fetch_one(&self.db)
            .await
            .map_err(|e| write_error(e, "insert user"))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        username: Option<&str>,
        email: Option<&str>,
    ) -> RepoResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET username = COALESCE($2, username),
                   email = COALESCE($3, email),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(username)
            .bind(email.map(str::to_lowercase))
            .fetch_optional(&self.db)
            .await
            .map_err(|e| write_error(e, "update user profile"))
    }

    async fn update_password(&self, id: Uuid, password: &str) -> RepoResult<bool> {
        let password_hash = password::ensure_hashed(password)?;
        let result = sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await
        .map_err(|e| write_error(e, "update user password"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_login(&self, id: Uuid) -> RepoResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET last_login = now(),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("record user login")?;
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(result.rows_affected() > 0)
    }
}
