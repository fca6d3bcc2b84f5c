use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{password, repo::UserRepo};
use crate::auth::repo_types::{NewUser, RepoError, RepoResult, UniqueField, User};

/// In-process [`UserRepo`] with the same uniqueness contract as the Postgres table.
#[derive(Default)]
pub struct MemoryUserRepo {
    rows: RwLock<Vec<User>>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables an account.
    pub async fn set_active(&self, id: Uuid, active: bool) -> bool {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.is_active = active;
                user.updated_at = OffsetDateTime::now_utc();
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn collision(
    rows: &[User],
    id: Option<Uuid>,
    username: Option<&str>,
    email: Option<&str>,
) -> Option<UniqueField> {
    rows.iter().filter(|u| Some(u.id) != id).find_map(|u| {
        if username == Some(u.username.as_str()) {
            Some(UniqueField::Username)
        } else if email == Some(u.email.as_str()) {
            Some(UniqueField::Email)
        } else {
            None
        }
    })
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.rows.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let email = email.to_lowercase();
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn insert(&self, user: NewUser) -> RepoResult<User> {
        let password_hash = password::ensure_hashed(&user.password)?;
        let email = user.email.to_lowercase();

        let mut rows = self.rows.write().await;
        let taken = collision(&rows, None, Some(user.username.as_str()), Some(email.as_str()));
        if let Some(field) = taken {
            return Err(RepoError::Conflict(field));
        }

        let now = OffsetDateTime::now_utc();
        let record = User {
            id: Uuid::new_v4(),
            username: user.username,
            email,
            password_hash,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login: None,
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        username: Option<&str>,
        email: Option<&str>,
    ) -> RepoResult<Option<User>> {
        let email = email.map(str::to_lowercase);

        let mut rows = self.rows.write().await;
        if let Some(field) = collision(&rows, Some(id), username, email.as_deref()) {
            return Err(RepoError::Conflict(field));
        }

        let Some(user) = rows.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(username) = username {
            user.username = username.to_string();
        }
        if let Some(email) = email {
            user.email = email;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn update_password(&self, id: Uuid, password: &str) -> RepoResult<bool> {
        let password_hash = password::ensure_hashed(password)?;

        let mut rows = self.rows.write().await;
        let Some(user) = rows.iter_mut().find(|u| u.id == id) else {
            return Ok(false);
        };
        user.password_hash = password_hash;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn record_login(&self, id: Uuid) -> RepoResult<Option<User>> {
        let mut rows = self.rows.write().await;
        let Some(user) = rows.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        let now = OffsetDateTime::now_utc();
        user.last_login = Some(now);
        user.updated_at = now;
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|u| u.id != id);
        Ok(rows.len() < before)
    }
}
