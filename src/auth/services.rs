use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    error::CredentialError,
    password::{hash_password, verify_password},
    repo::UserRepo,
    repo_types::{NewUser, RepoError, UniqueField, User},
    validation::{validate_email, validate_password_strength, validate_username},
};
use crate::state::AppState;

const EMAIL_TAKEN: &str = "Email already registered";
const USERNAME_TAKEN: &str = "Username already taken";

impl From<RepoError> for CredentialError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict(UniqueField::Email) => CredentialError::Conflict(EMAIL_TAKEN.into()),
            RepoError::Conflict(UniqueField::Username) => {
                CredentialError::Conflict(USERNAME_TAKEN.into())
            }
            RepoError::Backend(e) => CredentialError::Internal(e),
        }
    }
}

/// Owns the user entity: validation, uniqueness and password checks on top of a [`UserRepo`].
#[derive(Clone)]
pub struct CredentialStore {
    repo: Arc<dyn UserRepo>,
}

impl FromRef<AppState> for CredentialStore {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.users.clone())
    }
}

impl CredentialStore {
    pub fn new(repo: Arc<dyn UserRepo>) -> Self {
        Self { repo }
    }

    pub async fn find(&self, id: Uuid) -> Result<User, CredentialError> {
        self.repo.find_by_id(id).await?.ok_or(CredentialError::NotFound)
    }

    /// Registers a new account. `email` is lower-cased before any check.
    pub async fn create(
        &self,
        username: &str,
        email: &str,
        raw_password: &str,
    ) -> Result<User, CredentialError> {
        let email = email.to_lowercase();

        validate_username(username).map_err(CredentialError::Validation)?;
        validate_email(&email).map_err(CredentialError::Validation)?;
        validate_password_strength(raw_password).map_err(CredentialError::Validation)?;

        if self.repo.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(CredentialError::Conflict(EMAIL_TAKEN.into()));
        }
        if self.repo.find_by_username(username).await?.is_some() {
            warn!(username = %username, "username already taken");
            return Err(CredentialError::Conflict(USERNAME_TAKEN.into()));
        }

        let password_hash = hash_password(raw_password)?;
        let new_user = NewUser {
            username: username.to_string(),
            email,
            password: password_hash,
        };

        // A concurrent registration can still win the race; the unique constraint decides.
        let user = self.repo.insert(new_user).await.map_err(|e| match e {
            RepoError::Conflict(field) => {
                warn!(?field, "user insert lost uniqueness race");
                CredentialError::Conflict("User already exists".into())
            }
            other => other.into(),
        })?;

        info!(user_id = %user.id, email = %user.email, "user created");
        Ok(user)
    }

    /// Checks an email/password pair and stamps `last_login` on success.
    pub async fn authenticate(
        &self,
        email: &str,
        raw_password: &str,
    ) -> Result<User, CredentialError> {
        let email = email.to_lowercase();
        let user = self
            .repo
            .find_by_email(&email)
            .await?
            .ok_or(CredentialError::NotFound)?;

        if !user.is_active {
            warn!(user_id = %user.id, "login attempt on disabled account");
            return Err(CredentialError::Disabled);
        }

        if !self.password_matches(&user, raw_password)? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(CredentialError::InvalidCredentials);
        }

        let user = self
            .repo
            .record_login(user.id)
            .await?
            .ok_or(CredentialError::NotFound)?;
        info!(user_id = %user.id, "user authenticated");
        Ok(user)
    }

    /// Only fields that are present and differ from the stored value are validated and checked
    /// for collisions.
    pub async fn update_profile(
        &self,
        id: Uuid,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<User, CredentialError> {
        let current = self.find(id).await?;

        let username = username.filter(|u| *u != current.username);
        let email = email
            .map(str::to_lowercase)
            .filter(|e| *e != current.email);

        if let Some(username) = username {
            validate_username(username).map_err(CredentialError::Validation)?;
            if let Some(other) = self.repo.find_by_username(username).await? {
                if other.id != id {
                    return Err(CredentialError::Conflict(USERNAME_TAKEN.into()));
                }
            }
        }
        if let Some(email) = email.as_deref() {
            validate_email(email).map_err(CredentialError::Validation)?;
            if let Some(other) = self.repo.find_by_email(email).await? {
                if other.id != id {
                    return Err(CredentialError::Conflict(EMAIL_TAKEN.into()));
                }
            }
        }

        if username.is_none() && email.is_none() {
            debug!(user_id = %id, "profile unchanged");
            return Ok(current);
        }

        let user = self
            .repo
            .update_profile(id, username, email.as_deref())
            .await?
            .ok_or(CredentialError::NotFound)?;
        info!(user_id = %user.id, "profile updated");
        Ok(user)
    }

    pub async fn change_password(
        &self,
        id: Uuid,
        current_raw: &str,
        new_raw: &str,
    ) -> Result<(), CredentialError> {
        let user = self.find(id).await?;

        if !self.password_matches(&user, current_raw)? {
            warn!(user_id = %id, "change password with wrong current password");
            return Err(CredentialError::InvalidCredentials);
        }
        validate_password_strength(new_raw).map_err(CredentialError::Validation)?;

        let password_hash = hash_password(new_raw)?;
        if !self.repo.update_password(id, &password_hash).await? {
            return Err(CredentialError::NotFound);
        }
        info!(user_id = %id, "password changed");
        Ok(())
    }

    /// Permanently removes the account after re-checking its password.
    pub async fn delete(&self, id: Uuid, raw_password: &str) -> Result<(), CredentialError> {
        let user = self.find(id).await?;

        if !self.password_matches(&user, raw_password)? {
            warn!(user_id = %id, "delete account with wrong password");
            return Err(CredentialError::InvalidCredentials);
        }

        if !self.repo.delete(id).await? {
            return Err(CredentialError::NotFound);
        }
        info!(user_id = %id, "account deleted");
        Ok(())
    }

    fn password_matches(&self, user: &User, raw_password: &str) -> Result<bool, CredentialError> {
        verify_password(raw_password, &user.password_hash).map_err(|e| {
            error!(error = %e, user_id = %user.id, "stored password hash unreadable");
            CredentialError::Internal(e)
        })
    }
}
