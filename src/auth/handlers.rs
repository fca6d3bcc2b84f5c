use axum::{
    extract::{FromRef, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, DeleteAccountRequest, LoginRequest,
            MessageResponse, ProfileResponse, RegisterRequest, UpdateProfileRequest,
            VerifyTokenResponse,
        },
        error::CredentialError,
        extractors::{bearer_token, ApiJson, AuthUser},
        services::CredentialStore,
        token::TokenService,
        validation::validate_email,
    },
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verify-token", get(verify_token))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/change-password", post(change_password))
        .route("/update-profile", post(update_profile))
        .route("/delete-account", post(delete_account))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let username = payload.username.trim();
    let email = payload.email.trim().to_lowercase();

    if username.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("All fields are required"));
    }

    let store = CredentialStore::from_ref(&state);
    let user = store.create(username, &email, &payload.password).await?;

    let token = TokenService::from_ref(&state).issue(user.id, &user.email)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            message: "Registration successful",
            token,
            user_id: user.id,
            email: user.email,
            username: user.username,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = payload.email.trim().to_lowercase();

    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }
    validate_email(&email).map_err(ApiError::BadRequest)?;

    let store = CredentialStore::from_ref(&state);
    let user = match store.authenticate(&email, &payload.password).await {
        Ok(u) => u,
        // unknown email and wrong password look the same to the client
        Err(CredentialError::NotFound | CredentialError::InvalidCredentials) => {
            warn!(email = %email, "login rejected");
            return Err(ApiError::unauthorized("Invalid email or password"));
        }
        Err(e) => return Err(e.into()),
    };

    let token = TokenService::from_ref(&state).issue(user.id, &user.email)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful",
        token,
        user_id: user.id,
        email: user.email,
        username: user.username,
    }))
}

#[instrument(skip(state, headers))]
pub async fn verify_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<VerifyTokenResponse>> {
    let token = bearer_token(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()))?;

    let claims = TokenService::from_ref(&state).verify(token).map_err(|reason| {
        warn!(%reason, "token verification failed");
        ApiError::from(reason)
    })?;

    Ok(Json(VerifyTokenResponse {
        success: true,
        user_id: claims.user_id,
        email: claims.email,
    }))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if payload.current_password.is_empty() || payload.new_password.is_empty() {
        return Err(ApiError::bad_request(
            "Current password and new password are required",
        ));
    }

    let store = CredentialStore::from_ref(&state);
    match store
        .change_password(user_id, &payload.current_password, &payload.new_password)
        .await
    {
        Ok(()) => Ok(Json(MessageResponse::ok("Password changed successfully"))),
        Err(CredentialError::InvalidCredentials) => {
            Err(ApiError::unauthorized("Current password is incorrect"))
        }
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    let username = payload
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());
    let email = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());

    if username.is_none() && email.is_none() {
        return Err(ApiError::bad_request("Nothing to update"));
    }

    let store = CredentialStore::from_ref(&state);
    let user = store.update_profile(user_id, username, email).await?;

    Ok(Json(ProfileResponse {
        success: true,
        message: "Profile updated successfully",
        username: user.username,
        email: user.email,
    }))
}

#[instrument(skip(state, payload))]
pub async fn delete_account(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<DeleteAccountRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if payload.password.is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }

    let store = CredentialStore::from_ref(&state);
    match store.delete(user_id, &payload.password).await {
        Ok(()) => Ok(Json(MessageResponse::ok("Account deleted successfully"))),
        Err(CredentialError::InvalidCredentials) => {
            Err(ApiError::unauthorized("Password is incorrect"))
        }
        Err(e) => Err(e.into()),
    }
}
