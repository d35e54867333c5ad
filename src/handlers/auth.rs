// src/handlers/auth.rs

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    error::{AppError, HOME_PATH, STUDENT_DASHBOARD_PATH, dashboard_path, is_unique_violation},
    models::user::{CreateUserRequest, LoginRequest, User},
    services::{analytics::invalidate_global, rate_limit::Actor},
    state::AppState,
    store::session::Session,
    utils::{
        client::ClientAddr,
        hash::{check_password_strength, hash_password, verify_password},
        jwt::{CurrentUser, Identity, sign_jwt},
    },
};

fn actor(identity: &Identity, addr: ClientAddr) -> Actor {
    Actor::new(identity.0.as_ref().map(|u| u.id), addr.0)
}

/// Registers a new student account and signs it in.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created with a bearer token and the user object.
pub async fn register(
    State(state): State<AppState>,
    identity: Identity,
    addr: ClientAddr,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .limiter
        .enforce("register", &actor(&identity, addr), state.config.rate_limits.register)
        .await?;

    payload.validate()?;
    check_password_strength("password1", &payload.password1, &payload.username)?;

    let email = payload.email.trim().to_lowercase();
    let email_taken: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;
    if email_taken.is_some() {
        return Err(AppError::Conflict("Email is already registered.".to_string()));
    }

    let hashed_password = hash_password(&payload.password1)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, full_name, password, is_staff, is_active, is_superuser, created_at)
        VALUES (?, ?, ?, ?, 0, 1, 0, ?)
        RETURNING *
        "#,
    )
    .bind(payload.username.trim())
    .bind(&email)
    .bind(payload.full_name.trim())
    .bind(hashed_password)
    .bind(Utc::now())
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Username '{}' already exists", payload.username))
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    invalidate_global(state.cache.as_ref()).await;
    tracing::info!("Registered user {}", user.username);

    let token = sign_jwt(&user, &state.config.jwt_secret, state.config.jwt_expiration)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "token": token,
            "type": "Bearer",
            "user": user,
            "redirect": STUDENT_DASHBOARD_PATH,
        })),
    ))
}

async fn find_login_user(state: &AppState, login: &str) -> Result<Option<User>, AppError> {
    let by_username = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(login)
        .fetch_optional(&state.pool)
        .await?;

    if by_username.is_some() || !login.contains('@') {
        return Ok(by_username);
    }

    Ok(
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(login.to_lowercase())
            .fetch_optional(&state.pool)
            .await?,
    )
}

/// Authenticates a user by username or email and returns a JWT token.
pub async fn login(
    State(state): State<AppState>,
    identity: Identity,
    addr: ClientAddr,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .limiter
        .enforce("login", &actor(&identity, addr), state.config.rate_limits.login)
        .await?;

    payload.validate()?;

    let invalid =
        || AppError::AuthError("Please enter a correct username and password.".to_string());

    let user = find_login_user(&state, payload.username.trim())
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&payload.password, &user.password)? {
        tracing::info!("Failed login for {}", user.username);
        return Err(invalid());
    }
    if !user.is_active {
        return Err(AppError::AuthError("This account is inactive.".to_string()));
    }

    let token = sign_jwt(&user, &state.config.jwt_secret, state.config.jwt_expiration)?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "is_staff": user.is_staff,
        "redirect": dashboard_path(user.is_staff),
    })))
}

/// Ends the client session, dropping any exam in progress.
pub async fn logout(
    user: CurrentUser,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, AppError> {
    session.flush().await?;
    tracing::info!("User {} logged out", user.username);
    Ok(Json(json!({ "redirect": HOME_PATH })))
}
