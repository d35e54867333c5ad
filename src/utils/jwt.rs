// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{error::AppError, models::user::User, state::AppState};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    pub username: String,
    pub is_staff: bool,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

/// Signs a new JWT for the user.
pub fn sign_jwt(user: &User, secret: &str, expiration_seconds: u64) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        is_staff: user.is_staff,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// The authenticated caller, loaded fresh from the database on each request.
///
/// Flags come from the row rather than the token, so revoking staff access or
/// deactivating an account takes effect immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
        }
    }
}

/// Request extension set by [`identity_middleware`]; `None` for anonymous callers.
#[derive(Debug, Clone, Default)]
pub struct Identity(pub Option<CurrentUser>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Staff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    /// The caller must sign in first.
    Login,
    /// Signed in, but without the needed role.
    Forbidden,
}

/// Single decision point for every role gate.
pub fn authorize(identity: Option<&CurrentUser>, requirement: Requirement) -> Access {
    match (identity, requirement) {
        (None, _) => Access::Login,
        (Some(_), Requirement::Authenticated) => Access::Allow,
        (Some(user), Requirement::Staff) if user.is_staff => Access::Allow,
        (Some(_), Requirement::Staff) => Access::Forbidden,
    }
}

async fn resolve_user(pool: &SqlitePool, claims: &Claims) -> Result<CurrentUser, AppError> {
    let id: i64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::AuthError("User not found".to_string()))?;

    if !user.is_active {
        return Err(AppError::AuthError("This account is inactive.".to_string()));
    }

    Ok(CurrentUser::from(&user))
}

/// Axum Middleware: Identity.
///
/// Runs on every route. A missing `Authorization` header leaves the caller
/// anonymous; a present but invalid bearer token is rejected with 401.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .strip_prefix("Bearer ")
                .ok_or_else(|| AppError::AuthError("Invalid token".to_string()))
        })
        .transpose()?;

    let identity = match token {
        Some(token) => {
            let claims = verify_jwt(token, &state.config.jwt_secret)?;
            Some(resolve_user(&state.pool, &claims).await?)
        }
        None => None,
    };

    req.extensions_mut().insert(Identity(identity));
    Ok(next.run(req).await)
}

fn gate(req: &Request<Body>, requirement: Requirement) -> Result<(), AppError> {
    let identity = req
        .extensions()
        .get::<Identity>()
        .and_then(|identity| identity.0.as_ref());

    match authorize(identity, requirement) {
        Access::Allow => Ok(()),
        Access::Login => Err(AppError::AuthError(
            "Please log in to continue.".to_string(),
        )),
        Access::Forbidden => Err(AppError::Forbidden(
            "Staff access is required.".to_string(),
        )),
    }
}

/// Axum Middleware: Authentication.
///
/// Must be used after `identity_middleware`.
pub async fn require_auth(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    gate(&req, Requirement::Authenticated)?;
    Ok(next.run(req).await)
}

/// Axum Middleware: Staff Authorization.
pub async fn require_staff(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    gate(&req, Requirement::Staff)?;
    Ok(next.run(req).await)
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .and_then(|identity| identity.0.clone())
            .ok_or_else(|| AppError::AuthError("Please log in to continue.".to_string()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Identity>().cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(is_staff: bool) -> CurrentUser {
        CurrentUser {
            id: 7,
            username: "asha".to_string(),
            is_staff,
            is_superuser: false,
        }
    }

    #[test]
    fn authorize_covers_every_gate() {
        assert_eq!(authorize(None, Requirement::Authenticated), Access::Login);
        assert_eq!(authorize(None, Requirement::Staff), Access::Login);
        assert_eq!(
            authorize(Some(&user(false)), Requirement::Authenticated),
            Access::Allow
        );
        assert_eq!(
            authorize(Some(&user(false)), Requirement::Staff),
            Access::Forbidden
        );
        assert_eq!(authorize(Some(&user(true)), Requirement::Staff), Access::Allow);
    }

    #[test]
    fn signed_token_verifies_with_same_secret_only() {
        let account = User {
            id: 42,
            username: "asha".to_string(),
            email: Some("asha@example.com".to_string()),
            full_name: "Asha Rao".to_string(),
            password: String::new(),
            is_staff: true,
            is_active: true,
            is_superuser: false,
            created_at: Utc::now(),
        };
        let token = sign_jwt(&account, "secret", 60).unwrap();

        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.username, "asha");
        assert!(claims.is_staff);

        assert!(verify_jwt(&token, "other-secret").is_err());
    }
}
