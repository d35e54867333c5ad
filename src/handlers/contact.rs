// src/handlers/contact.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::contact::{ContactMessage, ContactRequest},
    services::{analytics::invalidate_global, rate_limit::Actor},
    state::AppState,
    utils::{client::ClientAddr, html::strip_tags, jwt::Identity},
};

/// Describes the contact form.
pub async fn contact_form() -> impl IntoResponse {
    Json(json!({
        "fields": ["name", "email", "message", "usefulness"],
        "usefulness_choices": [1, 2, 3, 4, 5],
    }))
}

/// Stores a contact message. Markup in the message body is stripped.
pub async fn submit_contact(
    State(state): State<AppState>,
    identity: Identity,
    addr: ClientAddr,
    Json(payload): Json<ContactRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::new(identity.0.as_ref().map(|u| u.id), addr.0);
    state
        .limiter
        .enforce("contact", &actor, state.config.rate_limits.contact)
        .await?;

    payload.validate()?;

    let message = strip_tags(&payload.message);
    if message.is_empty() {
        return Err(AppError::BadRequest("Message cannot be empty.".to_string()));
    }

    let saved = sqlx::query_as::<_, ContactMessage>(
        r#"
        INSERT INTO contact_messages (name, email, message, usefulness, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.email.trim().to_lowercase())
    .bind(message)
    .bind(payload.usefulness)
    .bind(Utc::now())
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store contact message: {:?}", e);
        AppError::from(e)
    })?;

    invalidate_global(state.cache.as_ref()).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Thank you! Your message has been received.",
            "id": saved.id,
        })),
    ))
}
