// src/models/contact.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'contact_messages' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ContactMessage {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Plain text; markup is stripped before storage.
    pub message: String,
    /// "Was the prediction helpful?" on a 1–5 scale.
    pub usefulness: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// DTO for the public contact form.
#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
    #[validate(range(min = 1, max = 5))]
    pub usefulness: Option<i64>,
}
