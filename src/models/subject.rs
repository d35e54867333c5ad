// src/models/subject.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'subjects' table: one exam question pool.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub time_limit_minutes: i64,

    /// Minimum percentage needed to pass.
    pub pass_percentage: f64,

    /// Points deducted per wrong answer. 0 disables negative marking.
    pub negative_marking: f64,

    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Subject {
    pub fn time_limit_seconds(&self) -> i64 {
        self.time_limit_minutes * 60
    }
}

/// Subject row joined with the number of questions a live exam would use.
#[derive(Debug, Serialize, FromRow)]
pub struct SubjectSummary {
    pub id: i64,
    pub name: String,
    pub time_limit_minutes: i64,
    pub pass_percentage: f64,
    pub negative_marking: f64,
    pub question_count: i64,
}

/// DTO for creating a subject.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubjectRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(range(min = 1, max = 600))]
    pub time_limit_minutes: i64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub pass_percentage: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default)]
    pub negative_marking: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// DTO for editing a subject. Fields are optional; `is_active = false` deactivates it.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSubjectRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(range(min = 1, max = 600))]
    pub time_limit_minutes: Option<i64>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub pass_percentage: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub negative_marking: Option<f64>,
    pub is_active: Option<bool>,
}

pub(crate) fn default_true() -> bool {
    true
}
