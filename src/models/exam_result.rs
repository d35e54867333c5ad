// src/models/exam_result.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::question::PublicQuestion;

/// Represents the 'exam_results' table in the database.
/// Rows are written once at submission and never updated.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ExamResult {
    pub id: i64,
    pub user_id: i64,
    pub subject_id: i64,

    /// Points after negative marking, never below 0.
    pub score: f64,

    pub total_questions: i64,
    pub correct_count: i64,
    pub wrong_count: i64,

    /// 0–100, rounded to 2 decimals.
    pub percentage: f64,

    pub passed: bool,
    pub created_at: DateTime<Utc>,
}

/// Result row joined with its subject name, for history listings.
#[derive(Debug, Serialize, FromRow)]
pub struct ExamResultEntry {
    pub id: i64,
    pub subject_id: i64,
    pub subject_name: String,
    pub score: f64,
    pub total_questions: i64,
    pub correct_count: i64,
    pub wrong_count: i64,
    pub percentage: f64,
    pub passed: bool,
    pub created_at: DateTime<Utc>,
}

/// DTO for a running exam.
#[derive(Debug, Serialize)]
pub struct ExamPaper {
    pub subject_id: i64,
    pub subject_name: String,
    pub pass_percentage: f64,
    pub negative_marking: f64,
    pub questions: Vec<PublicQuestion>,
    pub exam_token: String,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    /// Seconds left before the server stops accepting the exam.
    pub remaining_seconds: i64,
}

/// Query string of the exam page.
#[derive(Debug, Default, Deserialize)]
pub struct ExamQuery {
    pub subject: Option<i64>,
    #[serde(default)]
    pub start: Option<String>,
}

impl ExamQuery {
    pub fn wants_start(&self) -> bool {
        matches!(
            self.start.as_deref().map(str::trim),
            Some("1" | "true" | "yes" | "on")
        )
    }
}

/// Form body of the subject selection and explicit start actions.
#[derive(Debug, Default, Deserialize)]
pub struct SubjectForm {
    pub subject_id: Option<i64>,
}

/// DTO for submitting an exam attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitExamRequest {
    /// The token issued when the exam was started.
    pub exam_token: String,

    /// Key: Question ID. Value: selected option ("A".."D").
    #[serde(default)]
    pub answers: HashMap<i64, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_flag_accepts_common_truthy_values() {
        for raw in ["1", "true", "yes", "on"] {
            let q = ExamQuery {
                subject: None,
                start: Some(raw.to_string()),
            };
            assert!(q.wants_start(), "{raw}");
        }
        assert!(!ExamQuery::default().wants_start());
        assert!(
            !ExamQuery {
                subject: Some(1),
                start: Some("0".into())
            }
            .wants_start()
        );
    }

    #[test]
    fn submit_request_accepts_numeric_string_keys() {
        let req: SubmitExamRequest =
            serde_json::from_str(r#"{"exam_token":"t","answers":{"3":"A","11":"c"}}"#).unwrap();
        assert_eq!(req.answers.get(&3).map(String::as_str), Some("A"));
        assert_eq!(req.answers.get(&11).map(String::as_str), Some("c"));
    }
}
