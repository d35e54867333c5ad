// src/models/question.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::{Validate, ValidationError};

use crate::models::subject::default_true;

/// One of the four answer slots of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerOption {
    A,
    B,
    C,
    D,
}

impl AnswerOption {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerOption::A => "A",
            AnswerOption::B => "B",
            AnswerOption::C => "C",
            AnswerOption::D => "D",
        }
    }
}

impl fmt::Display for AnswerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerOption {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(AnswerOption::A),
            "B" | "b" => Ok(AnswerOption::B),
            "C" | "c" => Ok(AnswerOption::C),
            "D" | "d" => Ok(AnswerOption::D),
            _ => Err(()),
        }
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub subject_id: i64,

    /// The prompt shown to the student.
    pub text: String,

    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,

    /// "A", "B", "C" or "D".
    pub correct_option: String,

    pub points: i64,

    /// Inactive questions stay for result history but are left out of new exams.
    pub is_active: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Question {
    pub fn correct(&self) -> Option<AnswerOption> {
        self.correct_option.parse().ok()
    }
}

/// DTO for sending question to client (excludes the correct option).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub options: [PublicOption; 4],
    pub points: i64,
}

#[derive(Debug, Serialize)]
pub struct PublicOption {
    pub key: AnswerOption,
    pub text: String,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            text: q.text,
            options: [
                PublicOption { key: AnswerOption::A, text: q.option_a },
                PublicOption { key: AnswerOption::B, text: q.option_b },
                PublicOption { key: AnswerOption::C, text: q.option_c },
                PublicOption { key: AnswerOption::D, text: q.option_d },
            ],
            points: q.points,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub text: String,
    #[validate(length(min = 1, max = 255))]
    pub option_a: String,
    #[validate(length(min = 1, max = 255))]
    pub option_b: String,
    #[validate(length(min = 1, max = 255))]
    pub option_c: String,
    #[validate(length(min = 1, max = 255))]
    pub option_d: String,
    #[validate(custom(function = validate_option_key))]
    pub correct_option: String,
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_points")]
    pub points: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub text: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub option_a: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub option_b: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub option_c: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub option_d: Option<String>,
    #[validate(custom(function = validate_option_key))]
    pub correct_option: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub points: Option<i64>,
    pub is_active: Option<bool>,
}

fn default_points() -> i64 {
    1
}

fn validate_option_key(value: &str) -> Result<(), ValidationError> {
    match value.parse::<AnswerOption>() {
        Ok(_) => Ok(()),
        Err(_) => Err(ValidationError::new("correct_option_must_be_a_b_c_or_d")),
    }
}

/// Normalizes an accepted option key ("b" → "B").
pub fn normalize_option_key(value: &str) -> String {
    value
        .parse::<AnswerOption>()
        .map(|o| o.as_str().to_string())
        .unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_keys_parse_in_either_case() {
        assert_eq!("a".parse(), Ok(AnswerOption::A));
        assert_eq!(" D ".parse(), Ok(AnswerOption::D));
        assert!("E".parse::<AnswerOption>().is_err());
        assert!("".parse::<AnswerOption>().is_err());
        assert_eq!(normalize_option_key("c"), "C");
    }

    #[test]
    fn create_request_rejects_unknown_correct_option() {
        let req = CreateQuestionRequest {
            text: "2 + 2?".to_string(),
            option_a: "3".to_string(),
            option_b: "4".to_string(),
            option_c: "5".to_string(),
            option_d: "22".to_string(),
            correct_option: "E".to_string(),
            points: 0,
            is_active: true,
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("correct_option"));
        assert!(errors.field_errors().contains_key("points"));
    }
}
