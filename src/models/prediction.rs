// src/models/prediction.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

/// The two classes the model can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PredictionLabel {
    Pass,
    Fail,
}

impl PredictionLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            PredictionLabel::Pass => "PASS",
            PredictionLabel::Fail => "FAIL",
        }
    }
}

impl fmt::Display for PredictionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionLabel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PASS" => Ok(PredictionLabel::Pass),
            "FAIL" => Ok(PredictionLabel::Fail),
            _ => Err(()),
        }
    }
}

/// Represents the 'student_predictions' table in the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct StudentPrediction {
    pub id: i64,

    /// Null for anonymous submissions.
    pub user_id: Option<i64>,

    pub full_name: String,
    pub age: i64,
    pub gender: String,
    pub school: String,
    pub address: String,
    pub family_size: String,
    pub parental_status: String,
    pub mother_education: i64,
    pub father_education: i64,
    pub guardian: String,
    pub family_support: String,
    pub internet_access: String,
    pub study_time: i64,
    pub travel_time: i64,
    pub failures: i64,
    pub absences: i64,
    pub g1: i64,
    pub g2: i64,
    pub activities: String,
    pub health: i64,

    /// "PASS" or "FAIL".
    pub prediction: String,

    /// Probability of the stored label, when the model reports one.
    pub confidence: Option<f64>,

    pub created_at: DateTime<Utc>,
}

impl StudentPrediction {
    /// Confidence as a percentage rounded to 2 decimals, halves to even.
    pub fn confidence_percent(&self) -> Option<f64> {
        self.confidence.map(|c| (c * 10_000.0).round_ties_even() / 100.0)
    }

    /// The attribute set the record was created from.
    pub fn attributes(&self) -> StudentAttributes {
        StudentAttributes {
            full_name: self.full_name.clone(),
            age: self.age,
            gender: self.gender.clone(),
            school: self.school.clone(),
            address: self.address.clone(),
            family_size: self.family_size.clone(),
            parental_status: self.parental_status.clone(),
            mother_education: self.mother_education,
            father_education: self.father_education,
            guardian: self.guardian.clone(),
            family_support: self.family_support.clone(),
            internet_access: self.internet_access.clone(),
            study_time: self.study_time,
            travel_time: self.travel_time,
            failures: self.failures,
            absences: self.absences,
            g1: self.g1,
            g2: self.g2,
            activities: self.activities.clone(),
            health: self.health,
        }
    }
}

/// DTO for the prediction form. Every field is required.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
pub struct StudentAttributes {
    #[validate(length(min = 1, max = 100, message = "Enter the student's full name."))]
    pub full_name: String,
    #[validate(range(min = 10, max = 25, message = "Age should be between 10 and 25."))]
    pub age: i64,
    #[validate(custom(function = validate_gender))]
    pub gender: String,
    #[validate(custom(function = validate_school))]
    pub school: String,
    #[validate(custom(function = validate_address))]
    pub address: String,
    #[validate(custom(function = validate_family_size))]
    pub family_size: String,
    #[validate(custom(function = validate_parental_status))]
    pub parental_status: String,
    #[validate(range(min = 0, max = 4))]
    pub mother_education: i64,
    #[validate(range(min = 0, max = 4))]
    pub father_education: i64,
    #[validate(custom(function = validate_guardian))]
    pub guardian: String,
    #[validate(custom(function = validate_yes_no))]
    pub family_support: String,
    #[validate(custom(function = validate_yes_no))]
    pub internet_access: String,
    #[validate(range(min = 1, max = 4))]
    pub study_time: i64,
    #[validate(range(min = 1, max = 4))]
    pub travel_time: i64,
    #[validate(range(min = 0, max = 3))]
    pub failures: i64,
    #[validate(range(min = 0, max = 100))]
    pub absences: i64,
    #[validate(range(min = 0, max = 20))]
    pub g1: i64,
    #[validate(range(min = 0, max = 20))]
    pub g2: i64,
    #[validate(custom(function = validate_yes_no))]
    pub activities: String,
    #[validate(range(min = 1, max = 5))]
    pub health: i64,
}

pub const GENDER_CHOICES: &[&str] = &["M", "F"];
pub const SCHOOL_CHOICES: &[&str] = &["GP", "MS"];
pub const ADDRESS_CHOICES: &[&str] = &["U", "R"];
pub const FAMILY_SIZE_CHOICES: &[&str] = &["LE3", "GT3"];
pub const PARENTAL_STATUS_CHOICES: &[&str] = &["T", "A"];
pub const GUARDIAN_CHOICES: &[&str] = &["mother", "father", "other"];
pub const YES_NO_CHOICES: &[&str] = &["yes", "no"];

fn one_of(value: &str, choices: &[&str]) -> Result<(), ValidationError> {
    if choices.contains(&value) {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_choice");
        err.message = Some(format!("Select one of: {}.", choices.join(", ")).into());
        Err(err)
    }
}

fn validate_gender(value: &str) -> Result<(), ValidationError> {
    one_of(value, GENDER_CHOICES)
}

fn validate_school(value: &str) -> Result<(), ValidationError> {
    one_of(value, SCHOOL_CHOICES)
}

fn validate_address(value: &str) -> Result<(), ValidationError> {
    one_of(value, ADDRESS_CHOICES)
}

fn validate_family_size(value: &str) -> Result<(), ValidationError> {
    one_of(value, FAMILY_SIZE_CHOICES)
}

fn validate_parental_status(value: &str) -> Result<(), ValidationError> {
    one_of(value, PARENTAL_STATUS_CHOICES)
}

fn validate_guardian(value: &str) -> Result<(), ValidationError> {
    one_of(value, GUARDIAN_CHOICES)
}

fn validate_yes_no(value: &str) -> Result<(), ValidationError> {
    one_of(value, YES_NO_CHOICES)
}

/// Result page payload for one stored prediction.
#[derive(Debug, Serialize)]
pub struct PredictionResultResponse {
    pub record: StudentPrediction,
    pub confidence_percent: Option<f64>,
}

/// Query string for the analytics and dashboard views.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsParams {
    pub result: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Query string for record listings.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

/// Inclusive date range bound, accepting `YYYY-MM-DD`. Empty strings count as unset.
pub fn parse_date_param(raw: Option<&str>) -> Option<NaiveDate> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_prediction, memory_pool, sample_attributes as sample};

    #[test]
    fn valid_attributes_pass_validation() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn out_of_range_and_bad_choices_are_reported_per_field() {
        let mut attrs = sample();
        attrs.age = 30;
        attrs.school = "XX".to_string();
        attrs.g2 = 21;

        let errors = attrs.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("age"));
        assert!(fields.contains_key("school"));
        assert!(fields.contains_key("g2"));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn label_parses_case_insensitively() {
        assert_eq!("pass".parse(), Ok(PredictionLabel::Pass));
        assert_eq!(" FAIL ".parse(), Ok(PredictionLabel::Fail));
        assert!("maybe".parse::<PredictionLabel>().is_err());
    }

    #[test]
    fn date_params_ignore_blank_and_garbage() {
        assert_eq!(parse_date_param(Some("")), None);
        assert_eq!(parse_date_param(Some("not-a-date")), None);
        assert_eq!(
            parse_date_param(Some("2024-03-01")),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
    }

    #[tokio::test]
    async fn stored_record_reads_back_its_attributes() {
        let pool = memory_pool().await;
        let id = insert_prediction(&pool, None, "PASS", Utc::now()).await;

        let record = sqlx::query_as::<_, StudentPrediction>(
            "SELECT * FROM student_predictions WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(record.attributes(), sample());
        assert_eq!(record.prediction, "PASS");
    }

    #[test]
    fn confidence_percent_rounds_halves_to_even() {
        let record = StudentPrediction {
            id: 1,
            user_id: None,
            full_name: "Ana".into(),
            age: 17,
            gender: "F".into(),
            school: "GP".into(),
            address: "U".into(),
            family_size: "GT3".into(),
            parental_status: "T".into(),
            mother_education: 4,
            father_education: 4,
            guardian: "mother".into(),
            family_support: "yes".into(),
            internet_access: "yes".into(),
            study_time: 2,
            travel_time: 1,
            failures: 0,
            absences: 2,
            g1: 14,
            g2: 15,
            activities: "no".into(),
            health: 5,
            prediction: "PASS".into(),
            // 1 / 32, so the percentage is exactly 3.125.
            confidence: Some(0.03125),
            created_at: Utc::now(),
        };
        assert_eq!(record.confidence_percent(), Some(3.12));
    }
}
