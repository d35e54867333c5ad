// src/test_support.rs

//! Fixtures shared by the unit test modules.

use chrono::{DateTime, Utc};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

use crate::models::prediction::StudentAttributes;

/// Small logistic model driven by the grades, failures and absences.
pub const TEST_MODEL_JSON: &str = r#"{
    "intercept": -6.0,
    "numeric": { "G1": 0.2, "G2": 0.4, "failures": -0.8, "absences": -0.02 },
    "categorical": { "higher": { "yes": 0.1 } },
    "threshold": 0.5
}"#;

/// Fresh in-memory database with the schema applied.
///
/// A single connection that never idles out, since each connection to
/// `sqlite::memory:` would otherwise see its own empty database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn sample_attributes() -> StudentAttributes {
    StudentAttributes {
        full_name: "Asha Rao".to_string(),
        age: 17,
        gender: "F".to_string(),
        school: "GP".to_string(),
        address: "U".to_string(),
        family_size: "GT3".to_string(),
        parental_status: "T".to_string(),
        mother_education: 3,
        father_education: 2,
        guardian: "mother".to_string(),
        family_support: "yes".to_string(),
        internet_access: "yes".to_string(),
        study_time: 2,
        travel_time: 1,
        failures: 0,
        absences: 4,
        g1: 14,
        g2: 15,
        activities: "no".to_string(),
        health: 4,
    }
}

pub async fn create_user(pool: &SqlitePool, username: &str, is_staff: bool) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO users (username, email, full_name, password, is_staff, is_active, created_at)
        VALUES (?, ?, ?, 'not-a-hash', ?, 1, ?)
        RETURNING id
        "#,
    )
    .bind(username)
    .bind(format!("{username}@example.com"))
    .bind(username)
    .bind(is_staff)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_prediction(
    pool: &SqlitePool,
    user_id: Option<i64>,
    label: &str,
    created_at: DateTime<Utc>,
) -> i64 {
    let a = sample_attributes();
    sqlx::query_scalar(
        r#"
        INSERT INTO student_predictions (
            user_id, full_name, age, gender, school, address, family_size, parental_status,
            mother_education, father_education, guardian, family_support, internet_access,
            study_time, travel_time, failures, absences, g1, g2, activities, health,
            prediction, confidence, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(a.full_name)
    .bind(a.age)
    .bind(a.gender)
    .bind(a.school)
    .bind(a.address)
    .bind(a.family_size)
    .bind(a.parental_status)
    .bind(a.mother_education)
    .bind(a.father_education)
    .bind(a.guardian)
    .bind(a.family_support)
    .bind(a.internet_access)
    .bind(a.study_time)
    .bind(a.travel_time)
    .bind(a.failures)
    .bind(a.absences)
    .bind(a.g1)
    .bind(a.g2)
    .bind(a.activities)
    .bind(a.health)
    .bind(label)
    .bind(0.8_f64)
    .bind(created_at)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn create_subject(
    pool: &SqlitePool,
    name: &str,
    time_limit_minutes: i64,
    pass_percentage: f64,
    negative_marking: f64,
) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO subjects (name, time_limit_minutes, pass_percentage, negative_marking, is_active, created_at)
        VALUES (?, ?, ?, ?, 1, ?)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(time_limit_minutes)
    .bind(pass_percentage)
    .bind(negative_marking)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn create_question(pool: &SqlitePool, subject_id: i64, correct: &str, points: i64) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO questions
            (subject_id, text, option_a, option_b, option_c, option_d, correct_option, points, is_active, created_at)
        VALUES (?, 'Which one?', 'first', 'second', 'third', 'fourth', ?, ?, 1, ?)
        RETURNING id
        "#,
    )
    .bind(subject_id)
    .bind(correct)
    .bind(points)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .unwrap()
}
