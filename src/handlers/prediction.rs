// src/handlers/prediction.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::prediction::{
        ADDRESS_CHOICES, FAMILY_SIZE_CHOICES, GENDER_CHOICES, GUARDIAN_CHOICES,
        PARENTAL_STATUS_CHOICES, PredictionResultResponse, SCHOOL_CHOICES, StudentAttributes,
        StudentPrediction, YES_NO_CHOICES,
    },
    services::{analytics::invalidate_global, rate_limit::Actor},
    state::AppState,
    store::session::Session,
    utils::{client::ClientAddr, jwt::Identity},
};

/// Session key remembering the caller's most recent prediction.
const LAST_PREDICTION_KEY: &str = "last_prediction_id";

/// Describes the prediction form and its allowed values.
pub async fn predict_form() -> impl IntoResponse {
    Json(json!({
        "choices": {
            "gender": GENDER_CHOICES,
            "school": SCHOOL_CHOICES,
            "address": ADDRESS_CHOICES,
            "family_size": FAMILY_SIZE_CHOICES,
            "parental_status": PARENTAL_STATUS_CHOICES,
            "guardian": GUARDIAN_CHOICES,
            "family_support": YES_NO_CHOICES,
            "internet_access": YES_NO_CHOICES,
            "activities": YES_NO_CHOICES,
        },
        "ranges": {
            "age": [10, 25],
            "mother_education": [0, 4],
            "father_education": [0, 4],
            "study_time": [1, 4],
            "travel_time": [1, 4],
            "failures": [0, 3],
            "absences": [0, 100],
            "g1": [0, 20],
            "g2": [0, 20],
            "health": [1, 5],
        },
    }))
}

async fn insert_prediction(
    pool: &SqlitePool,
    user_id: Option<i64>,
    attrs: &StudentAttributes,
    label: &str,
    confidence: Option<f64>,
) -> Result<StudentPrediction, sqlx::Error> {
    sqlx::query_as::<_, StudentPrediction>(
        r#"
        INSERT INTO student_predictions (
            user_id, full_name, age, gender, school, address, family_size, parental_status,
            mother_education, father_education, guardian, family_support, internet_access,
            study_time, travel_time, failures, absences, g1, g2, activities, health,
            prediction, confidence, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(attrs.full_name.trim())
    .bind(attrs.age)
    .bind(&attrs.gender)
    .bind(&attrs.school)
    .bind(&attrs.address)
    .bind(&attrs.family_size)
    .bind(&attrs.parental_status)
    .bind(attrs.mother_education)
    .bind(attrs.father_education)
    .bind(&attrs.guardian)
    .bind(&attrs.family_support)
    .bind(&attrs.internet_access)
    .bind(attrs.study_time)
    .bind(attrs.travel_time)
    .bind(attrs.failures)
    .bind(attrs.absences)
    .bind(attrs.g1)
    .bind(attrs.g2)
    .bind(&attrs.activities)
    .bind(attrs.health)
    .bind(label)
    .bind(confidence)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

fn result_response(record: StudentPrediction) -> PredictionResultResponse {
    PredictionResultResponse {
        confidence_percent: record.confidence_percent(),
        record,
    }
}

/// Runs the classifier on the submitted attributes and stores the outcome.
///
/// Returns 201 with a `Location` header pointing at the stored result.
pub async fn create_prediction(
    State(state): State<AppState>,
    identity: Identity,
    addr: ClientAddr,
    Extension(session): Extension<Session>,
    Json(payload): Json<StudentAttributes>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = identity.0.as_ref().map(|u| u.id);
    state
        .limiter
        .enforce("predict", &Actor::new(user_id, addr.0), state.config.rate_limits.predict)
        .await?;

    payload.validate()?;

    let prediction = match state.predictor.predict(&payload).await {
        Ok(prediction) => prediction,
        Err(e) => {
            tracing::error!("Prediction failed: {}", e);
            return Err(AppError::InferenceUnavailable(serde_json::to_value(&payload)?));
        }
    };

    let record = insert_prediction(
        &state.pool,
        user_id,
        &payload,
        prediction.label.as_str(),
        prediction.confidence,
    )
    .await
    .map_err(|e| {
        tracing::error!("Failed to store prediction: {:?}", e);
        AppError::from(e)
    })?;

    session.insert(LAST_PREDICTION_KEY, &record.id).await?;
    invalidate_global(state.cache.as_ref()).await;

    tracing::info!(
        "Stored prediction {} ({}) for {}",
        record.id,
        record.prediction,
        user_id.map_or_else(|| "anonymous".to_string(), |id| format!("user {}", id))
    );

    let location = format!("/api/predictions/{}", record.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(result_response(record)),
    ))
}

async fn load_visible(
    pool: &SqlitePool,
    identity: &Identity,
    id: i64,
) -> Result<StudentPrediction, AppError> {
    let record = sqlx::query_as::<_, StudentPrediction>(
        "SELECT * FROM student_predictions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Prediction not found".to_string()))?;

    if let Some(owner) = record.user_id {
        let allowed = identity
            .0
            .as_ref()
            .is_some_and(|user| user.id == owner || user.is_staff);
        if !allowed {
            return Err(AppError::NotOwned);
        }
    }

    Ok(record)
}

/// One stored prediction. Owned records are visible to their owner and staff only.
pub async fn get_prediction(
    State(pool): State<SqlitePool>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let record = load_visible(&pool, &identity, id).await?;
    Ok(Json(result_response(record)))
}

/// The prediction this client submitted last.
pub async fn latest_prediction(
    State(pool): State<SqlitePool>,
    identity: Identity,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, AppError> {
    let id = session
        .get::<i64>(LAST_PREDICTION_KEY)
        .await?
        .ok_or_else(|| AppError::NotFound("No prediction yet. Submit the form first.".to_string()))?;

    let record = load_visible(&pool, &identity, id).await?;
    Ok(Json(result_response(record)))
}
