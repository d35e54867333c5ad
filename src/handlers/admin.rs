// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::{
        prediction::{AnalyticsParams, ListParams, StudentPrediction},
        question::{CreateQuestionRequest, Question, UpdateQuestionRequest, normalize_option_key},
        subject::{CreateSubjectRequest, Subject, UpdateSubjectRequest},
        user::UserActionRequest,
    },
    services::{
        analytics::{Analytics, AnalyticsFilter, Scope},
        user_admin,
    },
    state::AppState,
    utils::jwt::CurrentUser,
};

const RECENT_STAFF_PREDICTIONS: i64 = 6;

/// Staff overview: global prediction counts, users and contact messages.
pub async fn dashboard(
    State(state): State<AppState>,
    Query(params): Query<AnalyticsParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = AnalyticsFilter::from_params(&params);
    let analytics = Analytics::new(
        state.pool.clone(),
        state.cache.clone(),
        state.config.dashboard_cache_ttl,
    );

    let overview = analytics.staff_overview(&filter).await?;
    let recent = analytics
        .recent(Scope::Global, &filter, RECENT_STAFF_PREDICTIONS)
        .await?;

    Ok(Json(json!({
        "totals": overview.stats.totals,
        "pass_count": overview.stats.pass_count,
        "fail_count": overview.stats.fail_count,
        "pass_rate": overview.stats.pass_rate,
        "user_count": overview.user_count,
        "contact_count": overview.contact_count,
        "recent": recent,
    })))
}

/// Every stored prediction, newest first.
pub async fn list_records(
    State(pool): State<SqlitePool>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(500).clamp(1, 5000);

    let records = sqlx::query_as::<_, StudentPrediction>(
        "SELECT * FROM student_predictions ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&pool)
    .await?;

    Ok(Json(records))
}

/// Lists all users, newest first.
pub async fn list_users(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let users = user_admin::list_users(&pool).await.map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(users))
}

/// Toggles a permission flag on another account.
pub async fn manage_user(
    State(pool): State<SqlitePool>,
    actor: CurrentUser,
    Json(payload): Json<UserActionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let updated = user_admin::apply_action(&pool, &actor, payload.user_id, payload.action).await?;

    Ok(Json(json!({
        "message": format!("Permissions updated for {}.", updated.username),
        "user": updated,
    })))
}

pub async fn list_subjects(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let subjects = sqlx::query_as::<_, Subject>("SELECT * FROM subjects ORDER BY name")
        .fetch_all(&pool)
        .await?;

    Ok(Json(subjects))
}

fn subject_conflict(name: &str, e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict(format!("Subject '{}' already exists", name))
    } else {
        tracing::error!("Failed to save subject: {:?}", e);
        AppError::from(e)
    }
}

pub async fn create_subject(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let name = payload.name.trim();

    let subject = sqlx::query_as::<_, Subject>(
        r#"
        INSERT INTO subjects (name, time_limit_minutes, pass_percentage, negative_marking, is_active, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(payload.time_limit_minutes)
    .bind(payload.pass_percentage)
    .bind(payload.negative_marking)
    .bind(payload.is_active)
    .bind(Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(|e| subject_conflict(name, e))?;

    tracing::info!("Created subject '{}'", subject.name);
    Ok((StatusCode::CREATED, Json(subject)))
}

async fn find_subject(pool: &SqlitePool, id: i64) -> Result<Subject, AppError> {
    sqlx::query_as::<_, Subject>("SELECT * FROM subjects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Subject not found".to_string()))
}

/// Edits a subject. Subjects are never deleted; `is_active = false` retires one.
pub async fn update_subject(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let current = find_subject(&pool, id).await?;

    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .unwrap_or(&current.name)
        .to_string();

    let subject = sqlx::query_as::<_, Subject>(
        r#"
        UPDATE subjects
        SET name = ?, time_limit_minutes = ?, pass_percentage = ?, negative_marking = ?, is_active = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&name)
    .bind(payload.time_limit_minutes.unwrap_or(current.time_limit_minutes))
    .bind(payload.pass_percentage.unwrap_or(current.pass_percentage))
    .bind(payload.negative_marking.unwrap_or(current.negative_marking))
    .bind(payload.is_active.unwrap_or(current.is_active))
    .bind(id)
    .fetch_one(&pool)
    .await
    .map_err(|e| subject_conflict(&name, e))?;

    Ok(Json(subject))
}

/// All questions of a subject, including inactive ones and their answer keys.
pub async fn list_questions(
    State(pool): State<SqlitePool>,
    Path(subject_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    find_subject(&pool, subject_id).await?;

    let questions =
        sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE subject_id = ? ORDER BY id")
            .bind(subject_id)
            .fetch_all(&pool)
            .await?;

    Ok(Json(questions))
}

pub async fn create_question(
    State(pool): State<SqlitePool>,
    Path(subject_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    find_subject(&pool, subject_id).await?;

    let question = sqlx::query_as::<_, Question>(
        r#"
        INSERT INTO questions
            (subject_id, text, option_a, option_b, option_c, option_d, correct_option, points, is_active, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(subject_id)
    .bind(payload.text.trim())
    .bind(payload.option_a.trim())
    .bind(payload.option_b.trim())
    .bind(payload.option_c.trim())
    .bind(payload.option_d.trim())
    .bind(normalize_option_key(&payload.correct_option))
    .bind(payload.points)
    .bind(payload.is_active)
    .bind(Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Edits a question. Deactivating keeps it for past results but drops it from new exams.
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let current = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    let correct_option = payload
        .correct_option
        .as_deref()
        .map(normalize_option_key)
        .unwrap_or(current.correct_option);

    let question = sqlx::query_as::<_, Question>(
        r#"
        UPDATE questions
        SET text = ?, option_a = ?, option_b = ?, option_c = ?, option_d = ?,
            correct_option = ?, points = ?, is_active = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(payload.text.unwrap_or(current.text))
    .bind(payload.option_a.unwrap_or(current.option_a))
    .bind(payload.option_b.unwrap_or(current.option_b))
    .bind(payload.option_c.unwrap_or(current.option_c))
    .bind(payload.option_d.unwrap_or(current.option_d))
    .bind(correct_option)
    .bind(payload.points.unwrap_or(current.points))
    .bind(payload.is_active.unwrap_or(current.is_active))
    .bind(id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(question))
}
