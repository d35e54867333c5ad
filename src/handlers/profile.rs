// src/handlers/profile.rs

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{
        prediction::{AnalyticsParams, StudentPrediction},
        user::{ProfileResponse, User},
    },
    services::analytics::{Analytics, AnalyticsFilter, Scope},
    state::AppState,
    utils::jwt::CurrentUser,
};

const RECENT_STUDENT_PREDICTIONS: i64 = 8;

async fn prediction_count(pool: &SqlitePool, user_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM student_predictions WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

/// Student landing page.
pub async fn dashboard(
    State(pool): State<SqlitePool>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let prediction_count = prediction_count(&pool, user.id).await?;
    Ok(Json(json!({
        "user": user,
        "prediction_count": prediction_count,
    })))
}

/// Current user's account and counters.
pub async fn get_profile(
    State(pool): State<SqlitePool>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let account = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user.id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let exam_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exam_results WHERE user_id = ?")
        .bind(user.id)
        .fetch_one(&pool)
        .await?;

    Ok(Json(ProfileResponse {
        prediction_count: prediction_count(&pool, user.id).await?,
        exam_count,
        user: account,
    }))
}

/// Every prediction the current user has made, newest first.
pub async fn history(
    State(pool): State<SqlitePool>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let records = sqlx::query_as::<_, StudentPrediction>(
        "SELECT * FROM student_predictions WHERE user_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(user.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(records))
}

/// Personal pass/fail breakdown, filterable by label and date range.
pub async fn analytics(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<AnalyticsParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = AnalyticsFilter::from_params(&params);
    let analytics = Analytics::new(
        state.pool.clone(),
        state.cache.clone(),
        state.config.dashboard_cache_ttl,
    );

    let stats = analytics.student_stats(user.id, &filter).await?;
    let recent = analytics
        .recent(Scope::User(user.id), &filter, RECENT_STUDENT_PREDICTIONS)
        .await?;

    Ok(Json(json!({
        "totals": stats.totals,
        "pass_count": stats.pass_count,
        "fail_count": stats.fail_count,
        "pass_rate": stats.pass_rate,
        "recent": recent,
        "chart_data": {
            "labels": ["PASS", "FAIL"],
            "values": [stats.pass_count, stats.fail_count],
        },
    })))
}
