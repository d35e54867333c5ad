// src/handlers/exam.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;

use crate::{
    error::AppError,
    models::exam_result::{ExamQuery, SubjectForm, SubmitExamRequest},
    services::exam::{ExamEngine, resolve_subject},
    state::AppState,
    store::session::Session,
    utils::jwt::CurrentUser,
};

fn engine(state: &AppState, session: Session, user: &CurrentUser) -> ExamEngine {
    ExamEngine::new(
        state.pool.clone(),
        session,
        user.id,
        state.config.exam_submit_grace_seconds,
    )
}

/// Rules, available subjects and the caller's current exam state.
pub async fn instructions(
    State(state): State<AppState>,
    user: CurrentUser,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, AppError> {
    let engine = engine(&state, session, &user);
    let subjects = engine.available_subjects().await?;
    let status = engine.status().await?;

    Ok(Json(json!({
        "rules": [
            "The timer starts when you start the exam and keeps running if you leave the page.",
            "Each question has exactly one correct option.",
            "Wrong and unanswered questions may carry negative marks.",
            "Submit before the deadline; late submissions are not scored.",
        ],
        "subjects": subjects,
        "exam": status,
    })))
}

/// Remembers a subject for the next start.
pub async fn select_subject(
    State(state): State<AppState>,
    user: CurrentUser,
    Extension(session): Extension<Session>,
    Json(form): Json<SubjectForm>,
) -> Result<impl IntoResponse, AppError> {
    let subject_id = form.subject_id.ok_or(AppError::InvalidSubject)?;
    engine(&state, session, &user).select(subject_id).await?;

    Ok(Json(json!({
        "selected_subject": subject_id,
        "redirect": format!("/api/exam?subject={}&start=1", subject_id),
    })))
}

/// Shows the running exam, or starts one when `start` is set.
pub async fn exam_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Extension(session): Extension<Session>,
    Query(query): Query<ExamQuery>,
) -> Result<impl IntoResponse, AppError> {
    let engine = engine(&state, session, &user);
    let now = Utc::now();

    let paper = if query.wants_start() {
        let remembered = engine.load().await?.remembered_subject();
        let subject_id =
            resolve_subject(query.subject, None, remembered).ok_or(AppError::InvalidSubject)?;
        engine.start(subject_id, now).await?
    } else {
        engine.view(query.subject, now).await?
    };

    Ok(Json(paper))
}

/// Explicit start action; the subject may come from the query, the body or the session.
pub async fn start_exam(
    State(state): State<AppState>,
    user: CurrentUser,
    Extension(session): Extension<Session>,
    Query(query): Query<ExamQuery>,
    Json(form): Json<SubjectForm>,
) -> Result<impl IntoResponse, AppError> {
    let engine = engine(&state, session, &user);
    let remembered = engine.load().await?.remembered_subject();
    let subject_id = resolve_subject(query.subject, form.subject_id, remembered)
        .ok_or(AppError::InvalidSubject)?;

    let paper = engine.start(subject_id, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(paper)))
}

/// Scores the running exam. The token from the start response must match.
pub async fn submit_exam(
    State(state): State<AppState>,
    user: CurrentUser,
    Extension(session): Extension<Session>,
    Json(payload): Json<SubmitExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = engine(&state, session, &user)
        .submit(&payload, Utc::now())
        .await?;

    let location = format!("/api/exam/result/{}", result.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location.clone())],
        Json(json!({
            "result": result,
            "redirect": location,
        })),
    ))
}

/// Result of this session's last submission.
pub async fn last_result(
    State(state): State<AppState>,
    user: CurrentUser,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, AppError> {
    let result = engine(&state, session, &user).last_result().await?;
    Ok(Json(result))
}

pub async fn get_result(
    State(state): State<AppState>,
    user: CurrentUser,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = engine(&state, session, &user).result(id).await?;
    Ok(Json(result))
}

/// All of the caller's exam results, newest first.
pub async fn history(
    State(state): State<AppState>,
    user: CurrentUser,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, AppError> {
    let entries = engine(&state, session, &user).history().await?;
    Ok(Json(entries))
}
