// src/services/exam.rs

//! Timed exam lifecycle.
//!
//! The per-client session is the only record of a running exam. Its state
//! moves `NoExam → InProgress → Submitted | Expired`, and starting a new exam
//! from any state overwrites what was there. The deadline is checked against
//! the server clock on every read, so a client can neither resume nor submit a
//! stale exam.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{
        exam_result::{ExamPaper, ExamResult, ExamResultEntry, SubmitExamRequest},
        question::{AnswerOption, PublicQuestion, Question},
        subject::{Subject, SubjectSummary},
    },
    store::session::{Session, SessionError},
};

#[derive(Debug, thiserror::Error)]
pub enum ExamError {
    #[error("subject is missing, inactive or has no active questions")]
    InvalidSubject,
    #[error("no exam in progress")]
    NoActiveExam,
    #[error("exam token does not match the session")]
    InvalidToken,
    #[error("exam deadline has passed")]
    ExamExpired,
    #[error("exam result not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<ExamError> for AppError {
    fn from(err: ExamError) -> Self {
        match err {
            ExamError::InvalidSubject => AppError::InvalidSubject,
            ExamError::NoActiveExam => AppError::NoActiveExam,
            ExamError::InvalidToken => AppError::InvalidToken,
            ExamError::ExamExpired => AppError::ExamExpired,
            ExamError::NotFound => AppError::NotOwned,
            ExamError::Database(e) => AppError::from(e),
            ExamError::Session(e) => AppError::from(e),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExamState {
    #[default]
    NoExam,
    InProgress {
        subject_id: i64,
        token: String,
        started_at: DateTime<Utc>,
    },
    /// `result_id` is unset between claiming the token and storing the result.
    Submitted { result_id: Option<i64> },
    Expired { subject_id: i64 },
}

/// Exam state as stored in the client's session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExamSession {
    /// Subject picked on the instructions page, used when a request names none.
    pub selected_subject: Option<i64>,
    pub state: ExamState,
}

impl ExamSession {
    /// Begins a fresh attempt and returns its token.
    pub fn start(&mut self, subject_id: i64, now: DateTime<Utc>) -> String {
        let token = new_exam_token();
        self.selected_subject = Some(subject_id);
        self.state = ExamState::InProgress {
            subject_id,
            token: token.clone(),
            started_at: now,
        };
        token
    }

    pub fn expire(&mut self) {
        if let ExamState::InProgress { subject_id, .. } = self.state {
            self.state = ExamState::Expired { subject_id };
        }
    }

    pub fn remembered_subject(&self) -> Option<i64> {
        self.selected_subject.or(match self.state {
            ExamState::InProgress { subject_id, .. } | ExamState::Expired { subject_id } => {
                Some(subject_id)
            }
            _ => None,
        })
    }

    pub fn last_result_id(&self) -> Option<i64> {
        match self.state {
            ExamState::Submitted { result_id } => result_id,
            _ => None,
        }
    }
}

/// 256 random bits, hex encoded.
pub fn new_exam_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Picks the subject for a request: query parameter, then form field, then session.
pub fn resolve_subject(
    query: Option<i64>,
    form: Option<i64>,
    remembered: Option<i64>,
) -> Option<i64> {
    query.or(form).or(remembered)
}

pub fn deadline(started_at: DateTime<Utc>, time_limit_seconds: i64) -> DateTime<Utc> {
    started_at + Duration::seconds(time_limit_seconds)
}

/// True once more than `time_limit_seconds + grace_seconds` have elapsed since the start.
pub fn is_past_deadline(
    started_at: DateTime<Utc>,
    time_limit_seconds: i64,
    grace_seconds: i64,
    now: DateTime<Utc>,
) -> bool {
    now - started_at > Duration::seconds(time_limit_seconds + grace_seconds)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub score: f64,
    pub total_marks: i64,
    pub total_questions: i64,
    pub correct_count: i64,
    pub wrong_count: i64,
    pub percentage: f64,
    pub passed: bool,
}

/// Scores a submission against the subject's active questions.
///
/// Unanswered and unrecognised answers count as wrong and carry the
/// subject's negative marking. The final score never drops below 0, and the
/// percentage is rounded to 2 decimals with halves going to the even digit.
pub fn score_submission(
    subject: &Subject,
    questions: &[Question],
    answers: &HashMap<i64, String>,
) -> Score {
    let mut score = 0.0;
    let mut total_marks = 0;
    let mut correct_count = 0;
    let mut wrong_count = 0;

    for question in questions {
        total_marks += question.points;

        let submitted = answers
            .get(&question.id)
            .and_then(|raw| raw.parse::<AnswerOption>().ok());

        match (submitted, question.correct()) {
            (Some(given), Some(correct)) if given == correct => {
                correct_count += 1;
                score += question.points as f64;
            }
            _ => {
                wrong_count += 1;
                score -= subject.negative_marking;
            }
        }
    }

    let score = score.max(0.0);
    let percentage = if total_marks > 0 {
        (score / total_marks as f64 * 100.0 * 100.0).round_ties_even() / 100.0
    } else {
        0.0
    };

    Score {
        score,
        total_marks,
        total_questions: questions.len() as i64,
        correct_count,
        wrong_count,
        percentage,
        passed: percentage >= subject.pass_percentage,
    }
}

/// What the instructions page shows about the caller's exam.
#[derive(Debug, Serialize)]
pub struct ExamStatus {
    pub state: &'static str,
    pub subject_id: Option<i64>,
    pub selected_subject: Option<i64>,
    pub last_result_id: Option<i64>,
}

impl From<&ExamSession> for ExamStatus {
    fn from(exam: &ExamSession) -> Self {
        let (state, subject_id) = match &exam.state {
            ExamState::NoExam => ("no_exam", None),
            ExamState::InProgress { subject_id, .. } => ("in_progress", Some(*subject_id)),
            ExamState::Submitted { .. } => ("submitted", None),
            ExamState::Expired { subject_id } => ("expired", Some(*subject_id)),
        };
        ExamStatus {
            state,
            subject_id,
            selected_subject: exam.selected_subject,
            last_result_id: exam.last_result_id(),
        }
    }
}

/// Runs the exam operations for one user within one client session.
pub struct ExamEngine {
    pool: SqlitePool,
    session: Session,
    user_id: i64,
    submit_grace_seconds: i64,
}

impl ExamEngine {
    pub fn new(pool: SqlitePool, session: Session, user_id: i64, submit_grace_seconds: i64) -> Self {
        Self {
            pool,
            session,
            user_id,
            submit_grace_seconds,
        }
    }

    /// Exam state is kept per user, so a shared browser never mixes attempts.
    fn session_key(&self) -> String {
        format!("exam:{}", self.user_id)
    }

    pub async fn load(&self) -> Result<ExamSession, ExamError> {
        Ok(self
            .session
            .get::<ExamSession>(&self.session_key())
            .await?
            .unwrap_or_default())
    }

    async fn save(&self, exam: &ExamSession) -> Result<(), ExamError> {
        self.session.insert(&self.session_key(), exam).await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<ExamStatus, ExamError> {
        Ok(ExamStatus::from(&self.load().await?))
    }

    /// Active subjects with at least one active question.
    pub async fn available_subjects(&self) -> Result<Vec<SubjectSummary>, ExamError> {
        let subjects = sqlx::query_as::<_, SubjectSummary>(
            r#"
            SELECT
                s.id, s.name, s.time_limit_minutes, s.pass_percentage, s.negative_marking,
                COUNT(q.id) AS question_count
            FROM subjects s
            JOIN questions q ON q.subject_id = s.id AND q.is_active = 1
            WHERE s.is_active = 1
            GROUP BY s.id
            ORDER BY s.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(subjects)
    }

    /// Remembers the subject chosen on the instructions page.
    pub async fn select(&self, subject_id: i64) -> Result<(), ExamError> {
        self.live_subject(subject_id).await?;
        let mut exam = self.load().await?;
        exam.selected_subject = Some(subject_id);
        self.save(&exam).await
    }

    pub async fn start(&self, subject_id: i64, now: DateTime<Utc>) -> Result<ExamPaper, ExamError> {
        let (subject, questions) = self.live_subject(subject_id).await?;

        let mut exam = self.load().await?;
        let token = exam.start(subject.id, now);
        self.save(&exam).await?;

        tracing::info!(
            "User {} started exam '{}' ({} questions)",
            self.user_id,
            subject.name,
            questions.len()
        );
        Ok(paper(subject, questions, token, now, now))
    }

    /// Returns the running exam, expiring it if its time is up.
    ///
    /// `requested` is an explicit subject from the request; naming a subject
    /// other than the running one is treated as having no exam for it.
    pub async fn view(
        &self,
        requested: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ExamPaper, ExamError> {
        let mut exam = self.load().await?;
        let ExamState::InProgress {
            subject_id,
            token,
            started_at,
        } = exam.state.clone()
        else {
            return Err(ExamError::NoActiveExam);
        };

        let Some(subject) = find_subject(&self.pool, subject_id)
            .await?
            .filter(|s| s.is_active)
        else {
            exam.state = ExamState::NoExam;
            self.save(&exam).await?;
            return Err(ExamError::InvalidSubject);
        };

        // Expiry is checked before anything else in the request can short-circuit.
        if is_past_deadline(started_at, subject.time_limit_seconds(), 0, now) {
            exam.expire();
            self.save(&exam).await?;
            tracing::info!("Exam for user {} expired on read", self.user_id);
            return Err(ExamError::ExamExpired);
        }

        if requested.is_some_and(|id| id != subject_id) {
            return Err(ExamError::NoActiveExam);
        }

        let questions = active_questions(&self.pool, subject_id).await?;
        Ok(paper(subject, questions, token, started_at, now))
    }

    pub async fn submit(
        &self,
        req: &SubmitExamRequest,
        now: DateTime<Utc>,
    ) -> Result<ExamResult, ExamError> {
        let mut exam = self.load().await?;
        let ExamState::InProgress {
            subject_id,
            token,
            started_at,
        } = exam.state.clone()
        else {
            return Err(ExamError::NoActiveExam);
        };

        if req.exam_token != token {
            tracing::warn!("Rejected exam submission with stale token for user {}", self.user_id);
            return Err(ExamError::InvalidToken);
        }

        let Some(subject) = find_subject(&self.pool, subject_id).await? else {
            exam.state = ExamState::NoExam;
            self.save(&exam).await?;
            return Err(ExamError::InvalidSubject);
        };

        if is_past_deadline(
            started_at,
            subject.time_limit_seconds(),
            self.submit_grace_seconds,
            now,
        ) {
            exam.expire();
            self.save(&exam).await?;
            tracing::info!("Late exam submission from user {} refused", self.user_id);
            return Err(ExamError::ExamExpired);
        }

        // Consume the token before scoring so a racing second submission loses.
        let mut claimed = ExamSession {
            selected_subject: None,
            state: ExamState::Submitted { result_id: None },
        };
        if !self
            .session
            .compare_and_swap(&self.session_key(), &exam, &claimed)
            .await?
        {
            tracing::warn!("Concurrent exam submission for user {} dropped", self.user_id);
            return Err(ExamError::NoActiveExam);
        }

        let questions = active_questions(&self.pool, subject_id).await?;
        let score = score_submission(&subject, &questions, &req.answers);

        let stored = sqlx::query_as::<_, ExamResult>(
            r#"
            INSERT INTO exam_results
                (user_id, subject_id, score, total_questions, correct_count,
                 wrong_count, percentage, passed, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(self.user_id)
        .bind(subject.id)
        .bind(score.score)
        .bind(score.total_questions)
        .bind(score.correct_count)
        .bind(score.wrong_count)
        .bind(score.percentage)
        .bind(score.passed)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        let result = match stored {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Failed to store exam result: {:?}", e);
                // Hand the attempt back so the same token can be resubmitted.
                match self
                    .session
                    .compare_and_swap(&self.session_key(), &claimed, &exam)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => tracing::warn!(
                        "Exam session for user {} changed before it could be restored",
                        self.user_id
                    ),
                    Err(restore) => tracing::error!(
                        "Failed to restore exam session for user {}: {}",
                        self.user_id,
                        restore
                    ),
                }
                return Err(ExamError::Database(e));
            }
        };

        claimed.state = ExamState::Submitted {
            result_id: Some(result.id),
        };
        self.save(&claimed).await?;

        tracing::info!(
            "User {} submitted exam '{}': {}% ({})",
            self.user_id,
            subject.name,
            result.percentage,
            if result.passed { "passed" } else { "failed" }
        );
        Ok(result)
    }

    /// Loads one of the caller's results. Other users' results read as missing.
    pub async fn result(&self, result_id: i64) -> Result<ExamResult, ExamError> {
        sqlx::query_as::<_, ExamResult>("SELECT * FROM exam_results WHERE id = ? AND user_id = ?")
            .bind(result_id)
            .bind(self.user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ExamError::NotFound)
    }

    /// The result produced by this session's most recent submission.
    pub async fn last_result(&self) -> Result<ExamResult, ExamError> {
        let id = self.load().await?.last_result_id().ok_or(ExamError::NotFound)?;
        self.result(id).await
    }

    pub async fn history(&self) -> Result<Vec<ExamResultEntry>, ExamError> {
        let entries = sqlx::query_as::<_, ExamResultEntry>(
            r#"
            SELECT
                r.id, r.subject_id, s.name AS subject_name, r.score, r.total_questions,
                r.correct_count, r.wrong_count, r.percentage, r.passed, r.created_at
            FROM exam_results r
            JOIN subjects s ON s.id = r.subject_id
            WHERE r.user_id = ?
            ORDER BY r.created_at DESC, r.id DESC
            "#,
        )
        .bind(self.user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// An active subject together with its active questions; fails if either is missing.
    async fn live_subject(&self, subject_id: i64) -> Result<(Subject, Vec<Question>), ExamError> {
        let subject = find_subject(&self.pool, subject_id)
            .await?
            .filter(|s| s.is_active)
            .ok_or(ExamError::InvalidSubject)?;
        let questions = active_questions(&self.pool, subject_id).await?;
        if questions.is_empty() {
            return Err(ExamError::InvalidSubject);
        }
        Ok((subject, questions))
    }
}

async fn find_subject(pool: &SqlitePool, id: i64) -> Result<Option<Subject>, sqlx::Error> {
    sqlx::query_as::<_, Subject>("SELECT * FROM subjects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

async fn active_questions(pool: &SqlitePool, subject_id: i64) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(
        "SELECT * FROM questions WHERE subject_id = ? AND is_active = 1 ORDER BY id",
    )
    .bind(subject_id)
    .fetch_all(pool)
    .await
}

fn paper(
    subject: Subject,
    questions: Vec<Question>,
    token: String,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ExamPaper {
    let deadline = deadline(started_at, subject.time_limit_seconds());
    ExamPaper {
        subject_id: subject.id,
        subject_name: subject.name,
        pass_percentage: subject.pass_percentage,
        negative_marking: subject.negative_marking,
        questions: questions.into_iter().map(PublicQuestion::from).collect(),
        exam_token: token,
        started_at,
        deadline,
        remaining_seconds: (deadline - now).num_seconds().max(0),
    }
}
