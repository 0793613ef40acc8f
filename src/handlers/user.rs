// src/handlers/user.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{
        chapter::{Chapter, ChapterListParams},
        question::{PublicQuestion, Question},
        quiz::{Quiz, QuizListParams},
        score::SubmitQuizRequest,
        subject::Subject,
    },
    services::{
        evaluator::{ensure_available, evaluate, find_quiz},
        export::export_user_history,
        rollup::load_score_records,
        statistics::aggregate,
    },
    utils::jwt::Claims,
};

/// Lists every subject.
pub async fn list_subjects(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let subjects = sqlx::query_as::<_, Subject>(
        "SELECT id, name, description, created_at FROM subjects ORDER BY id",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(subjects))
}

pub async fn get_subject(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let subject = sqlx::query_as::<_, Subject>(
        "SELECT id, name, description, created_at FROM subjects WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Subject not found".to_string()))?;

    Ok(Json(subject))
}

/// Lists chapters, optionally filtered by `?subject_id=`.
pub async fn list_chapters(
    State(pool): State<SqlitePool>,
    Query(params): Query<ChapterListParams>,
) -> Result<impl IntoResponse, AppError> {
    let chapters = sqlx::query_as::<_, Chapter>(
        r#"
        SELECT id, subject_id, name, description
        FROM chapters
        WHERE (?1 IS NULL OR subject_id = ?1)
        ORDER BY id
        "#,
    )
    .bind(params.subject_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(chapters))
}

pub async fn get_chapter(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let chapter = sqlx::query_as::<_, Chapter>(
        "SELECT id, subject_id, name, description FROM chapters WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Chapter not found".to_string()))?;

    Ok(Json(chapter))
}

/// Lists quizzes, optionally filtered by `?chapter_id=`.
/// Listing is not gated by the attempt window; the detail view is.
pub async fn list_quizzes(
    State(pool): State<SqlitePool>,
    Query(params): Query<QuizListParams>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes = sqlx::query_as::<_, Quiz>(
        r#"
        SELECT id, chapter_id, date_of_quiz, end_date, time_duration, remarks
        FROM quizzes
        WHERE (?1 IS NULL OR chapter_id = ?1)
        ORDER BY date_of_quiz DESC, id
        "#,
    )
    .bind(params.chapter_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(quizzes))
}

/// A quiz as served to a participant: answer keys stripped.
#[derive(Debug, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<PublicQuestion>,
}

/// Returns a quiz with its questions, provided the quiz is open today.
pub async fn get_quiz(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = find_quiz(&pool, id).await?;
    ensure_available(&quiz, Utc::now().date_naive())?;

    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, quiz_id, question_statement, option1, option2, option3, option4, correct_option
        FROM questions
        WHERE quiz_id = ?
        ORDER BY id
        "#,
    )
    .bind(quiz.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(QuizDetail {
        quiz,
        questions: questions.into_iter().map(PublicQuestion::from).collect(),
    }))
}

/// Grades a submission and records one score row.
///
/// Answers map question ids to the chosen option (1-4). Missing or foreign
/// entries count as wrong.
pub async fn submit_quiz(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let score = evaluate(&pool, id, &payload.selections(), Utc::now(), user_id).await?;

    Ok(Json(serde_json::json!({
        "score_id": score.id,
        "quiz_id": score.quiz_id,
        "total_scored": score.total_scored,
        "max_score": score.max_score,
        "percentage": score.percentage(),
        "attempted_at": score.attempted_at,
    })))
}

/// The caller's attempts, oldest first, each with quiz/chapter/subject resolved.
pub async fn list_scores(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let records = load_score_records(&pool, claims.user_id()?, None).await?;
    Ok(Json(records))
}

pub async fn statistics(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let rollup = aggregate(&pool, claims.user_id()?).await?;
    Ok(Json(rollup))
}

/// Downloads the caller's score history as CSV.
pub async fn export_scores(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let csv = export_user_history(&pool, user_id).await?;

    let disposition = format!(
        "attachment; filename=\"quiz_history_{}_{}.csv\"",
        user_id,
        Utc::now().format("%Y%m%d")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
