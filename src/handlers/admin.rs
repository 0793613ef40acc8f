// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        chapter::{Chapter, ChapterListParams, CreateChapterRequest, UpdateChapterRequest},
        question::{
            AdminQuestion, CreateQuestionRequest, Question, QuestionListParams,
            UpdateQuestionRequest,
        },
        quiz::{CreateQuizRequest, Quiz, QuizListParams, UpdateQuizRequest, check_window, parse_date},
        subject::{CreateSubjectRequest, Subject, UpdateSubjectRequest},
        user::User,
    },
    services::jobs::{MonthlyReportOptions, send_daily_reminders, send_monthly_reports},
    state::AppState,
    utils::{
        html::{clean_html, clean_opt},
        jwt::Claims,
    },
};

// Quiz filters used by the cascades. Fixed strings, never user input.
const QUIZZES_OF_SUBJECT: &str =
    "chapter_id IN (SELECT id FROM chapters WHERE subject_id = ?)";
const QUIZZES_OF_CHAPTER: &str = "chapter_id = ?";
const QUIZ_BY_ID: &str = "id = ?";

/// Removes the selected quizzes together with their questions and scores.
async fn purge_quizzes(
    conn: &mut SqliteConnection,
    filter: &str,
    id: i64,
) -> Result<(), sqlx::Error> {
    let scores = format!("DELETE FROM scores WHERE quiz_id IN (SELECT id FROM quizzes WHERE {filter})");
    sqlx::query(&scores).bind(id).execute(&mut *conn).await?;

    let questions =
        format!("DELETE FROM questions WHERE quiz_id IN (SELECT id FROM quizzes WHERE {filter})");
    sqlx::query(&questions).bind(id).execute(&mut *conn).await?;

    let quizzes = format!("DELETE FROM quizzes WHERE {filter}");
    sqlx::query(&quizzes).bind(id).execute(&mut *conn).await?;

    Ok(())
}

async fn ensure_exists(pool: &SqlitePool, table: &str, id: i64, what: &str) -> Result<(), AppError> {
    let sql = format!("SELECT id FROM {table} WHERE id = ?");
    sqlx::query_scalar::<_, i64>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(|_| ())
        .ok_or(AppError::NotFound(format!("{what} not found")))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Lists all users in the system.
/// Admin only.
pub async fn list_users(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password, full_name, qualification, dob, role, created_at
        FROM users
        ORDER BY id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

/// Deletes a user and their scores.
/// Admin only. Prevents deleting self.
pub async fn delete_user(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id()? {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM scores WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tx.commit().await?;
    tracing::info!(user_id = id, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Subjects
// ---------------------------------------------------------------------------

pub async fn list_subjects(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let subjects = sqlx::query_as::<_, Subject>(
        "SELECT id, name, description, created_at FROM subjects ORDER BY id",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(subjects))
}

async fn fetch_subject(pool: &SqlitePool, id: i64) -> Result<Subject, AppError> {
    sqlx::query_as::<_, Subject>("SELECT id, name, description, created_at FROM subjects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Subject not found".to_string()))
}

pub async fn get_subject(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_subject(&pool, id).await?))
}

pub async fn create_subject(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let subject = sqlx::query_as::<_, Subject>(
        r#"
        INSERT INTO subjects (name, description)
        VALUES (?, ?)
        RETURNING id, name, description, created_at
        "#,
    )
    .bind(clean_html(payload.name.trim()))
    .bind(clean_opt(payload.description.as_deref()))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create subject: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(subject)))
}

pub async fn update_subject(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let current = fetch_subject(&pool, id).await?;

    let name = payload
        .name
        .map(|n| clean_html(n.trim()))
        .unwrap_or(current.name);
    let description = clean_opt(payload.description.as_deref()).or(current.description);

    let subject = sqlx::query_as::<_, Subject>(
        r#"
        UPDATE subjects SET name = ?, description = ?
        WHERE id = ?
        RETURNING id, name, description, created_at
        "#,
    )
    .bind(name)
    .bind(description)
    .bind(id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(subject))
}

/// Deletes a subject with every chapter, quiz, question and score below it.
pub async fn delete_subject(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    purge_quizzes(&mut *tx, QUIZZES_OF_SUBJECT, id).await?;

    sqlx::query("DELETE FROM chapters WHERE subject_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM subjects WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    // Dropping the transaction rolls back the cascade.
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Subject not found".to_string()));
    }

    tx.commit().await?;
    tracing::info!(subject_id = id, "Subject deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Chapters
// ---------------------------------------------------------------------------

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

async fn fetch_chapter(pool: &SqlitePool, id: i64) -> Result<Chapter, AppError> {
    sqlx::query_as::<_, Chapter>("SELECT id, subject_id, name, description FROM chapters WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Chapter not found".to_string()))
}

pub async fn get_chapter(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_chapter(&pool, id).await?))
}

pub async fn create_chapter(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateChapterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    ensure_exists(&pool, "subjects", payload.subject_id, "Subject").await?;

    let chapter = sqlx::query_as::<_, Chapter>(
        r#"
        INSERT INTO chapters (subject_id, name, description)
        VALUES (?, ?, ?)
        RETURNING id, subject_id, name, description
        "#,
    )
    .bind(payload.subject_id)
    .bind(clean_html(payload.name.trim()))
    .bind(clean_opt(payload.description.as_deref()))
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(chapter)))
}

pub async fn update_chapter(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateChapterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let current = fetch_chapter(&pool, id).await?;

    let subject_id = payload.subject_id.unwrap_or(current.subject_id);
    if subject_id != current.subject_id {
        ensure_exists(&pool, "subjects", subject_id, "Subject").await?;
    }
    let name = payload
        .name
        .map(|n| clean_html(n.trim()))
        .unwrap_or(current.name);
    let description = clean_opt(payload.description.as_deref()).or(current.description);

    let chapter = sqlx::query_as::<_, Chapter>(
        r#"
        UPDATE chapters SET subject_id = ?, name = ?, description = ?
        WHERE id = ?
        RETURNING id, subject_id, name, description
        "#,
    )
    .bind(subject_id)
    .bind(name)
    .bind(description)
    .bind(id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(chapter))
}

/// Deletes a chapter with its quizzes, their questions and scores.
pub async fn delete_chapter(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    purge_quizzes(&mut *tx, QUIZZES_OF_CHAPTER, id).await?;

    let result = sqlx::query("DELETE FROM chapters WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Chapter not found".to_string()));
    }

    tx.commit().await?;
    tracing::info!(chapter_id = id, "Chapter deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Quizzes
// ---------------------------------------------------------------------------

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

async fn fetch_quiz(pool: &SqlitePool, id: i64) -> Result<Quiz, AppError> {
    sqlx::query_as::<_, Quiz>(
        "SELECT id, chapter_id, date_of_quiz, end_date, time_duration, remarks FROM quizzes WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))
}

/// Admin view: no availability check.
pub async fn get_quiz(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_quiz(&pool, id).await?))
}

pub async fn create_quiz(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let date_of_quiz = parse_date("date_of_quiz", &payload.date_of_quiz)?;
    let end_date = payload
        .end_date
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_date("end_date", s))
        .transpose()?;
    check_window(date_of_quiz, end_date)?;
    ensure_exists(&pool, "chapters", payload.chapter_id, "Chapter").await?;

    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        INSERT INTO quizzes (chapter_id, date_of_quiz, end_date, time_duration, remarks)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, chapter_id, date_of_quiz, end_date, time_duration, remarks
        "#,
    )
    .bind(payload.chapter_id)
    .bind(date_of_quiz)
    .bind(end_date)
    .bind(payload.time_duration)
    .bind(clean_opt(payload.remarks.as_deref()))
    .fetch_one(&pool)
    .await?;

    tracing::info!(quiz_id = quiz.id, "Quiz created");

    Ok((StatusCode::CREATED, Json(quiz)))
}

pub async fn update_quiz(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let current = fetch_quiz(&pool, id).await?;

    let chapter_id = payload.chapter_id.unwrap_or(current.chapter_id);
    if chapter_id != current.chapter_id {
        ensure_exists(&pool, "chapters", chapter_id, "Chapter").await?;
    }
    let date_of_quiz = match payload.date_of_quiz.as_deref() {
        Some(s) => parse_date("date_of_quiz", s)?,
        None => current.date_of_quiz,
    };
    let end_date = match payload.end_date.as_ref() {
        Some(Some(s)) if !s.trim().is_empty() => Some(parse_date("end_date", s)?),
        Some(_) => None,
        None => current.end_date,
    };
    // The merged record must still describe a valid window.
    check_window(date_of_quiz, end_date)?;

    let time_duration = payload.time_duration.unwrap_or(current.time_duration);
    let remarks = clean_opt(payload.remarks.as_deref()).or(current.remarks);

    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        UPDATE quizzes
        SET chapter_id = ?, date_of_quiz = ?, end_date = ?, time_duration = ?, remarks = ?
        WHERE id = ?
        RETURNING id, chapter_id, date_of_quiz, end_date, time_duration, remarks
        "#,
    )
    .bind(chapter_id)
    .bind(date_of_quiz)
    .bind(end_date)
    .bind(time_duration)
    .bind(remarks)
    .bind(id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(quiz))
}

/// Deletes a quiz with its questions and scores.
pub async fn delete_quiz(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    fetch_quiz(&pool, id).await?;

    let mut tx = pool.begin().await?;
    purge_quizzes(&mut *tx, QUIZ_BY_ID, id).await?;
    tx.commit().await?;

    tracing::info!(quiz_id = id, "Quiz deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

pub async fn list_questions(
    State(pool): State<SqlitePool>,
    Query(params): Query<QuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, quiz_id, question_statement, option1, option2, option3, option4, correct_option
        FROM questions
        WHERE (?1 IS NULL OR quiz_id = ?1)
        ORDER BY id
        "#,
    )
    .bind(params.quiz_id)
    .fetch_all(&pool)
    .await?;

    let questions: Vec<AdminQuestion> = questions.into_iter().map(AdminQuestion::from).collect();
    Ok(Json(questions))
}

async fn fetch_question(pool: &SqlitePool, id: i64) -> Result<Question, AppError> {
    sqlx::query_as::<_, Question>(
        r#"
        SELECT id, quiz_id, question_statement, option1, option2, option3, option4, correct_option
        FROM questions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))
}

pub async fn get_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(AdminQuestion::from(fetch_question(&pool, id).await?)))
}

/// Creates a new question.
/// Admin only.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    ensure_exists(&pool, "quizzes", payload.quiz_id, "Quiz").await?;

    let options: Vec<String> = payload.options.iter().map(|o| clean_html(o.trim())).collect();

    let question = sqlx::query_as::<_, Question>(
        r#"
        INSERT INTO questions
            (quiz_id, question_statement, option1, option2, option3, option4, correct_option)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id, quiz_id, question_statement, option1, option2, option3, option4, correct_option
        "#,
    )
    .bind(payload.quiz_id)
    .bind(clean_html(&payload.question_statement))
    .bind(&options[0])
    .bind(&options[1])
    .bind(&options[2])
    .bind(&options[3])
    .bind(payload.correct_option)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(AdminQuestion::from(question))))
}

/// Updates a question.
/// Admin only.
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let current = fetch_question(&pool, id).await?;

    let quiz_id = payload.quiz_id.unwrap_or(current.quiz_id);
    if quiz_id != current.quiz_id {
        ensure_exists(&pool, "quizzes", quiz_id, "Quiz").await?;
    }
    let statement = payload
        .question_statement
        .map(|s| clean_html(&s))
        .unwrap_or_else(|| current.question_statement.clone());
    let options: Vec<String> = match payload.options {
        Some(opts) => opts.iter().map(|o| clean_html(o.trim())).collect(),
        None => current.options().to_vec(),
    };
    let correct_option = payload.correct_option.unwrap_or(current.correct_option);

    let question = sqlx::query_as::<_, Question>(
        r#"
        UPDATE questions
        SET quiz_id = ?, question_statement = ?,
            option1 = ?, option2 = ?, option3 = ?, option4 = ?,
            correct_option = ?
        WHERE id = ?
        RETURNING id, quiz_id, question_statement, option1, option2, option3, option4, correct_option
        "#,
    )
    .bind(quiz_id)
    .bind(statement)
    .bind(&options[0])
    .bind(&options[1])
    .bind(&options[2])
    .bind(&options[3])
    .bind(correct_option)
    .bind(id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(AdminQuestion::from(question)))
}

/// Deletes a question. Scores already recorded against its quiz are kept.
pub async fn delete_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Runs the monthly report job now. Body: `{"test_mode": bool, "user_id": id?}`.
pub async fn trigger_monthly_reports(
    State(state): State<AppState>,
    payload: Option<Json<MonthlyReportOptions>>,
) -> Result<impl IntoResponse, AppError> {
    let options = payload.map(|Json(o)| o).unwrap_or_default();
    tracing::info!(?options, "Monthly reports triggered by admin");

    let summary = send_monthly_reports(&state, &options, Utc::now()).await;
    Ok(Json(summary))
}

/// Runs the daily reminder job now.
pub async fn trigger_daily_reminders(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("Daily reminders triggered by admin");

    let summary = send_daily_reminders(&state, Utc::now()).await;
    Ok(Json(summary))
}
