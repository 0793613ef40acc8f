// src/services/evaluator.rs

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::models::{
    quiz::{Availability, Quiz},
    score::Score,
};

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Quiz {0} not found")]
    QuizNotFound(i64),

    #[error("User {0} not found")]
    UserNotFound(i64),

    #[error("This quiz is not yet available (opens on {opens_on})")]
    NotYetAvailable { quiz_id: i64, opens_on: NaiveDate },

    #[error("This quiz has expired (closed on {closed_on}) and can no longer be submitted")]
    Expired { quiz_id: i64, closed_on: NaiveDate },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Helper struct for fetching answer keys from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnswerKey {
    pub id: i64,
    pub correct_option: i64,
}

/// Outcome of grading one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
    pub total_scored: i64,
    pub max_score: i64,
}

/// Grades `answers` (question id to selected option) against the quiz's keys.
///
/// The denominator is the number of keys. Unanswered questions and wrong or
/// out-of-range options score nothing; ids that are not part of the quiz are ignored.
pub fn grade(keys: &[AnswerKey], answers: &HashMap<i64, i64>) -> Grade {
    let total_scored = keys
        .iter()
        .filter(|key| answers.get(&key.id) == Some(&key.correct_option))
        .count() as i64;

    Grade {
        total_scored,
        max_score: keys.len() as i64,
    }
}

/// Fails unless `day` lies inside the quiz's attempt window.
pub fn ensure_available(quiz: &Quiz, day: NaiveDate) -> Result<(), EvaluationError> {
    match quiz.availability_on(day) {
        Availability::Open => Ok(()),
        Availability::NotYetAvailable => Err(EvaluationError::NotYetAvailable {
            quiz_id: quiz.id,
            opens_on: quiz.date_of_quiz,
        }),
        Availability::Expired => Err(EvaluationError::Expired {
            quiz_id: quiz.id,
            closed_on: quiz.end_date.unwrap_or(quiz.date_of_quiz),
        }),
    }
}

pub async fn find_quiz(pool: &SqlitePool, quiz_id: i64) -> Result<Quiz, EvaluationError> {
    sqlx::query_as::<_, Quiz>(
        "SELECT id, chapter_id, date_of_quiz, end_date, time_duration, remarks FROM quizzes WHERE id = ?",
    )
    .bind(quiz_id)
    .fetch_optional(pool)
    .await?
    .ok_or(EvaluationError::QuizNotFound(quiz_id))
}

/// Scores a submission and records the attempt.
///
/// Availability is judged on the UTC calendar day of `as_of`, which is also
/// stored as the attempt timestamp. Every call inserts a new score row.
pub async fn evaluate(
    pool: &SqlitePool,
    quiz_id: i64,
    answers: &HashMap<i64, i64>,
    as_of: DateTime<Utc>,
    user_id: i64,
) -> Result<Score, EvaluationError> {
    let quiz = find_quiz(pool, quiz_id).await?;
    ensure_available(&quiz, as_of.date_naive())?;

    let mut tx = pool.begin().await?;

    // The account may have been deleted while its token is still valid.
    sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EvaluationError::UserNotFound(user_id))?;

    let keys = sqlx::query_as::<_, AnswerKey>(
        "SELECT id, correct_option FROM questions WHERE quiz_id = ? ORDER BY id",
    )
    .bind(quiz.id)
    .fetch_all(&mut *tx)
    .await?;

    let grade = grade(&keys, answers);

    let score = sqlx::query_as::<_, Score>(
        r#"
        INSERT INTO scores (quiz_id, user_id, attempted_at, total_scored, max_score)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, quiz_id, user_id, attempted_at, total_scored, max_score
        "#,
    )
    .bind(quiz.id)
    .bind(user_id)
    .bind(as_of)
    .bind(grade.total_scored)
    .bind(grade.max_score)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id,
        quiz_id,
        total_scored = score.total_scored,
        max_score = score.max_score,
        "Quiz attempt recorded"
    );

    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(correct: &[i64]) -> Vec<AnswerKey> {
        correct
            .iter()
            .enumerate()
            .map(|(i, &c)| AnswerKey {
                id: i as i64 + 1,
                correct_option: c,
            })
            .collect()
    }

    #[test]
    fn grades_partial_submission() {
        let answers = HashMap::from([(1, 2), (2, 3), (3, 4), (4, 3)]);
        let g = grade(&keys(&[2, 1, 4, 3]), &answers);
        assert_eq!(g, Grade { total_scored: 3, max_score: 4 });
    }

    #[test]
    fn two_of_four_is_fifty_percent() {
        // q2 and q4 wrong, q1 and q3 right.
        let answers = HashMap::from([(1, 2), (2, 3), (3, 4), (4, 1)]);
        let g = grade(&keys(&[2, 1, 4, 3]), &answers);
        assert_eq!(g, Grade { total_scored: 2, max_score: 4 });
        assert_eq!(
            crate::services::rollup::percentage(g.total_scored, g.max_score),
            50.0
        );
    }

    #[test]
    fn unanswered_and_out_of_range_count_as_wrong() {
        let answers = HashMap::from([(1, 9), (2, -1)]);
        let g = grade(&keys(&[1, 2, 3]), &answers);
        assert_eq!(g, Grade { total_scored: 0, max_score: 3 });
    }

    #[test]
    fn foreign_question_ids_do_not_change_denominator() {
        let answers = HashMap::from([(1, 1), (99, 1), (100, 2)]);
        let g = grade(&keys(&[1, 1]), &answers);
        assert_eq!(g, Grade { total_scored: 1, max_score: 2 });
    }

    #[test]
    fn empty_quiz_scores_zero_of_zero() {
        let g = grade(&[], &HashMap::from([(1, 1)]));
        assert_eq!(g, Grade { total_scored: 0, max_score: 0 });
    }

    #[test]
    fn availability_errors_name_the_boundary() {
        let quiz = Quiz {
            id: 4,
            chapter_id: 1,
            date_of_quiz: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            end_date: Some(NaiveDate::from_ymd_opt(2024, 6, 20).unwrap()),
            time_duration: "00:20".to_string(),
            remarks: None,
        };

        let early = ensure_available(&quiz, NaiveDate::from_ymd_opt(2024, 6, 9).unwrap());
        assert!(matches!(
            early,
            Err(EvaluationError::NotYetAvailable { quiz_id: 4, .. })
        ));

        let late = ensure_available(&quiz, NaiveDate::from_ymd_opt(2024, 6, 21).unwrap());
        assert!(matches!(late, Err(EvaluationError::Expired { quiz_id: 4, .. })));

        assert!(ensure_available(&quiz, NaiveDate::from_ymd_opt(2024, 6, 20).unwrap()).is_ok());
    }
}
