// src/models/quiz.rs

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::error::AppError;

/// Free-form `HH:MM` duration. Informational only; no timer is enforced.
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}:[0-5]\d$").expect("valid duration regex"));

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub chapter_id: i64,

    /// First day on which the quiz accepts submissions.
    pub date_of_quiz: NaiveDate,

    /// Last day on which the quiz accepts submissions. Open-ended when absent.
    pub end_date: Option<NaiveDate>,

    pub time_duration: String,
    pub remarks: Option<String>,
}

/// Where a given day falls relative to a quiz's attempt window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Open,
    NotYetAvailable,
    Expired,
}

impl Quiz {
    /// Checks `day` against the inclusive `[date_of_quiz, end_date]` window.
    pub fn availability_on(&self, day: NaiveDate) -> Availability {
        if day < self.date_of_quiz {
            return Availability::NotYetAvailable;
        }
        match self.end_date {
            Some(end) if day > end => Availability::Expired,
            _ => Availability::Open,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    pub chapter_id: i64,
    /// `YYYY-MM-DD`
    pub date_of_quiz: String,
    /// `YYYY-MM-DD`
    pub end_date: Option<String>,
    #[validate(custom(function = validate_duration))]
    pub time_duration: String,
    #[validate(length(max = 2000))]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuizRequest {
    pub chapter_id: Option<i64>,
    pub date_of_quiz: Option<String>,
    /// Absent keeps the stored end, `null` removes it, a date replaces it.
    #[serde(default, deserialize_with = "present_or_null")]
    pub end_date: Option<Option<String>>,
    #[validate(custom(function = validate_duration))]
    pub time_duration: Option<String>,
    #[validate(length(max = 2000))]
    pub remarks: Option<String>,
}

/// Tells a field sent as `null` (`Some(None)`) apart from a missing one (`None`).
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Query string for listing quizzes, optionally scoped to one chapter.
#[derive(Debug, Deserialize)]
pub struct QuizListParams {
    pub chapter_id: Option<i64>,
}

fn validate_duration(value: &str) -> Result<(), validator::ValidationError> {
    if DURATION_RE.is_match(value) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("duration_must_be_hh_mm"))
    }
}

/// Parses a `YYYY-MM-DD` date coming from a request body.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date format for {}", field)))
}

/// Rejects windows whose end precedes their start.
pub fn check_window(date_of_quiz: NaiveDate, end_date: Option<NaiveDate>) -> Result<(), AppError> {
    match end_date {
        Some(end) if end < date_of_quiz => Err(AppError::BadRequest(
            "end_date must not be before date_of_quiz".to_string(),
        )),
        _ => Ok(()),
    }
}
