// src/services/export.rs

use csv_async::AsyncSerializer;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::{
    models::score::ScoreRecord,
    services::rollup::{load_score_records, percentage},
};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No quiz history found for this user")]
    NoHistory,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("CSV encoding failed: {0}")]
    Csv(String),
}

impl From<csv_async::Error> for ExportError {
    fn from(err: csv_async::Error) -> Self {
        ExportError::Csv(err.to_string())
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Csv(err.to_string())
    }
}

/// One line of the quiz history export.
#[derive(Debug, Serialize, PartialEq)]
pub struct HistoryRow {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Chapter")]
    pub chapter: String,
    #[serde(rename = "Quiz Date")]
    pub quiz_date: String,
    #[serde(rename = "Score")]
    pub score: i64,
    #[serde(rename = "Total Questions")]
    pub total_questions: i64,
    #[serde(rename = "Percentage")]
    pub percentage: String,
}

impl From<&ScoreRecord> for HistoryRow {
    fn from(r: &ScoreRecord) -> Self {
        Self {
            date: r.attempted_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            subject: r.subject_name.clone(),
            chapter: r.chapter_name.clone(),
            quiz_date: r.quiz_date.format("%Y-%m-%d").to_string(),
            score: r.total_scored,
            total_questions: r.max_score,
            percentage: format!("{:.2}%", percentage(r.total_scored, r.max_score)),
        }
    }
}

/// Encodes records as CSV with a header row.
pub async fn encode_history(records: &[ScoreRecord]) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    {
        let mut writer = AsyncSerializer::from_writer(&mut buf);
        for record in records {
            writer.serialize(HistoryRow::from(record)).await?;
        }
        writer.flush().await?;
    }
    Ok(buf)
}

/// The user's full score history as CSV, one row per attempt.
pub async fn export_user_history(pool: &SqlitePool, user_id: i64) -> Result<Vec<u8>, ExportError> {
    let records = load_score_records(pool, user_id, None).await?;
    if records.is_empty() {
        return Err(ExportError::NoHistory);
    }
    encode_history(&records).await
}
