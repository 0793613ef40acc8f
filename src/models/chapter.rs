// src/models/chapter.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'chapters' table. Always owned by one subject.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub subject_id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChapterRequest {
    pub subject_id: i64,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateChapterRequest {
    pub subject_id: Option<i64>,
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

/// Query string for listing chapters, optionally scoped to one subject.
#[derive(Debug, Deserialize)]
pub struct ChapterListParams {
    pub subject_id: Option<i64>,
}
