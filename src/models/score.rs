// src/models/score.rs

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'scores' table in the database.
/// One row per quiz attempt; rows are never updated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Score {
    pub id: i64,
    pub quiz_id: i64,
    pub user_id: i64,
    pub attempted_at: DateTime<Utc>,
    pub total_scored: i64,
    pub max_score: i64,
}

impl Score {
    pub fn percentage(&self) -> f64 {
        crate::services::rollup::percentage(self.total_scored, self.max_score)
    }
}

/// A score joined with the quiz, chapter and subject it belongs to.
/// Produced by a single query so history reads stay free of N+1 lookups.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScoreRecord {
    pub score_id: i64,
    pub quiz_id: i64,
    pub attempted_at: DateTime<Utc>,
    pub total_scored: i64,
    pub max_score: i64,
    pub quiz_date: NaiveDate,
    pub chapter_id: i64,
    pub chapter_name: String,
    pub subject_id: i64,
    pub subject_name: String,
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitQuizRequest {
    /// User's answers map.
    /// Key: Question ID (JSON object keys are strings)
    /// Value: selected option (1-4)
    #[serde(default)]
    pub answers: HashMap<String, serde_json::Value>,
}

impl SubmitQuizRequest {
    /// Keeps the entries that name a question id and an integral option,
    /// whether sent as an integer, a whole float or a numeric string.
    /// Anything else can never match an answer key, so it is dropped here
    /// and graded as unanswered.
    pub fn selections(&self) -> HashMap<i64, i64> {
        self.answers
            .iter()
            .filter_map(|(key, value)| {
                let question_id = key.trim().parse::<i64>().ok()?;
                let option = match value {
                    // `2.0` is as good as `2`; `1.5` names no option.
                    serde_json::Value::Number(n) => n.as_i64().or_else(|| {
                        n.as_f64()
                            .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                            .map(|f| f as i64)
                    })?,
                    serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
                    _ => return None,
                };
                Some((question_id, option))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selections_skip_unusable_entries() {
        let req: SubmitQuizRequest = serde_json::from_value(serde_json::json!({
            "answers": { "1": 2, "2": "3", "q3": 4, "4": null, "5": 1.5, "6": 2.0 }
        }))
        .unwrap();

        let picked = req.selections();
        assert_eq!(picked.len(), 3);
        assert_eq!(picked.get(&1), Some(&2));
        assert_eq!(picked.get(&2), Some(&3));
        assert_eq!(picked.get(&6), Some(&2));
        assert!(!picked.contains_key(&5));
    }

    #[test]
    fn missing_answers_default_to_empty() {
        let req: SubmitQuizRequest = serde_json::from_str("{}").unwrap();
        assert!(req.selections().is_empty());
    }
}
