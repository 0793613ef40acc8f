// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Number of option slots every question carries.
pub const OPTION_COUNT: usize = 4;

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,
    pub question_statement: String,
    pub option1: String,
    pub option2: String,
    pub option3: String,
    pub option4: String,

    /// 1-based index of the correct option.
    pub correct_option: i64,
}

impl Question {
    pub fn options(&self) -> [String; OPTION_COUNT] {
        [
            self.option1.clone(),
            self.option2.clone(),
            self.option3.clone(),
            self.option4.clone(),
        ]
    }
}

/// DTO for sending question to client (excludes the answer key).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub quiz_id: i64,
    pub question_statement: String,
    pub options: [String; OPTION_COUNT],
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        Self {
            options: q.options(),
            id: q.id,
            quiz_id: q.quiz_id,
            question_statement: q.question_statement,
        }
    }
}

/// Admin view of a question, answer key included.
#[derive(Debug, Serialize)]
pub struct AdminQuestion {
    pub id: i64,
    pub quiz_id: i64,
    pub question_statement: String,
    pub options: [String; OPTION_COUNT],
    pub correct_option: i64,
}

impl From<Question> for AdminQuestion {
    fn from(q: Question) -> Self {
        Self {
            options: q.options(),
            id: q.id,
            quiz_id: q.quiz_id,
            question_statement: q.question_statement,
            correct_option: q.correct_option,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub quiz_id: i64,
    #[validate(length(min = 1, max = 2000))]
    pub question_statement: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(range(min = 1, max = 4, message = "correct_option must be between 1 and 4"))]
    pub correct_option: i64,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    pub quiz_id: Option<i64>,
    #[validate(length(min = 1, max = 2000))]
    pub question_statement: Option<String>,
    #[validate(custom(function = validate_options))]
    pub options: Option<Vec<String>>,
    #[validate(range(min = 1, max = 4, message = "correct_option must be between 1 and 4"))]
    pub correct_option: Option<i64>,
}

/// Query string for listing questions of one quiz.
#[derive(Debug, Deserialize)]
pub struct QuestionListParams {
    pub quiz_id: Option<i64>,
}

/// Exactly four populated options, so any `correct_option` in 1..=4 points at text.
fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != OPTION_COUNT {
        return Err(validator::ValidationError::new("exactly_four_options_required"));
    }
    for opt in options {
        if opt.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 255 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(options: &[&str], correct_option: i64) -> CreateQuestionRequest {
        CreateQuestionRequest {
            quiz_id: 1,
            question_statement: "2 + 2 = ?".to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            correct_option,
        }
    }

    #[test]
    fn accepts_four_populated_options() {
        assert!(request(&["1", "2", "3", "4"], 4).validate().is_ok());
    }

    #[test]
    fn rejects_wrong_option_count_or_blank_option() {
        assert!(request(&["1", "2", "3"], 1).validate().is_err());
        assert!(request(&["1", "2", " ", "4"], 1).validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_correct_option() {
        assert!(request(&["1", "2", "3", "4"], 0).validate().is_err());
        assert!(request(&["1", "2", "3", "4"], 5).validate().is_err());
    }

    #[test]
    fn public_view_hides_answer_key() {
        let q = Question {
            id: 7,
            quiz_id: 3,
            question_statement: "Pick B".to_string(),
            option1: "A".to_string(),
            option2: "B".to_string(),
            option3: "C".to_string(),
            option4: "D".to_string(),
            correct_option: 2,
        };
        let json = serde_json::to_value(PublicQuestion::from(q)).unwrap();
        assert!(json.get("correct_option").is_none());
        assert_eq!(json["options"][1], "B");
    }
}
