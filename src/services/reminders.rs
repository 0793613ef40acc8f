// src/services/reminders.rs

use std::collections::HashSet;
use std::fmt::Write as _;

use ammonia::clean_text;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    models::user::User,
    services::{notifier::OutgoingEmail, rollup::start_of_day},
};

/// How far back "recent" reaches, both for new quizzes and for activity.
pub const LOOKBACK_DAYS: i64 = 7;

/// Users with at least this many recent attempts get no reminder.
pub const ACTIVE_ATTEMPT_THRESHOLD: i64 = 3;

/// Most quizzes listed in one reminder.
pub const MAX_LISTED_QUIZZES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    /// No attempts during the lookback period.
    Inactivity,
    /// Some activity, and there are recent quizzes the user never tried.
    NewQuizzes,
}

/// A quiz whose start date falls inside the lookback period.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct RecentQuiz {
    pub quiz_id: i64,
    pub quiz_date: NaiveDate,
    pub chapter_name: String,
    pub subject_name: String,
}

/// Decides whether a user is reminded and with which message.
pub fn classify(recent_attempts: i64, untried_quizzes: usize) -> Option<ReminderKind> {
    if recent_attempts >= ACTIVE_ATTEMPT_THRESHOLD {
        return None;
    }
    if recent_attempts == 0 {
        return Some(ReminderKind::Inactivity);
    }
    if untried_quizzes > 0 {
        Some(ReminderKind::NewQuizzes)
    } else {
        None
    }
}

pub async fn load_recent_quizzes(
    pool: &SqlitePool,
    today: NaiveDate,
) -> Result<Vec<RecentQuiz>, sqlx::Error> {
    sqlx::query_as::<_, RecentQuiz>(
        r#"
        SELECT
            q.id AS quiz_id,
            q.date_of_quiz AS quiz_date,
            c.name AS chapter_name,
            sb.name AS subject_name
        FROM quizzes q
        JOIN chapters c ON c.id = q.chapter_id
        JOIN subjects sb ON sb.id = c.subject_id
        WHERE q.date_of_quiz >= ?
        ORDER BY q.date_of_quiz, q.id
        "#,
    )
    .bind(today - Duration::days(LOOKBACK_DAYS))
    .fetch_all(pool)
    .await
}

/// Builds the reminder for `user`, or `None` when no reminder is due.
pub async fn build_reminder(
    pool: &SqlitePool,
    user: &User,
    now: DateTime<Utc>,
    recent_quizzes: &[RecentQuiz],
) -> Result<Option<OutgoingEmail>, sqlx::Error> {
    let since = start_of_day(now.date_naive() - Duration::days(LOOKBACK_DAYS));

    let recent_attempts = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM scores WHERE user_id = ? AND attempted_at >= ?",
    )
    .bind(user.id)
    .bind(since)
    .fetch_one(pool)
    .await?;

    let attempted: HashSet<i64> =
        sqlx::query_scalar::<_, i64>("SELECT DISTINCT quiz_id FROM scores WHERE user_id = ?")
            .bind(user.id)
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();

    let untried: Vec<&RecentQuiz> = recent_quizzes
        .iter()
        .filter(|q| !attempted.contains(&q.quiz_id))
        .collect();

    let Some(kind) = classify(recent_attempts, untried.len()) else {
        return Ok(None);
    };

    let listed = &untried[..untried.len().min(MAX_LISTED_QUIZZES)];
    Ok(Some(render_reminder(user, kind, listed)))
}

fn render_reminder(user: &User, kind: ReminderKind, quizzes: &[&RecentQuiz]) -> OutgoingEmail {
    let intro = match kind {
        ReminderKind::Inactivity => {
            "We haven't seen you in a while. A short quiz is a great way to keep your knowledge fresh."
        }
        ReminderKind::NewQuizzes => "New quizzes are waiting for you.",
    };

    let mut text = String::new();
    let _ = writeln!(text, "Hello {},", user.full_name);
    let _ = writeln!(text);
    let _ = writeln!(text, "{}", intro);

    let mut html = format!(
        "<p>Hello {},</p><p>{}</p>",
        clean_text(&user.full_name),
        clean_text(intro)
    );

    if !quizzes.is_empty() {
        let _ = writeln!(text);
        let _ = writeln!(text, "Quizzes you haven't tried yet:");
        html.push_str("<ul>");
        for quiz in quizzes {
            let _ = writeln!(
                text,
                "  - {} / {} ({})",
                quiz.subject_name, quiz.chapter_name, quiz.quiz_date
            );
            let _ = write!(
                html,
                "<li>{} / {} ({})</li>",
                clean_text(&quiz.subject_name),
                clean_text(&quiz.chapter_name),
                quiz.quiz_date
            );
        }
        html.push_str("</ul>");
    }

    let _ = writeln!(text);
    let _ = writeln!(text, "Quiz Master");
    html.push_str("<p>Quiz Master</p>");

    OutgoingEmail {
        subject: "Quiz Master: Your Daily Quiz Reminder".to_string(),
        recipients: vec![user.username.clone()],
        text_body: text,
        html_body: Some(html),
        attachments: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_users_are_left_alone() {
        assert_eq!(classify(3, 4), None);
        assert_eq!(classify(10, 0), None);
    }

    #[test]
    fn inactive_users_always_get_a_nudge() {
        assert_eq!(classify(0, 0), Some(ReminderKind::Inactivity));
        assert_eq!(classify(0, 2), Some(ReminderKind::Inactivity));
    }

    #[test]
    fn lightly_active_users_hear_only_about_new_quizzes() {
        assert_eq!(classify(1, 2), Some(ReminderKind::NewQuizzes));
        assert_eq!(classify(2, 0), None);
    }

    #[test]
    fn reminder_lists_quizzes() {
        let user = User {
            id: 1,
            username: "sam@example.com".to_string(),
            password: String::new(),
            full_name: "Sam".to_string(),
            qualification: None,
            dob: None,
            role: crate::models::user::Role::User,
            created_at: None,
        };
        let quiz = RecentQuiz {
            quiz_id: 3,
            quiz_date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
            chapter_name: "Vectors".to_string(),
            subject_name: "Physics".to_string(),
        };

        let email = render_reminder(&user, ReminderKind::NewQuizzes, &[&quiz]);
        assert_eq!(email.recipients, vec!["sam@example.com".to_string()]);
        assert!(email.text_body.contains("Physics / Vectors (2024-09-02)"));
    }
}
