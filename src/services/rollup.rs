// src/services/rollup.rs

//! Score rollup shared by the statistics endpoint and the periodic reports.
//!
//! Both read a user's scores joined up to their subject, optionally limited
//! to a time window, and fold them into the same summary shape.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::models::score::ScoreRecord;

/// Half-open time range `[start, end)` over attempt timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    /// The calendar month before the one containing `now`.
    pub fn previous_month(now: DateTime<Utc>) -> Self {
        let this_month = first_of_month(now.date_naive());
        let last_month = first_of_month(this_month - Duration::days(1));
        Self::new(start_of_day(last_month), start_of_day(this_month))
    }

    /// From the first of the current month up to and including `now`.
    pub fn month_to_date(now: DateTime<Utc>) -> Self {
        let this_month = first_of_month(now.date_naive());
        Self::new(start_of_day(this_month), now + Duration::seconds(1))
    }
}

pub fn first_of_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// `100 * correct / total`, rounded to two decimals. Zero when `total` is zero.
pub fn percentage(correct: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let raw = correct as f64 * 100.0 / total as f64;
    (raw * 100.0).round() / 100.0
}

/// How the per-subject breakdown is ordered. Both orders are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectOrder {
    /// Most attempted subject first.
    Attempts,
    /// Best scoring subject first.
    Percentage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectPerformance {
    pub subject_id: i64,
    pub subject_name: String,
    pub percentage: f64,
    pub attempts: i64,
    pub total_correct: i64,
    pub total_questions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub score_id: i64,
    pub quiz_id: i64,
    pub timestamp: DateTime<Utc>,
    pub quiz_date: NaiveDate,
    pub chapter_name: String,
    pub subject_name: String,
    pub score: i64,
    pub max_score: i64,
    pub percentage: f64,
}

/// Aggregate of a set of scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rollup {
    pub total_attempts: i64,
    pub total_correct: i64,
    pub total_questions: i64,
    pub average_score_pct: f64,
    pub per_subject: Vec<SubjectPerformance>,
    pub score_history: Vec<HistoryEntry>,
}

/// Folds score records into a [`Rollup`].
///
/// History keeps one entry per record in input order. Subjects are keyed by id
/// and listed in first-encounter order before `order` is applied.
pub fn rollup(records: &[ScoreRecord], order: SubjectOrder) -> Rollup {
    let mut total_correct = 0;
    let mut total_questions = 0;
    let mut score_history = Vec::with_capacity(records.len());
    let mut per_subject: Vec<SubjectPerformance> = Vec::new();
    let mut subject_index: HashMap<i64, usize> = HashMap::new();

    for record in records {
        total_correct += record.total_scored;
        total_questions += record.max_score;

        score_history.push(HistoryEntry {
            score_id: record.score_id,
            quiz_id: record.quiz_id,
            timestamp: record.attempted_at,
            quiz_date: record.quiz_date,
            chapter_name: record.chapter_name.clone(),
            subject_name: record.subject_name.clone(),
            score: record.total_scored,
            max_score: record.max_score,
            percentage: percentage(record.total_scored, record.max_score),
        });

        let idx = *subject_index.entry(record.subject_id).or_insert_with(|| {
            per_subject.push(SubjectPerformance {
                subject_id: record.subject_id,
                subject_name: record.subject_name.clone(),
                percentage: 0.0,
                attempts: 0,
                total_correct: 0,
                total_questions: 0,
            });
            per_subject.len() - 1
        });
        let subject = &mut per_subject[idx];
        subject.total_correct += record.total_scored;
        subject.total_questions += record.max_score;
        subject.attempts += 1;
    }

    for subject in &mut per_subject {
        subject.percentage = percentage(subject.total_correct, subject.total_questions);
    }

    match order {
        SubjectOrder::Attempts => per_subject.sort_by(|a, b| b.attempts.cmp(&a.attempts)),
        SubjectOrder::Percentage => {
            per_subject.sort_by(|a, b| b.percentage.total_cmp(&a.percentage))
        }
    }

    Rollup {
        total_attempts: records.len() as i64,
        total_correct,
        total_questions,
        average_score_pct: percentage(total_correct, total_questions),
        per_subject,
        score_history,
    }
}

/// Loads a user's scores joined with quiz, chapter and subject in one query,
/// ordered by insertion. `window` limits the attempt timestamps.
pub async fn load_score_records(
    pool: &SqlitePool,
    user_id: i64,
    window: Option<&TimeWindow>,
) -> Result<Vec<ScoreRecord>, sqlx::Error> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        SELECT
            s.id AS score_id,
            s.quiz_id,
            s.attempted_at,
            s.total_scored,
            s.max_score,
            q.date_of_quiz AS quiz_date,
            c.id AS chapter_id,
            c.name AS chapter_name,
            sb.id AS subject_id,
            sb.name AS subject_name
        FROM scores s
        JOIN quizzes q ON q.id = s.quiz_id
        JOIN chapters c ON c.id = q.chapter_id
        JOIN subjects sb ON sb.id = c.subject_id
        WHERE s.user_id = "#,
    );
    builder.push_bind(user_id);

    if let Some(window) = window {
        builder.push(" AND s.attempted_at >= ");
        builder.push_bind(window.start);
        builder.push(" AND s.attempted_at < ");
        builder.push_bind(window.end);
    }

    builder.push(" ORDER BY s.id");

    builder.build_query_as().fetch_all(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(score_id: i64, subject_id: i64, subject: &str, scored: i64, max: i64) -> ScoreRecord {
        ScoreRecord {
            score_id,
            quiz_id: score_id * 10,
            attempted_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
                + Duration::hours(score_id),
            total_scored: scored,
            max_score: max,
            quiz_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            chapter_id: subject_id * 100,
            chapter_name: format!("{} basics", subject),
            subject_id,
            subject_name: subject.to_string(),
        }
    }

    #[test]
    fn percentage_rounds_and_guards_zero() {
        assert_eq!(percentage(2, 4), 50.0);
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn empty_history_rolls_up_to_zero() {
        let r = rollup(&[], SubjectOrder::Attempts);
        assert_eq!(r.total_attempts, 0);
        assert_eq!(r.average_score_pct, 0.0);
        assert!(r.per_subject.is_empty());
        assert!(r.score_history.is_empty());
    }

    #[test]
    fn totals_are_pooled_not_averaged() {
        let records = vec![record(1, 1, "Math", 1, 1), record(2, 1, "Math", 0, 3)];
        let r = rollup(&records, SubjectOrder::Attempts);
        // 1 of 4 overall, not the mean of 100% and 0%.
        assert_eq!(r.average_score_pct, 25.0);
        assert_eq!(r.total_correct, 1);
        assert_eq!(r.total_questions, 4);
    }

    #[test]
    fn subjects_sorted_by_attempts_with_stable_ties() {
        let records = vec![
            record(1, 1, "Math", 3, 4),
            record(2, 2, "Physics", 1, 4),
            record(3, 3, "Chemistry", 4, 4),
            record(4, 2, "Physics", 2, 4),
        ];
        let r = rollup(&records, SubjectOrder::Attempts);
        let names: Vec<_> = r.per_subject.iter().map(|s| s.subject_name.as_str()).collect();
        assert_eq!(names, ["Physics", "Math", "Chemistry"]);
        assert_eq!(r.per_subject[0].attempts, 2);
        assert_eq!(r.per_subject[0].percentage, 37.5);
    }

    #[test]
    fn subjects_sorted_by_percentage() {
        let records = vec![
            record(1, 1, "Math", 1, 4),
            record(2, 2, "Physics", 4, 4),
            record(3, 3, "Chemistry", 1, 4),
        ];
        let r = rollup(&records, SubjectOrder::Percentage);
        let names: Vec<_> = r.per_subject.iter().map(|s| s.subject_name.as_str()).collect();
        assert_eq!(names, ["Physics", "Math", "Chemistry"]);
    }

    #[test]
    fn history_keeps_every_record_in_order() {
        let records = vec![record(5, 1, "Math", 0, 0), record(2, 1, "Math", 2, 2)];
        let r = rollup(&records, SubjectOrder::Attempts);
        assert_eq!(r.score_history.len(), 2);
        assert_eq!(r.score_history[0].score_id, 5);
        assert_eq!(r.score_history[0].percentage, 0.0);
        assert_eq!(r.score_history[1].percentage, 100.0);
    }

    #[test]
    fn previous_month_window_is_half_open() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let w = TimeWindow::previous_month(now);
        assert_eq!(w.start, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(w.end, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());

        assert!(w.contains(Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap()));
        assert!(!w.contains(w.end));
        assert!(w.contains(w.start));
    }

    #[test]
    fn previous_month_wraps_the_year() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
        let w = TimeWindow::previous_month(now);
        assert_eq!(w.start, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(w.end, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn month_to_date_includes_now() {
        let now = Utc.with_ymd_and_hms(2024, 7, 19, 17, 30, 0).unwrap();
        let w = TimeWindow::month_to_date(now);
        assert_eq!(w.start, Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
        assert!(w.contains(now));
    }
}
