// src/services/report.rs

use std::fmt::Write as _;

use ammonia::clean_text;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::{
    models::{score::ScoreRecord, user::User},
    services::{
        chart::{Chart, ChartPoint, performance_points, render_performance_chart},
        notifier::{Attachment, OutgoingEmail},
        rollup::{Rollup, SubjectOrder, TimeWindow, load_score_records, rollup},
    },
};

/// Placeholder ranking. Reports carry a `rank` field but no ranking is computed.
pub const RANK_NOT_COMPUTED: u32 = 0;

/// Content id the HTML body uses to reference the inline chart.
pub const CHART_CONTENT_ID: &str = "performance-chart";

/// Everything needed to deliver one user's performance summary.
#[derive(Debug, Clone)]
pub struct ReportPayload {
    pub user_id: i64,
    pub recipient: String,
    pub full_name: String,
    pub period_label: String,
    pub summary: Rollup,
    pub rank: u32,
    pub total_users: usize,
    pub chart: Option<Chart>,
    /// Set when the summary is built from a placeholder attempt.
    pub synthetic: bool,
}

#[derive(Debug, Clone)]
pub enum ReportOutcome {
    Ready(Box<ReportPayload>),
    /// Nothing happened in the window; no report should be sent.
    Skip,
}

/// Parameters shared by every report of one batch run.
#[derive(Debug, Clone)]
pub struct ReportPeriod {
    pub window: TimeWindow,
    pub label: String,
    pub total_users: usize,
    /// Build a placeholder attempt instead of skipping users without activity.
    pub synthetic_fallback: bool,
}

/// Builds the report for `user` over `period.window`.
///
/// A failing chart only drops the image; the report itself is still produced.
pub async fn generate_report(
    pool: &SqlitePool,
    user: &User,
    period: &ReportPeriod,
    now: DateTime<Utc>,
) -> Result<ReportOutcome, sqlx::Error> {
    let mut records = load_score_records(pool, user.id, Some(&period.window)).await?;
    let mut synthetic = false;

    if records.is_empty() {
        if !period.synthetic_fallback {
            return Ok(ReportOutcome::Skip);
        }
        match placeholder_record(pool, now).await? {
            Some(record) => {
                tracing::debug!(user_id = user.id, quiz_id = record.quiz_id, "Using placeholder attempt");
                records.push(record);
                synthetic = true;
            }
            None => return Ok(ReportOutcome::Skip),
        }
    }

    let summary = rollup(&records, SubjectOrder::Percentage);

    let chart = chart_or_none(user.id, &performance_points(&records));

    Ok(ReportOutcome::Ready(Box::new(ReportPayload {
        user_id: user.id,
        recipient: user.username.clone(),
        full_name: user.full_name.clone(),
        period_label: period.label.clone(),
        summary,
        rank: RANK_NOT_COMPUTED,
        total_users: period.total_users,
        chart,
        synthetic,
    })))
}

/// Renders the chart, logging and dropping it when rendering fails.
fn chart_or_none(user_id: i64, points: &[ChartPoint]) -> Option<Chart> {
    match render_performance_chart(points) {
        Ok(chart) => Some(chart),
        Err(e) => {
            tracing::warn!(user_id, "Report chart omitted: {}", e);
            None
        }
    }
}

/// An unsaved 8/10 attempt on the first quiz in the catalogue, dated five days ago.
async fn placeholder_record(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<Option<ScoreRecord>, sqlx::Error> {
    sqlx::query_as::<_, ScoreRecord>(
        r#"
        SELECT
            0 AS score_id,
            q.id AS quiz_id,
            ? AS attempted_at,
            8 AS total_scored,
            10 AS max_score,
            q.date_of_quiz AS quiz_date,
            c.id AS chapter_id,
            c.name AS chapter_name,
            sb.id AS subject_id,
            sb.name AS subject_name
        FROM quizzes q
        JOIN chapters c ON c.id = q.chapter_id
        JOIN subjects sb ON sb.id = c.subject_id
        ORDER BY q.id
        LIMIT 1
        "#,
    )
    .bind(now - Duration::days(5))
    .fetch_optional(pool)
    .await
}

impl ReportPayload {
    pub fn subject_line(&self) -> String {
        format!("Your Quiz Master Performance Report - {}", self.period_label)
    }

    pub fn text_body(&self) -> String {
        let s = &self.summary;
        let mut body = String::new();

        let _ = writeln!(body, "Hello {},", self.full_name);
        let _ = writeln!(body);
        let _ = writeln!(body, "Here is your quiz performance for {}.", self.period_label);
        let _ = writeln!(body);
        let _ = writeln!(body, "Quizzes attempted: {}", s.total_attempts);
        let _ = writeln!(body, "Average score: {:.2}%", s.average_score_pct);
        let _ = writeln!(body, "Rank: {} of {}", self.rank, self.total_users);

        if !s.per_subject.is_empty() {
            let _ = writeln!(body);
            let _ = writeln!(body, "Performance by subject:");
            for subject in &s.per_subject {
                let _ = writeln!(
                    body,
                    "  - {}: {:.2}% ({} attempt{})",
                    subject.subject_name,
                    subject.percentage,
                    subject.attempts,
                    if subject.attempts == 1 { "" } else { "s" }
                );
            }
        }

        let _ = writeln!(body);
        let _ = writeln!(body, "Keep practising!");
        let _ = writeln!(body, "Quiz Master");
        body
    }

    pub fn html_body(&self) -> String {
        let s = &self.summary;
        let mut html = String::new();

        let _ = write!(
            html,
            "<h2>Quiz performance for {}</h2><p>Hello {},</p>",
            clean_text(&self.period_label),
            clean_text(&self.full_name)
        );
        let _ = write!(
            html,
            "<ul><li>Quizzes attempted: {}</li><li>Average score: {:.2}%</li><li>Rank: {} of {}</li></ul>",
            s.total_attempts, s.average_score_pct, self.rank, self.total_users
        );

        if !s.per_subject.is_empty() {
            html.push_str("<table><tr><th>Subject</th><th>Score</th><th>Attempts</th></tr>");
            for subject in &s.per_subject {
                let _ = write!(
                    html,
                    "<tr><td>{}</td><td>{:.2}%</td><td>{}</td></tr>",
                    clean_text(&subject.subject_name),
                    subject.percentage,
                    subject.attempts
                );
            }
            html.push_str("</table>");
        }

        if self.chart.is_some() {
            let _ = write!(
                html,
                "<h3>Score trend</h3><p><img src=\"cid:{}\" alt=\"Score trend\"></p>",
                CHART_CONTENT_ID
            );
        }

        html.push_str("<p>Keep practising!<br>Quiz Master</p>");
        html
    }

    pub fn to_email(&self) -> OutgoingEmail {
        OutgoingEmail {
            subject: self.subject_line(),
            recipients: vec![self.recipient.clone()],
            text_body: self.text_body(),
            html_body: Some(self.html_body()),
            attachments: self
                .chart
                .iter()
                .map(|chart| Attachment {
                    file_name: chart.file_name.clone(),
                    content_type: chart.content_type.clone(),
                    bytes: chart.bytes.clone(),
                    content_id: Some(CHART_CONTENT_ID.to_string()),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rollup::SubjectPerformance;

    fn payload(chart: Option<Chart>) -> ReportPayload {
        ReportPayload {
            user_id: 1,
            recipient: "ada@example.com".to_string(),
            full_name: "Ada <Lovelace>".to_string(),
            period_label: "February 2024".to_string(),
            summary: Rollup {
                total_attempts: 3,
                total_correct: 7,
                total_questions: 10,
                average_score_pct: 70.0,
                per_subject: vec![SubjectPerformance {
                    subject_id: 1,
                    subject_name: "Math".to_string(),
                    percentage: 70.0,
                    attempts: 3,
                    total_correct: 7,
                    total_questions: 10,
                }],
                score_history: Vec::new(),
            },
            rank: RANK_NOT_COMPUTED,
            total_users: 12,
            chart,
            synthetic: false,
        }
    }

    #[test]
    fn text_body_lists_summary_and_stub_rank() {
        let body = payload(None).text_body();
        assert!(body.contains("Quizzes attempted: 3"));
        assert!(body.contains("Average score: 70.00%"));
        assert!(body.contains("Rank: 0 of 12"));
        assert!(body.contains("Math: 70.00% (3 attempts)"));
    }

    #[test]
    fn html_body_escapes_user_text() {
        let html = payload(None).html_body();
        assert!(!html.contains("<Lovelace>"));
        assert!(html.contains("&lt;Lovelace&gt;"));
    }

    #[test]
    fn chart_is_embedded_in_the_html_body() {
        let chart = Chart {
            file_name: "performance.svg".to_string(),
            content_type: "image/svg+xml".to_string(),
            bytes: b"<svg/>".to_vec(),
        };
        let email = payload(Some(chart)).to_email();
        assert_eq!(email.subject, "Your Quiz Master Performance Report - February 2024");
        assert_eq!(email.recipients, vec!["ada@example.com".to_string()]);
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].content_id.as_deref(), Some(CHART_CONTENT_ID));

        let html = email.html_body.unwrap();
        assert!(html.contains(r#"<img src="cid:performance-chart""#));

        let plain = payload(None).to_email();
        assert!(plain.attachments.is_empty());
        assert!(!plain.html_body.unwrap().contains("<img"));
    }

    #[test]
    fn failed_chart_still_yields_a_report() {
        assert!(chart_or_none(1, &[]).is_none());

        let email = payload(chart_or_none(1, &[])).to_email();
        assert!(email.attachments.is_empty());
        assert!(email.text_body.contains("Average score: 70.00%"));
        assert!(email.html_body.unwrap().contains("Rank: 0 of 12"));
    }
}
