// src/services/jobs.rs

//! Batch jobs run by the scheduler (or on demand by an admin).
//!
//! A job never fails as a whole: every user is processed independently and
//! the outcome is tallied in a [`JobSummary`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    models::user::User,
    services::{
        notifier::TransportError,
        reminders::{build_reminder, load_recent_quizzes},
        report::{ReportOutcome, ReportPeriod, generate_report},
        rollup::TimeWindow,
    },
    state::AppState,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub success_count: u32,
    pub error_count: u32,
    pub skip_count: u32,
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sent, {} errors, {} skipped",
            self.success_count, self.error_count, self.skip_count
        )
    }
}

/// Options for a monthly report run.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MonthlyReportOptions {
    /// Report on the current month so far and fall back to a placeholder
    /// attempt for users without activity.
    #[serde(default)]
    pub test_mode: bool,
    /// Restrict the run to one user (any role).
    pub user_id: Option<i64>,
}

enum Delivery {
    Sent,
    Skipped,
}

#[derive(Debug, Error)]
enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl JobSummary {
    fn record(&mut self, job: &str, user: &User, outcome: Result<Delivery, DispatchError>) {
        match outcome {
            Ok(Delivery::Sent) => {
                tracing::info!(user_id = user.id, "{}: sent to {}", job, user.username);
                self.success_count += 1;
            }
            Ok(Delivery::Skipped) => {
                tracing::debug!(user_id = user.id, "{}: nothing to send", job);
                self.skip_count += 1;
            }
            Err(e) => {
                tracing::error!(user_id = user.id, "{}: failed for {}: {}", job, user.username, e);
                self.error_count += 1;
            }
        }
    }
}

async fn bounded<F>(limit: Duration, work: F) -> Result<Delivery, DispatchError>
where
    F: Future<Output = Result<Delivery, DispatchError>>,
{
    tokio::time::timeout(limit, work)
        .await
        .unwrap_or(Err(DispatchError::TimedOut(limit)))
}

async fn load_recipients(state: &AppState, only: Option<i64>) -> Result<Vec<User>, sqlx::Error> {
    match only {
        Some(id) => {
            sqlx::query_as::<_, User>(
                "SELECT id, username, password, full_name, qualification, dob, role, created_at FROM users WHERE id = ?",
            )
            .bind(id)
            .fetch_all(&state.pool)
            .await
        }
        None => {
            sqlx::query_as::<_, User>(
                "SELECT id, username, password, full_name, qualification, dob, role, created_at FROM users WHERE role = 'user' ORDER BY id",
            )
            .fetch_all(&state.pool)
            .await
        }
    }
}

/// Sends each user a performance report for the previous calendar month
/// (or, in test mode, the current month up to `now`).
pub async fn send_monthly_reports(
    state: &AppState,
    options: &MonthlyReportOptions,
    now: DateTime<Utc>,
) -> JobSummary {
    const JOB: &str = "monthly report";
    let mut summary = JobSummary::default();

    let users = match load_recipients(state, options.user_id).await {
        Ok(users) => users,
        Err(e) => {
            tracing::error!("{}: failed to load users: {:?}", JOB, e);
            summary.error_count += 1;
            return summary;
        }
    };

    if users.is_empty() {
        tracing::info!("{}: no users to process", JOB);
        return summary;
    }

    let (window, label) = if options.test_mode {
        (
            TimeWindow::month_to_date(now),
            format!("{} (TEST)", now.format("%B %Y")),
        )
    } else {
        let window = TimeWindow::previous_month(now);
        let label = window.start.format("%B %Y").to_string();
        (window, label)
    };

    let period = ReportPeriod {
        window,
        label,
        total_users: users.len(),
        synthetic_fallback: options.test_mode,
    };
    let limit = Duration::from_secs(state.config.jobs.user_timeout_secs);

    tracing::info!(users = users.len(), period = %period.label, "Starting {} run", JOB);

    for user in &users {
        let outcome = bounded(limit, async {
            match generate_report(&state.pool, user, &period, now).await? {
                ReportOutcome::Ready(payload) => {
                    state.notifier.send(&payload.to_email()).await?;
                    Ok(Delivery::Sent)
                }
                ReportOutcome::Skip => Ok(Delivery::Skipped),
            }
        })
        .await;
        summary.record(JOB, user, outcome);
    }

    tracing::info!("Monthly reports: {}", summary);
    summary
}

/// Reminds inactive users to come back and lightly active users about
/// quizzes they have not tried.
pub async fn send_daily_reminders(state: &AppState, now: DateTime<Utc>) -> JobSummary {
    const JOB: &str = "daily reminder";
    let mut summary = JobSummary::default();

    let (users, recent_quizzes) = match tokio::try_join!(
        load_recipients(state, None),
        load_recent_quizzes(&state.pool, now.date_naive())
    ) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("{}: failed to load users or quizzes: {:?}", JOB, e);
            summary.error_count += 1;
            return summary;
        }
    };

    let limit = Duration::from_secs(state.config.jobs.user_timeout_secs);

    for user in &users {
        let outcome = bounded(limit, async {
            match build_reminder(&state.pool, user, now, &recent_quizzes).await? {
                Some(email) => {
                    state.notifier.send(&email).await?;
                    Ok(Delivery::Sent)
                }
                None => Ok(Delivery::Skipped),
            }
        })
        .await;
        summary.record(JOB, user, outcome);
    }

    tracing::info!("Daily reminders: {}", summary);
    summary
}
