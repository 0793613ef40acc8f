// src/services/scheduler.rs

//! Wall-clock triggers for the batch jobs: daily reminders and monthly reports.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use tokio::task::JoinHandle;

use crate::{
    services::jobs::{MonthlyReportOptions, send_daily_reminders, send_monthly_reports},
    state::AppState,
};

fn at_hour(day: NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    day.and_time(time).and_utc()
}

/// Next `hour:00` UTC strictly after `now`.
pub fn next_daily_run(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let today = at_hour(now.date_naive(), hour);
    if today > now {
        today
    } else {
        at_hour(now.date_naive() + Duration::days(1), hour)
    }
}

/// Next 1st-of-the-month at `hour:00` UTC strictly after `now`.
pub fn next_monthly_run(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let (year, month) = (now.year(), now.month());
    let this_month = NaiveDate::from_ymd_opt(year, month, 1).map(|d| at_hour(d, hour));
    if let Some(run) = this_month.filter(|run| *run > now) {
        return run;
    }
    let (year, month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| at_hour(d, hour))
        .unwrap_or(now + Duration::days(31))
}

async fn sleep_until(at: DateTime<Utc>) {
    let wait = (at - Utc::now()).to_std().unwrap_or_default();
    tokio::time::sleep(wait).await;
}

/// Spawns the two scheduler loops. They run until the runtime shuts down.
pub fn spawn(state: AppState) -> Vec<JoinHandle<()>> {
    let jobs = state.config.jobs.clone();

    let daily_state = state.clone();
    let daily = tokio::spawn(async move {
        loop {
            let next = next_daily_run(Utc::now(), jobs.reminder_hour);
            tracing::info!("Next daily reminder run at {}", next);
            sleep_until(next).await;
            send_daily_reminders(&daily_state, Utc::now()).await;
        }
    });

    let monthly = tokio::spawn(async move {
        loop {
            let next = next_monthly_run(Utc::now(), jobs.report_hour);
            tracing::info!("Next monthly report run at {}", next);
            sleep_until(next).await;
            send_monthly_reports(&state, &MonthlyReportOptions::default(), Utc::now()).await;
        }
    });

    vec![daily, monthly]
}
