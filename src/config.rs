// src/config.rs

use std::env;
use dotenvy::dotenv;

/// SMTP relay credentials. Absent when mail should only be logged.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Settings for the scheduled background jobs.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    pub enabled: bool,
    /// Hour of day (UTC) at which daily reminders go out.
    pub reminder_hour: u32,
    /// Hour of day (UTC) on the 1st of the month at which reports go out.
    pub report_hour: u32,
    /// Upper bound for the work done for a single user inside a batch.
    pub user_timeout_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reminder_hour: 18,
            report_hour: 8,
            user_timeout_secs: 30,
        }
    }
}

/// Per-IP quota for the login, registration and submission routes.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Seconds it takes to earn back one request.
    pub replenish_secs: u64,
    /// Requests a client may fire back to back before being throttled.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            replenish_secs: 2,
            burst_size: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub smtp: Option<SmtpConfig>,
    pub jobs: JobsConfig,
    pub rate_limit: RateLimitConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://quiz_master.db?mode=rwc".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env_parse("JWT_EXPIRATION", 3600);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        // The bootstrap admin is only created when a password is provided.
        let admin_password = env::var("ADMIN_PASSWORD").ok();
        let admin_username = admin_password.as_ref().map(|_| {
            env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin@quizmaster.com".to_string())
        });

        let smtp = match (
            env::var("SMTP_HOST"),
            env::var("SMTP_USERNAME"),
            env::var("SMTP_PASSWORD"),
        ) {
            (Ok(host), Ok(username), Ok(password)) => {
                let from = env::var("MAIL_FROM").unwrap_or_else(|_| username.clone());
                Some(SmtpConfig {
                    host,
                    username,
                    password,
                    from,
                })
            }
            _ => None,
        };

        let defaults = JobsConfig::default();
        let jobs = JobsConfig {
            enabled: env_parse("JOBS_ENABLED", defaults.enabled),
            reminder_hour: env_parse("REMINDER_HOUR", defaults.reminder_hour).min(23),
            report_hour: env_parse("REPORT_HOUR", defaults.report_hour).min(23),
            user_timeout_secs: env_parse("JOB_USER_TIMEOUT_SECS", defaults.user_timeout_secs),
        };

        // The governor refuses a zero quota.
        let limits = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            replenish_secs: env_parse("RATE_LIMIT_REPLENISH_SECS", limits.replenish_secs).max(1),
            burst_size: env_parse("RATE_LIMIT_BURST", limits.burst_size).max(1),
        };

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            bind_addr,
            admin_username,
            admin_password,
            smtp,
            jobs,
            rate_limit,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
