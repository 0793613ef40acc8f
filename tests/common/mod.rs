// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quizmaster::{
    config::{Config, JobsConfig, RateLimitConfig},
    routes,
    services::notifier::{Notifier, OutgoingEmail, TransportError},
    state::AppState,
    utils::hash::hash_password,
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

pub const ADMIN_USERNAME: &str = "admin@quizmaster.com";
pub const ADMIN_PASSWORD: &str = "admin-pass";

/// Keeps every message it is asked to send. Recipients listed in `fail_for`
/// get a transport error instead.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub fail_for: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn fail_for(&self, recipient: &str) {
        self.fail_for.lock().unwrap().insert(recipient.to_string());
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        let failing = self.fail_for.lock().unwrap();
        if email.recipients.iter().any(|r| failing.contains(r)) {
            return Err(TransportError::Send("connection refused".to_string()));
        }
        drop(failing);
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
    pub client: reqwest::Client,
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        admin_username: None,
        admin_password: None,
        smtp: None,
        jobs: JobsConfig {
            enabled: false,
            ..JobsConfig::default()
        },
        // Every test talks from 127.0.0.1; keep the quota out of the way.
        rate_limit: RateLimitConfig {
            replenish_secs: 1,
            burst_size: 1000,
        },
    }
}

/// Fresh in-memory database. A single, never-recycled connection keeps the
/// schema alive for the lifetime of the pool.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    pool
}

/// Spawns the app on a random port with an admin account already seeded.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: Config) -> TestApp {
    let pool = test_pool().await;
    seed_admin(&pool).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState {
        pool: pool.clone(),
        config,
        notifier: notifier.clone(),
    };

    let app = routes::create_router(state.clone());

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        address,
        pool,
        state,
        notifier,
        client: reqwest::Client::new(),
    }
}

async fn seed_admin(pool: &SqlitePool) {
    sqlx::query(
        "INSERT INTO users (username, password, full_name, role) VALUES (?, ?, 'Quiz Master Admin', 'admin')",
    )
    .bind(ADMIN_USERNAME)
    .bind(hash_password(ADMIN_PASSWORD).unwrap())
    .execute(pool)
    .await
    .unwrap();
}

pub fn unique_email() -> String {
    format!("u_{}@example.com", &uuid::Uuid::new_v4().to_string()[..8])
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn login(&self, username: &str, password: &str) -> String {
        let body: serde_json::Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body["token"].as_str().expect("login returned no token").to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    /// Registers a user and returns `(user_id, username, token)`.
    pub async fn register_user(&self, full_name: &str) -> (i64, String, String) {
        let username = unique_email();
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&serde_json::json!({
                "username": username,
                "password": "password123",
                "full_name": full_name,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
        let user: serde_json::Value = response.json().await.unwrap();
        let token = self.login(&username, "password123").await;
        (user["id"].as_i64().unwrap(), username, token)
    }

    pub async fn admin_post(&self, token: &str, path: &str, body: serde_json::Value) -> serde_json::Value {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201, "POST {} failed", path);
        response.json().await.unwrap()
    }

    /// Creates subject -> chapter -> quiz with the given window and answer keys.
    /// Returns `(quiz_id, question_ids)`.
    pub async fn seed_quiz(
        &self,
        token: &str,
        subject: &str,
        date_of_quiz: &str,
        end_date: Option<&str>,
        keys: &[i64],
    ) -> (i64, Vec<i64>) {
        let subject = self
            .admin_post(token, "/api/admin/subjects", serde_json::json!({ "name": subject }))
            .await;
        let chapter = self
            .admin_post(
                token,
                "/api/admin/chapters",
                serde_json::json!({ "name": "Chapter 1", "subject_id": subject["id"] }),
            )
            .await;
        let quiz = self
            .admin_post(
                token,
                "/api/admin/quizzes",
                serde_json::json!({
                    "chapter_id": chapter["id"],
                    "date_of_quiz": date_of_quiz,
                    "end_date": end_date,
                    "time_duration": "00:30",
                }),
            )
            .await;
        let quiz_id = quiz["id"].as_i64().unwrap();

        let mut question_ids = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            let question = self
                .admin_post(
                    token,
                    "/api/admin/questions",
                    serde_json::json!({
                        "quiz_id": quiz_id,
                        "question_statement": format!("Question {}", i + 1),
                        "options": ["A", "B", "C", "D"],
                        "correct_option": key,
                    }),
                )
                .await;
            question_ids.push(question["id"].as_i64().unwrap());
        }

        (quiz_id, question_ids)
    }
}

/// `YYYY-MM-DD` for today shifted by `days` (UTC).
pub fn day_offset(days: i64) -> String {
    (chrono::Utc::now().date_naive() + chrono::Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}
