use std::sync::Arc;

use crate::{config::Config, services::notifier::Notifier};
use axum::extract::FromRef;
use sqlx::SqlitePool;

/// Process-wide context built once at startup and shared by handlers and jobs.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub notifier: Arc<dyn Notifier>,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
