// src/services/statistics.rs

use sqlx::SqlitePool;

use crate::{
    error::AppError,
    services::rollup::{Rollup, SubjectOrder, load_score_records, rollup},
};

/// Lifetime statistics for one user: overall average, per-subject breakdown
/// (most attempted first) and one history entry per score.
pub async fn aggregate(pool: &SqlitePool, user_id: i64) -> Result<Rollup, AppError> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let records = load_score_records(pool, user_id, None).await.map_err(|e| {
        tracing::error!("Failed to load score history for user {}: {:?}", user_id, e);
        AppError::from(e)
    })?;

    Ok(rollup(&records, SubjectOrder::Attempts))
}
