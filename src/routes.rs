// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post},
};
use std::{sync::Arc, time::Duration};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, user},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, user, admin).
/// * Rate-limits login, registration and quiz submission per client IP.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state.
///
/// The governed routes key on the peer address, so the router must be served
/// with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let rate_limit = &state.config.rate_limit;
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(rate_limit.replenish_secs)
        .burst_size(rate_limit.burst_size)
        .finish()
        .expect("rate limit quota is non-zero");

    let governor_conf = Arc::new(governor_conf);

    // Forget idle clients so the limiter does not grow without bound.
    let limiter = governor_conf.limiter().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            limiter.retain_recent();
        }
    });

    let auth_layer = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(GovernorLayer::new(governor_conf.clone()))
        // Protected auth routes
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .layer(auth_layer.clone()),
        );

    let user_routes = Router::new()
        .route("/subjects", get(user::list_subjects))
        .route("/subjects/{id}", get(user::get_subject))
        .route("/chapters", get(user::list_chapters))
        .route("/chapters/{id}", get(user::get_chapter))
        .route("/quizzes", get(user::list_quizzes))
        .route("/quizzes/{id}", get(user::get_quiz))
        .route(
            "/quizzes/{id}/submit",
            post(user::submit_quiz).layer(GovernorLayer::new(governor_conf)),
        )
        .route("/scores", get(user::list_scores))
        .route("/scores/export", get(user::export_scores))
        .route("/statistics", get(user::statistics))
        .layer(auth_layer.clone());

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{id}", delete(admin::delete_user))
        .route(
            "/subjects",
            get(admin::list_subjects).post(admin::create_subject),
        )
        .route(
            "/subjects/{id}",
            get(admin::get_subject)
                .put(admin::update_subject)
                .delete(admin::delete_subject),
        )
        .route(
            "/chapters",
            get(admin::list_chapters).post(admin::create_chapter),
        )
        .route(
            "/chapters/{id}",
            get(admin::get_chapter)
                .put(admin::update_chapter)
                .delete(admin::delete_chapter),
        )
        .route("/quizzes", get(admin::list_quizzes).post(admin::create_quiz))
        .route(
            "/quizzes/{id}",
            get(admin::get_quiz)
                .put(admin::update_quiz)
                .delete(admin::delete_quiz),
        )
        .route(
            "/questions",
            get(admin::list_questions).post(admin::create_question),
        )
        .route(
            "/questions/{id}",
            get(admin::get_question)
                .put(admin::update_question)
                .delete(admin::delete_question),
        )
        .route("/jobs/monthly-reports", post(admin::trigger_monthly_reports))
        .route("/jobs/daily-reminders", post(admin::trigger_daily_reminders))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(auth_layer);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/user", user_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
