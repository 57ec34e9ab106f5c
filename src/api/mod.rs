mod admin;
pub mod auth;
mod courses;
pub mod error;
mod extract;
mod guard;
mod lessons;
pub mod metrics;
mod pages;
pub mod rate_limit;
mod validation;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Credential endpoints are rate limited per client
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me).put(auth::update_me));

    // Identity is resolved per handler through the `User` extractor
    let api_routes = Router::new()
        // Courses
        .route("/courses", get(courses::list_courses).post(courses::create_course))
        .route(
            "/courses/:id",
            get(courses::get_course)
                .put(courses::update_course)
                .delete(courses::delete_course),
        )
        .route("/courses/:id/publish", post(courses::toggle_publish))
        // Lessons
        .route("/lessons", get(lessons::list_lessons).post(lessons::create_lesson))
        .route(
            "/lessons/:id",
            get(lessons::get_lesson)
                .put(lessons::update_lesson)
                .delete(lessons::delete_lesson),
        )
        // Admin
        .route("/admin/reconcile", post(admin::reconcile_counters));

    // Front-end pages with SPA fallback, behind the page guard
    let static_dir = &state.config.server.static_dir;
    let serve_static =
        ServeDir::new(static_dir).not_found_service(ServeFile::new(static_dir.join("index.html")));
    let page_routes = Router::new()
        .fallback_service(serve_static)
        .layer(middleware::from_fn_with_state(state.clone(), pages::page_guard));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .fallback_service(page_routes)
}

async fn health_check() -> &'static str {
    "OK"
}
