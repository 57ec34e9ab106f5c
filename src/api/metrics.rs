//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! This module provides:
//! - A `/metrics` endpoint that returns Prometheus-formatted metrics
//! - Middleware for tracking HTTP request counts and durations
//! - Helper functions to record course and lesson activity

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::db::CourseStatus;
use crate::AppState;

// Metric names as constants for consistency
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const COURSES_CREATED_TOTAL: &str = "courses_created_total";
pub const LESSON_MUTATIONS_TOTAL: &str = "lesson_mutations_total";
pub const PUBLISH_TOGGLES_TOTAL: &str = "course_publish_toggles_total";
pub const COURSES_TOTAL: &str = "courses_total";
pub const USERS_TOTAL: &str = "users_total";

/// Initialize the Prometheus metrics recorder and return a handle for rendering metrics.
///
/// This should be called once during application startup.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(
        HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests received"
    );
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(COURSES_CREATED_TOTAL, "Total number of courses created");
    describe_counter!(
        LESSON_MUTATIONS_TOTAL,
        "Lesson writes by operation (created/updated/deleted)"
    );
    describe_counter!(
        PUBLISH_TOGGLES_TOTAL,
        "Publish toggles by resulting status"
    );
    describe_gauge!(COURSES_TOTAL, "Number of courses by status");
    describe_gauge!(USERS_TOTAL, "Number of users by role");

    Ok(handle)
}

/// GET /metrics - Returns Prometheus-formatted metrics.
///
/// This endpoint is accessible without authentication.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Refresh the course and user gauges from the database.
async fn update_gauge_metrics(state: &AppState) {
    if let Ok(rows) = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM courses GROUP BY status",
    )
    .fetch_all(&state.db)
    .await
    {
        for (status, count) in rows {
            gauge!(COURSES_TOTAL, "status" => status).set(count as f64);
        }
    }

    if let Ok(rows) =
        sqlx::query_as::<_, (String, i64)>("SELECT role, COUNT(*) FROM users GROUP BY role")
            .fetch_all(&state.db)
            .await
    {
        for (role, count) in rows {
            gauge!(USERS_TOTAL, "role" => role).set(count as f64);
        }
    }
}

/// Middleware to track HTTP request metrics.
///
/// Records:
/// - `http_requests_total` counter with method, path, and status labels
/// - `http_request_duration_seconds` histogram with method and path labels
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Use the route template (/api/courses/:id) so ids do not explode label cardinality
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

pub fn record_course_created() {
    counter!(COURSES_CREATED_TOTAL).increment(1);
}

pub fn record_lesson_created() {
    counter!(LESSON_MUTATIONS_TOTAL, "op" => "created").increment(1);
}

pub fn record_lesson_updated() {
    counter!(LESSON_MUTATIONS_TOTAL, "op" => "updated").increment(1);
}

pub fn record_lesson_deleted() {
    counter!(LESSON_MUTATIONS_TOTAL, "op" => "deleted").increment(1);
}

pub fn record_publish_toggle(status: CourseStatus) {
    counter!(PUBLISH_TOGGLES_TOTAL, "status" => status.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        // Ensure metric names follow Prometheus naming conventions
        assert!(HTTP_REQUESTS_TOTAL.ends_with("_total"));
        assert!(COURSES_CREATED_TOTAL.ends_with("_total"));
        assert!(LESSON_MUTATIONS_TOTAL.ends_with("_total"));
        assert!(PUBLISH_TOGGLES_TOTAL.ends_with("_total"));
        assert!(HTTP_REQUEST_DURATION_SECONDS.ends_with("_seconds"));
    }
}
