//! Admin-only maintenance endpoints.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::error::ApiError;
use super::guard::require_admin;
use crate::db::{counters, counters::CounterDrift, User};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub message: String,
    pub fixed: usize,
    pub courses: Vec<CounterDrift>,
}

/// POST /api/admin/reconcile
///
/// Rebuilds every course's lesson counters from its live lessons.
pub async fn reconcile_counters(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<ReconcileResponse>, ApiError> {
    require_admin(&user)?;

    let drift = counters::reconcile(&state.db).await?;
    info!(user_id = %user.id, fixed = drift.len(), "Counters reconciled by admin");

    Ok(Json(ReconcileResponse {
        message: if drift.is_empty() {
            "All course counters are consistent".to_string()
        } else {
            format!("Repaired counters on {} course(s)", drift.len())
        },
        fixed: drift.len(),
        courses: drift,
    }))
}
