//! Status endpoints
//!
//! Read-only views of the shared status record.

use super::common::ApiResponse;
use super::AppState;
use crate::status::StatusRecord;
use crate::VERSION;
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// GET / - Current egress status
pub async fn get_status(State(state): State<AppState>) -> ApiResponse<StatusRecord> {
    ApiResponse::success(state.store.read())
}

/// GET /version - Build version
pub async fn version() -> Json<Value> {
    Json(json!({ "version": VERSION }))
}
