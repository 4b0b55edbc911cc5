use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::core::errors::Error;
use crate::store::{IsolationLevel, MenuId};
use crate::trial::{run_trial, Scenario, TrialReport, TrialSpec};

use super::AppState;

/// Query parameters shared by every trial route.
///
/// Both arrive as strings so that a missing and a malformed `menuId` get
/// the same client-facing answer.
#[derive(Debug, Deserialize)]
pub(super) struct TrialParams {
    #[serde(rename = "menuId")]
    menu_id: Option<String>,
    #[serde(rename = "isolationLevel")]
    isolation_level: Option<String>,
}

pub(super) async fn health(State(state): State<AppState>) -> Response {
    Json(json!({
        "message": "menu service is running",
        "menuItems": state.store.row_count(),
        "lockStats": state.store.lock_stats(),
    }))
    .into_response()
}

pub(super) async fn dirty_read(
    State(state): State<AppState>,
    Query(params): Query<TrialParams>,
) -> Response {
    run_scenario(state, Scenario::DirtyRead, params).await
}

pub(super) async fn non_repeatable_read(
    State(state): State<AppState>,
    Query(params): Query<TrialParams>,
) -> Response {
    run_scenario(state, Scenario::NonRepeatableRead, params).await
}

pub(super) async fn lost_update(
    State(state): State<AppState>,
    Query(params): Query<TrialParams>,
) -> Response {
    run_scenario(state, Scenario::LostUpdate, params).await
}

pub(super) async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not found" })),
    )
        .into_response()
}

async fn run_scenario(state: AppState, scenario: Scenario, params: TrialParams) -> Response {
    let menu_id: MenuId = match params.menu_id.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => match raw.parse() {
            Ok(id) => id,
            Err(_) => return bad_request("menuId is required"),
        },
        _ => return bad_request("menuId is required"),
    };
    if state.store.item(menu_id).is_none() {
        return menu_item_not_found();
    }

    let mut spec = TrialSpec::new(scenario, menu_id);
    match params.isolation_level.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => match raw.parse::<IsolationLevel>() {
            Ok(level) => spec = spec.with_isolation(level),
            Err(err) => return bad_request(&err.to_string()),
        },
        _ => {}
    }

    // The trial holds two pooled connections and must restore the row when
    // it ends; run it on its own task so a dropped request cannot cancel
    // the cleanup mid-script.
    let store = state.store.clone();
    let task = tokio::spawn(async move { run_trial(&store, spec).await });

    match task.await {
        Ok(Ok(report)) => {
            let status = if report.success {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(report)).into_response()
        }
        Ok(Err(Error::RowNotFound(_))) => menu_item_not_found(),
        Ok(Err(err)) => {
            error!(%scenario, error = %err, "trial could not run");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TrialReport::failed(scenario, &err)),
            )
                .into_response()
        }
        Err(join_err) => {
            error!(%scenario, error = %join_err, "trial task panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": format!("{} Test Failed", scenario.label()),
                    "error": "trial task failed",
                })),
            )
                .into_response()
        }
    }
}

fn menu_item_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Menu item not found" })),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
        .into_response()
}
