use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use tracing::{error, instrument};

use super::{dto::OwnerCode, repo::CodeStore, services::issue_owner_code};
use crate::{auth::jwt::AuthUser, state::AppState};

pub fn codes_routes() -> Router<AppState> {
    Router::new()
        .route("/codes", post(create_code))
        .route("/codes/mine", get(my_code))
}

fn code_store(state: &AppState) -> Result<&Arc<dyn CodeStore>, (StatusCode, String)> {
    state.codes.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "Invite codes need the hosted backend.".to_string(),
    ))
}

#[instrument(skip(state))]
pub async fn create_code(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<OwnerCode>, (StatusCode, String)> {
    let store = code_store(&state)?;
    let code = issue_owner_code(store.as_ref(), user.user_id)
        .await
        .map_err(|e| {
            error!(error = %format!("{e:#}"), user_id = %user.user_id, "issue code failed");
            (StatusCode::BAD_GATEWAY, format!("{e:#}"))
        })?;
    Ok(Json(code.into()))
}

#[instrument(skip(state))]
pub async fn my_code(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<OwnerCode>, (StatusCode, String)> {
    let store = code_store(&state)?;
    store
        .find_by_owner(user.user_id)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("{e:#}")))?
        .map(|code| Json(code.into()))
        .ok_or((StatusCode::NOT_FOUND, "No code yet".to_string()))
}
