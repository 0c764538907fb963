use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use super::{
    dto::{AccessRequest, AccessRequestReceived, DropView, VerifyCodeRequest, VerifyCodeResponse},
    services::{drop_state, validate_request, verify_code, GateOutcome, PRIVATE_PAGE, REQUEST_RECEIVED},
};
use crate::{
    state::AppState,
    telemetry::{record_auth, AuthEvent, Outcome},
};

pub fn access_routes() -> Router<AppState> {
    Router::new()
        .route("/access/verify", post(verify))
        .route("/access/request", post(request_access))
        .route("/access/drop", get(drop_window))
}

#[instrument(skip(state, payload))]
pub async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyCodeRequest>,
) -> Result<Json<VerifyCodeResponse>, (StatusCode, String)> {
    let outcome = verify_code(&state.config.access, state.codes.as_deref(), &payload.code)
        .await
        .map_err(|e| {
            error!(error = %format!("{e:#}"), "code check failed");
            (StatusCode::BAD_GATEWAY, format!("{e:#}"))
        })?;

    match outcome {
        GateOutcome::Granted => {
            info!("access code accepted");
            Ok(Json(VerifyCodeResponse {
                message: outcome.message().into(),
                redirect: PRIVATE_PAGE.into(),
            }))
        }
        GateOutcome::Missing | GateOutcome::BadFormat => {
            Err((StatusCode::BAD_REQUEST, outcome.message().into()))
        }
        GateOutcome::Unknown | GateOutcome::Exhausted => {
            warn!(?outcome, "access code refused");
            Err((StatusCode::FORBIDDEN, outcome.message().into()))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn request_access(
    State(state): State<AppState>,
    Json(payload): Json<AccessRequest>,
) -> Result<Json<AccessRequestReceived>, (StatusCode, String)> {
    if let Err(msg) = validate_request(&payload) {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, msg.into()));
    }

    record_auth(
        state.activity.as_ref(),
        AuthEvent::new("access_request", Outcome::Success, &payload.email).metadata(json!({
            "name": payload.name.trim(),
            "social": payload.social.trim(),
            "reason": payload.reason.trim(),
        })),
    )
    .await;
    info!("access request received");
    Ok(Json(AccessRequestReceived {
        message: REQUEST_RECEIVED.into(),
    }))
}

#[instrument(skip(state))]
pub async fn drop_window(State(state): State<AppState>) -> Json<DropView> {
    let now = OffsetDateTime::now_utc();
    let window = drop_state(&state.config.access, now);
    Json(DropView {
        open: window.is_open(),
        message: window.message(),
        ends_at: window.is_open().then_some(state.config.access.drop_end).flatten(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::telemetry::memory::MemoryActivityLog;

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, String) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn verify_reports_each_outcome() {
        let app = access_routes().with_state(AppState::fake());

        let (status, body) = call(app.clone(), post("/access/verify", json!({ "code": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Enter a code to continue.");

        let (status, body) = call(app.clone(), post("/access/verify", json!({ "code": "nope" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Use your issued access code.");

        let (status, body) = call(app.clone(), post("/access/verify", json!({ "code": "RES-ZZZZ" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "Code not recognised. Request access if needed.");

        let (status, body) = call(app, post("/access/verify", json!({ "code": "founder-001" }))).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["redirect"], PRIVATE_PAGE);
    }

    #[tokio::test]
    async fn access_request_is_logged() {
        let mut state = AppState::fake();
        let activity = Arc::new(MemoryActivityLog::default());
        state.activity = activity.clone();
        let app = access_routes().with_state(state);

        let (status, body) = call(
            app.clone(),
            post("/access/request", json!({ "name": "Ana", "email": "ana@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body, "Check your details. Some fields are missing.");

        let (status, _) = call(
            app,
            post(
                "/access/request",
                json!({ "name": "Ana", "email": "ana@example.com", "social": "@ana", "reason": "Collector" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(activity.auth_actions(), vec![("access_request", Outcome::Success)]);
    }

    #[tokio::test]
    async fn drop_defaults_to_closed() {
        let app = access_routes().with_state(AppState::fake());
        let (status, body) = call(app, Request::get("/access/drop").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["open"], false);
        assert_eq!(body["message"], "Closed for now. Request a code to enter.");
    }
}
