use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{EditorForm, EditorState, PublicProfileQuery, PublicProfileView, RemoteWrite, SaveResponse},
    editor::{build_profile, editor_state, load_profile, EditorSession},
    render::{render, view_from_profile, AssetPresence},
};
use crate::{auth::jwt::AuthUser, state::AppState};

/// How long the client shows "Saved" before moving to the public page.
pub const REDIRECT_AFTER_MS: u64 = 800;

pub fn editor_routes() -> Router<AppState> {
    Router::new()
        .route("/editor", get(get_editor))
        .route("/editor/save", post(save_profile))
        .route("/editor/preview", post(preview_profile))
}

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/public/profile", get(public_profile))
}

fn session(user: Option<AuthUser>) -> Option<EditorSession> {
    user.map(|u| EditorSession {
        owner_id: u.user_id,
        email: u.email,
    })
}

#[instrument(skip(state, user))]
pub async fn get_editor(
    State(state): State<AppState>,
    user: Option<AuthUser>,
) -> Result<Json<EditorState>, (StatusCode, String)> {
    let session = session(user);
    let (source, profile) = load_profile(&state.profiles, session.as_ref())
        .await
        .map_err(|e| {
            error!(error = %format!("{e:#}"), "load profile failed");
            (StatusCode::BAD_GATEWAY, format!("{e:#}"))
        })?;
    let config = state.config.clone();
    Ok(Json(editor_state(source, profile.as_ref(), |slug| {
        config.public_profile_url(slug)
    })))
}

#[instrument(skip(state, user, form))]
pub async fn save_profile(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Json(form): Json<EditorForm>,
) -> Result<(StatusCode, Json<SaveResponse>), (StatusCode, String)> {
    let owner_id = user.as_ref().map(|u| u.user_id);
    let profile = build_profile(&form, owner_id)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let outcome = state.profiles.save(owner_id, &profile).await;
    let public_url = state.config.public_profile_url(&profile.slug);

    let (status, message, redirect_after_ms) = match (&outcome.remote, outcome.draft_saved) {
        (RemoteWrite::Failed(raw), _) => {
            warn!(slug = %profile.slug, "profile saved locally only");
            (StatusCode::BAD_GATEWAY, raw.clone(), 0)
        }
        (RemoteWrite::Skipped, false) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Could not save the profile on this device.".into(),
            ));
        }
        _ => (StatusCode::OK, "Saved. Redirecting…".to_string(), REDIRECT_AFTER_MS),
    };

    info!(slug = %profile.slug, remote = ?outcome.remote, draft = outcome.draft_saved, "profile saved");
    Ok((
        status,
        Json(SaveResponse {
            slug: profile.slug,
            public_url,
            redirect_after_ms,
            remote: outcome.remote,
            draft_saved: outcome.draft_saved,
            message,
        }),
    ))
}

/// Renders unsaved form input the way the public page would. Nothing is stored.
#[instrument(skip(state, form))]
pub async fn preview_profile(
    State(state): State<AppState>,
    Json(form): Json<EditorForm>,
) -> Result<Json<PublicProfileView>, (StatusCode, String)> {
    let profile =
        build_profile(&form, None).map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    let assets = AssetPresence {
        gallery: !state.media.gallery(&profile.slug).await.is_empty(),
        music: !state.media.music(&profile.slug).await.is_empty(),
    };
    Ok(Json(view_from_profile(&profile, assets, true)))
}

#[instrument(skip(state))]
pub async fn public_profile(
    State(state): State<AppState>,
    Query(q): Query<PublicProfileQuery>,
) -> Json<PublicProfileView> {
    let view = render(
        &state.profiles,
        &state.media,
        q.u.as_deref(),
        q.is_preview(),
        Duration::from_millis(state.config.render_min_dwell_ms),
    )
    .await;
    Json(view)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        extract::FromRef,
        http::{header, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::{
        auth::jwt::JwtKeys,
        profiles::repo::{memory::MemoryProfileStore, ProfileRepository},
    };

    fn app(state: AppState) -> Router {
        Router::new()
            .merge(editor_routes())
            .merge(public_routes())
            .with_state(state)
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    fn post(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::get(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        req.body(Body::empty()).unwrap()
    }

    fn with_remote(remote: Arc<MemoryProfileStore>) -> AppState {
        let mut state = AppState::fake();
        state.profiles = ProfileRepository::new(Some(remote), state.profiles.drafts().clone());
        state
    }

    #[tokio::test]
    async fn local_save_then_public_render() {
        let app = app(AppState::fake());
        let (status, body) = call(
            &app,
            post(
                "/editor/save",
                json!({
                    "name": "Ana Silva",
                    "bio": "Cards and prints.",
                    "settings": { "show_title": false, "show_bio": true },
                    "contact": { "website": { "value": "ana.example", "hidden": false } }
                }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["slug"], "ana-silva");
        assert_eq!(body["redirect_after_ms"], 800);
        assert_eq!(body["remote"]["status"], "skipped");

        let (status, view) = call(&app, get("/public/profile?u=Ana-Silva", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["placeholder"], false);
        assert_eq!(view["bio"], "Cards and prints.");
        assert_eq!(view["links"][0]["url"], "https://ana.example");
        assert_eq!(view["links"].as_array().unwrap().len(), 1);

        let (_, editor) = call(&app, get("/editor", None)).await;
        assert_eq!(editor["source"], "draft");
        assert_eq!(editor["form"]["name"], "Ana Silva");
    }

    #[tokio::test]
    async fn empty_name_is_rejected_before_any_write() {
        let state = AppState::fake();
        let drafts = state.profiles.drafts().clone();
        let app = app(state);
        let (status, _) = call(&app, post("/editor/save", json!({ "name": "  ", "slug": "x" }), None)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(drafts.latest().await.is_none());
    }

    #[tokio::test]
    async fn signed_in_editor_creates_then_saves_remote_row() {
        let remote = Arc::new(MemoryProfileStore::default());
        let state = with_remote(remote.clone());
        let owner = Uuid::new_v4();
        let token = JwtKeys::from_ref(&state)
            .sign_access(owner, "ana.silva@example.com")
            .unwrap();
        let app = app(state);

        let (status, editor) = call(&app, get("/editor", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(editor["source"], "remote");
        assert_eq!(editor["form"]["slug"], "ana-silva");
        assert!(remote.rows.lock().await.contains_key(&owner));

        let (status, body) = call(
            &app,
            post("/editor/save", json!({ "name": "Ana", "slug": "ana" }), Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["remote"]["status"], "saved");
        assert_eq!(remote.rows.lock().await[&owner].slug, "ana");
    }

    #[tokio::test]
    async fn remote_failure_reports_raw_error_and_keeps_draft() {
        let state = with_remote(Arc::new(MemoryProfileStore::failing()));
        let token = JwtKeys::from_ref(&state)
            .sign_access(Uuid::new_v4(), "ana@example.com")
            .unwrap();
        let app = app(state);

        let (status, body) = call(
            &app,
            post("/editor/save", json!({ "name": "Ana" }), Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["message"], "connection refused");
        assert_eq!(body["draft_saved"], true);
        assert_eq!(body["redirect_after_ms"], 0);
    }

    #[tokio::test]
    async fn preview_does_not_persist() {
        let state = AppState::fake();
        let drafts = state.profiles.drafts().clone();
        let app = app(state);
        let (status, view) = call(
            &app,
            post("/editor/preview", json!({ "name": "Ana", "title": "Maker" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["preview"], true);
        assert_eq!(view["title"], "Maker");
        assert!(drafts.latest().await.is_none());
    }

    #[tokio::test]
    async fn missing_slug_renders_placeholder() {
        let app = app(AppState::fake());
        let (status, view) = call(&app, get("/public/profile", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["placeholder"], true);
        assert_eq!(view["name"], "Your name");
    }
}
