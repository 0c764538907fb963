use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use super::{
    repo::Track,
    services::{clean_gallery, clean_tracks, gallery_view, music_view, GalleryView, MusicView},
};
use crate::{
    auth::jwt::AuthUser,
    profiles::{
        render::normalize_slug,
        repo::Resolution,
        slug::slugify,
    },
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SlugQuery {
    pub u: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GalleryUpdate {
    pub slug: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MusicUpdate {
    pub slug: String,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

pub fn media_routes() -> Router<AppState> {
    Router::new()
        .route("/public/gallery", get(public_gallery))
        .route("/public/music", get(public_music))
        .route("/editor/gallery", put(update_gallery))
        .route("/editor/music", put(update_music))
}

fn required_slug(raw: Option<&str>) -> Result<String, (StatusCode, String)> {
    normalize_slug(raw).ok_or((StatusCode::BAD_REQUEST, "Missing profile slug".to_string()))
}

async fn owner_name(state: &AppState, slug: &str) -> Option<String> {
    match state.profiles.resolve_by_slug(slug).await {
        Resolution::Remote(p) | Resolution::Draft(p) => Some(p.name),
        Resolution::NotFound | Resolution::Unavailable(_) => None,
    }
}

#[instrument(skip(state))]
pub async fn public_gallery(
    State(state): State<AppState>,
    Query(q): Query<SlugQuery>,
) -> Result<Json<GalleryView>, (StatusCode, String)> {
    let slug = required_slug(q.u.as_deref())?;
    let name = owner_name(&state, &slug).await;
    let images = state.media.gallery(&slug).await;
    Ok(Json(gallery_view(&slug, name.as_deref(), images)))
}

#[instrument(skip(state))]
pub async fn public_music(
    State(state): State<AppState>,
    Query(q): Query<SlugQuery>,
) -> Result<Json<MusicView>, (StatusCode, String)> {
    let slug = required_slug(q.u.as_deref())?;
    let name = owner_name(&state, &slug).await;
    let tracks = state.media.music(&slug).await;
    Ok(Json(music_view(&slug, name.as_deref(), tracks)))
}

/// With a hosted backend, a signed-in owner may only edit their own slug and an
/// anonymous caller may not touch a slug that belongs to a hosted profile.
async fn authorize_slug(
    state: &AppState,
    user: Option<&AuthUser>,
    raw_slug: &str,
) -> Result<String, (StatusCode, String)> {
    let slug = slugify(raw_slug);
    if slug.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Slug / URL is required.".into()));
    }
    let Some(remote) = state.profiles.remote() else {
        return Ok(slug);
    };

    let lookup = match user {
        Some(user) => remote.find_by_owner(user.user_id).await,
        None => remote.find_by_slug(&slug).await,
    };
    let profile = lookup.map_err(|e| {
        error!(error = %format!("{e:#}"), %slug, "profile lookup failed");
        (StatusCode::BAD_GATEWAY, format!("{e:#}"))
    })?;

    match (user, profile) {
        (Some(_), Some(own)) if own.slug == slug => Ok(slug),
        (Some(user), _) => {
            warn!(user_id = %user.user_id, %slug, "media edit for a slug the user does not own");
            Err((StatusCode::FORBIDDEN, "You can only edit your own profile.".into()))
        }
        (None, Some(_)) => Err((StatusCode::UNAUTHORIZED, "Sign in to edit this profile.".into())),
        (None, None) => Ok(slug),
    }
}

#[instrument(skip(state, user, payload))]
pub async fn update_gallery(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Json(payload): Json<GalleryUpdate>,
) -> Result<Json<GalleryView>, (StatusCode, String)> {
    let slug = authorize_slug(&state, user.as_ref(), &payload.slug).await?;
    let images = clean_gallery(payload.images).map_err(|m| (StatusCode::UNPROCESSABLE_ENTITY, m))?;
    state.media.set_gallery(&slug, &images).await.map_err(|e| {
        error!(error = %e, %slug, "gallery save failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    info!(%slug, count = images.len(), "gallery saved");
    let name = owner_name(&state, &slug).await;
    Ok(Json(gallery_view(&slug, name.as_deref(), images)))
}

#[instrument(skip(state, user, payload))]
pub async fn update_music(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Json(payload): Json<MusicUpdate>,
) -> Result<Json<MusicView>, (StatusCode, String)> {
    let slug = authorize_slug(&state, user.as_ref(), &payload.slug).await?;
    let tracks = clean_tracks(payload.tracks).map_err(|m| (StatusCode::UNPROCESSABLE_ENTITY, m))?;
    state.media.set_music(&slug, &tracks).await.map_err(|e| {
        error!(error = %e, %slug, "music save failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    info!(%slug, count = tracks.len(), "music saved");
    let name = owner_name(&state, &slug).await;
    Ok(Json(music_view(&slug, name.as_deref(), tracks)))
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
        profiles::{
            repo::{memory::MemoryProfileStore, ProfileRepository, ProfileStore},
            repo_types::{StoredProfile, Theme},
        },
    };

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    fn put_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut req = Request::put(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    fn profile(owner: Uuid, slug: &str) -> StoredProfile {
        StoredProfile {
            owner_id: Some(owner),
            name: "Ana".into(),
            slug: slug.into(),
            title: String::new(),
            bio: String::new(),
            avatar_url: String::new(),
            theme: Theme::Dark,
            links: Vec::new(),
        }
    }

    #[tokio::test]
    async fn local_gallery_roundtrip() {
        let app = media_routes().with_state(AppState::fake());
        let (status, _) = call(
            app.clone(),
            put_json("/editor/gallery", json!({ "slug": "Ana", "images": ["https://x/a.jpg"] }), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            app,
            Request::get("/public/gallery?u=ANA").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["images"][0]["alt"], "Gallery image 1");
        assert_eq!(body["title"], "Gallery");
    }

    #[tokio::test]
    async fn music_without_uploads_shows_sample() {
        let app = media_routes().with_state(AppState::fake());
        let (status, body) = call(
            app,
            Request::get("/public/music?u=nobody").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sample"], true);
    }

    #[tokio::test]
    async fn hosted_profiles_only_accept_their_owner() {
        let owner = Uuid::new_v4();
        let remote = Arc::new(MemoryProfileStore::default());
        remote.save(owner, &profile(owner, "ana")).await.unwrap();

        let mut state = AppState::fake();
        state.profiles = ProfileRepository::new(
            Some(remote),
            state.profiles.drafts().clone(),
        );
        let keys = JwtKeys::from_ref(&state);
        let owner_token = keys.sign_access(owner, "ana@example.com").unwrap();
        let other_token = keys.sign_access(Uuid::new_v4(), "eve@example.com").unwrap();
        let app = media_routes().with_state(state);

        let body = json!({ "slug": "ana", "tracks": [{ "src": "https://x/1.mp3" }] });
        let (status, _) = call(app.clone(), put_json("/editor/music", body.clone(), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(app.clone(), put_json("/editor/music", body.clone(), Some(&other_token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, view) = call(app, put_json("/editor/music", body, Some(&owner_token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["title"], "Ana Music");
        assert_eq!(view["tracks"][0]["name"], "Track 1");
    }
}
